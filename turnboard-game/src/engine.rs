//! Command reducer for one session.
//!
//! [`TurnEngine::handle`] validates a [`Command`] against the current phase,
//! mutates the session and shared state, and returns the [`Effect`]s the
//! caller must perform: pushes to the remote document, step scheduling,
//! scoring requests, alerts, persistence, and timer control. The engine never
//! performs I/O itself, so every turn can be replayed deterministically from a
//! seed and a command list.

use log::{debug, info, warn};
use smallvec::SmallVec;
use std::collections::BTreeMap;

use crate::board::{Board, SquareKind};
use crate::cards::LandingContext;
use crate::config::{ConfigError, EngineConfig};
use crate::data::CardDeck;
use crate::movement::{self, StepOutcome, Walk};
use crate::resources::Resources;
use crate::rng::RngBundle;
use crate::scoring::{
    ScoringError, ScoringRequest, ScoringResponse, apply_pipeline, clamp_raw,
};
use crate::state::{
    ChosenOption, GameState, Phase, ScoringOutcome, Session, SessionStatus, StatePatch,
    TurnRecord,
};
use crate::turn::{self, CommandError, require_phase, transition};

/// Dice total typed in by the facilitator instead of a digital roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualRoll {
    pub total: u8,
    /// Prefer a double when the total allows one.
    pub double: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartGame,
    RollDice,
    ManualRoll(ManualRoll),
    /// The step delay elapsed; move one square.
    StepElapsed,
    AcknowledgeLapBonus,
    SelectOption(Option<String>),
    EditJustification(String),
    CastVote { voter: String, option_id: String },
    SubmitDecision,
    ScoringCompleted(Result<ScoringResponse, ScoringError>),
    TimerTick,
    Pause,
    Resume,
    GrantMultiplier(u8),
    ArmBroadcast,
    ResetSession,
    EndSession,
}

impl Command {
    /// Commands any client may issue while a decision is open.
    #[must_use]
    pub const fn is_shared_edit(&self) -> bool {
        matches!(
            self,
            Self::SelectOption(_) | Self::EditJustification(_) | Self::CastVote { .. }
        )
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StartGame => "start game",
            Self::RollDice => "roll dice",
            Self::ManualRoll(_) => "manual roll",
            Self::StepElapsed => "step",
            Self::AcknowledgeLapBonus => "acknowledge lap bonus",
            Self::SelectOption(_) => "select option",
            Self::EditJustification(_) => "edit justification",
            Self::CastVote { .. } => "cast vote",
            Self::SubmitDecision => "submit decision",
            Self::ScoringCompleted(_) => "complete scoring",
            Self::TimerTick => "timer tick",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::GrantMultiplier(_) => "grant multiplier",
            Self::ArmBroadcast => "arm broadcast",
            Self::ResetSession => "reset session",
            Self::EndSession => "end session",
        }
    }
}

/// Work the caller performs after a command is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Merge into the remote document.
    Push(StatePatch),
    /// Deliver `Command::StepElapsed` after the delay.
    ScheduleStep { delay_ms: u64 },
    /// Show the lap bonus. When `awaiting_ack` is set the walk is suspended
    /// until `Command::AcknowledgeLapBonus`.
    ShowLapBonus {
        team: usize,
        delta: Resources,
        awaiting_ack: bool,
    },
    /// Score the decision and answer with `Command::ScoringCompleted`.
    RequestScoring(ScoringRequest),
    Alert(String),
    /// Save the session (teams, histories, status) to the repository.
    PersistSession,
    StartDecisionTimer,
    StopDecisionTimer,
}

pub type EffectList = SmallVec<[Effect; 4]>;

#[derive(Debug, Clone)]
pub struct TurnEngine {
    session: Session,
    state: GameState,
    board: Board,
    deck: CardDeck,
    config: EngineConfig,
    rng: RngBundle,
    walk: Option<Walk>,
}

impl TurnEngine {
    /// Engine on the standard board.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid for the board.
    pub fn new(session: Session, deck: CardDeck, config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_board(session, Board::standard(), deck, config)
    }

    /// Engine on a custom board.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid for the board.
    pub fn with_board(
        session: Session,
        board: Board,
        deck: CardDeck,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate(&board)?;
        let rng = RngBundle::from_user_seed(session.seed);
        let mut state = GameState::for_teams(session.teams.len());
        state.positions = session.teams.iter().map(|team| team.position).collect();
        Ok(Self {
            session,
            state,
            board,
            deck,
            config,
            rng,
            walk: None,
        })
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub const fn state(&self) -> &GameState {
        &self.state
    }

    /// Mutable state for the authority guard to apply remote snapshots.
    pub const fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    #[must_use]
    pub const fn board(&self) -> &Board {
        &self.board
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn pending_walk(&self) -> Option<&Walk> {
        self.walk.as_ref()
    }

    /// Replace the session with a newer copy from the repository.
    pub fn replace_session(&mut self, session: Session) {
        self.session = session;
    }

    /// Apply one command.
    ///
    /// # Errors
    ///
    /// Returns a `CommandError` when the command is not valid in the current
    /// phase or carries invalid input. Nothing is mutated in that case.
    pub fn handle(&mut self, command: Command, now_ms: i64) -> Result<EffectList, CommandError> {
        if self.session.status == SessionStatus::Ended && command != Command::ResetSession {
            return Err(CommandError::SessionEnded);
        }
        let name = command.name();
        let mut effects = EffectList::new();
        match command {
            Command::StartGame => self.start_game(name, now_ms, &mut effects)?,
            Command::RollDice => {
                require_phase(&self.state, Phase::Idle, name)?;
                let dice = self.rng.roll_pair();
                self.begin_roll(dice, name, now_ms, &mut effects)?;
            }
            Command::ManualRoll(roll) => {
                require_phase(&self.state, Phase::Idle, name)?;
                let dice = movement::split_manual(roll.total, roll.double)
                    .ok_or(CommandError::InvalidManualTotal(roll.total))?;
                self.begin_roll(dice, name, now_ms, &mut effects)?;
            }
            Command::StepElapsed => self.step(name, now_ms, &mut effects)?,
            Command::AcknowledgeLapBonus => {
                require_phase(&self.state, Phase::Moving, name)?;
                if !self.state.lap_bonus_pending {
                    return Err(CommandError::NoPendingLapBonus);
                }
                self.state.lap_bonus_pending = false;
                self.push_full(now_ms, &mut effects);
                effects.push(self.schedule_step());
            }
            Command::SelectOption(option) => {
                self.require_editable(name)?;
                if let Some(option_id) = &option {
                    self.require_option(option_id)?;
                }
                self.state.selected_option = option;
                self.push_editing(now_ms, &mut effects);
            }
            Command::EditJustification(text) => {
                self.require_editable(name)?;
                self.state.justification = text;
                self.push_editing(now_ms, &mut effects);
            }
            Command::CastVote { voter, option_id } => {
                require_phase(&self.state, Phase::Decision, name)?;
                self.require_option(&option_id)?;
                cast_vote(&mut self.state.votes, voter, option_id);
                self.touch(now_ms);
                effects.push(Effect::Push(StatePatch::votes(self.state.votes.clone())));
            }
            Command::SubmitDecision => self.submit(name, now_ms, &mut effects)?,
            Command::ScoringCompleted(result) => {
                require_phase(&self.state, Phase::Decision, name)?;
                if !self.state.is_processing {
                    return Err(CommandError::NoScoringPending);
                }
                match result {
                    Ok(response) => self.resolve_decision(&response, now_ms, &mut effects),
                    Err(err) => {
                        warn!("scoring failed: {err}");
                        self.state.is_submitting = false;
                        self.state.is_processing = false;
                        self.state.push_log(format!("Scoring failed: {err}"));
                        self.push_full(now_ms, &mut effects);
                        effects.push(Effect::Alert(format!("Scoring failed: {err}")));
                    }
                }
            }
            Command::TimerTick => {
                if turn::tick_timer(&mut self.state) {
                    self.touch(now_ms);
                    effects.push(Effect::Push(StatePatch::timer(self.state.timer_remaining)));
                }
            }
            Command::Pause => {
                let prior = turn::pause(&mut self.state)?;
                self.session.status = SessionStatus::Paused;
                self.state.push_log("Game paused");
                if prior == Phase::Decision {
                    effects.push(Effect::StopDecisionTimer);
                }
                self.push_full(now_ms, &mut effects);
                effects.push(Effect::PersistSession);
            }
            Command::Resume => {
                let prior = turn::resume(&mut self.state)?;
                self.session.status = SessionStatus::Active;
                self.state.push_log("Game resumed");
                self.push_full(now_ms, &mut effects);
                match prior {
                    Phase::Decision => effects.push(Effect::StartDecisionTimer),
                    Phase::Moving if self.walk.is_some() && !self.state.lap_bonus_pending => {
                        effects.push(self.schedule_step());
                    }
                    _ => {}
                }
                effects.push(Effect::PersistSession);
            }
            Command::GrantMultiplier(factor) => {
                if !matches!(factor, 2 | 3) {
                    return Err(CommandError::InvalidMultiplier(factor));
                }
                if !self.state.is_game_started {
                    return Err(CommandError::GameNotStarted);
                }
                self.state.modifiers.custom_multiplier = Some(factor);
                self.state
                    .push_log(format!("Facilitator armed a x{factor} multiplier"));
                self.push_full(now_ms, &mut effects);
            }
            Command::ArmBroadcast => {
                if !self.state.is_game_started {
                    return Err(CommandError::GameNotStarted);
                }
                self.state.modifiers.broadcast = true;
                self.state.push_log("Broadcast mode armed");
                self.push_full(now_ms, &mut effects);
            }
            Command::ResetSession => self.reset(now_ms, &mut effects),
            Command::EndSession => {
                self.session.status = SessionStatus::Ended;
                self.walk = None;
                self.state.push_log("Session ended");
                info!("session {} ended", self.session.id);
                effects.push(Effect::StopDecisionTimer);
                self.push_full(now_ms, &mut effects);
                effects.push(Effect::PersistSession);
            }
        }
        Ok(effects)
    }

    fn start_game(
        &mut self,
        name: &'static str,
        now_ms: i64,
        effects: &mut EffectList,
    ) -> Result<(), CommandError> {
        require_phase(&self.state, Phase::WaitingToStart, name)?;
        if self.session.teams.is_empty() {
            return Err(CommandError::NoTeams);
        }
        transition(&mut self.state, Phase::Idle, name)?;
        self.state.is_game_started = true;
        self.state.turn = 1;
        self.state.current_team_index = 0;
        self.sync_positions();
        self.state.push_log(format!(
            "Game started with {} teams",
            self.session.teams.len()
        ));
        info!("session {} started", self.session.id);
        self.push_full(now_ms, effects);
        effects.push(Effect::PersistSession);
        Ok(())
    }

    fn begin_roll(
        &mut self,
        dice: (u8, u8),
        name: &'static str,
        now_ms: i64,
        effects: &mut EffectList,
    ) -> Result<(), CommandError> {
        let team_index = self.state.current_team_index;
        if team_index >= self.session.teams.len() {
            return Err(CommandError::NoTeams);
        }
        transition(&mut self.state, Phase::Rolling, name)?;
        self.state.dice = Some(dice);
        self.state.modifiers.double = dice.0 == dice.1;
        let team_name = self.team_name(team_index);
        let double = if dice.0 == dice.1 { " (double)" } else { "" };
        self.state
            .push_log(format!("{team_name} rolled {} + {}{double}", dice.0, dice.1));
        self.push_full(now_ms, effects);

        transition(&mut self.state, Phase::Moving, name)?;
        self.walk = Some(Walk::new(team_index, dice.0 + dice.1));
        self.push_full(now_ms, effects);
        effects.push(self.schedule_step());
        Ok(())
    }

    fn step(
        &mut self,
        name: &'static str,
        now_ms: i64,
        effects: &mut EffectList,
    ) -> Result<(), CommandError> {
        require_phase(&self.state, Phase::Moving, name)?;
        if self.state.lap_bonus_pending {
            return Err(CommandError::IllegalPhase {
                command: name,
                phase: self.state.phase,
            });
        }
        let Some(mut walk) = self.walk.take() else {
            warn!("step without a pending walk; returning to idle");
            transition(&mut self.state, Phase::Idle, name)?;
            self.push_full(now_ms, effects);
            return Ok(());
        };
        let Some(team) = self.session.teams.get_mut(walk.team) else {
            warn!("walk references missing team {}", walk.team);
            transition(&mut self.state, Phase::Idle, name)?;
            self.push_full(now_ms, effects);
            return Ok(());
        };

        let team_name = team.name.clone();
        let outcome = movement::advance(team, &mut walk, &self.board, &self.config.lap_bonus);
        self.sync_positions();
        match outcome {
            StepOutcome::Advanced { position } => {
                debug!("team {} advanced to {position}", walk.team);
                self.walk = Some(walk);
                self.push_full(now_ms, effects);
                effects.push(self.schedule_step());
            }
            StepOutcome::LapBonus { delta, remaining } => {
                self.walk = Some(walk);
                self.state.lap_bonus_pending = true;
                self.state.push_log(format!(
                    "{team_name} passed Start: lap bonus {delta} ({remaining} steps left)"
                ));
                self.push_full(now_ms, effects);
                effects.push(Effect::ShowLapBonus {
                    team: walk.team,
                    delta,
                    awaiting_ack: true,
                });
                effects.push(Effect::PersistSession);
            }
            StepOutcome::Landed {
                position,
                lap_bonus,
            } => {
                if let Some(delta) = lap_bonus {
                    self.state
                        .push_log(format!("{team_name} landed on Start: lap bonus {delta}"));
                    effects.push(Effect::ShowLapBonus {
                        team: walk.team,
                        delta,
                        awaiting_ack: false,
                    });
                }
                self.land(walk, position, name, now_ms, effects)?;
            }
        }
        Ok(())
    }

    fn land(
        &mut self,
        walk: Walk,
        position: usize,
        name: &'static str,
        now_ms: i64,
        effects: &mut EffectList,
    ) -> Result<(), CommandError> {
        let team_name = self.team_name(walk.team);
        let answered = self
            .session
            .teams
            .get(walk.team)
            .is_some_and(|team| movement::needs_reroll(team, &self.board, position));

        if answered {
            if walk.rerolls >= self.config.max_consecutive_rerolls {
                info!("{team_name} hit the re-roll limit on square {position}");
                self.state.push_log(format!(
                    "{team_name} hit the re-roll limit; turn ends on square {position}"
                ));
                return self.pass_through(name, now_ms, effects);
            }
            let dice = self.rng.roll_pair();
            self.state.dice = Some(dice);
            self.state.modifiers.double = dice.0 == dice.1;
            info!("{team_name} re-rolled {} + {} from square {position}", dice.0, dice.1);
            self.state.push_log(format!(
                "{team_name} already answered square {position}; re-rolled {} + {}",
                dice.0, dice.1
            ));
            self.walk = Some(walk.reroll(dice.0 + dice.1));
            self.push_full(now_ms, effects);
            effects.push(self.schedule_step());
            return Ok(());
        }

        let resolution = LandingContext {
            board: &self.board,
            deck: &self.deck,
            session: &self.session,
            config: &self.config,
        }
        .resolve(position, &mut self.rng);

        if let Some(team) = self.session.teams.get_mut(walk.team) {
            if let Some(delta) = resolution.flat_delta {
                team.resources += delta;
                self.state
                    .push_log(format!("{team_name} hit a zone on square {position}: {delta}"));
            }
            if resolution.burnout {
                team.burnout = true;
                team.burnout_count = team.burnout_count.saturating_add(1);
                self.state.push_log(format!("{team_name} is burned out"));
            }
        }

        let Some(active) = resolution.card else {
            self.state.push_log(format!(
                "{team_name} landed on {} square {position}",
                self.board.kind_at(position)
            ));
            return self.pass_through(name, now_ms, effects);
        };

        let arming = resolution.arming;
        if arming.risk {
            self.state.modifiers.risk = true;
        }
        if let Some(factor) = arming.multiplier {
            self.state.modifiers.custom_multiplier = Some(factor);
        }
        if arming.broadcast {
            self.state.modifiers.broadcast = true;
        }

        transition(&mut self.state, Phase::Decision, name)?;
        self.state.clear_decision();
        self.state.scoring_result = None;
        self.state.timer_remaining = self.config.decision_timer_units;
        self.state
            .push_log(format!("{team_name} drew \"{}\"", active.card.title));
        self.state.active_card = Some(active);
        self.push_full(now_ms, effects);
        effects.push(Effect::StartDecisionTimer);
        effects.push(Effect::PersistSession);
        Ok(())
    }

    fn pass_through(
        &mut self,
        name: &'static str,
        now_ms: i64,
        effects: &mut EffectList,
    ) -> Result<(), CommandError> {
        transition(&mut self.state, Phase::Idle, name)?;
        self.push_full(now_ms, effects);
        effects.push(Effect::PersistSession);
        Ok(())
    }

    fn submit(
        &mut self,
        name: &'static str,
        now_ms: i64,
        effects: &mut EffectList,
    ) -> Result<(), CommandError> {
        self.require_editable(name)?;
        if self.state.justification.trim().is_empty() {
            return Err(CommandError::EmptyJustification);
        }
        if let Some(option_id) = &self.state.selected_option {
            self.require_option(option_id)?;
        }
        let Some(active) = &self.state.active_card else {
            warn!("decision submitted without an active card; rotating");
            turn::rotate(&mut self.state, &mut self.session.teams);
            self.push_full(now_ms, effects);
            effects.push(Effect::StopDecisionTimer);
            return Ok(());
        };
        let chosen_option = self
            .state
            .selected_option
            .as_deref()
            .and_then(|id| active.card.option(id))
            .map(|option| option.text.clone());
        let request = ScoringRequest {
            situation: active.card.situation.clone(),
            card_kind: active.card.kind,
            chosen_option,
            justification: self.state.justification.clone(),
        };
        self.state.is_submitting = true;
        self.state.is_processing = true;
        self.push_full(now_ms, effects);
        effects.push(Effect::RequestScoring(request));
        Ok(())
    }

    fn resolve_decision(
        &mut self,
        response: &ScoringResponse,
        now_ms: i64,
        effects: &mut EffectList,
    ) {
        let (raw, clamped) = clamp_raw(response.score_delta);
        if clamped {
            warn!("scoring delta {} clamped to {raw}", response.score_delta);
        }
        let modifiers = self.state.modifiers;
        let applied = apply_pipeline(raw, &modifiers);
        let team_index = self.state.current_team_index;

        let team_name = self.team_name(team_index);
        match self.state.active_card.clone() {
            Some(active) if team_index < self.session.teams.len() => {
                let choice = self
                    .state
                    .selected_option
                    .as_deref()
                    .and_then(|id| active.card.option(id))
                    .map_or(ChosenOption::FreeText, |option| ChosenOption::Option {
                        id: option.id.clone(),
                        text: option.text.clone(),
                    });
                let record = TurnRecord {
                    turn: self.state.turn,
                    card_id: active.card.id.clone(),
                    card_title: active.card.title.clone(),
                    situation: active.card.situation.clone(),
                    choice,
                    justification: self.state.justification.clone(),
                    feedback: response.feedback.clone(),
                    delta: applied,
                    timestamp_ms: now_ms,
                    position: active.square,
                    broadcast: false,
                };
                let keeps_burnout = active.square_kind == SquareKind::Burnout;

                for (idx, team) in self.session.teams.iter_mut().enumerate() {
                    if idx == team_index {
                        team.resources += applied;
                        if team.burnout && !keeps_burnout {
                            team.burnout = false;
                        }
                        team.append_record(record.clone());
                    } else if modifiers.broadcast {
                        team.resources += applied;
                        team.append_record(TurnRecord {
                            broadcast: true,
                            ..record.clone()
                        });
                    }
                }

                info!("{team_name} resolved \"{}\" for {applied}", record.card_title);
                self.state
                    .push_log(format!("{team_name} scored {applied}"));
                if modifiers.broadcast {
                    self.state
                        .push_log("Broadcast: every other team received the same delta");
                }
                self.state.scoring_result = Some(ScoringOutcome {
                    feedback: response.feedback.clone(),
                    raw_delta: raw,
                    applied_delta: applied,
                    broadcast: modifiers.broadcast,
                });
            }
            _ => warn!("resolution without an active card or current team; rotating"),
        }

        self.state.modifiers.clear();
        turn::rotate(&mut self.state, &mut self.session.teams);
        self.sync_positions();
        self.push_full(now_ms, effects);
        effects.push(Effect::StopDecisionTimer);
        effects.push(Effect::PersistSession);
    }

    fn reset(&mut self, now_ms: i64, effects: &mut EffectList) {
        for team in &mut self.session.teams {
            team.reset();
        }
        let last_updated = self.state.last_updated;
        self.state = GameState::for_teams(self.session.teams.len());
        self.state.last_updated = last_updated;
        self.state.push_log("Session reset");
        self.session.status = SessionStatus::Active;
        self.walk = None;
        info!("session {} reset", self.session.id);
        effects.push(Effect::StopDecisionTimer);
        self.push_full(now_ms, effects);
        effects.push(Effect::PersistSession);
    }

    fn require_editable(&self, name: &'static str) -> Result<(), CommandError> {
        require_phase(&self.state, Phase::Decision, name)?;
        if self.state.is_submitting {
            return Err(CommandError::AlreadySubmitting);
        }
        Ok(())
    }

    fn require_option(&self, option_id: &str) -> Result<(), CommandError> {
        let known = self
            .state
            .active_card
            .as_ref()
            .is_some_and(|active| active.card.option(option_id).is_some());
        if known {
            Ok(())
        } else {
            Err(CommandError::UnknownOption(option_id.to_string()))
        }
    }

    fn team_name(&self, index: usize) -> String {
        self.session
            .teams
            .get(index)
            .map_or_else(|| format!("team {index}"), |team| team.name.clone())
    }

    fn sync_positions(&mut self) {
        self.state.positions = self
            .session
            .teams
            .iter()
            .map(|team| team.position)
            .collect();
    }

    const fn schedule_step(&self) -> Effect {
        Effect::ScheduleStep {
            delay_ms: self.config.step_delay_ms,
        }
    }

    fn touch(&mut self, now_ms: i64) {
        self.state.last_updated = self.state.last_updated.max(now_ms);
    }

    fn push_full(&mut self, now_ms: i64, effects: &mut EffectList) {
        self.touch(now_ms);
        effects.push(Effect::Push(StatePatch::full(&self.state)));
    }

    fn push_editing(&mut self, now_ms: i64, effects: &mut EffectList) {
        self.touch(now_ms);
        effects.push(Effect::Push(StatePatch::shared_editing(
            self.state.selected_option.clone(),
            self.state.justification.clone(),
        )));
    }
}

/// Move `voter` to `option_id`, dropping any earlier vote.
fn cast_vote(votes: &mut BTreeMap<String, Vec<String>>, voter: String, option_id: String) {
    for voters in votes.values_mut() {
        voters.retain(|name| name != &voter);
    }
    votes.retain(|_, voters| !voters.is_empty());
    votes.entry(option_id).or_default().push(voter);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessCode;
    use crate::data::{Card, CardKind, CardOption};
    use crate::state::{GameMode, Team};

    fn session(teams: usize) -> Session {
        let code: AccessCode = "246810".parse().unwrap();
        let mut session = Session::new("s1", "Demo", GameMode::Foundation, code, 1_000)
            .with_seed(11);
        for idx in 0..teams {
            session.teams.push(Team::new(
                format!("t{idx}"),
                format!("Team {idx}"),
                "red",
                vec![format!("m{idx}a"), format!("m{idx}b")],
            ));
        }
        session
    }

    fn engine(teams: usize) -> TurnEngine {
        TurnEngine::new(session(teams), CardDeck::standard(), EngineConfig::default()).unwrap()
    }

    fn started(teams: usize) -> TurnEngine {
        let mut engine = engine(teams);
        engine.handle(Command::StartGame, 1_000).unwrap();
        engine
    }

    /// Step until the walk lands, acknowledging lap bonuses along the way.
    fn walk_out(engine: &mut TurnEngine, now: i64) {
        for _ in 0..64 {
            if engine.state().phase != Phase::Moving {
                return;
            }
            if engine.state().lap_bonus_pending {
                engine.handle(Command::AcknowledgeLapBonus, now).unwrap();
            } else {
                engine.handle(Command::StepElapsed, now).unwrap();
            }
        }
        panic!("walk never finished");
    }

    fn decision_card() -> Card {
        Card {
            id: "fund-x".into(),
            kind: CardKind::Fund,
            title: "Grant".into(),
            situation: "A donor offers a grant".into(),
            options: vec![
                CardOption {
                    id: "a".into(),
                    text: "Accept".into(),
                },
                CardOption {
                    id: "b".into(),
                    text: "Decline".into(),
                },
            ],
            modes: Vec::new(),
            squares: Vec::new(),
        }
    }

    fn in_decision() -> TurnEngine {
        let mut session = session(2);
        session.card_overrides.push(decision_card());
        let mut engine =
            TurnEngine::new(session, CardDeck::standard(), EngineConfig::default()).unwrap();
        engine.handle(Command::StartGame, 1_000).unwrap();
        // Square 5 is a fund square.
        engine
            .handle(
                Command::ManualRoll(ManualRoll {
                    total: 5,
                    double: false,
                }),
                1_001,
            )
            .unwrap();
        walk_out(&mut engine, 1_002);
        assert_eq!(engine.state().phase, Phase::Decision);
        engine
    }

    #[test]
    fn start_requires_teams_and_is_one_shot() {
        let mut empty = engine(0);
        assert_eq!(empty.handle(Command::StartGame, 0), Err(CommandError::NoTeams));

        let mut engine = started(2);
        assert!(engine.state().is_game_started);
        assert_eq!(engine.state().phase, Phase::Idle);
        assert!(matches!(
            engine.handle(Command::StartGame, 2_000),
            Err(CommandError::IllegalPhase { .. })
        ));
    }

    #[test]
    fn manual_twelve_rolls_a_double_and_moves() {
        let mut engine = started(2);
        let effects = engine
            .handle(
                Command::ManualRoll(ManualRoll {
                    total: 12,
                    double: false,
                }),
                2_000,
            )
            .unwrap();
        assert_eq!(engine.state().dice, Some((6, 6)));
        assert_eq!(engine.state().phase, Phase::Moving);
        assert!(engine.state().modifiers.double);
        let phases: Vec<Phase> = effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Push(patch) => patch.phase,
                _ => None,
            })
            .collect();
        assert_eq!(phases, vec![Phase::Rolling, Phase::Moving]);
        assert!(
            effects
                .iter()
                .any(|effect| matches!(effect, Effect::ScheduleStep { .. }))
        );
    }

    #[test]
    fn manual_roll_is_rejected_outside_idle_and_out_of_range() {
        let mut engine = engine(2);
        assert!(matches!(
            engine.handle(
                Command::ManualRoll(ManualRoll {
                    total: 12,
                    double: false
                }),
                0
            ),
            Err(CommandError::IllegalPhase { .. })
        ));
        let mut engine = started(2);
        assert_eq!(
            engine.handle(
                Command::ManualRoll(ManualRoll {
                    total: 13,
                    double: false
                }),
                0
            ),
            Err(CommandError::InvalidManualTotal(13))
        );
        assert_eq!(engine.state().phase, Phase::Idle);
    }

    #[test]
    fn submit_requires_justification_and_known_option() {
        let mut engine = in_decision();
        assert_eq!(
            engine.handle(Command::SubmitDecision, 3_000),
            Err(CommandError::EmptyJustification)
        );
        assert_eq!(
            engine.handle(Command::SelectOption(Some("zzz".into())), 3_000),
            Err(CommandError::UnknownOption("zzz".into()))
        );
        engine
            .handle(Command::SelectOption(Some("a".into())), 3_000)
            .unwrap();
        engine
            .handle(Command::EditJustification("Funds the pilot".into()), 3_001)
            .unwrap();
        let effects = engine.handle(Command::SubmitDecision, 3_002).unwrap();
        let request = effects
            .iter()
            .find_map(|effect| match effect {
                Effect::RequestScoring(request) => Some(request.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(request.chosen_option.as_deref(), Some("Accept"));
        assert_eq!(request.card_kind, CardKind::Fund);
        assert!(engine.state().is_processing);
        assert_eq!(
            engine.handle(Command::SubmitDecision, 3_003),
            Err(CommandError::AlreadySubmitting)
        );
    }

    #[test]
    fn scoring_failure_alerts_and_keeps_decision_open() {
        let mut engine = in_decision();
        engine
            .handle(Command::EditJustification("why not".into()), 3_000)
            .unwrap();
        engine.handle(Command::SubmitDecision, 3_001).unwrap();
        let before = engine.session().teams[0].resources;
        let effects = engine
            .handle(
                Command::ScoringCompleted(Err(ScoringError::Unavailable("down".into()))),
                3_002,
            )
            .unwrap();
        assert!(
            effects
                .iter()
                .any(|effect| matches!(effect, Effect::Alert(_)))
        );
        assert_eq!(engine.state().phase, Phase::Decision);
        assert!(!engine.state().is_processing);
        assert_eq!(engine.session().teams[0].resources, before);
    }

    #[test]
    fn pause_waits_for_the_scoring_call() {
        let mut engine = in_decision();
        engine
            .handle(Command::EditJustification("Pilot first".into()), 3_000)
            .unwrap();
        engine.handle(Command::SubmitDecision, 3_001).unwrap();
        assert_eq!(
            engine.handle(Command::Pause, 3_002),
            Err(CommandError::AlreadySubmitting)
        );
        assert_eq!(engine.state().phase, Phase::Decision);
        assert_eq!(engine.session().status, SessionStatus::Active);

        engine
            .handle(
                Command::ScoringCompleted(Ok(ScoringResponse {
                    feedback: "Fine".into(),
                    score_delta: Resources::uniform(1),
                })),
                3_003,
            )
            .unwrap();
        assert_eq!(engine.session().teams[0].history().len(), 1);
        assert_eq!(engine.state().phase, Phase::Idle);
        assert!(!engine.state().is_processing);
        engine.handle(Command::Pause, 3_004).unwrap();
        assert_eq!(engine.state().phase, Phase::Paused);
    }

    #[test]
    fn paused_decision_can_still_be_submitted_after_resume() {
        let mut engine = in_decision();
        engine
            .handle(Command::EditJustification("Pilot first".into()), 3_000)
            .unwrap();
        engine.handle(Command::Pause, 3_001).unwrap();
        engine.handle(Command::Resume, 3_002).unwrap();
        assert_eq!(engine.state().phase, Phase::Decision);
        engine.handle(Command::SubmitDecision, 3_003).unwrap();
        assert!(engine.state().is_processing);
    }

    #[test]
    fn resolution_records_history_and_rotates() {
        let mut engine = in_decision();
        engine
            .handle(Command::SelectOption(Some("b".into())), 3_000)
            .unwrap();
        engine
            .handle(Command::EditJustification("Not aligned".into()), 3_000)
            .unwrap();
        engine.handle(Command::SubmitDecision, 3_001).unwrap();
        let before = engine.session().teams[0].resources;
        engine
            .handle(
                Command::ScoringCompleted(Ok(ScoringResponse {
                    feedback: "Good".into(),
                    score_delta: Resources::new(1, 0, 2, 0, 0),
                })),
                3_500,
            )
            .unwrap();
        let team = &engine.session().teams[0];
        assert_eq!(team.resources, before + Resources::new(1, 0, 2, 0, 0));
        assert_eq!(team.history().len(), 1);
        assert_eq!(
            team.history()[0].choice,
            ChosenOption::Option {
                id: "b".into(),
                text: "Decline".into()
            }
        );
        assert_eq!(team.history()[0].position, 5);
        assert_eq!(engine.state().phase, Phase::Idle);
        assert_eq!(engine.state().current_team_index, 1);
        assert!(engine.state().modifiers.is_clear());
        assert!(engine.state().active_card.is_none());
        assert_eq!(engine.session().teams[1].current_roller(), Some("m1b"));
    }

    #[test]
    fn broadcast_copies_delta_to_other_teams() {
        let mut engine = in_decision();
        engine.handle(Command::ArmBroadcast, 3_000).unwrap();
        engine
            .handle(Command::EditJustification("Share it".into()), 3_000)
            .unwrap();
        engine.handle(Command::SubmitDecision, 3_001).unwrap();
        let other_before = engine.session().teams[1].resources;
        engine
            .handle(
                Command::ScoringCompleted(Ok(ScoringResponse {
                    feedback: "Shared".into(),
                    score_delta: Resources::uniform(1),
                })),
                3_002,
            )
            .unwrap();
        let other = &engine.session().teams[1];
        assert_eq!(other.resources, other_before + Resources::uniform(1));
        assert!(other.history()[0].broadcast);
        assert!(!other.has_record_at(5));
    }

    #[test]
    fn votes_move_between_options() {
        let mut engine = in_decision();
        engine
            .handle(
                Command::CastVote {
                    voter: "Team 1".into(),
                    option_id: "a".into(),
                },
                3_000,
            )
            .unwrap();
        engine
            .handle(
                Command::CastVote {
                    voter: "Team 1".into(),
                    option_id: "b".into(),
                },
                3_001,
            )
            .unwrap();
        assert_eq!(engine.state().votes.get("a"), None);
        assert_eq!(engine.state().votes["b"], vec!["Team 1".to_string()]);
    }

    #[test]
    fn timer_ticks_only_in_decision() {
        let mut engine = started(1);
        assert!(engine.handle(Command::TimerTick, 2_000).unwrap().is_empty());
        let mut engine = in_decision();
        let start = engine.state().timer_remaining;
        engine.handle(Command::TimerTick, 3_000).unwrap();
        assert_eq!(engine.state().timer_remaining, start - 1);
    }

    #[test]
    fn pause_and_resume_reschedule_pending_steps() {
        let mut engine = started(1);
        engine
            .handle(
                Command::ManualRoll(ManualRoll {
                    total: 6,
                    double: false,
                }),
                2_000,
            )
            .unwrap();
        engine.handle(Command::Pause, 2_001).unwrap();
        assert_eq!(engine.state().phase, Phase::Paused);
        assert_eq!(engine.session().status, SessionStatus::Paused);
        assert!(matches!(
            engine.handle(Command::StepElapsed, 2_002),
            Err(CommandError::IllegalPhase { .. })
        ));
        let effects = engine.handle(Command::Resume, 2_003).unwrap();
        assert_eq!(engine.state().phase, Phase::Moving);
        assert!(
            effects
                .iter()
                .any(|effect| matches!(effect, Effect::ScheduleStep { .. }))
        );
    }

    #[test]
    fn multiplier_grant_validates_factor() {
        let mut engine = started(1);
        assert_eq!(
            engine.handle(Command::GrantMultiplier(4), 2_000),
            Err(CommandError::InvalidMultiplier(4))
        );
        engine.handle(Command::GrantMultiplier(3), 2_000).unwrap();
        assert_eq!(engine.state().modifiers.custom_multiplier, Some(3));
    }

    #[test]
    fn end_blocks_commands_until_reset() {
        let mut engine = started(2);
        engine.handle(Command::EndSession, 2_000).unwrap();
        assert_eq!(
            engine.handle(Command::RollDice, 2_001),
            Err(CommandError::SessionEnded)
        );
        engine.handle(Command::ResetSession, 2_002).unwrap();
        assert_eq!(engine.state().phase, Phase::WaitingToStart);
        assert_eq!(engine.session().status, SessionStatus::Active);
        assert!(engine.state().last_updated >= 2_002);
    }

    #[test]
    fn last_updated_never_decreases() {
        let mut engine = started(1);
        engine.handle(Command::GrantMultiplier(2), 5_000).unwrap();
        engine.handle(Command::GrantMultiplier(3), 4_000).unwrap();
        assert_eq!(engine.state().last_updated, 5_000);
    }
}
