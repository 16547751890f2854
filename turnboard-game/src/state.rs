//! Session, team, and shared game-state document.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::access::AccessCode;
use crate::board::{ChanceKind, SquareKind};
use crate::constants::{LOG_HISTORY_LIMIT, STARTING_DIMENSION, STARTING_RESOURCE};
use crate::data::{Card, CardDeck, CardKind};
use crate::resources::{Resources, ScoreDelta};
use crate::scoring::ArmedModifiers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    #[default]
    Foundation,
    Leadership,
    FreeForm,
}

impl GameMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Foundation => "foundation",
            Self::Leadership => "leadership",
            Self::FreeForm => "free_form",
        }
    }

    /// Free-form sessions use facilitator square assignments and zone effects.
    #[must_use]
    pub const fn is_free_form(self) -> bool {
        matches!(self, Self::FreeForm)
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "foundation" => Ok(Self::Foundation),
            "leadership" => Ok(Self::Leadership),
            "free_form" | "freeform" => Ok(Self::FreeForm),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Paused,
    Ended,
}

/// Turn phase shared by every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    WaitingToStart,
    Idle,
    Rolling,
    Moving,
    Decision,
    Paused,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WaitingToStart => "waiting_to_start",
            Self::Idle => "idle",
            Self::Rolling => "rolling",
            Self::Moving => "moving",
            Self::Decision => "decision",
            Self::Paused => "paused",
        }
    }

    #[must_use]
    pub const fn can_pause(self) -> bool {
        matches!(self, Self::Idle | Self::Rolling | Self::Moving | Self::Decision)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a team answered on a decision card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChosenOption {
    Option { id: String, text: String },
    /// Answer given only through the justification text.
    FreeText,
}

impl ChosenOption {
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Option { text, .. } => Some(text),
            Self::FreeText => None,
        }
    }
}

/// Immutable entry in a team's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn: u32,
    pub card_id: String,
    pub card_title: String,
    pub situation: String,
    pub choice: ChosenOption,
    pub justification: String,
    pub feedback: String,
    /// Delta after the multiplier pipeline.
    pub delta: ScoreDelta,
    pub timestamp_ms: i64,
    pub position: usize,
    /// Set on copies appended to other teams by broadcast mode.
    #[serde(default)]
    pub broadcast: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub position: usize,
    #[serde(default = "Team::starting_resources")]
    pub resources: Resources,
    #[serde(default)]
    pub laps: u32,
    #[serde(default)]
    pub burnout: bool,
    #[serde(default)]
    pub burnout_count: u32,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub roller_index: usize,
    #[serde(default)]
    history: Vec<TurnRecord>,
}

impl Team {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        color: impl Into<String>,
        members: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
            position: 0,
            resources: Self::starting_resources(),
            laps: 0,
            burnout: false,
            burnout_count: 0,
            members,
            roller_index: 0,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub const fn starting_resources() -> Resources {
        Resources::new(
            STARTING_RESOURCE,
            STARTING_DIMENSION,
            STARTING_DIMENSION,
            STARTING_DIMENSION,
            STARTING_DIMENSION,
        )
    }

    /// Reinitialize everything except identity and roster.
    pub fn reset(&mut self) {
        self.position = 0;
        self.resources = Self::starting_resources();
        self.laps = 0;
        self.burnout = false;
        self.burnout_count = 0;
        self.roller_index = 0;
        self.history.clear();
    }

    #[must_use]
    pub fn current_roller(&self) -> Option<&str> {
        self.members.get(self.roller_index).map(String::as_str)
    }

    /// Hand the dice to the next member; no-op for empty rosters.
    pub fn advance_roller(&mut self) {
        if !self.members.is_empty() {
            self.roller_index = (self.roller_index + 1) % self.members.len();
        }
    }

    #[must_use]
    pub fn history(&self) -> &[TurnRecord] {
        &self.history
    }

    pub fn append_record(&mut self, record: TurnRecord) {
        self.history.push(record);
    }

    /// True when the team already resolved its own decision on `position`.
    #[must_use]
    pub fn has_record_at(&self, position: usize) -> bool {
        self.history
            .iter()
            .any(|record| !record.broadcast && record.position == position)
    }
}

/// Facilitator-owned session metadata plus the teams playing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub mode: GameMode,
    pub access_code: AccessCode,
    #[serde(default)]
    pub status: SessionStatus,
    pub created_at_ms: i64,
    #[serde(default)]
    pub teams: Vec<Team>,
    /// Facilitator-authored cards that replace base-deck draws of the same kind.
    #[serde(default)]
    pub card_overrides: Vec<Card>,
    /// Free-form mode: square index to card id.
    #[serde(default)]
    pub square_assignments: BTreeMap<usize, String>,
    #[serde(default)]
    pub board_background: Option<String>,
    #[serde(default)]
    pub seed: u64,
}

impl Session {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        mode: GameMode,
        access_code: AccessCode,
        created_at_ms: i64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mode,
            access_code,
            status: SessionStatus::Active,
            created_at_ms,
            teams: Vec::new(),
            card_overrides: Vec::new(),
            square_assignments: BTreeMap::new(),
            board_background: None,
            seed: 0,
        }
    }

    #[must_use]
    pub fn with_team(mut self, team: Team) -> Self {
        self.teams.push(team);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn overrides_of_kind(&self, kind: CardKind) -> impl Iterator<Item = &Card> + '_ {
        self.card_overrides.iter().filter(move |card| card.kind == kind)
    }

    /// Card assigned to a square in free-form mode, searched in overrides first.
    #[must_use]
    pub fn assigned_card<'a>(&'a self, square: usize, deck: &'a CardDeck) -> Option<&'a Card> {
        let card_id = self.square_assignments.get(&square)?;
        self.card_overrides
            .iter()
            .find(|card| &card.id == card_id)
            .or_else(|| deck.by_id(card_id))
    }

    /// Teams ranked by total resources, then laps, then name.
    #[must_use]
    pub fn standings(&self) -> Vec<Standing> {
        let mut rows: Vec<Standing> = self
            .teams
            .iter()
            .map(|team| Standing {
                rank: 0,
                team_id: team.id.clone(),
                name: team.name.clone(),
                total: team.resources.total(),
                laps: team.laps,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.total
                .cmp(&a.total)
                .then_with(|| b.laps.cmp(&a.laps))
                .then_with(|| a.name.cmp(&b.name))
        });
        for (idx, row) in rows.iter_mut().enumerate() {
            row.rank = idx + 1;
        }
        rows
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub rank: usize,
    pub team_id: String,
    pub name: String,
    pub total: i64,
    pub laps: u32,
}

/// Card currently shown to the table together with where it was drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCard {
    pub card: Card,
    pub square: usize,
    pub square_kind: SquareKind,
    #[serde(default)]
    pub chance_kind: Option<ChanceKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringOutcome {
    pub feedback: String,
    pub raw_delta: ScoreDelta,
    pub applied_delta: ScoreDelta,
    #[serde(default)]
    pub broadcast: bool,
}

/// The shared document every client mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GameState {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub paused_from: Option<Phase>,
    #[serde(default)]
    pub current_team_index: usize,
    #[serde(default)]
    pub dice: Option<(u8, u8)>,
    #[serde(default)]
    pub active_card: Option<ActiveCard>,
    #[serde(default)]
    pub selected_option: Option<String>,
    #[serde(default)]
    pub justification: String,
    #[serde(default)]
    pub scoring_result: Option<ScoringOutcome>,
    #[serde(default)]
    pub is_submitting: bool,
    #[serde(default)]
    pub is_processing: bool,
    /// Spectator votes: option id to voting team names.
    #[serde(default)]
    pub votes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub log: Vec<String>,
    #[serde(default)]
    pub is_game_started: bool,
    #[serde(default)]
    pub timer_remaining: u32,
    #[serde(default)]
    pub turn: u32,
    #[serde(default)]
    pub positions: Vec<usize>,
    #[serde(default)]
    pub modifiers: ArmedModifiers,
    #[serde(default)]
    pub lap_bonus_pending: bool,
    #[serde(default)]
    pub last_updated: i64,
}

impl GameState {
    #[must_use]
    pub fn for_teams(team_count: usize) -> Self {
        Self {
            positions: vec![0; team_count],
            ..Self::default()
        }
    }

    /// Drop everything scoped to the current decision. The last scoring
    /// result stays visible until the next decision opens.
    pub fn clear_decision(&mut self) {
        self.active_card = None;
        self.selected_option = None;
        self.justification.clear();
        self.is_submitting = false;
        self.is_processing = false;
        self.votes.clear();
    }

    pub fn push_log(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
        if self.log.len() > LOG_HISTORY_LIMIT {
            let excess = self.log.len() - LOG_HISTORY_LIMIT;
            self.log.drain(..excess);
        }
    }

    pub fn apply_patch(&mut self, patch: &StatePatch) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = &patch.$field {
                    self.$field = value.clone();
                })*
            };
        }
        take!(
            phase,
            paused_from,
            current_team_index,
            dice,
            active_card,
            selected_option,
            justification,
            scoring_result,
            is_submitting,
            is_processing,
            votes,
            log,
            is_game_started,
            timer_remaining,
            turn,
            positions,
            modifiers,
            lap_bonus_pending,
        );
    }
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial update merged into the shared document. `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub paused_from: Option<Option<Phase>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_team_index: Option<usize>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub dice: Option<Option<(u8, u8)>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub active_card: Option<Option<ActiveCard>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub selected_option: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub scoring_result: Option<Option<ScoringOutcome>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_submitting: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_processing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_game_started: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_remaining: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positions: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<ArmedModifiers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lap_bonus_pending: Option<bool>,
}

impl StatePatch {
    /// Patch that overwrites every shared field with `state`.
    #[must_use]
    pub fn full(state: &GameState) -> Self {
        Self {
            phase: Some(state.phase),
            paused_from: Some(state.paused_from),
            current_team_index: Some(state.current_team_index),
            dice: Some(state.dice),
            active_card: Some(state.active_card.clone()),
            selected_option: Some(state.selected_option.clone()),
            justification: Some(state.justification.clone()),
            scoring_result: Some(state.scoring_result.clone()),
            is_submitting: Some(state.is_submitting),
            is_processing: Some(state.is_processing),
            votes: Some(state.votes.clone()),
            log: Some(state.log.clone()),
            is_game_started: Some(state.is_game_started),
            timer_remaining: Some(state.timer_remaining),
            turn: Some(state.turn),
            positions: Some(state.positions.clone()),
            modifiers: Some(state.modifiers),
            lap_bonus_pending: Some(state.lap_bonus_pending),
        }
    }

    /// Patch carrying only the fields any client may edit during a decision.
    #[must_use]
    pub fn shared_editing(selected_option: Option<String>, justification: String) -> Self {
        Self {
            selected_option: Some(selected_option),
            justification: Some(justification),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn votes(votes: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            votes: Some(votes),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn timer(remaining: u32) -> Self {
        Self {
            timer_remaining: Some(remaining),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> AccessCode {
        "123456".parse().unwrap()
    }

    #[test]
    fn team_reset_keeps_identity_and_roster() {
        let mut team = Team::new("t1", "Falcons", "red", vec!["ana".into(), "bo".into()]);
        team.position = 17;
        team.laps = 2;
        team.burnout = true;
        team.resources = Resources::uniform(-3);
        team.advance_roller();
        team.reset();
        assert_eq!(team.id, "t1");
        assert_eq!(team.members.len(), 2);
        assert_eq!(team.position, 0);
        assert_eq!(team.laps, 0);
        assert!(!team.burnout);
        assert_eq!(team.resources, Team::starting_resources());
        assert_eq!(team.roller_index, 0);
    }

    #[test]
    fn roller_wraps_and_skips_empty_roster() {
        let mut team = Team::new("t1", "Falcons", "red", vec!["ana".into(), "bo".into()]);
        team.advance_roller();
        assert_eq!(team.current_roller(), Some("bo"));
        team.advance_roller();
        assert_eq!(team.current_roller(), Some("ana"));

        let mut empty = Team::new("t2", "Owls", "blue", Vec::new());
        empty.advance_roller();
        assert_eq!(empty.roller_index, 0);
        assert_eq!(empty.current_roller(), None);
    }

    #[test]
    fn standings_break_ties_by_laps_then_name() {
        let mut a = Team::new("a", "Beta", "red", Vec::new());
        let b = Team::new("b", "Alpha", "blue", Vec::new());
        let mut c = Team::new("c", "Gamma", "green", Vec::new());
        a.laps = 1;
        c.resources = Resources::uniform(100);
        let session = Session::new("s", "Demo", GameMode::Foundation, code(), 0)
            .with_team(a)
            .with_team(b)
            .with_team(c);
        let names: Vec<_> = session
            .standings()
            .into_iter()
            .map(|row| (row.rank, row.name))
            .collect();
        assert_eq!(
            names,
            vec![
                (1, "Gamma".to_string()),
                (2, "Beta".to_string()),
                (3, "Alpha".to_string())
            ]
        );
    }

    #[test]
    fn log_is_bounded() {
        let mut state = GameState::default();
        for idx in 0..(LOG_HISTORY_LIMIT + 10) {
            state.push_log(format!("line {idx}"));
        }
        assert_eq!(state.log.len(), LOG_HISTORY_LIMIT);
        assert_eq!(state.log[0], "line 10");
    }

    #[test]
    fn patch_clears_optional_fields() {
        let mut state = GameState {
            selected_option: Some("a".into()),
            dice: Some((3, 4)),
            ..GameState::default()
        };
        let patch = StatePatch {
            selected_option: Some(None),
            ..StatePatch::default()
        };
        state.apply_patch(&patch);
        assert_eq!(state.selected_option, None);
        assert_eq!(state.dice, Some((3, 4)));
    }

    #[test]
    fn patch_json_distinguishes_null_from_missing() {
        let patch: StatePatch =
            serde_json::from_str(r#"{ "selected_option": null, "turn": 4 }"#).unwrap();
        assert_eq!(patch.selected_option, Some(None));
        assert_eq!(patch.dice, None);
        assert_eq!(patch.turn, Some(4));
    }

    #[test]
    fn full_patch_reproduces_state() {
        let mut source = GameState::for_teams(3);
        source.phase = Phase::Decision;
        source.turn = 9;
        source.justification = "because".into();
        source.push_log("hello");
        let mut mirror = GameState::default();
        mirror.apply_patch(&StatePatch::full(&source));
        assert_eq!(mirror, source);
    }

    #[test]
    fn game_mode_round_trips_through_str() {
        for mode in [GameMode::Foundation, GameMode::Leadership, GameMode::FreeForm] {
            assert_eq!(mode.as_str().parse::<GameMode>(), Ok(mode));
        }
        assert!("chess".parse::<GameMode>().is_err());
    }
}
