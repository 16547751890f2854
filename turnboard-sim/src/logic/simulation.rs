use anyhow::{Context, Result, anyhow, bail};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use turnboard_game::sync::{ChannelError, InMemoryChannel};
use turnboard_game::{
    CardDeck, CardKind, ClientRole, ClientRuntime, Command, EngineConfig, GameMode, GameState,
    InMemorySessionRepository, ManualRoll, Phase, RuntimeOptions, RuntimeOutcome, RuntimeReport,
    Session, SessionRepository, Standing, StubScoringService, SystemClock, Team, TurnEngine,
};

/// Longest the autopilot waits for any single state change.
const STALL_TIMEOUT: Duration = Duration::from_secs(10);
const SESSION_ID: &str = "sim";
const TEAM_COLORS: [&str; 6] = ["red", "blue", "green", "amber", "violet", "teal"];

pub type Expectation = fn(&SimulationSummary) -> Result<()>;

/// How the facilitator rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiceSource {
    Digital,
    /// Totals typed in by hand, cycling through 2..=12 from the seed.
    Manual,
}

#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub mode: GameMode,
    pub teams: usize,
    /// Decisions to resolve before ending the session.
    pub turns: u32,
    pub viewers: usize,
    pub dice: DiceSource,
    /// Pushes the channel rejects right after start.
    pub push_failures: usize,
    /// Turn on which the scoring service fails once.
    pub scoring_failure_turn: Option<u32>,
    /// Grant a x2 multiplier before every n-th turn.
    pub multiplier_every: Option<u32>,
    pub step_delay_ms: u64,
    pub expectations: Vec<Expectation>,
}

impl SimulationPlan {
    #[must_use]
    pub fn new(mode: GameMode, teams: usize, turns: u32) -> Self {
        Self {
            mode,
            teams,
            turns,
            viewers: 1,
            dice: DiceSource::Digital,
            push_failures: 0,
            scoring_failure_turn: None,
            multiplier_every: None,
            step_delay_ms: 2,
            expectations: vec![expect_consistent_viewers, expect_one_record_per_turn],
        }
    }

    #[must_use]
    pub fn with_viewers(mut self, viewers: usize) -> Self {
        self.viewers = viewers;
        self
    }

    #[must_use]
    pub fn with_expectation(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }
}

/// Everything a finished simulated session reports.
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub seed: u64,
    pub mode: GameMode,
    pub turns_played: u32,
    pub decisions_recorded: usize,
    pub laps_completed: u32,
    pub votes_cast: usize,
    pub standings: Vec<Standing>,
    pub facilitator: RuntimeReport,
    pub viewers: Vec<RuntimeReport>,
    pub final_state: GameState,
    pub mismatches: Vec<String>,
    /// Decisions found in the repository copy of the session.
    pub persisted_records: Option<usize>,
}

fn expect_consistent_viewers(summary: &SimulationSummary) -> Result<()> {
    if summary.mismatches.is_empty() {
        Ok(())
    } else {
        bail!("viewer diverged: {}", summary.mismatches.join("; "))
    }
}

fn expect_one_record_per_turn(summary: &SimulationSummary) -> Result<()> {
    let expected = usize::try_from(summary.turns_played).unwrap_or(usize::MAX);
    if summary.decisions_recorded == expected {
        Ok(())
    } else {
        bail!(
            "{} decisions recorded over {} turns",
            summary.decisions_recorded,
            summary.turns_played
        )
    }
}

pub fn expect_laps_match_bonuses(summary: &SimulationSummary) -> Result<()> {
    let shown = summary.facilitator.lap_bonuses;
    if u64::from(summary.laps_completed) == shown {
        Ok(())
    } else {
        bail!(
            "{} laps completed but {shown} lap bonuses shown",
            summary.laps_completed
        )
    }
}

pub fn expect_push_failures_survived(summary: &SimulationSummary) -> Result<()> {
    if summary.facilitator.push_failures == 0 {
        bail!("no push failure was injected");
    }
    expect_consistent_viewers(summary)
}

pub fn expect_scoring_alert(summary: &SimulationSummary) -> Result<()> {
    if summary
        .facilitator
        .alerts
        .iter()
        .any(|alert| alert.starts_with("Scoring failed"))
    {
        Ok(())
    } else {
        bail!("scoring failure never surfaced as an alert")
    }
}

pub fn expect_persisted_progress(summary: &SimulationSummary) -> Result<()> {
    match summary.persisted_records {
        Some(records) if records == summary.decisions_recorded => Ok(()),
        other => bail!(
            "repository holds {other:?} decisions, facilitator recorded {}",
            summary.decisions_recorded
        ),
    }
}

type RuntimeHandle = JoinHandle<Result<RuntimeOutcome, ChannelError>>;

struct Client {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<GameState>,
    handle: RuntimeHandle,
}

fn build_session(plan: &SimulationPlan, seed: u64) -> Result<Session> {
    let code = format!("{:06}", seed % 1_000_000)
        .parse()
        .map_err(|err| anyhow!("access code for seed {seed}: {err}"))?;
    let mut session = Session::new(SESSION_ID, "Simulated session", plan.mode, code, 0)
        .with_seed(seed);
    for idx in 0..plan.teams {
        session = session.with_team(Team::new(
            format!("team-{idx}"),
            format!("Team {}", idx + 1),
            TEAM_COLORS[idx % TEAM_COLORS.len()],
            vec![format!("player-{idx}-a"), format!("player-{idx}-b")],
        ));
    }
    if plan.mode.is_free_form() {
        let deck = CardDeck::standard();
        let competency: Vec<String> = deck
            .cards
            .iter()
            .filter(|card| card.kind == CardKind::Competency)
            .map(|card| card.id.clone())
            .collect();
        for (square, card_id) in [1usize, 7, 14, 20, 26].into_iter().zip(competency) {
            session.square_assignments.insert(square, card_id);
        }
    }
    Ok(session)
}

struct Table {
    channel: Arc<InMemoryChannel>,
    scorer: Arc<StubScoringService>,
    repository: Arc<InMemorySessionRepository>,
    config: EngineConfig,
}

impl Table {
    fn join(&self, session: Session, role: ClientRole) -> Result<Client> {
        let engine = TurnEngine::new(session, CardDeck::standard(), self.config.clone())
            .context("engine configuration rejected")?;
        let runtime = ClientRuntime::new(
            engine,
            role,
            Arc::clone(&self.channel),
            Arc::clone(&self.scorer),
            Arc::clone(&self.repository),
            Arc::new(SystemClock),
            RuntimeOptions {
                auto_acknowledge_lap_bonus: true,
                decision_tick: Duration::from_millis(250),
            },
        );
        let state = runtime.watch();
        let (commands, rx) = mpsc::channel(32);
        Ok(Client {
            commands,
            state,
            handle: tokio::spawn(runtime.run(rx)),
        })
    }
}

/// Run one complete session: a facilitator autopilot plus voting viewers.
///
/// # Errors
///
/// Returns an error if the session stalls or a runtime fails to start.
pub async fn run_session(plan: &SimulationPlan, seed: u64) -> Result<SimulationSummary> {
    let config = EngineConfig {
        step_delay_ms: plan.step_delay_ms,
        ..EngineConfig::default()
    };
    let table = Table {
        channel: Arc::new(InMemoryChannel::default()),
        scorer: Arc::new(StubScoringService::new(seed)),
        repository: Arc::new(InMemorySessionRepository::new()),
        config,
    };
    let session = build_session(plan, seed)?;

    let facilitator = table.join(session.clone(), ClientRole::Facilitator)?;
    let mut viewers = Vec::with_capacity(plan.viewers);
    for _ in 0..plan.viewers {
        viewers.push(table.join(session.clone(), ClientRole::Viewer)?);
    }
    tokio::task::yield_now().await;
    table.channel.fail_next_pushes(plan.push_failures);

    let (stop_tx, stop_rx) = watch::channel(false);
    let voters: Vec<JoinHandle<usize>> = viewers
        .iter()
        .enumerate()
        .map(|(idx, viewer)| {
            tokio::spawn(vote(
                format!("viewer-{idx}"),
                idx,
                viewer.commands.clone(),
                viewer.state.clone(),
                stop_rx.clone(),
            ))
        })
        .collect();

    let drive = autopilot(
        plan,
        seed,
        &facilitator.commands,
        facilitator.state.clone(),
        &table.scorer,
    )
    .await;

    let Client {
        commands, handle, ..
    } = facilitator;
    drop(commands);
    let facilitator = handle.await.context("facilitator task panicked")??;
    drive?;

    let final_stamp = facilitator.state.last_updated;
    for viewer in &mut viewers {
        let caught_up = timeout(
            STALL_TIMEOUT,
            viewer
                .state
                .wait_for(|state| state.last_updated >= final_stamp),
        )
        .await;
        if caught_up.is_err() {
            warn!("viewer never saw the final snapshot {final_stamp}");
        }
    }
    stop_tx.send_replace(true);
    let mut votes_cast = 0;
    for voter in voters {
        votes_cast += voter.await.unwrap_or(0);
    }

    let mut viewer_outcomes = Vec::with_capacity(viewers.len());
    for viewer in viewers {
        drop(viewer.commands);
        viewer_outcomes.push(viewer.handle.await.context("viewer task panicked")??);
    }

    let mismatches = compare(&facilitator.state, &viewer_outcomes);
    let persisted_records = table
        .repository
        .find(SESSION_ID)
        .await?
        .map(|session| own_records(&session));
    let decisions_recorded = own_records(&facilitator.session);
    Ok(SimulationSummary {
        seed,
        mode: plan.mode,
        turns_played: facilitator.state.turn.saturating_sub(1),
        decisions_recorded,
        laps_completed: facilitator.session.teams.iter().map(|team| team.laps).sum(),
        votes_cast,
        standings: facilitator.session.standings(),
        facilitator: facilitator.report,
        viewers: viewer_outcomes.into_iter().map(|outcome| outcome.report).collect(),
        final_state: facilitator.state,
        mismatches,
        persisted_records,
    })
}

/// Decisions each team answered itself, not broadcast copies.
fn own_records(session: &Session) -> usize {
    session
        .teams
        .iter()
        .map(|team| team.history().iter().filter(|record| !record.broadcast).count())
        .sum()
}

fn compare(facilitator: &GameState, viewers: &[RuntimeOutcome]) -> Vec<String> {
    let mut mismatches = Vec::new();
    for (idx, viewer) in viewers.iter().enumerate() {
        let state = &viewer.state;
        if state.positions != facilitator.positions {
            mismatches.push(format!(
                "viewer {idx} positions {:?} != {:?}",
                state.positions, facilitator.positions
            ));
        }
        if state.turn != facilitator.turn {
            mismatches.push(format!(
                "viewer {idx} turn {} != {}",
                state.turn, facilitator.turn
            ));
        }
        if state.phase != facilitator.phase {
            mismatches.push(format!(
                "viewer {idx} phase {} != {}",
                state.phase, facilitator.phase
            ));
        }
        if state.current_team_index != facilitator.current_team_index {
            mismatches.push(format!(
                "viewer {idx} current team {} != {}",
                state.current_team_index, facilitator.current_team_index
            ));
        }
    }
    mismatches
}

async fn changed_until(
    state: &mut watch::Receiver<GameState>,
    what: &str,
    predicate: impl FnMut(&GameState) -> bool,
) -> Result<GameState> {
    let snapshot = timeout(STALL_TIMEOUT, state.wait_for(predicate))
        .await
        .map_err(|_| anyhow!("stalled waiting for {what}"))?
        .map_err(|_| anyhow!("facilitator stopped while waiting for {what}"))?;
    Ok(snapshot.clone())
}

async fn send(commands: &mpsc::Sender<Command>, command: Command) -> Result<()> {
    commands
        .send(command)
        .await
        .map_err(|_| anyhow!("facilitator runtime is gone"))
}

fn manual_total(seed: u64, turn: u32, attempt: u32) -> u8 {
    let mixed = seed
        .wrapping_mul(31)
        .wrapping_add(u64::from(turn) * 7)
        .wrapping_add(u64::from(attempt));
    2 + u8::try_from(mixed % 11).unwrap_or(0)
}

/// Facilitator autopilot: roll in `Idle`, answer in `Decision`, end after the
/// planned number of turns.
async fn autopilot(
    plan: &SimulationPlan,
    seed: u64,
    commands: &mpsc::Sender<Command>,
    mut state: watch::Receiver<GameState>,
    scorer: &StubScoringService,
) -> Result<()> {
    send(commands, Command::StartGame).await?;
    changed_until(&mut state, "game start", |s| s.is_game_started).await?;

    let mut rolls = 0u32;
    let mut failed_scoring = false;
    loop {
        let current = changed_until(&mut state, "idle or an open decision", |s| {
            s.phase == Phase::Idle || (s.phase == Phase::Decision && !s.is_processing)
        })
        .await?;
        let mut last_line = current.log.last().cloned();

        match current.phase {
            Phase::Idle => {
                if current.turn > plan.turns {
                    send(commands, Command::EndSession).await?;
                    return Ok(());
                }
                if let Some(every) = plan.multiplier_every
                    && current.turn % every.max(1) == 0
                    && current.modifiers.custom_multiplier.is_none()
                {
                    send(commands, Command::GrantMultiplier(2)).await?;
                    let armed = changed_until(&mut state, "the multiplier", |s| {
                        s.modifiers.custom_multiplier.is_some()
                    })
                    .await?;
                    last_line = armed.log.last().cloned();
                }
                rolls += 1;
                debug!("turn {} roll {rolls}", current.turn);
                let roll = match plan.dice {
                    DiceSource::Digital => Command::RollDice,
                    DiceSource::Manual => Command::ManualRoll(ManualRoll {
                        total: manual_total(seed, current.turn, rolls),
                        double: rolls % 2 == 0,
                    }),
                };
                send(commands, roll).await?;
                changed_until(&mut state, "the roll", |s| {
                    s.phase != Phase::Idle || s.log.last() != last_line.as_ref()
                })
                .await?;
            }
            Phase::Decision => {
                if plan.scoring_failure_turn == Some(current.turn) && !failed_scoring {
                    scorer.fail_next();
                    failed_scoring = true;
                }
                let option = current
                    .active_card
                    .as_ref()
                    .and_then(|active| active.card.options.first())
                    .map(|option| option.id.clone());
                if option.is_some() {
                    send(commands, Command::SelectOption(option)).await?;
                }
                let justification = format!(
                    "Turn {}: we weigh the effect on every stakeholder before acting.",
                    current.turn
                );
                send(commands, Command::EditJustification(justification)).await?;
                send(commands, Command::SubmitDecision).await?;
                changed_until(&mut state, "the submission", |s| {
                    s.is_processing || s.phase != Phase::Decision || s.log.last() != last_line.as_ref()
                })
                .await?;
            }
            _ => {}
        }
    }
}

/// Viewer behaviour: vote once per open decision that offers options.
async fn vote(
    voter: String,
    index: usize,
    commands: mpsc::Sender<Command>,
    mut state: watch::Receiver<GameState>,
    mut stop: watch::Receiver<bool>,
) -> usize {
    let mut voted_turn = 0;
    let mut votes = 0;
    loop {
        let open = state.wait_for(|s| {
            s.phase == Phase::Decision
                && !s.is_submitting
                && s.turn != voted_turn
                && s.active_card
                    .as_ref()
                    .is_some_and(|active| !active.card.options.is_empty())
        });
        let current = tokio::select! {
            snapshot = open => match snapshot {
                Ok(snapshot) => snapshot.clone(),
                Err(_) => return votes,
            },
            _ = stop.wait_for(|done| *done) => return votes,
        };
        voted_turn = current.turn;
        let Some(option_id) = current.active_card.as_ref().and_then(|active| {
            let options = &active.card.options;
            options.get(index % options.len()).map(|option| option.id.clone())
        }) else {
            continue;
        };
        let command = Command::CastVote {
            voter: voter.clone(),
            option_id,
        };
        if commands.send(command).await.is_err() {
            return votes;
        }
        votes += 1;
    }
}
