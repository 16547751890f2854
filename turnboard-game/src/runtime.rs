//! Tokio client driver.
//!
//! One [`ClientRuntime`] runs per console. It owns a [`TurnEngine`] and an
//! [`AuthorityGuard`], feeds commands, remote snapshots, step timers, decision
//! ticks, and scoring results through the engine one at a time, and performs
//! the effects the engine returns.

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::clock::Clock;
use crate::engine::{Command, Effect, EffectList, TurnEngine};
use crate::repository::SessionRepository;
use crate::scoring::{ScoringError, ScoringResponse, ScoringService};
use crate::state::{GameState, Session, StatePatch};
use crate::sync::{AuthorityGuard, ChannelError, GuardStats, RemoteChannel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    /// Drives the turn; the only intended writer outside shared edits.
    Facilitator,
    /// Team console: mirrors the document and may edit the open decision.
    Viewer,
}

#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Acknowledge mid-walk lap bonuses without waiting for a command.
    pub auto_acknowledge_lap_bonus: bool,
    /// Real time per decision-timer unit.
    pub decision_tick: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            auto_acknowledge_lap_bonus: false,
            decision_tick: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimeReport {
    pub commands_accepted: u64,
    pub commands_rejected: u64,
    pub pushes: u64,
    pub push_failures: u64,
    pub persisted: u64,
    pub persist_failures: u64,
    pub lap_bonuses: u64,
    pub alerts: Vec<String>,
    pub guard: GuardStats,
}

/// What a runtime leaves behind when its command stream closes.
#[derive(Debug, Clone)]
pub struct RuntimeOutcome {
    pub role: ClientRole,
    pub state: GameState,
    pub session: Session,
    pub report: RuntimeReport,
}

pub struct ClientRuntime<C, S, R, K> {
    engine: TurnEngine,
    guard: AuthorityGuard,
    role: ClientRole,
    channel: Arc<C>,
    scorer: Arc<S>,
    repository: Arc<R>,
    clock: Arc<K>,
    options: RuntimeOptions,
    report: RuntimeReport,
    state_tx: watch::Sender<GameState>,
    /// A scoring call is outstanding; the local operation stays in flight.
    scoring_pending: bool,
    /// A facilitator push was lost; the next push carries the whole state.
    repair_pending: bool,
}

impl<C, S, R, K> ClientRuntime<C, S, R, K>
where
    C: RemoteChannel + 'static,
    S: ScoringService + 'static,
    R: SessionRepository + 'static,
    K: Clock + 'static,
{
    #[must_use]
    pub fn new(
        engine: TurnEngine,
        role: ClientRole,
        channel: Arc<C>,
        scorer: Arc<S>,
        repository: Arc<R>,
        clock: Arc<K>,
        options: RuntimeOptions,
    ) -> Self {
        let guard = match role {
            ClientRole::Facilitator => AuthorityGuard::new(engine.config().sync).authoritative(),
            ClientRole::Viewer => AuthorityGuard::new(engine.config().sync),
        };
        let (state_tx, _) = watch::channel(engine.state().clone());
        Self {
            engine,
            guard,
            role,
            channel,
            scorer,
            repository,
            clock,
            options,
            report: RuntimeReport::default(),
            state_tx,
            scoring_pending: false,
            repair_pending: false,
        }
    }

    /// Observe the local state after every processed event.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<GameState> {
        self.state_tx.subscribe()
    }

    /// Run until the command stream closes or the channel shuts down.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial subscription fails. Later push
    /// failures are logged and counted, never returned.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
    ) -> Result<RuntimeOutcome, ChannelError> {
        let session_id = self.engine.session().id.clone();
        let mut snapshots = self.channel.subscribe(&session_id).await?;
        let (scoring_tx, mut scoring_rx) =
            mpsc::channel::<Result<ScoringResponse, ScoringError>>(4);

        let step = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(step);
        let mut step_armed = false;
        let mut ticker = tokio::time::interval(self.options.decision_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut timer_running = false;

        info!("{:?} client attached to session {session_id}", self.role);
        loop {
            let effects = tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.dispatch(command)
                }
                snapshot = snapshots.recv() => match snapshot {
                    Ok(snapshot) => {
                        let now = self.clock.now_ms();
                        let decision = self.guard.admit(self.engine.state_mut(), &snapshot, now);
                        debug!("{:?} snapshot {}: {decision:?}", self.role, snapshot.last_updated);
                        EffectList::new()
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("{:?} client skipped {skipped} snapshots", self.role);
                        EffectList::new()
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(result) = scoring_rx.recv() => {
                    self.scoring_pending = false;
                    self.dispatch(Command::ScoringCompleted(result))
                }
                () = &mut step, if step_armed => {
                    step_armed = false;
                    self.dispatch(Command::StepElapsed)
                }
                _ = ticker.tick(), if timer_running => self.dispatch(Command::TimerTick),
            };

            let mut queue: VecDeque<Effect> = effects.into_iter().collect();
            while let Some(effect) = queue.pop_front() {
                match effect {
                    Effect::Push(patch) => self.push(&session_id, patch).await,
                    Effect::ScheduleStep { delay_ms } => {
                        step.as_mut()
                            .reset(Instant::now() + Duration::from_millis(delay_ms));
                        step_armed = true;
                    }
                    Effect::ShowLapBonus {
                        team,
                        delta,
                        awaiting_ack,
                    } => {
                        self.report.lap_bonuses += 1;
                        info!("lap bonus for team {team}: {delta}");
                        if awaiting_ack && self.options.auto_acknowledge_lap_bonus {
                            queue.extend(self.dispatch(Command::AcknowledgeLapBonus));
                        }
                    }
                    Effect::RequestScoring(request) => {
                        self.scoring_pending = true;
                        let scorer = Arc::clone(&self.scorer);
                        let tx = scoring_tx.clone();
                        tokio::spawn(async move {
                            let result = scorer.score(request).await;
                            if tx.send(result).await.is_err() {
                                debug!("scoring result dropped after runtime stopped");
                            }
                        });
                    }
                    Effect::Alert(message) => {
                        warn!("alert: {message}");
                        self.report.alerts.push(message);
                    }
                    Effect::PersistSession => self.persist().await,
                    Effect::StartDecisionTimer => {
                        ticker.reset();
                        timer_running = true;
                    }
                    Effect::StopDecisionTimer => timer_running = false,
                }
            }

            if !self.scoring_pending {
                self.guard.end_local();
            }
            self.state_tx.send_replace(self.engine.state().clone());
        }

        self.report.guard = self.guard.stats();
        info!("{:?} client detached from session {session_id}", self.role);
        Ok(RuntimeOutcome {
            role: self.role,
            state: self.engine.state().clone(),
            session: self.engine.session().clone(),
            report: self.report,
        })
    }

    fn dispatch(&mut self, command: Command) -> EffectList {
        if self.role == ClientRole::Viewer && !command.is_shared_edit() {
            debug!("viewer ignored {}", command.name());
            self.report.commands_rejected += 1;
            return EffectList::new();
        }
        let now = self.clock.now_ms();
        let local_operation = command != Command::TimerTick;
        let name = command.name();
        match self.engine.handle(command, now) {
            Ok(effects) => {
                if local_operation {
                    self.guard.begin_local(now);
                }
                self.report.commands_accepted += 1;
                effects
            }
            Err(err) => {
                debug!("{name} rejected: {err}");
                self.report.commands_rejected += 1;
                EffectList::new()
            }
        }
    }

    async fn push(&mut self, session_id: &str, patch: StatePatch) {
        let now = self.clock.now_ms();
        let patch = if self.repair_pending {
            StatePatch::full(self.engine.state())
        } else {
            patch
        };
        match self.channel.push(session_id, patch, now).await {
            Ok(stamp) => {
                self.repair_pending = false;
                self.report.pushes += 1;
                self.guard.record_local_write(stamp);
                let state = self.engine.state_mut();
                state.last_updated = state.last_updated.max(stamp);
            }
            Err(err) => {
                // Local state stays authoritative; the next push carries it.
                warn!("push failed: {err}");
                self.report.push_failures += 1;
                self.repair_pending = self.role == ClientRole::Facilitator;
            }
        }
    }

    async fn persist(&mut self) {
        if self.role != ClientRole::Facilitator {
            return;
        }
        match self.repository.save(self.engine.session().clone()).await {
            Ok(()) => self.report.persisted += 1,
            Err(err) => {
                warn!("persisting session failed: {err}");
                self.report.persist_failures += 1;
            }
        }
    }
}
