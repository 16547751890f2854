//! Local authority guard.
//!
//! Remote snapshots arrive as whole documents and may be echoes of writes the
//! local client has already superseded. The guard decides, per snapshot,
//! whether it replaces the local state, only contributes the shared-editing
//! fields, or is dropped.

use log::debug;
use serde::Serialize;

use crate::config::SyncConfig;
use crate::state::{GameState, Phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Same `last_updated` as the last applied snapshot.
    Duplicate,
    /// Older than the last applied snapshot.
    Stale,
    /// A local operation is in flight and the snapshot is not a decision edit.
    InFlight,
    /// Stamped before the local operation that is still inside the guard window.
    GuardWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Apply,
    /// Only the shared-editing fields (selected option, justification, votes)
    /// were taken.
    MergeEditing,
    Discard(DiscardReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GuardStats {
    pub applied: u64,
    pub merged: u64,
    pub discarded: u64,
}

#[derive(Debug, Clone)]
pub struct AuthorityGuard {
    config: SyncConfig,
    authoritative: bool,
    in_flight: bool,
    local_started_at: Option<i64>,
    last_applied: Option<i64>,
    stats: GuardStats,
}

impl AuthorityGuard {
    #[must_use]
    pub const fn new(config: SyncConfig) -> Self {
        Self {
            config,
            authoritative: false,
            in_flight: false,
            local_started_at: None,
            last_applied: None,
            stats: GuardStats {
                applied: 0,
                merged: 0,
                discarded: 0,
            },
        }
    }

    /// Guard for the client that owns the turn. Remote writers can then only
    /// contribute shared-editing fields; everything else stays local.
    #[must_use]
    pub const fn authoritative(mut self) -> Self {
        self.authoritative = true;
        self
    }

    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    #[must_use]
    pub const fn last_applied(&self) -> Option<i64> {
        self.last_applied
    }

    #[must_use]
    pub const fn stats(&self) -> GuardStats {
        self.stats
    }

    /// Mark a local operation as started at `now_ms`.
    pub fn begin_local(&mut self, now_ms: i64) {
        self.in_flight = true;
        self.local_started_at = Some(now_ms);
    }

    /// Clear the in-flight flag. The guard window keeps running.
    pub fn end_local(&mut self) {
        self.in_flight = false;
    }

    /// Record a write this client pushed, so its echo is treated as a duplicate.
    pub fn record_local_write(&mut self, stamped_ms: i64) {
        self.last_applied = Some(self.last_applied.map_or(stamped_ms, |prev| prev.max(stamped_ms)));
    }

    /// Classify a snapshot without touching any state.
    #[must_use]
    pub fn evaluate(&self, snapshot: &GameState, now_ms: i64) -> GuardDecision {
        let stamp = snapshot.last_updated;
        if let Some(last) = self.last_applied {
            if stamp < last {
                return GuardDecision::Discard(DiscardReason::Stale);
            }
            if stamp == last && self.config.dedupe_equal_timestamps {
                return GuardDecision::Discard(DiscardReason::Duplicate);
            }
        }
        if self.in_flight {
            return if snapshot.phase == Phase::Decision {
                GuardDecision::MergeEditing
            } else {
                GuardDecision::Discard(DiscardReason::InFlight)
            };
        }
        if let Some(started) = self.local_started_at
            && now_ms.saturating_sub(started) < self.config.guard_window_ms
            && stamp < started
        {
            return GuardDecision::Discard(DiscardReason::GuardWindow);
        }
        if self.authoritative {
            GuardDecision::MergeEditing
        } else {
            GuardDecision::Apply
        }
    }

    /// Evaluate `snapshot` and fold it into `local` accordingly.
    pub fn admit(&mut self, local: &mut GameState, snapshot: &GameState, now_ms: i64) -> GuardDecision {
        let decision = self.evaluate(snapshot, now_ms);
        match decision {
            GuardDecision::Apply => {
                *local = snapshot.clone();
                if local.phase == Phase::Idle {
                    local.clear_decision();
                }
                self.last_applied = Some(snapshot.last_updated);
                self.stats.applied += 1;
            }
            GuardDecision::MergeEditing => {
                if local.phase == Phase::Decision && snapshot.phase == Phase::Decision {
                    local.selected_option.clone_from(&snapshot.selected_option);
                    local.justification.clone_from(&snapshot.justification);
                    local.votes.clone_from(&snapshot.votes);
                }
                if !self.in_flight {
                    self.record_local_write(snapshot.last_updated);
                }
                self.stats.merged += 1;
            }
            GuardDecision::Discard(reason) => {
                self.stats.discarded += 1;
                debug!(
                    "discarded snapshot stamped {} ({reason:?})",
                    snapshot.last_updated
                );
            }
        }
        decision
    }
}
