//! Turn phase transitions and the advisory decision timer.

use log::debug;
use thiserror::Error;

use crate::state::{GameState, Phase, Team};

/// Reasons a command is rejected. Rejected commands never mutate state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{command} is not allowed while {phase}")]
    IllegalPhase { command: &'static str, phase: Phase },
    #[error("manual dice total {0} is outside 2..=12")]
    InvalidManualTotal(u8),
    #[error("a justification is required before submitting")]
    EmptyJustification,
    #[error("option {0} is not on the active card")]
    UnknownOption(String),
    #[error("the game has not started")]
    GameNotStarted,
    #[error("the session has no teams")]
    NoTeams,
    #[error("the session has ended")]
    SessionEnded,
    #[error("multiplier x{0} is not supported")]
    InvalidMultiplier(u8),
    #[error("no lap bonus is waiting for acknowledgment")]
    NoPendingLapBonus,
    #[error("no scoring request is in flight")]
    NoScoringPending,
    #[error("a decision is already being scored")]
    AlreadySubmitting,
}

/// Legal edges of the phase graph. Pause/resume and reset are handled separately.
#[must_use]
pub const fn is_legal(from: Phase, to: Phase) -> bool {
    matches!(
        (from, to),
        (Phase::WaitingToStart, Phase::Idle)
            | (Phase::Idle, Phase::Rolling)
            | (Phase::Rolling, Phase::Moving)
            | (Phase::Moving, Phase::Decision | Phase::Idle)
            | (Phase::Decision, Phase::Idle)
    )
}

/// Require the state to be in `expected` before running `command`.
///
/// # Errors
///
/// Returns `CommandError::IllegalPhase` when the phase differs.
pub fn require_phase(
    state: &GameState,
    expected: Phase,
    command: &'static str,
) -> Result<(), CommandError> {
    if state.phase == expected {
        Ok(())
    } else {
        Err(CommandError::IllegalPhase {
            command,
            phase: state.phase,
        })
    }
}

/// Move along a legal edge.
///
/// # Errors
///
/// Returns `CommandError::IllegalPhase` for edges outside the phase graph.
pub fn transition(
    state: &mut GameState,
    to: Phase,
    command: &'static str,
) -> Result<(), CommandError> {
    if !is_legal(state.phase, to) {
        return Err(CommandError::IllegalPhase {
            command,
            phase: state.phase,
        });
    }
    debug!("phase {} -> {to} ({command})", state.phase);
    state.phase = to;
    Ok(())
}

/// Close the decision and hand the turn to the next team.
///
/// This is the only place `current_team_index` changes outside a reset.
pub fn rotate(state: &mut GameState, teams: &mut [Team]) {
    debug!("phase {} -> idle (rotate)", state.phase);
    state.phase = Phase::Idle;
    state.clear_decision();
    state.timer_remaining = 0;
    state.turn = state.turn.saturating_add(1);
    if teams.is_empty() {
        return;
    }
    state.current_team_index = (state.current_team_index + 1) % teams.len();
    if let Some(team) = teams.get_mut(state.current_team_index) {
        team.advance_roller();
    }
}

/// Enter `Paused`, remembering the phase to come back to.
///
/// # Errors
///
/// Returns `CommandError::IllegalPhase` unless the phase can be paused, and
/// `CommandError::AlreadySubmitting` while a decision is out for scoring.
pub fn pause(state: &mut GameState) -> Result<Phase, CommandError> {
    if !state.phase.can_pause() {
        return Err(CommandError::IllegalPhase {
            command: "pause",
            phase: state.phase,
        });
    }
    // The scoring completion is only accepted in `Decision`.
    if state.is_processing {
        return Err(CommandError::AlreadySubmitting);
    }
    let prior = state.phase;
    state.paused_from = Some(prior);
    state.phase = Phase::Paused;
    debug!("phase {prior} -> paused");
    Ok(prior)
}

/// Leave `Paused` for the remembered phase.
///
/// # Errors
///
/// Returns `CommandError::IllegalPhase` when the state is not paused.
pub fn resume(state: &mut GameState) -> Result<Phase, CommandError> {
    if state.phase != Phase::Paused {
        return Err(CommandError::IllegalPhase {
            command: "resume",
            phase: state.phase,
        });
    }
    let prior = state.paused_from.take().unwrap_or(Phase::Idle);
    state.phase = prior;
    debug!("phase paused -> {prior}");
    Ok(prior)
}

/// Count the decision timer down by one unit. Returns true when it moved.
///
/// The timer only runs during `Decision`, floors at zero, and never forces
/// a transition.
pub fn tick_timer(state: &mut GameState) -> bool {
    if state.phase != Phase::Decision || state.timer_remaining == 0 {
        return false;
    }
    state.timer_remaining -= 1;
    true
}
