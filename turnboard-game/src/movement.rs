//! Stepwise token movement, lap bonus, and re-roll detection.

use log::info;
use serde::{Deserialize, Serialize};

use crate::board::{Board, SquareKind};
use crate::config::LapBonus;
use crate::constants::{DIE_FACES, MANUAL_TOTAL_MAX, MANUAL_TOTAL_MIN};
use crate::resources::Resources;
use crate::state::Team;

/// Movement still owed to the current team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Walk {
    pub team: usize,
    pub remaining: u8,
    /// Consecutive re-rolls already taken during this turn.
    pub rerolls: u8,
}

impl Walk {
    #[must_use]
    pub const fn new(team: usize, steps: u8) -> Self {
        Self {
            team,
            remaining: steps,
            rerolls: 0,
        }
    }

    #[must_use]
    pub const fn reroll(self, steps: u8) -> Self {
        Self {
            team: self.team,
            remaining: steps,
            rerolls: self.rerolls.saturating_add(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced { position: usize },
    /// Crossed the start square with steps left; the walk waits for acknowledgment.
    LapBonus { delta: Resources, remaining: u8 },
    Landed {
        position: usize,
        lap_bonus: Option<Resources>,
    },
}

/// Move the team one square along its walk.
pub fn advance(team: &mut Team, walk: &mut Walk, board: &Board, bonus: &LapBonus) -> StepOutcome {
    let size = board.len();
    let from = team.position % size;
    team.position = (from + 1) % size;
    walk.remaining = walk.remaining.saturating_sub(1);

    let lap_bonus = (from == size - 1).then(|| apply_lap_bonus(team, bonus));
    match (walk.remaining, lap_bonus) {
        (0, lap_bonus) => StepOutcome::Landed {
            position: team.position,
            lap_bonus,
        },
        (remaining, Some(delta)) => StepOutcome::LapBonus { delta, remaining },
        (_, None) => StepOutcome::Advanced {
            position: team.position,
        },
    }
}

/// Credit one completed lap. Both the mid-walk and the exact-landing path go through here.
pub fn apply_lap_bonus(team: &mut Team, bonus: &LapBonus) -> Resources {
    let delta = bonus.delta();
    team.resources += delta;
    team.laps = team.laps.saturating_add(1);
    info!("{} completed lap {} ({delta})", team.name, team.laps);
    delta
}

/// City squares already answered by this team trigger a fresh roll.
#[must_use]
pub fn needs_reroll(team: &Team, board: &Board, position: usize) -> bool {
    board.kind_at(position) == SquareKind::City && team.has_record_at(position)
}

/// Split a manually entered dice total into two faces.
///
/// Returns `None` for totals outside 2..=12. `double` is honored when the
/// total is even; totals 2 and 12 are always doubles.
#[must_use]
pub fn split_manual(total: u8, double: bool) -> Option<(u8, u8)> {
    if !(MANUAL_TOTAL_MIN..=MANUAL_TOTAL_MAX).contains(&total) {
        return None;
    }
    let half = total / 2;
    let pair = if total % 2 == 1 {
        (half + 1, half)
    } else if double || total == MANUAL_TOTAL_MIN || total == MANUAL_TOTAL_MAX {
        (half, half)
    } else {
        (half + 1, half - 1)
    };
    debug_assert!(pair.0 <= DIE_FACES && pair.1 >= 1);
    Some(pair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BOARD_SIZE;

    fn team_at(position: usize) -> Team {
        let mut team = Team::new("t", "Falcons", "red", Vec::new());
        team.position = position;
        team
    }

    fn run(team: &mut Team, steps: u8) -> Vec<StepOutcome> {
        let board = Board::standard();
        let bonus = LapBonus::default();
        let mut walk = Walk::new(0, steps);
        let mut out = Vec::new();
        loop {
            let outcome = advance(team, &mut walk, &board, &bonus);
            out.push(outcome);
            if matches!(outcome, StepOutcome::Landed { .. }) {
                return out;
            }
        }
    }

    #[test]
    fn crossing_start_mid_walk_suspends_once() {
        let mut team = team_at(30);
        let before = team.resources;
        let outcomes = run(&mut team, 5);
        assert_eq!(team.position, 3);
        assert_eq!(team.laps, 1);
        assert_eq!(team.resources, before + LapBonus::default().delta());
        let suspensions = outcomes
            .iter()
            .filter(|o| matches!(o, StepOutcome::LapBonus { .. }))
            .count();
        assert_eq!(suspensions, 1);
        assert!(matches!(
            outcomes[1],
            StepOutcome::LapBonus { remaining: 3, .. }
        ));
    }

    #[test]
    fn exact_landing_on_start_credits_without_suspending() {
        let mut team = team_at(BOARD_SIZE - 4);
        let outcomes = run(&mut team, 4);
        assert_eq!(team.position, 0);
        assert_eq!(team.laps, 1);
        assert!(matches!(
            outcomes.last(),
            Some(StepOutcome::Landed {
                position: 0,
                lap_bonus: Some(_)
            })
        ));
        assert!(
            !outcomes
                .iter()
                .any(|o| matches!(o, StepOutcome::LapBonus { .. }))
        );
    }

    #[test]
    fn reroll_only_for_answered_city_squares() {
        let board = Board::standard();
        let mut team = team_at(0);
        assert!(!needs_reroll(&team, &board, 1));
        team.append_record(crate::state::TurnRecord {
            turn: 1,
            card_id: "c".into(),
            card_title: "c".into(),
            situation: String::new(),
            choice: crate::state::ChosenOption::FreeText,
            justification: "j".into(),
            feedback: String::new(),
            delta: Resources::ZERO,
            timestamp_ms: 0,
            position: 1,
            broadcast: false,
        });
        assert!(needs_reroll(&team, &board, 1));
        assert!(!needs_reroll(&team, &board, 3));
    }

    #[test]
    fn manual_totals_split_into_faces() {
        assert_eq!(split_manual(12, false), Some((6, 6)));
        assert_eq!(split_manual(2, false), Some((1, 1)));
        assert_eq!(split_manual(7, true), Some((4, 3)));
        assert_eq!(split_manual(8, false), Some((5, 3)));
        assert_eq!(split_manual(8, true), Some((4, 4)));
        assert_eq!(split_manual(1, false), None);
        assert_eq!(split_manual(13, false), None);
    }
}
