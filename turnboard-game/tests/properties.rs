use proptest::prelude::*;

use turnboard_game::constants::BOARD_SIZE;
use turnboard_game::movement::{self, StepOutcome, Walk};
use turnboard_game::scoring::apply_pipeline;
use turnboard_game::{
    ArmedModifiers, AuthorityGuard, Board, GameState, GuardDecision, LapBonus, Phase, Resources,
    SyncConfig, Team,
};

fn walk_to_end(position: usize, steps: u8) -> (Team, u32) {
    let board = Board::standard();
    let bonus = LapBonus::default();
    let mut team = Team::new("t", "Team", "green", Vec::new());
    team.position = position;
    let mut walk = Walk::new(0, steps);
    let mut paid = 0;
    loop {
        match movement::advance(&mut team, &mut walk, &board, &bonus) {
            StepOutcome::Advanced { .. } => {}
            StepOutcome::LapBonus { .. } => paid += 1,
            StepOutcome::Landed { lap_bonus, .. } => {
                paid += u32::from(lap_bonus.is_some());
                return (team, paid);
            }
        }
    }
}

fn resources() -> impl Strategy<Value = Resources> {
    prop::array::uniform5(-10i32..=10)
        .prop_map(|[a, b, c, d, e]| Resources::new(a, b, c, d, e))
}

proptest! {
    #[test]
    fn movement_wraps_modulo_board(position in 0usize..BOARD_SIZE, steps in 2u8..=12) {
        let (team, paid) = walk_to_end(position, steps);
        let target = position + usize::from(steps);
        prop_assert_eq!(team.position, target % BOARD_SIZE);
        let wrapped = target >= BOARD_SIZE;
        prop_assert_eq!(paid, u32::from(wrapped));
        prop_assert_eq!(team.laps, u32::from(wrapped));
        let expected = if wrapped {
            Team::starting_resources() + LapBonus::default().delta()
        } else {
            Team::starting_resources()
        };
        prop_assert_eq!(team.resources, expected);
    }

    #[test]
    fn risk_never_yields_a_positive_dimension(
        raw in resources(),
        double in any::<bool>(),
        multiplier in prop::option::of(2u8..=3),
    ) {
        let modifiers = ArmedModifiers {
            double,
            custom_multiplier: multiplier,
            risk: true,
            broadcast: false,
        };
        let applied = apply_pipeline(raw, &modifiers);
        for value in [applied.resource, applied.energy, applied.trust, applied.competency, applied.insight] {
            prop_assert!(value <= 0);
        }
    }

    #[test]
    fn guard_never_applies_older_snapshots(
        stamps in prop::collection::vec(0i64..10_000, 1..40),
        skew in -3_000i64..3_000,
    ) {
        let mut guard = AuthorityGuard::new(SyncConfig::default());
        let mut local = GameState::default();
        let mut newest_applied: Option<i64> = None;
        for (idx, stamp) in stamps.into_iter().enumerate() {
            let snapshot = GameState {
                phase: Phase::Idle,
                last_updated: stamp,
                ..GameState::default()
            };
            // The local clock disagrees with the stamping clock by `skew`.
            let now = stamp + skew + i64::try_from(idx).unwrap_or(0);
            if guard.admit(&mut local, &snapshot, now) == GuardDecision::Apply {
                if let Some(prev) = newest_applied {
                    prop_assert!(stamp > prev);
                }
                newest_applied = Some(stamp);
                prop_assert_eq!(local.last_updated, stamp);
            }
        }
        prop_assert_eq!(guard.last_applied(), newest_applied);
    }
}
