use turnboard_game::GameMode;

use crate::logic::simulation::{
    DiceSource, SimulationPlan, expect_laps_match_bonuses, expect_persisted_progress,
    expect_push_failures_survived, expect_scoring_alert,
};

/// Named simulation with the checks it must pass.
#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub plan: SimulationPlan,
}

impl TestScenario {
    #[must_use]
    pub fn simulation(name: impl Into<String>, plan: SimulationPlan) -> Self {
        Self {
            name: name.into(),
            plan,
        }
    }
}

const CATALOG: [(&str, &str); 6] = [
    ("smoke", "Two teams, four turns, one viewer"),
    (
        "full-session",
        "Four teams play sixteen leadership turns with three voting viewers",
    ),
    (
        "free-form",
        "Free-form board with zone effects and assigned competency squares",
    ),
    ("manual-dice", "Facilitator types dice totals instead of rolling"),
    (
        "flaky-network",
        "Early pushes fail and the scorer errors once; every console must converge",
    ),
    (
        "multiplier-grants",
        "Facilitator grants a x2 multiplier before every third turn",
    ),
];

#[must_use]
pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    CATALOG.to_vec()
}

#[must_use]
pub fn all_scenario_names() -> Vec<String> {
    CATALOG.iter().map(|(name, _)| (*name).to_string()).collect()
}

/// Scenario overrides supplied on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOverrides {
    pub mode: Option<GameMode>,
    pub teams: Option<usize>,
    pub turns: Option<u32>,
    pub viewers: Option<usize>,
}

impl PlanOverrides {
    fn apply(self, mut plan: SimulationPlan) -> SimulationPlan {
        if let Some(mode) = self.mode {
            plan.mode = mode;
        }
        if let Some(teams) = self.teams {
            plan.teams = teams.max(1);
        }
        if let Some(turns) = self.turns {
            plan.turns = turns;
        }
        if let Some(viewers) = self.viewers {
            plan.viewers = viewers;
        }
        plan
    }
}

#[must_use]
pub fn get_scenario(name: &str, overrides: PlanOverrides) -> Option<TestScenario> {
    let plan = match name {
        "smoke" => SimulationPlan::new(GameMode::Foundation, 2, 4),
        "full-session" => SimulationPlan::new(GameMode::Leadership, 4, 16)
            .with_viewers(3)
            .with_expectation(expect_laps_match_bonuses)
            .with_expectation(expect_persisted_progress),
        "free-form" => SimulationPlan::new(GameMode::FreeForm, 3, 9)
            .with_viewers(2)
            .with_expectation(expect_laps_match_bonuses),
        "manual-dice" => SimulationPlan {
            dice: DiceSource::Manual,
            ..SimulationPlan::new(GameMode::Foundation, 3, 8)
        }
        .with_expectation(expect_laps_match_bonuses),
        "flaky-network" => SimulationPlan {
            push_failures: 2,
            scoring_failure_turn: Some(2),
            ..SimulationPlan::new(GameMode::Foundation, 2, 5)
        }
        .with_viewers(2)
        .with_expectation(expect_push_failures_survived)
        .with_expectation(expect_scoring_alert),
        "multiplier-grants" => SimulationPlan {
            multiplier_every: Some(3),
            ..SimulationPlan::new(GameMode::Leadership, 3, 9)
        },
        _ => return None,
    };
    Some(TestScenario::simulation(name, overrides.apply(plan)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_scenario_resolves() {
        for (name, _) in list_scenarios() {
            let scenario = get_scenario(name, PlanOverrides::default()).unwrap();
            assert_eq!(scenario.name, name);
            assert!(!scenario.plan.expectations.is_empty());
        }
        assert!(get_scenario("unknown", PlanOverrides::default()).is_none());
    }

    #[test]
    fn overrides_replace_plan_fields() {
        let overrides = PlanOverrides {
            mode: Some(GameMode::FreeForm),
            teams: Some(0),
            turns: Some(2),
            viewers: None,
        };
        let scenario = get_scenario("smoke", overrides).unwrap();
        assert_eq!(scenario.plan.mode, GameMode::FreeForm);
        assert_eq!(scenario.plan.teams, 1);
        assert_eq!(scenario.plan.turns, 2);
        assert_eq!(scenario.plan.viewers, 1);
    }
}
