use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use turnboard_game::{RuntimeReport, Standing};

use crate::common::scenario::TestScenario;
use crate::logic::simulation::{SimulationPlan, SimulationSummary, run_session};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub seed: u64,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "millis")]
    pub average_duration: Duration,
    #[serde(with = "millis::list")]
    pub performance_data: Vec<Duration>,
    /// Standings of the last completed iteration.
    #[serde(default)]
    pub standings: Vec<Standing>,
    /// Facilitator counters of the last completed iteration.
    #[serde(skip_deserializing, default)]
    pub facilitator: Option<RuntimeReport>,
}

pub struct LogicTester {
    verbose: bool,
}

impl LogicTester {
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub async fn run_scenario(
        &self,
        scenario: &TestScenario,
        seeds: &[u64],
        iterations: usize,
    ) -> Vec<ScenarioResult> {
        let mut results = Vec::new();

        for &seed in seeds {
            if self.verbose {
                println!(
                    "🧪 Testing scenario: {} (mode: {} teams: {} seed: {})",
                    scenario.name.bright_white(),
                    scenario.plan.mode,
                    scenario.plan.teams,
                    seed
                );
            }

            let result = self.run_single_scenario(scenario, seed, iterations).await;
            results.push(result);
        }

        results
    }

    async fn run_single_scenario(
        &self,
        scenario: &TestScenario,
        seed: u64,
        iterations: usize,
    ) -> ScenarioResult {
        let mut successes = 0;
        let mut failures = Vec::new();
        let mut performance_data = Vec::new();
        let mut last_summary: Option<SimulationSummary> = None;

        for i in 0..iterations {
            let start_time = Instant::now();
            let iteration_seed = seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX));

            match run_session(&scenario.plan, iteration_seed).await {
                Ok(summary) => {
                    if let Some(err) = evaluate_expectations(&scenario.plan, &summary) {
                        failures.push(format!(
                            "Iteration {} (mode {}, seed {}, turns {}, decisions {}): {} | {}",
                            i + 1,
                            summary.mode,
                            summary.seed,
                            summary.turns_played,
                            summary.decisions_recorded,
                            err,
                            summarize_standings(&summary)
                        ));
                        if self.verbose {
                            println!(
                                "  ❌ Iteration {}/{} failed: {}",
                                i + 1,
                                iterations,
                                err.red()
                            );
                        }
                    } else {
                        successes += 1;
                        let duration = start_time.elapsed();
                        performance_data.push(duration);
                        if self.verbose {
                            println!(
                                "  ✅ Iteration {}/{} passed ({duration:?}) turns:{} laps:{} votes:{} pushes:{}",
                                i + 1,
                                iterations,
                                summary.turns_played,
                                summary.laps_completed,
                                summary.votes_cast,
                                summary.facilitator.pushes
                            );
                        }
                    }
                    last_summary = Some(summary);
                }
                Err(err) => {
                    failures.push(format!(
                        "Iteration {} (seed {iteration_seed}) aborted: {err:#}",
                        i + 1
                    ));
                    if self.verbose {
                        println!("  ❌ Iteration {}/{} aborted: {err:#}", i + 1, iterations);
                    }
                }
            }
        }

        let average_duration = if performance_data.is_empty() {
            Duration::ZERO
        } else {
            performance_data.iter().sum::<Duration>()
                / u32::try_from(performance_data.len()).unwrap_or(1)
        };

        ScenarioResult {
            scenario_name: scenario.name.clone(),
            seed,
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            average_duration,
            performance_data,
            standings: last_summary
                .as_ref()
                .map(|summary| summary.standings.clone())
                .unwrap_or_default(),
            facilitator: last_summary.map(|summary| summary.facilitator),
        }
    }
}

fn evaluate_expectations(plan: &SimulationPlan, summary: &SimulationSummary) -> Option<String> {
    for expectation in &plan.expectations {
        if let Err(err) = expectation(summary) {
            return Some(err.to_string());
        }
    }
    None
}

fn summarize_standings(summary: &SimulationSummary) -> String {
    if summary.standings.is_empty() {
        return "no teams".to_string();
    }

    summary
        .standings
        .iter()
        .take(3)
        .map(|standing| {
            format!(
                "#{} {} total {} laps {}",
                standing.rank, standing.name, standing.total, standing.laps
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Durations travel as whole milliseconds in reports.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    fn to_millis(value: Duration) -> u64 {
        u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(to_millis(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub mod list {
        use super::{Deserialize, Deserializer, Duration, Serializer, to_millis};

        pub fn serialize<S: Serializer>(
            values: &[Duration],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(values.iter().map(|value| to_millis(*value)))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<Duration>, D::Error> {
            Vec::<u64>::deserialize(deserializer)
                .map(|values| values.into_iter().map(Duration::from_millis).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::scenario::{PlanOverrides, get_scenario};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn smoke_scenario_passes() {
        let scenario = get_scenario("smoke", PlanOverrides::default()).unwrap();
        let results = LogicTester::new(false)
            .run_scenario(&scenario, &[7], 1)
            .await;
        assert_eq!(results.len(), 1);
        assert!(results[0].passed, "{:?}", results[0].failures);
        assert_eq!(results[0].standings.len(), 2);
    }

    #[test]
    fn result_serializes_durations_as_millis() {
        let result = ScenarioResult {
            scenario_name: "smoke".into(),
            seed: 1,
            passed: true,
            iterations_run: 1,
            successful_iterations: 1,
            failures: Vec::new(),
            average_duration: Duration::from_millis(12),
            performance_data: vec![Duration::from_millis(12)],
            standings: Vec::new(),
            facilitator: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["average_duration"], 12);
        assert_eq!(json["performance_data"][0], 12);
    }
}
