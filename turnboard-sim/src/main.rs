mod common;
mod logic;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::{Path, PathBuf};
use std::time::Instant;

use turnboard_game::GameMode;

use common::scenario::{PlanOverrides, all_scenario_names, get_scenario, list_scenarios};
use common::split_csv;
use logic::{LogicTester, ScenarioResult, SeedInfo, resolve_seed_inputs};

#[derive(Debug, Parser)]
#[command(name = "turnboard-sim", version)]
#[command(
    about = "Drives simulated facilitator and viewer consoles through full board-game sessions"
)]
struct Args {
    /// Scenarios to run (comma-separated, or "all")
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Seeds to run (comma-separated; decimal, 0x-hex or a..b ranges)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario and seed
    #[arg(long, default_value_t = 3)]
    iterations: usize,

    /// Override the scenario's game mode (foundation, leadership, free_form)
    #[arg(long)]
    mode: Option<String>,

    /// Override the number of teams
    #[arg(long)]
    teams: Option<usize>,

    /// Override the number of decisions played before ending the session
    #[arg(long)]
    turns: Option<u32>,

    /// Override the number of viewer consoles
    #[arg(long)]
    viewers: Option<usize>,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let overrides = plan_overrides(&args)?;
    let scenarios = expand_scenarios(&args.scenarios);
    let seed_tokens = split_csv(&args.seeds);
    let seed_infos = resolve_seed_inputs(&seed_tokens)?;
    if args.verbose {
        announce_seeds(&seed_infos);
    }
    let seeds: Vec<u64> = seed_infos.iter().map(|info| info.seed).collect();

    let results = run_scenarios(&args, &scenarios, &seeds, overrides).await;

    write_reports(&args, &results, start_time)?;

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut sink = ReportSink::open(args.output.as_deref())?;
    writeln!(sink, "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(sink, "  {key:20} - {description}")?;
    }
    sink.flush()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🎲 Turnboard Session Simulator".bright_cyan().bold());
    println!("{}", "==============================".cyan());
}

fn announce_seeds(seeds: &[SeedInfo]) {
    let listed: Vec<String> = seeds
        .iter()
        .map(|info| format!("{} ({})", info.seed, info.source))
        .collect();
    println!("🌱 Seeds: {}", listed.join(", "));
}

fn plan_overrides(args: &Args) -> Result<PlanOverrides> {
    let mode = match args.mode.as_deref() {
        None => None,
        Some(raw) => match raw.parse::<GameMode>() {
            Ok(mode) => Some(mode),
            Err(()) => bail!("unknown game mode '{raw}' (expected foundation, leadership or free_form)"),
        },
    };
    Ok(PlanOverrides {
        mode,
        teams: args.teams,
        turns: args.turns,
        viewers: args.viewers,
    })
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s == "all") {
        scenarios.retain(|s| s != "all");
        for name in all_scenario_names() {
            if !scenarios.contains(&name) {
                scenarios.push(name);
            }
        }
    }
    scenarios
}

async fn run_scenarios(
    args: &Args,
    scenarios: &[String],
    seeds: &[u64],
    overrides: PlanOverrides,
) -> Vec<ScenarioResult> {
    println!("{}", "🧠 Running Session Simulations".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let tester = LogicTester::new(args.verbose);
    let mut results = Vec::new();

    for scenario_name in scenarios {
        if let Some(scenario) = get_scenario(scenario_name, overrides) {
            results.extend(
                tester
                    .run_scenario(&scenario, seeds, args.iterations)
                    .await,
            );
        } else {
            eprintln!("⚠️  Unknown scenario: {}", scenario_name.yellow());
        }
    }

    results
}

fn write_reports(args: &Args, results: &[ScenarioResult], started: Instant) -> Result<()> {
    let mut sink = ReportSink::open(args.output.as_deref())?;

    match (args.report.as_str(), results.is_empty()) {
        ("json", _) => logic::reports::generate_json_report(&mut sink, results)?,
        ("markdown", true) => writeln!(
            sink,
            "# Turnboard Session Simulation Results\n\n_No scenarios executed._"
        )?,
        ("markdown", false) => logic::reports::generate_markdown_report(&mut sink, results)?,
        (_, true) => writeln!(sink, "No scenarios executed.")?,
        (_, false) => {
            logic::reports::generate_console_report(&mut sink, results, started.elapsed())?;
        }
    }

    // JSON output stays machine-readable.
    if args.report != "json" {
        writeln!(sink)?;
        writeln!(sink, "🏁 Elapsed: {:?}", started.elapsed())?;
    }
    sink.flush()?;
    Ok(())
}

/// Destination of the report: a file when `--output` is given, stdout otherwise.
struct ReportSink {
    inner: BufWriter<Box<dyn Write>>,
}

impl ReportSink {
    fn open(path: Option<&Path>) -> Result<Self> {
        let target: Box<dyn Write> = match path {
            Some(path) => Box::new(
                File::create(path)
                    .with_context(|| format!("cannot write report to {}", path.display()))?,
            ),
            None => Box::new(stdout()),
        };
        Ok(Self {
            inner: BufWriter::new(target),
        })
    }
}

impl Write for ReportSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn base_args() -> Args {
        Args {
            scenarios: "smoke".to_string(),
            list_scenarios: false,
            seeds: "1337".to_string(),
            iterations: 1,
            mode: None,
            teams: None,
            turns: None,
            viewers: None,
            report: "json".to_string(),
            verbose: false,
            output: None,
        }
    }

    fn sample_result(passed: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_name: "smoke".to_string(),
            seed: 1337,
            passed,
            iterations_run: 3,
            successful_iterations: if passed { 3 } else { 2 },
            failures: if passed {
                Vec::new()
            } else {
                vec!["failure".to_string()]
            },
            average_duration: Duration::from_millis(10),
            performance_data: vec![Duration::from_millis(10)],
            standings: Vec::new(),
            facilitator: None,
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("turnboard-sim-{}-{name}", std::process::id()))
    }

    #[test]
    fn args_parse_from_command_line() {
        let args = Args::try_parse_from([
            "turnboard-sim",
            "--scenarios",
            "smoke,manual-dice",
            "--mode",
            "leadership",
            "--teams",
            "3",
            "--report",
            "markdown",
        ])
        .unwrap();
        assert_eq!(args.iterations, 3);
        assert_eq!(args.teams, Some(3));
        assert!(Args::try_parse_from(["turnboard-sim", "--report", "csv"]).is_err());
    }

    #[test]
    fn expands_all_scenarios_keyword() {
        let expanded = expand_scenarios("smoke,all");
        assert_eq!(expanded[0], "smoke");
        assert_eq!(expanded.len(), all_scenario_names().len());
        assert!(expanded.contains(&"flaky-network".to_string()));
    }

    #[test]
    fn expand_scenarios_without_all_preserves_order() {
        let expanded = expand_scenarios("manual-dice,smoke");
        assert_eq!(expanded, vec!["manual-dice".to_string(), "smoke".to_string()]);
    }

    #[test]
    fn plan_overrides_parse_mode() {
        let args = Args {
            mode: Some("free_form".to_string()),
            teams: Some(5),
            ..base_args()
        };
        let overrides = plan_overrides(&args).unwrap();
        assert_eq!(overrides.mode, Some(GameMode::FreeForm));
        assert_eq!(overrides.teams, Some(5));

        let bad = Args {
            mode: Some("chess".to_string()),
            ..base_args()
        };
        assert!(plan_overrides(&bad).is_err());
    }

    #[test]
    fn maybe_list_scenarios_writes_output() {
        let temp = temp_path("scenarios.txt");
        let args = Args {
            list_scenarios: true,
            output: Some(temp.clone()),
            ..base_args()
        };
        assert!(maybe_list_scenarios(&args).unwrap());
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("Available scenarios"));
        assert!(content.contains("multiplier-grants"));
    }

    #[test]
    fn maybe_list_scenarios_returns_false_when_disabled() {
        assert!(!maybe_list_scenarios(&base_args()).unwrap());
    }

    #[test]
    fn write_reports_emits_json_for_results() {
        let temp = temp_path("report.json");
        let args = Args {
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[sample_result(true)], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value[0]["scenario_name"], "smoke");
    }

    #[test]
    fn write_reports_markdown_empty_results() {
        let temp = temp_path("report.md");
        let args = Args {
            report: "markdown".to_string(),
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("No scenarios executed"));
    }

    #[test]
    fn write_reports_console_lists_failures() {
        let temp = temp_path("report.txt");
        let args = Args {
            report: "console".to_string(),
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[sample_result(false)], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("Failures:"));
        assert!(content.contains("Elapsed"));
    }

    #[test]
    fn report_sink_defaults_to_stdout() {
        let mut sink = ReportSink::open(None).unwrap();
        sink.write_all(b"ok").unwrap();
        sink.flush().unwrap();
    }

    #[test]
    fn report_sink_reports_unwritable_paths() {
        let missing = temp_path("missing-dir").join("report.json");
        assert!(ReportSink::open(Some(&missing)).is_err());
    }
}
