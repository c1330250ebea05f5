//! api-tester CLI - scenario-based API test execution tool.

use anyhow::{bail, Context, Result};
use api_tester::report::{save_report, ReportFormat, Summary};
use api_tester::{
    load_scenarios, ApiDefinition, DefaultScenarioRunner, HttpSender,
    ScenarioReport, ScenarioRunner, StatusValidator, SuiteConfig,
    SuiteReport,
};
use clap::Parser;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// api-tester - run API test scenarios against a live service.
#[derive(Parser, Debug)]
#[command(name = "api-tester", version, about)]
struct Cli {
    /// Suite configuration file (YAML).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// OpenAPI / Swagger definition file. Repeatable.
    #[arg(long = "spec")]
    spec: Vec<PathBuf>,

    /// Base URL of the service under test.
    #[arg(short = 'b', long = "base-url", env = "API_TESTER_BASE_URL")]
    base_url: Option<String>,

    /// Request timeout in seconds.
    #[arg(short = 't', long = "timeout")]
    timeout: Option<u64>,

    /// Extra request header as NAME=VALUE. Repeatable.
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Scenario file or directory, replacing the config's scenarios.
    #[arg(long = "scenarios")]
    scenarios: Option<PathBuf>,

    /// Run only the scenario with this name.
    #[arg(short = 's', long = "scenario")]
    scenario: Option<String>,

    /// Directory to save the report file.
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Report output format.
    #[arg(long = "report-format", default_value = "json")]
    report_format: ReportFormat,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))
}

fn init_tracing(verbose: bool) {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}

/// Config file (if any) with command-line overrides applied.
fn load_config(args: &Cli) -> Result<SuiteConfig> {
    let mut config = match &args.config {
        Some(path) => SuiteConfig::load(path)?,
        None => SuiteConfig::default(),
    };

    if !args.spec.is_empty() {
        config.spec = None;
        config.spec_files = args.spec.clone();
    }
    if let Some(base_url) = &args.base_url {
        config.base_url = Some(base_url.clone());
    }
    if let Some(timeout) = args.timeout {
        config.timeout = Some(timeout);
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = Some(dir.clone());
    }
    config.request.headers.extend(args.headers.iter().cloned());

    if let Some(path) = &args.scenarios {
        config.scenarios = load_scenarios(path).context(format!(
            "Failed to load scenarios: {}",
            path.display()
        ))?;
    }

    config.validate()?;
    Ok(config)
}

fn print_scenario_report(scenario: &ScenarioReport) {
    let passed = scenario.results.iter().all(|r| r.passed);
    let status = if passed {
        "\x1b[32mPASS\x1b[0m"
    } else {
        "\x1b[31mFAIL\x1b[0m"
    };
    info!(
        "{} scenario: {} ({} ms)",
        status, scenario.name, scenario.duration_ms
    );

    for (i, step) in scenario.results.iter().enumerate() {
        let step_status = if step.passed {
            "\x1b[32m✓\x1b[0m"
        } else {
            "\x1b[31m✗\x1b[0m"
        };
        let code = step
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "---".to_string());
        info!(
            "  {}. {} {} {} {} -> {} ({} ms)",
            i + 1,
            step_status,
            step.step,
            step.method,
            step.path,
            code,
            step.elapsed_ms
        );

        if let Some(reason) = &step.failure_reason {
            error!("     \x1b[31mError: {}\x1b[0m", reason);
        }

        if let Some(body) = &step.response_body {
            let truncated = if body.len() > 500 {
                let cut = (0..=500)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                format!("{}...(truncated)", &body[..cut])
            } else {
                body.clone()
            };
            debug!("     Response body: {}", truncated);
        }
    }

    for name in &scenario.skipped {
        warn!("  - {} skipped (dependencies not completed)", name);
    }
}

fn print_summary(summary: &Summary, duration_ms: u64) {
    info!(
        "Summary:\n  Total: {}\n  \x1b[32mPassed: {}\x1b[0m\n  \x1b[31mFailed: {}\x1b[0m\n  Skipped: {}\n  Pass rate: {:.1}%\n  Avg response: {:.1} ms\n  Duration: {} ms",
        summary.total,
        summary.passed,
        summary.failed,
        summary.skipped,
        summary.pass_rate,
        summary.avg_response_ms,
        duration_ms
    );
}

async fn run(args: &Cli, config: SuiteConfig) -> Result<Summary> {
    let base_url = config.base_url()?.to_string();

    let spec_paths = config.spec_paths();
    let definition = if spec_paths.is_empty() {
        ApiDefinition::default()
    } else {
        ApiDefinition::load_all(spec_paths.as_slice())?
    };

    let scenarios = if config.scenarios.is_empty() {
        if definition.endpoints.is_empty() {
            bail!("Nothing to run: no scenarios and no API endpoints");
        }
        info!(
            "No scenarios configured; testing all {} endpoints",
            definition.endpoints.len()
        );
        vec![definition.to_scenario(&config.request)]
    } else {
        config.scenarios.clone()
    };

    let sender = HttpSender::new(
        &base_url,
        config.request.headers.clone(),
        config.timeout(),
    )?;
    info!("Testing {} ({} scenarios)", sender.base_url(), scenarios.len());

    let runner = DefaultScenarioRunner::new(Box::new(definition), Arc::new(sender))
        .with_validator(Box::new(StatusValidator))
        .with_resolver(config.resolver())
        .isolate_variables(config.isolate_variables.unwrap_or(false));

    let report: SuiteReport = match &args.scenario {
        Some(name) => runner.run_named(&scenarios, name).await?,
        None => runner.run_suite(&scenarios).await?,
    };

    for scenario in &report.scenarios {
        print_scenario_report(scenario);
    }
    let summary = Summary::of(&report);
    print_summary(&summary, report.duration_ms);

    match save_report(&report, &config.output_dir(), args.report_format) {
        Ok(path) => info!("Report saved: {}", path.display()),
        Err(e) => error!("Failed to save report: {:#}", e),
    }

    Ok(summary)
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let loaded = load_config(&args);
    let verbose = args.verbose
        || loaded
            .as_ref()
            .ok()
            .and_then(|config| config.verbose)
            .unwrap_or(false);
    init_tracing(verbose);

    let outcome = match loaded {
        Ok(config) => run(&args, config).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(summary) if summary.all_passed() => {}
        Ok(_) => exit(1),
        Err(e) => {
            error!("\x1b[31m{:#}\x1b[0m", e);
            exit(2);
        }
    }
}
