//! greenroom - run agent assessments from a scenario file.
//!
//! ## Commands
//!
//! - `run`: launch every role, run one assessment, tear down
//! - `check`: validate a scenario without launching anything
//!
//! Exit codes: 0 passed, 1 completed but failed, 2 orchestration failure.
//! Ctrl-C or SIGTERM during `run` cancels the assessment, tears every role
//! down and exits 2.

mod outcome;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use greenroom_core::{
    Orchestrator, OrchestratorConfig, Scenario, StatusUpdate, SupervisorError, SupervisorResult,
    METRICS,
};
use tracing::Level;

use outcome::{Verdict, EXIT_ORCHESTRATION_FAILURE};

#[derive(Parser)]
#[command(name = "greenroom")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evaluator/participant assessment harness", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch a scenario, run its assessment and tear it down
    Run {
        /// Scenario file (TOML)
        scenario: PathBuf,

        /// Stream status updates and pass role output through
        #[arg(long)]
        show_logs: bool,

        /// Launch the roles and keep them running until Ctrl-C
        #[arg(long)]
        serve_only: bool,

        /// Assessment budget, overriding `assessment.timeout_secs`
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Per-role startup budget, overriding `startup_timeout_secs`
        #[arg(long)]
        startup_timeout_secs: Option<u64>,
    },

    /// Validate a scenario file
    Check {
        /// Scenario file (TOML)
        scenario: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    greenroom_core::init_tracing(cli.json, level);

    let outcome = match cli.command {
        Commands::Run {
            scenario,
            show_logs,
            serve_only,
            timeout_secs,
            startup_timeout_secs,
        } => {
            let overrides = Overrides {
                timeout_secs,
                startup_timeout_secs,
            };
            if serve_only {
                cmd_serve(&scenario, show_logs, overrides).await
            } else {
                cmd_run(&scenario, show_logs, overrides).await
            }
        }
        Commands::Check { scenario } => cmd_check(&scenario),
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error [{}]: {err}", err.kind());
            ExitCode::from(err.exit_code())
        }
    }
}

/// Command-line values that win over the scenario file.
#[derive(Debug, Clone, Copy, Default)]
struct Overrides {
    timeout_secs: Option<u64>,
    startup_timeout_secs: Option<u64>,
}

fn prepare(path: &Path, show_logs: bool, overrides: Overrides) -> SupervisorResult<(Scenario, Orchestrator)> {
    let mut scenario = Scenario::load(path)?;
    let mut config = OrchestratorConfig::default().with_inherit_output(show_logs);

    if let Some(secs) = overrides.timeout_secs.filter(|s| *s > 0) {
        scenario.assessment.timeout = Some(Duration::from_secs(secs));
    }
    if let Some(secs) = overrides.startup_timeout_secs.filter(|s| *s > 0) {
        let timeout = Duration::from_secs(secs);
        config = config.with_startup_timeout(timeout);
        for role in &mut scenario.roles {
            role.startup_timeout = Some(timeout);
        }
    }

    let orchestrator = Orchestrator::new(config)?;
    Ok((scenario, orchestrator))
}

fn print_update(update: &StatusUpdate) {
    let progress = update
        .progress
        .map(|p| format!(" ({:.0}%)", p * 100.0))
        .unwrap_or_default();
    println!(
        "[{:>3}] {:<10} {}{}",
        update.seq, update.status, update.message, progress
    );
}

/// Run the scenario end to end
async fn cmd_run(path: &Path, show_logs: bool, overrides: Overrides) -> SupervisorResult<u8> {
    let (scenario, mut orchestrator) = prepare(path, show_logs, overrides)?;

    let mut observer = print_update;
    let observer: Option<&mut (dyn FnMut(&StatusUpdate) + Send)> = if show_logs {
        Some(&mut observer)
    } else {
        None
    };
    let outcome = orchestrator
        .run_scenario_until(&scenario, observer, interrupted())
        .await;
    METRICS.flush();

    let result = outcome?;
    let verdict = Verdict::of(&result, scenario.assessment.pass_threshold);
    let rendered = serde_json::to_string_pretty(&result).map_err(|e| SupervisorError::Protocol {
        task_id: result.task_id,
        reason: format!("cannot render result: {e}"),
    })?;
    println!("{rendered}");
    tracing::info!(
        scenario = %scenario.name,
        score = result.score,
        verdict = verdict.as_str(),
        "assessment finished"
    );
    Ok(verdict.exit_code())
}

/// Launch every role and keep it up until Ctrl-C
async fn cmd_serve(path: &Path, show_logs: bool, overrides: Overrides) -> SupervisorResult<u8> {
    let (scenario, mut orchestrator) = prepare(path, show_logs, overrides)?;

    for role in &scenario.roles {
        println!("{:<16} {}", role.name, role.endpoint);
    }
    let report = orchestrator.serve(&scenario, interrupted()).await;
    METRICS.flush();

    let report = report?;
    if report.is_clean() {
        Ok(0)
    } else {
        for error in &report.errors {
            eprintln!("teardown: {error}");
        }
        Ok(EXIT_ORCHESTRATION_FAILURE)
    }
}

/// Resolves on Ctrl-C or SIGTERM. Never resolves if no handler can be
/// installed.
async fn interrupted() {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("ctrl-c received"),
        () = terminate => tracing::info!("SIGTERM received"),
    }
}

/// Validate a scenario and print what it would launch
fn cmd_check(path: &Path) -> SupervisorResult<u8> {
    let scenario = Scenario::load(path)?;

    println!("Scenario:     {}", scenario.name);
    println!("Evaluator:    {}", scenario.assessment.evaluator);
    println!("Participants: {}", scenario.assessment.participants.join(", "));
    if let Some(threshold) = scenario.assessment.pass_threshold {
        println!("Threshold:    {threshold}");
    }
    println!();
    for role in &scenario.roles {
        println!("{:<16} {}{}", role.name, role.endpoint, role.health_check_path);
        println!("    {}", role.launch_command);
    }
    Ok(0)
}
