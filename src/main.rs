use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

mod cli;

use cli::Cli;
use revrun::Session;
use revrun::config::{RunSettings, load_config};
use revrun::report::{ReportFormat, format_json, format_text};
use revrun::resolve::{PathFilter, RevisionRange};
use revrun::runner::CommandSpec;

/// Exit status when the run could not start or was aborted by an error.
const FATAL_EXIT_CODE: i32 = 2;

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("revrun")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("revrun.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let level = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Resolves once the user asks the run to stop.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn run_application(cli: &Cli) -> Result<i32> {
    let config = load_config(cli.config.as_ref()).context("Failed to load configuration")?;
    let settings = RunSettings::resolve(&config, &cli.overrides());
    info!("Settings: {:?}", settings);

    let filter = match &cli.filter {
        Some(path) => PathFilter::new(path).context("Invalid --filter")?,
        None => None,
    };
    let range = RevisionRange::new(&cli.start, &cli.end).with_path_filter(filter);
    let session = Session::new(&cli.path, range, CommandSpec::new(cli.command.iter().cloned()))
        .with_settings(settings.clone());

    if cli.is_verbose() {
        eprintln!(
            "{} {}..{} in {}",
            "Running on".cyan(),
            cli.start,
            cli.end,
            cli.path.display()
        );
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let report = runtime
        .block_on(session.run_until(shutdown_signal()))
        .context("Run failed")?;
    // Waits for any release still running on the blocking pool.
    drop(runtime);

    match settings.format {
        ReportFormat::Text => print!("{}", format_text(&report, &settings.text_options())),
        ReportFormat::Json => println!("{}", format_json(&report).context("Failed to serialize report")?),
    }

    Ok(report.exit_code(settings.exit_status))
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(cli.is_verbose()) {
        eprintln!("{} {:#}", "warning:".yellow(), e);
    }

    if !io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let code = match run_application(&cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("{} {:#}", "error:".red().bold(), e);
            FATAL_EXIT_CODE
        }
    };
    std::process::exit(code);
}
