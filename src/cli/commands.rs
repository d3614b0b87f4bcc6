//! CLI definition using clap.

use clap::Parser;
use std::path::PathBuf;

use revrun::config::CliOverrides;
use revrun::context::ContextStrategy;
use revrun::orchestrator::FailurePolicy;
use revrun::report::{ExitStatusPolicy, ReportFormat, ShowOutput};
use revrun::resolve::DEFAULT_END;

/// Revrun - run a command on every revision in a git range
#[derive(Parser, Debug)]
#[command(name = "revrun")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Example: revrun -s v1.0 -e main -- cargo test --quiet")]
pub struct Cli {
    /// First revision to visit (inclusive)
    #[arg(short, long)]
    pub start: String,

    /// Last revision to visit (inclusive)
    #[arg(short, long, default_value = DEFAULT_END)]
    pub end: String,

    /// Repository location (searched upward like git)
    #[arg(short, long, default_value = ".")]
    pub path: PathBuf,

    /// Only visit revisions that change this path
    #[arg(short, long)]
    pub filter: Option<PathBuf>,

    /// Stop after the first failing revision
    #[arg(long)]
    pub stop_on_failure: bool,

    /// Revisions to run concurrently
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// How revisions are checked out
    #[arg(long, value_enum)]
    pub strategy: Option<ContextStrategy>,

    /// Kill the command after this many seconds (0 = never)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Parent directory for temporary checkouts
    #[arg(long, value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Run the command through `sh -c`
    #[arg(long)]
    pub shell: bool,

    /// Report format
    #[arg(long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Which command output to include in the report
    #[arg(long, value_enum)]
    pub show_output: Option<ShowOutput>,

    /// How failures map to the exit status
    #[arg(long, value_enum)]
    pub exit_status: Option<ExitStatusPolicy>,

    /// Print a line per finished revision to stderr
    #[arg(long)]
    pub progress: bool,

    /// Optional config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to run, followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Flags that take precedence over the config file.
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            on_failure: self.stop_on_failure.then_some(FailurePolicy::StopImmediately),
            jobs: self.jobs,
            timeout_secs: self.timeout,
            strategy: self.strategy,
            scratch_dir: self.scratch_dir.clone(),
            shell: self.shell.then_some(true),
            format: self.format,
            show_output: self.show_output,
            exit_status: self.exit_status,
            progress: self.progress.then_some(true),
        }
    }
}
