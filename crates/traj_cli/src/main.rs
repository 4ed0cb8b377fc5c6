use std::path::PathBuf;
use std::process::exit;

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use traj_store::ExportFormat;

mod commands;

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "trajectory",
    about = "Parameter sweeps persisted to a single resumable store file",
    long_about = "Runs explored parameter trees against a JSON-lines store,\n\
                  resumes interrupted sweeps, and inspects, merges, exports\n\
                  and compacts store files."
)]
struct Cli {
    /// Log level for diagnostics on stderr
    #[arg(long, global = true, env = "TRAJECTORY_LOG", default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the x*y demo sweep; re-running resumes where it stopped
    Demo(DemoArgs),
    /// Print the structure and run ledger of a store
    Inspect(InspectArgs),
    /// Merge two stores over the same parameter space into a new one
    Merge {
        first: PathBuf,
        second: PathBuf,
        /// Output store; must not exist yet
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Export completed runs as a table
    Export {
        store: PathBuf,
        output: PathBuf,
        /// Output format; defaults to the output file extension
        #[arg(value_enum, long)]
        format: Option<FormatArg>,
    },
    /// Rewrite a store keeping only live records
    Compact { store: PathBuf },
}

#[derive(Args)]
pub(crate) struct DemoArgs {
    /// Store file to create or resume
    #[arg(long, env = "TRAJECTORY_STORE", default_value = "demo.jsonl")]
    pub store: PathBuf,
    /// Runner configuration file (JSON)
    #[arg(long, env = "TRAJECTORY_RUNNER_CONFIG")]
    pub config: Option<PathBuf>,
    /// Run on a pool of this many workers (0 = one per core)
    #[arg(long)]
    pub workers: Option<usize>,
    /// Candidate values of x
    #[arg(long, value_delimiter = ',', default_value = "1,2,3,4")]
    pub xs: Vec<i64>,
    /// Candidate values of y
    #[arg(long, value_delimiter = ',', default_value = "6,7,8")]
    pub ys: Vec<i64>,
    /// Simulated work per run, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub delay_ms: u64,
    /// Stop dispatching after this many runs complete
    #[arg(long)]
    pub stop_after: Option<usize>,
    /// Make this run fail
    #[arg(long)]
    pub fail_run: Option<usize>,
    /// Export completed runs here afterwards
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Args)]
pub(crate) struct InspectArgs {
    pub store: PathBuf,
    /// Print every completed run with its bindings and results
    #[arg(long)]
    pub runs: bool,
    /// Load and print one node (shorthand paths work)
    #[arg(long)]
    pub get: Option<String>,
    /// Result item to print with --get; defaults to every item
    #[arg(long, requires = "get")]
    pub item: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Parquet,
    Csv,
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Parquet => Self::Parquet,
            FormatArg::Csv => Self::Csv,
            FormatArg::Json => Self::Json,
        }
    }
}

// ── entry point ────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    let config = ConfigBuilder::new()
        .add_filter_allow_str("traj_")
        .build();
    if let Err(error) = TermLogger::init(cli.log_level, config, TerminalMode::Stderr, ColorChoice::Auto) {
        eprintln!("warning: logger not installed: {error}");
    }

    let outcome = match cli.command {
        Commands::Demo(args) => commands::demo(&args),
        Commands::Inspect(args) => commands::inspect(&args),
        Commands::Merge { first, second, out } => commands::merge(&first, &second, &out),
        Commands::Export {
            store,
            output,
            format,
        } => commands::export(&store, &output, format.map(ExportFormat::from)),
        Commands::Compact { store } => commands::compact(&store),
    };

    if let Err(error) = outcome {
        eprintln!("error: {error}");
        exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_defaults() {
        let cli = Cli::try_parse_from(["trajectory", "demo"]).expect("parse");
        let Commands::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        assert_eq!(args.xs, vec![1, 2, 3, 4]);
        assert_eq!(args.ys, vec![6, 7, 8]);
        assert!(args.workers.is_none());
    }

    #[test]
    fn test_export_format_flag() {
        let cli = Cli::try_parse_from([
            "trajectory",
            "--log-level",
            "warn",
            "export",
            "sweep.jsonl",
            "out.dat",
            "--format",
            "csv",
        ])
        .expect("parse");
        assert_eq!(cli.log_level, LevelFilter::Warn);
        assert!(matches!(
            cli.command,
            Commands::Export {
                format: Some(FormatArg::Csv),
                ..
            }
        ));
    }

    #[test]
    fn test_item_requires_get() {
        assert!(Cli::try_parse_from(["trajectory", "inspect", "s.jsonl", "--item", "z"]).is_err());
    }
}
