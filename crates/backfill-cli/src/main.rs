mod cmd;
mod output;
mod reasoner;
mod root;
mod setup;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, run::RunArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "backfill",
    about = "Fill missing account ids and central account ids in a batch of records",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .backfill/ or .git/)
    #[arg(long, global = true, env = "BACKFILL_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config to .backfill/config.yaml
    Init,

    /// Emit the built-in sample records
    Sample {
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show the plan for each record without running any lookups
    Plan {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Plan, resolve and write the filled records
    Run {
        #[command(flatten)]
        args: RunArgs,

        /// Output file (default: output.path from config)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Also write the batch report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Inspect and validate configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Sample { out } => cmd::sample::run(&root, out.as_deref(), cli.json),
        Commands::Plan { args } => cmd::plan::run(&root, &args, cli.json),
        Commands::Run { args, out, report } => {
            cmd::run::run(&root, &args, out.as_deref(), report.as_deref(), cli.json)
        }
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
