use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "vigil", about = "Evaluate training conditions against simulation events")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a scenario file and list its conditions
    Check(commands::check::CheckArgs),
    /// Replay a recorded event log against a scenario
    Replay(commands::replay::ReplayArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Check(args) => commands::check::run(args),
        Commands::Replay(args) => commands::replay::run(args).await,
    }
}
