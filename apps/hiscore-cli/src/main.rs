use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{ConfigCmd, DiagArgs, SubmitArgs, TablesCmd, TopArgs};

#[derive(Parser)]
#[command(name = "hiscore-cli", version, about = "High-score table storage utilities")]
struct Cli {
    /// Config file (default: $HISCORE_CONFIG, then ./hiscore.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Table helpers
    Tables {
        #[command(subcommand)]
        cmd: TablesCmd,
    },
    /// Submit a score to the leaderboard
    Submit(SubmitArgs),
    /// Print the top scores
    Top(TopArgs),
    /// Check that the configured account answers a signed query
    Diag(DiagArgs),
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
}

#[tokio::main]
async fn main() {
    hiscore_otel::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let path = cli.config.as_deref();
    match cli.command {
        Commands::Config { cmd } => commands::config::execute(path, cmd),
        Commands::Tables { cmd } => commands::tables::execute(&commands::load(path)?, cmd).await,
        Commands::Submit(args) => commands::scores::submit(&commands::load(path)?, args).await,
        Commands::Top(args) => commands::scores::top(&commands::load(path)?, args).await,
        Commands::Diag(args) => commands::diag::execute(&commands::load(path)?, args).await,
    }
}
