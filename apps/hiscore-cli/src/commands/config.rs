use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::json;

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Print (or write) the JSON schema for hiscore.toml
    Schema(SchemaArgs),
    /// Show which account and endpoint the effective configuration selects
    Show,
}

#[derive(Args)]
pub struct SchemaArgs {
    /// Write the schema to this file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn execute(path: Option<&Path>, cmd: ConfigCmd) -> Result<()> {
    match cmd {
        ConfigCmd::Schema(args) => match args.out {
            Some(out) => {
                hiscore_core::write_schema_file(&out)
                    .with_context(|| format!("write schema to {}", out.display()))?;
                println!("Wrote {}", out.display());
                Ok(())
            }
            None => {
                let schema = hiscore_core::config_schema_json();
                println!("{}", serde_json::to_string_pretty(&schema)?);
                Ok(())
            }
        },
        ConfigCmd::Show => show(path),
    }
}

fn show(path: Option<&Path>) -> Result<()> {
    let cfg = super::load(path)?;
    let resolver = cfg.storage.resolver();
    let credentials = resolver.resolve().context("resolve storage account")?;
    let summary = json!({
        "source": resolver.describe(),
        "account": credentials.account_name(),
        "endpoint": credentials.endpoint(),
        "path_style": credentials.is_path_style(),
        "api_version": cfg.storage.client_options().api_version,
        "timeout_secs": cfg.storage.timeout().as_secs(),
        "tables": cfg.storage.tables(),
        "leaderboard": {
            "table": cfg.leaderboard.table(),
            "partition": cfg.leaderboard.partition(),
            "top": cfg.leaderboard.top(),
        },
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
