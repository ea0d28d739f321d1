use anyhow::{ensure, Context, Result};
use clap::{Args, Subcommand};
use hiscore_core::{Config, SchemaReport};

#[derive(Subcommand)]
pub enum TablesCmd {
    /// Create the configured tables (existing tables are left alone)
    Init(InitArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Table to create; repeat for several. Defaults to `storage.tables`.
    #[arg(long = "table")]
    pub tables: Vec<String>,
    /// Emit the bootstrap report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(cfg: &Config, cmd: TablesCmd) -> Result<()> {
    match cmd {
        TablesCmd::Init(args) => init(cfg, args).await,
    }
}

async fn init(cfg: &Config, args: InitArgs) -> Result<()> {
    let client = hiscore_core::connect_with(&cfg.storage, None, None)?;
    let tables = if args.tables.is_empty() {
        cfg.storage.tables()
    } else {
        args.tables
    };
    let report = client
        .spawn_bootstrap(tables)
        .await
        .context("schema bootstrap task")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in render_report(&report) {
            println!("{line}");
        }
    }
    ensure!(
        report.is_complete(),
        "{} table(s) could not be created",
        report.failed.len()
    );
    Ok(())
}

fn render_report(report: &SchemaReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .ready
        .iter()
        .map(|entry| format!("{:<24} {:?}", entry.table, entry.status))
        .collect();
    for failure in &report.failed {
        let status = failure
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".into());
        lines.push(format!(
            "{:<24} failed ({status}): {}",
            failure.table, failure.detail
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiscore_core::schema::{TableFailure, TableReady};
    use hiscore_core::TableStatus;

    #[test]
    fn report_lines_cover_ready_and_failed_tables() {
        let report = SchemaReport {
            ready: vec![TableReady {
                table: "highscores".into(),
                status: TableStatus::AlreadyExists,
            }],
            failed: vec![TableFailure {
                table: "stats".into(),
                status: None,
                detail: "connection refused".into(),
            }],
        };
        let lines = render_report(&report);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("highscores") && lines[0].ends_with("AlreadyExists"));
        assert!(lines[1].contains("failed (-): connection refused"));
    }
}
