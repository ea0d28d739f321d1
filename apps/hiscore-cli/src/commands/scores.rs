use anyhow::Result;
use clap::Args;
use hiscore_core::{Config, HighScore, HttpTransport, Leaderboard};

#[derive(Args)]
pub struct SubmitArgs {
    /// Player name (must not be blank)
    #[arg(long)]
    pub player: String,
    /// Score value
    #[arg(long)]
    pub score: i64,
    /// Partition override (default: leaderboard.partition)
    #[arg(long)]
    pub partition: Option<String>,
}

#[derive(Args)]
pub struct TopArgs {
    /// Number of scores to show (default: leaderboard.top)
    #[arg(long)]
    pub limit: Option<u32>,
    /// Partition override (default: leaderboard.partition)
    #[arg(long)]
    pub partition: Option<String>,
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

async fn leaderboard(
    cfg: &Config,
    partition: Option<String>,
) -> Result<Leaderboard<HttpTransport>> {
    let client = hiscore_core::connect(&cfg.storage, None)?;
    if cfg.storage.bootstrap_on_connect() {
        let report = client.ensure_schema(&cfg.storage.tables()).await;
        if !report.is_complete() {
            tracing::warn!(failed = report.failed.len(), "schema bootstrap incomplete");
        }
    }
    Ok(Leaderboard::new(client)
        .with_table(cfg.leaderboard.table())
        .with_partition(partition.unwrap_or_else(|| cfg.leaderboard.partition().to_string())))
}

pub async fn submit(cfg: &Config, args: SubmitArgs) -> Result<()> {
    let board = leaderboard(cfg, args.partition).await?;
    let saved = board.submit(&args.player, args.score).await?;
    println!(
        "Submitted {} ({}) to {}/{} as {}",
        saved.player_name,
        saved.score,
        board.table(),
        board.partition(),
        saved.row_key
    );
    Ok(())
}

pub async fn top(cfg: &Config, args: TopArgs) -> Result<()> {
    let board = leaderboard(cfg, args.partition).await?;
    let limit = args.limit.unwrap_or_else(|| cfg.leaderboard.top());
    let page = board.top(limit).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&page.entities)?);
    } else if page.is_empty() {
        println!("No scores in {}/{}", board.table(), board.partition());
    } else {
        for line in render_rows(&page.entities) {
            println!("{line}");
        }
    }
    if page.skipped > 0 {
        eprintln!("{} malformed row(s) skipped", page.skipped);
    }
    Ok(())
}

fn render_rows(scores: &[HighScore]) -> Vec<String> {
    let width = scores
        .iter()
        .map(|s| s.player_name.chars().count())
        .max()
        .unwrap_or(0);
    scores
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{:>3}. {:<width$}  {:>10}", i + 1, s.player_name, s.score))
        .collect()
}
