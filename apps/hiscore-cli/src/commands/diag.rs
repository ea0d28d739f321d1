use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::Args;
use hiscore_core::{Config, EntityQuery, StoreError};
use hiscore_events::{Bus, REQUEST_FAILED};

#[derive(Args)]
pub struct DiagArgs {
    /// Give up after this many milliseconds
    #[arg(long, default_value_t = 5000)]
    pub timeout_ms: u64,
    /// Table to query (default: leaderboard.table)
    #[arg(long)]
    pub table: Option<String>,
}

/// Issues one signed `$top=1` query and reports how the account answered.
pub async fn execute(cfg: &Config, args: DiagArgs) -> Result<()> {
    let bus = Bus::default();
    let mut events = bus.subscribe();
    let client = hiscore_core::connect_with(&cfg.storage, Some(bus), None)?;
    let table = args
        .table
        .unwrap_or_else(|| cfg.leaderboard.table().to_string());
    let credentials = client.credentials();
    println!(
        "Probing {} (account {}, api {})",
        credentials.endpoint(),
        credentials.account_name(),
        client.api_version()
    );

    let started = Instant::now();
    let query = EntityQuery::new().top(1);
    let check = client.query_entities(&table, &query);
    let outcome = tokio::time::timeout(Duration::from_millis(args.timeout_ms), check).await;
    let elapsed = started.elapsed().as_millis();

    match outcome {
        Err(_) => Err(anyhow!(
            "no response from {} within {} ms",
            credentials.endpoint(),
            args.timeout_ms
        )),
        Ok(Ok(page)) => {
            println!(
                "OK: {table} answered in {elapsed} ms ({} row(s))",
                page.len()
            );
            Ok(())
        }
        Ok(Err(err)) => {
            while let Ok(event) = events.try_recv() {
                if event.is(REQUEST_FAILED) {
                    tracing::debug!(time = %event.time, payload = %event.payload, "diagnostic query failed");
                }
            }
            Err(anyhow!(explain(&err)))
        }
    }
}

fn explain(err: &StoreError) -> String {
    match err.status() {
        Some(403) => format!("signature rejected (403): {}", err.detail()),
        Some(404) => format!("table not found (404); run `tables init` first: {}", err.detail()),
        Some(status) => format!("request rejected ({status}): {}", err.detail()),
        None => format!("request did not reach the service: {err}"),
    }
}
