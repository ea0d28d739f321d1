use futures_util::future::join_all;
use hiscore_events::SCHEMA_READY;
use serde::Serialize;

use crate::client::TableClient;
use crate::transport::Transport;

pub const HIGHSCORES_TABLE: &str = "highscores";
pub const STATS_TABLE: &str = "stats";
pub const DEFAULT_TABLES: [&str; 2] = [HIGHSCORES_TABLE, STATS_TABLE];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Created,
    AlreadyExists,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableReady {
    pub table: String,
    pub status: TableStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableFailure {
    pub table: String,
    pub status: Option<u16>,
    pub detail: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub ready: Vec<TableReady>,
    pub failed: Vec<TableFailure>,
}

impl SchemaReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn status_of(&self, table: &str) -> Option<TableStatus> {
        self.ready
            .iter()
            .find(|entry| entry.table == table)
            .map(|entry| entry.status)
    }
}

pub fn default_tables() -> Vec<String> {
    DEFAULT_TABLES.iter().map(|t| t.to_string()).collect()
}

/// Ensures every table exists. Failures are logged and reported, never raised;
/// `schema.ready` is published once all tables were attempted. Callers go
/// through [`TableClient::ensure_schema`], which runs this at most once.
pub(crate) async fn bootstrap<T: Transport>(client: &TableClient<T>, tables: &[String]) -> SchemaReport {
    let attempts = tables.iter().map(|table| async move {
        (table.clone(), client.create_table_if_not_exists(table).await)
    });
    let mut report = SchemaReport::default();
    for (table, outcome) in join_all(attempts).await {
        match outcome {
            Ok(status) => {
                tracing::info!(table = %table, ?status, "table created or already exists");
                report.ready.push(TableReady { table, status });
            }
            Err(err) => {
                tracing::error!(table = %table, %err, "schema bootstrap failed for table");
                report.failed.push(TableFailure {
                    table,
                    status: err.status(),
                    detail: err.detail(),
                });
            }
        }
    }
    tracing::info!(
        ready = report.ready.len(),
        failed = report.failed.len(),
        "schema bootstrap finished"
    );
    client.bus().publish(SCHEMA_READY, &report);
    report
}
