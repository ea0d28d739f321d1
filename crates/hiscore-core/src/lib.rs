use std::sync::Arc;

use hiscore_events::Bus;

pub mod client;
pub mod codec;
mod config;
pub use config::{
    config_schema_json, default_config_path, load_config, load_effective_config,
    write_schema_file, Config, LeaderboardConfig, Secret, StorageConfig, DEFAULT_CONFIG_FILE,
};
pub mod endpoint;
pub mod error;
pub mod leaderboard;
pub mod schema;
pub mod signing;
pub mod transport;

mod test_support;

pub use client::{ClientOptions, Completion, EntityQuery, InsertAck, TableClient};
pub use codec::{Entity, QueryPage, TableEntity};
pub use endpoint::{
    ConnectionStringResolver, Credentials, EndpointResolver, EnvironmentResolver,
    StorageEnvironment,
};
pub use error::{ConfigError, StoreError};
pub use leaderboard::{HighScore, Leaderboard};
pub use schema::{SchemaReport, TableStatus};
pub use transport::{HttpTransport, Transport};

/// Builds an HTTP-backed client from storage settings. Pass a bus to share
/// completion events with other components. When `storage.bootstrap` is on
/// (the default) and a tokio runtime is running, the configured tables are
/// created on a background task; await [`TableClient::ensure_schema`] to wait
/// for it.
pub fn connect(
    storage: &StorageConfig,
    bus: Option<Bus>,
) -> Result<Arc<TableClient<HttpTransport>>, StoreError> {
    let bootstrap = storage.bootstrap_on_connect().then(|| storage.tables());
    connect_with(storage, bus, bootstrap)
}

/// Like [`connect`], with the bootstrap table set chosen by the caller
/// (`None` skips bootstrap).
pub fn connect_with(
    storage: &StorageConfig,
    bus: Option<Bus>,
    bootstrap: Option<Vec<String>>,
) -> Result<Arc<TableClient<HttpTransport>>, StoreError> {
    let resolver = storage.resolver();
    let transport =
        HttpTransport::new(storage.timeout()).map_err(|e| StoreError::Transport(e.0))?;
    let mut options = storage.client_options();
    options.bus = bus;
    let client = Arc::new(TableClient::with_options(
        resolver.as_ref(),
        Arc::new(transport),
        options,
    )?);
    if let Some(tables) = bootstrap {
        if tokio::runtime::Handle::try_current().is_ok() {
            drop(client.spawn_bootstrap(tables));
        } else {
            tracing::warn!("no tokio runtime; schema bootstrap skipped");
        }
    }
    Ok(client)
}
