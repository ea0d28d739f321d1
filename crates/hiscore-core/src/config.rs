use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::client::{ClientOptions, DEFAULT_API_VERSION};
use crate::endpoint::{
    AccountSettings, ConnectionStringResolver, EndpointResolver, EnvironmentResolver,
    StorageEnvironment,
};
use crate::error::ConfigError;
use crate::leaderboard::{DEFAULT_PARTITION, DEFAULT_TOP};
use crate::schema::{default_tables, HIGHSCORES_TABLE};
use crate::transport::DEFAULT_TIMEOUT_SECS;

pub const DEFAULT_CONFIG_FILE: &str = "hiscore.toml";

/// Secret string; serialises as-is but never shows up in `Debug` output.
#[derive(Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"<redacted>\"")
    }
}

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// `Key=Value;...` connection string, or `UseDevelopmentStorage=true`.
    #[serde(default)]
    pub connection_string: Option<Secret>,
    /// Endpoint toggle used when no connection string is set.
    #[serde(default)]
    pub environment: Option<StorageEnvironment>,
    #[serde(default)]
    pub account_name: Option<String>,
    /// Base64 account key. Prefer `HISCORE_ACCOUNT_KEY` over storing it in the file.
    #[serde(default)]
    pub account_key: Option<Secret>,
    /// Table endpoint override, e.g. <https://acct.table.core.windows.net>
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    /// Tables created at startup (default: highscores, stats).
    #[serde(default)]
    pub tables: Option<Vec<String>>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Create `tables` in the background as soon as a client connects (default: true).
    #[serde(default)]
    pub bootstrap: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct LeaderboardConfig {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub top: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub leaderboard: LeaderboardConfig,
}

/// Returns the JSON schema describing the configuration structure.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(Config);
    serde_json::to_value(&schema).unwrap_or_default()
}

static CONFIG_VALIDATOR: Lazy<Result<Validator, String>> =
    Lazy::new(|| validator_for(&config_schema_json()).map_err(|e| e.to_string()));

pub fn write_schema_file(path: &Path) -> std::io::Result<()> {
    let schema_json = config_schema_json();
    std::fs::write(path, serde_json::to_string_pretty(&schema_json)?)
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: toml::Value =
            toml::from_str(content).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let json_value =
            serde_json::to_value(&raw).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let validator = CONFIG_VALIDATOR
            .as_ref()
            .map_err(|e| ConfigError::Invalid(format!("schema: {e}")))?;
        let validation_errors: Vec<String> = validator
            .iter_errors(&json_value)
            .map(|e| e.to_string())
            .collect();
        if !validation_errors.is_empty() {
            return Err(ConfigError::Invalid(validation_errors.join(", ")));
        }
        toml::from_str(content).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Applies `HISCORE_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let storage = &mut self.storage;
        if let Some(cs) = env_value("HISCORE_CONNECTION_STRING") {
            storage.connection_string = Some(Secret::new(cs));
        }
        if let Some(name) = env_value("HISCORE_ACCOUNT_NAME") {
            storage.account_name = Some(name);
        }
        if let Some(key) = env_value("HISCORE_ACCOUNT_KEY") {
            storage.account_key = Some(Secret::new(key));
        }
        if let Some(raw) = env_value("HISCORE_ENVIRONMENT") {
            let env = StorageEnvironment::from_slug(&raw).ok_or_else(|| {
                ConfigError::Invalid(format!("HISCORE_ENVIRONMENT: unknown environment {raw}"))
            })?;
            storage.environment = Some(env);
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl StorageConfig {
    /// Connection string wins; otherwise the explicit toggle. With neither an
    /// environment nor an account configured, the local emulator is used.
    pub fn resolver(&self) -> Box<dyn EndpointResolver> {
        if let Some(cs) = self
            .connection_string
            .as_ref()
            .filter(|cs| !cs.expose().trim().is_empty())
        {
            return Box::new(ConnectionStringResolver::new(cs.expose()));
        }
        let environment = self.environment.unwrap_or(if self.account_name.is_some() {
            StorageEnvironment::Production
        } else {
            StorageEnvironment::Development
        });
        match environment {
            StorageEnvironment::Development => Box::new(EnvironmentResolver::development()),
            StorageEnvironment::Production => {
                Box::new(EnvironmentResolver::production(AccountSettings {
                    name: self.account_name.clone().unwrap_or_default(),
                    key: self
                        .account_key
                        .as_ref()
                        .map(|k| k.expose().to_string())
                        .unwrap_or_default(),
                    endpoint: self.endpoint.clone(),
                }))
            }
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            api_version: self
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            bus: None,
        }
    }

    pub fn tables(&self) -> Vec<String> {
        match &self.tables {
            Some(tables) if !tables.is_empty() => tables.clone(),
            _ => default_tables(),
        }
    }

    pub fn bootstrap_on_connect(&self) -> bool {
        self.bootstrap.unwrap_or(true)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1))
    }
}

impl LeaderboardConfig {
    pub fn table(&self) -> &str {
        self.table.as_deref().unwrap_or(HIGHSCORES_TABLE)
    }

    pub fn partition(&self) -> &str {
        self.partition.as_deref().unwrap_or(DEFAULT_PARTITION)
    }

    pub fn top(&self) -> u32 {
        self.top.unwrap_or(DEFAULT_TOP)
    }
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Config::from_toml_str(&content).map_err(|e| ConfigError::File {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// `HISCORE_CONFIG` when set, otherwise `hiscore.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    env_value("HISCORE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Loads `path` (or the default path) if it exists, then applies env overrides.
/// A missing default file is not an error; a missing explicit file is.
pub fn load_effective_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut cfg = match path {
        Some(explicit) => load_config(explicit)?,
        None => {
            let candidate = default_config_path();
            if candidate.exists() {
                load_config(&candidate)?
            } else {
                Config::default()
            }
        }
    };
    cfg.apply_env_overrides()?;
    Ok(cfg)
}
