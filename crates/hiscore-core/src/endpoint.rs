use std::collections::HashMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::signing::SigningKey;

/// Connection string selecting the local storage emulator.
pub const DEVELOPMENT_SENTINEL: &str = "UseDevelopmentStorage=true";
pub const DEV_ENDPOINT: &str = "http://127.0.0.1:10002";
pub const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
/// Publicly documented emulator key. Never valid against production storage.
pub const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
pub const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StorageEnvironment {
    #[default]
    Development,
    Production,
}

impl StorageEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageEnvironment::Development => "development",
            StorageEnvironment::Production => "production",
        }
    }

    pub fn from_slug(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "emulator" | "azurite" => Some(StorageEnvironment::Development),
            "production" | "prod" => Some(StorageEnvironment::Production),
            _ => None,
        }
    }
}

/// Resolved account triple. Immutable for the lifetime of a client.
#[derive(Clone)]
pub struct Credentials {
    account_name: String,
    key: SigningKey,
    endpoint: String,
    base_url: Url,
    base_path: String,
    path_style: bool,
}

impl Credentials {
    pub fn new(account_name: &str, account_key: &str, endpoint: &str) -> Result<Self, ConfigError> {
        Self::build(account_name, account_key, endpoint, false)
    }

    /// Local emulator credentials; request URLs carry the account as the first path segment.
    pub fn development() -> Result<Self, ConfigError> {
        Self::build(DEV_ACCOUNT_NAME, DEV_ACCOUNT_KEY, DEV_ENDPOINT, true)
    }

    fn build(
        account_name: &str,
        account_key: &str,
        endpoint: &str,
        path_style: bool,
    ) -> Result<Self, ConfigError> {
        let account_name = account_name.trim();
        if account_name.is_empty() {
            return Err(ConfigError::Missing("account name"));
        }
        let key = SigningKey::from_base64(account_key)?;
        let endpoint = endpoint.trim().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(ConfigError::Missing("table endpoint"));
        }
        let base = if path_style {
            format!("{endpoint}/{account_name}")
        } else {
            endpoint.clone()
        };
        let base_url = Url::parse(&base).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint {
                endpoint,
                reason: format!("unsupported scheme {}", base_url.scheme()),
            });
        }
        let base_path = base_url.path().trim_end_matches('/').to_string();
        Ok(Self {
            account_name: account_name.to_string(),
            key,
            endpoint,
            base_url,
            base_path,
            path_style,
        })
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_path_style(&self) -> bool {
        self.path_style
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    /// Builds the request URL for `resource` and returns it with the encoded
    /// path-and-query relative to the endpoint (the part that gets signed).
    pub fn locate(&self, resource: &str) -> Result<(Url, String), url::ParseError> {
        let mut raw = self.base_url.as_str().trim_end_matches('/').to_string();
        raw.push_str(resource);
        let url = Url::parse(&raw)?;
        let path = url.path();
        let relative = path.strip_prefix(self.base_path.as_str()).unwrap_or(path);
        let mut signed = if relative.starts_with('/') {
            relative.to_string()
        } else {
            format!("/{relative}")
        };
        if let Some(query) = url.query() {
            signed.push('?');
            signed.push_str(query);
        }
        Ok((url, signed))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_name", &self.account_name)
            .field("key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("path_style", &self.path_style)
            .finish()
    }
}

/// Strategy deciding which account a client talks to. Resolved once, at construction.
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self) -> Result<Credentials, ConfigError>;

    /// Short label for logs.
    fn describe(&self) -> &'static str;
}

/// `Key=Value;...` descriptor, or the development sentinel.
#[derive(Clone)]
pub struct ConnectionStringResolver {
    connection_string: String,
}

impl ConnectionStringResolver {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }

    pub fn development() -> Self {
        Self::new(DEVELOPMENT_SENTINEL)
    }

    fn is_development(&self) -> bool {
        self.connection_string
            .trim()
            .trim_end_matches(';')
            .eq_ignore_ascii_case(DEVELOPMENT_SENTINEL)
    }
}

impl EndpointResolver for ConnectionStringResolver {
    fn resolve(&self) -> Result<Credentials, ConfigError> {
        if self.is_development() {
            return Credentials::development();
        }
        parse_connection_string(&self.connection_string)
    }

    fn describe(&self) -> &'static str {
        if self.is_development() {
            "development"
        } else {
            "connection-string"
        }
    }
}

/// Keys are case-insensitive; values may themselves contain `=` (base64 padding).
pub fn parse_connection_string(connection_string: &str) -> Result<Credentials, ConfigError> {
    let parts: HashMap<String, String> = connection_string
        .split(';')
        .filter_map(|part| part.split_once('='))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    let get = |key: &str| parts.get(key).map(String::as_str).filter(|v| !v.is_empty());

    if get("usedevelopmentstorage").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        return Credentials::development();
    }

    let account_name = get("accountname").ok_or(ConfigError::Missing("account name"))?;
    let account_key = get("accountkey").ok_or(ConfigError::Missing("account key"))?;
    let endpoint = match get("tableendpoint") {
        Some(explicit) => explicit.trim_end_matches('/').to_string(),
        None => {
            let protocol = get("defaultendpointsprotocol").unwrap_or("https");
            let suffix = get("endpointsuffix").unwrap_or(DEFAULT_ENDPOINT_SUFFIX);
            format!("{protocol}://{account_name}.table.{suffix}")
        }
    };
    Credentials::new(account_name, account_key, &endpoint)
}

#[derive(Clone, Default)]
pub struct AccountSettings {
    pub name: String,
    pub key: String,
    pub endpoint: Option<String>,
}

impl fmt::Debug for AccountSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSettings")
            .field("name", &self.name)
            .field("key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Explicit development/production toggle.
#[derive(Clone, Debug)]
pub struct EnvironmentResolver {
    environment: StorageEnvironment,
    account: AccountSettings,
}

impl EnvironmentResolver {
    pub fn development() -> Self {
        Self {
            environment: StorageEnvironment::Development,
            account: AccountSettings::default(),
        }
    }

    pub fn production(account: AccountSettings) -> Self {
        Self {
            environment: StorageEnvironment::Production,
            account,
        }
    }

    pub fn environment(&self) -> StorageEnvironment {
        self.environment
    }
}

impl EndpointResolver for EnvironmentResolver {
    fn resolve(&self) -> Result<Credentials, ConfigError> {
        match self.environment {
            StorageEnvironment::Development => Credentials::development(),
            StorageEnvironment::Production => {
                let name = self.account.name.trim();
                let endpoint = match self.account.endpoint.as_deref().map(str::trim) {
                    Some(explicit) if !explicit.is_empty() => explicit.to_string(),
                    _ => format!("https://{name}.table.{DEFAULT_ENDPOINT_SUFFIX}"),
                };
                Credentials::new(name, &self.account.key, &endpoint)
            }
        }
    }

    fn describe(&self) -> &'static str {
        self.environment.as_str()
    }
}
