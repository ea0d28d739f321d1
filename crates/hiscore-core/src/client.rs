use std::sync::Arc;

use chrono::{DateTime, Utc};
use hiscore_events::{Bus, Envelope, REQUEST_FAILED, REQUEST_SUCCEEDED};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, OnceCell};
use tokio::task::JoinHandle;

use crate::codec::{self, Entity, QueryPage, TableEntity};
use crate::endpoint::{Credentials, EndpointResolver};
use crate::error::{ConfigError, StoreError};
use crate::schema::{self, SchemaReport, TableStatus};
use crate::signing::{self, StringToSign, Verb};
use crate::transport::{SignedRequest, Transport, TransportError, TransportResponse};

pub const DEFAULT_API_VERSION: &str = "2019-07-07";
const TABLES_RESOURCE: &str = "/Tables";
const HTTP_CONFLICT: u16 = 409;

#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub api_version: String,
    pub bus: Option<Bus>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            bus: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateTable,
    Insert,
    Query,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateTable => "create_table",
            Operation::Insert => "insert",
            Operation::Query => "query",
        }
    }
}

/// Terminal outcome of one request. Exactly one is produced per request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    Succeeded {
        status: u16,
        etag: Option<String>,
        body: String,
    },
    /// `status` is `None` when the request never reached the service.
    Failed { status: Option<u16>, body: String },
}

impl Completion {
    pub fn classify(
        operation: Operation,
        outcome: Result<TransportResponse, TransportError>,
    ) -> Self {
        match outcome {
            Ok(resp)
                if resp.is_success()
                    || (operation == Operation::CreateTable && resp.status == HTTP_CONFLICT) =>
            {
                Completion::Succeeded {
                    status: resp.status,
                    etag: resp.header("etag").map(str::to_string),
                    body: resp.body,
                }
            }
            Ok(resp) => Completion::Failed {
                status: Some(resp.status),
                body: resp.body,
            },
            Err(err) => Completion::Failed {
                status: None,
                body: err.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Completion::Succeeded { .. })
    }

    pub fn into_result(self) -> Result<Delivered, StoreError> {
        match self {
            Completion::Succeeded { status, etag, body } => Ok(Delivered { status, etag, body }),
            Completion::Failed {
                status: Some(status),
                body,
            } => Err(StoreError::Rejected { status, body }),
            Completion::Failed { status: None, body } => Err(StoreError::Transport(body)),
        }
    }
}

/// Successful raw response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivered {
    pub status: u16,
    pub etag: Option<String>,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InsertAck {
    pub status: u16,
    pub body: String,
    /// Echoed entity, when the service returned one.
    pub entity: Option<Entity>,
}

/// OData query options. Unset parts are omitted from the query string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntityQuery {
    pub filter: Option<String>,
    pub top: Option<u32>,
    pub order_by: Option<String>,
}

impl EntityQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    /// `PartitionKey eq '<value>'` with embedded quotes doubled.
    pub fn partition_eq(partition_key: &str) -> String {
        format!("PartitionKey eq '{}'", partition_key.replace('\'', "''"))
    }

    pub fn to_query_string(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(filter) = self.filter.as_deref().filter(|f| !f.trim().is_empty()) {
            parts.push(format!("$filter={}", escape_option(filter)));
        }
        if let Some(top) = self.top.filter(|t| *t > 0) {
            parts.push(format!("$top={top}"));
        }
        if let Some(order) = self.order_by.as_deref().filter(|o| !o.trim().is_empty()) {
            parts.push(format!("$orderby={}", escape_option(order)));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("&"))
        }
    }

    pub fn resource(&self, table: &str) -> String {
        match self.to_query_string() {
            Some(query) => format!("/{table}()?{query}"),
            None => format!("/{table}()"),
        }
    }
}

// Spaces and quotes are left to URL parsing so the signed path matches the request line.
fn escape_option(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('&', "%26")
        .replace('#', "%23")
        .replace('+', "%2B")
}

/// Table names: 3-63 ASCII alphanumerics starting with a letter.
pub fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let ok = (3..=63).contains(&table.len())
        && table.chars().all(|c| c.is_ascii_alphanumeric())
        && table.starts_with(|c: char| c.is_ascii_alphabetic());
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}

/// SharedKey table client. Credentials are resolved once; every request is
/// signed at send time and produces exactly one [`Completion`].
pub struct TableClient<T: Transport> {
    credentials: Credentials,
    transport: Arc<T>,
    api_version: String,
    bus: Bus,
    schema: OnceCell<SchemaReport>,
}

impl<T: Transport> TableClient<T> {
    pub fn new(resolver: &dyn EndpointResolver, transport: Arc<T>) -> Result<Self, ConfigError> {
        Self::with_options(resolver, transport, ClientOptions::default())
    }

    pub fn with_options(
        resolver: &dyn EndpointResolver,
        transport: Arc<T>,
        options: ClientOptions,
    ) -> Result<Self, ConfigError> {
        let credentials = resolver.resolve()?;
        let api_version = options.api_version.trim().to_string();
        if api_version.is_empty() {
            return Err(ConfigError::Missing("api version"));
        }
        tracing::info!(
            source = resolver.describe(),
            account = credentials.account_name(),
            endpoint = credentials.endpoint(),
            "table storage client ready"
        );
        Ok(Self {
            credentials,
            transport,
            api_version,
            bus: options.bus.unwrap_or_default(),
            schema: OnceCell::new(),
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.bus.subscribe()
    }

    /// Idempotent: a 409 for an existing table is reported as `AlreadyExists`.
    pub async fn create_table_if_not_exists(&self, table: &str) -> Result<TableStatus, StoreError> {
        validate_table_name(table)?;
        let body = json!({ "TableName": table }).to_string();
        tracing::info!(table, "creating table");
        let delivered = self
            .execute(Operation::CreateTable, table, Verb::Post, TABLES_RESOURCE, Some(body))
            .await?;
        if delivered.status == HTTP_CONFLICT {
            Ok(TableStatus::AlreadyExists)
        } else {
            Ok(TableStatus::Created)
        }
    }

    pub async fn insert_entity(&self, table: &str, entity: &Entity) -> Result<InsertAck, StoreError> {
        validate_table_name(table)?;
        entity.validate_keys()?;
        let body = codec::encode_body(entity);
        let resource = format!("/{table}");
        tracing::info!(table, row_key = %entity.row_key, "inserting entity");
        let delivered = self
            .execute(Operation::Insert, table, Verb::Post, &resource, Some(body))
            .await?;
        // The insert already succeeded; an undecodable echo only loses the entity copy.
        let mut echoed = codec::decode_single(&delivered.body).unwrap_or_else(|err| {
            tracing::warn!(table, %err, "insert acknowledgment not decodable");
            None
        });
        if let Some(entity) = echoed.as_mut() {
            if entity.etag.is_none() {
                entity.etag = delivered.etag.clone();
            }
        }
        Ok(InsertAck {
            status: delivered.status,
            body: delivered.body,
            entity: echoed,
        })
    }

    /// Server ordering is best-effort; callers that need a ranking re-sort.
    pub async fn query_entities(
        &self,
        table: &str,
        query: &EntityQuery,
    ) -> Result<QueryPage<Entity>, StoreError> {
        let body = self.query_raw(table, query).await?;
        codec::decode_query(&body)
    }

    pub async fn query_as<E: TableEntity>(
        &self,
        table: &str,
        query: &EntityQuery,
    ) -> Result<QueryPage<E>, StoreError> {
        let body = self.query_raw(table, query).await?;
        codec::decode_query_as(&body)
    }

    /// Runs schema bootstrap at most once per client. Later (or concurrent)
    /// callers get the first report; the first caller's table set wins and
    /// `schema.ready` is published only by that run.
    pub async fn ensure_schema(&self, tables: &[String]) -> SchemaReport {
        self.schema
            .get_or_init(|| schema::bootstrap(self, tables))
            .await
            .clone()
    }

    /// Report of the bootstrap run, once it has finished.
    pub fn schema_report(&self) -> Option<&SchemaReport> {
        self.schema.get()
    }

    async fn query_raw(&self, table: &str, query: &EntityQuery) -> Result<String, StoreError> {
        validate_table_name(table)?;
        let resource = query.resource(table);
        tracing::info!(table, resource = %resource, "querying entities");
        let delivered = self
            .execute(Operation::Query, table, Verb::Get, &resource, None)
            .await?;
        Ok(delivered.body)
    }

    async fn execute(
        &self,
        operation: Operation,
        table: &str,
        verb: Verb,
        resource: &str,
        body: Option<String>,
    ) -> Result<Delivered, StoreError> {
        let completion = match self.sign_at(verb, resource, body, Utc::now()) {
            Ok(request) => {
                let outcome = self.transport.send(request).await;
                Completion::classify(operation, outcome)
            }
            Err(err) => Completion::Failed {
                status: None,
                body: err.to_string(),
            },
        };
        self.dispatch(operation, table, &completion);
        completion.into_result()
    }

    /// Signs `resource` (path-and-query relative to the endpoint) as of `at`.
    /// The same date string goes into the signature and the `x-ms-date` header.
    pub fn sign_at(
        &self,
        verb: Verb,
        resource: &str,
        body: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<SignedRequest, TransportError> {
        let (url, signed_path) = self
            .credentials
            .locate(resource)
            .map_err(|e| TransportError(format!("invalid request url: {e}")))?;
        let account = self.credentials.account_name();
        let canonical_resource = signing::canonical_resource(account, &signed_path);
        let date = signing::rfc1123(at);
        let authorization = self.credentials.signing_key().authorization(
            account,
            &StringToSign {
                verb,
                date: &date,
                api_version: &self.api_version,
                canonical_resource: &canonical_resource,
            },
        );
        Ok(SignedRequest {
            verb,
            url,
            canonical_resource,
            date,
            api_version: self.api_version.clone(),
            authorization,
            body,
        })
    }

    fn dispatch(&self, operation: Operation, table: &str, completion: &Completion) {
        match completion {
            Completion::Succeeded { status, body, .. } => {
                tracing::info!(op = operation.as_str(), table, status, "request succeeded");
                self.bus.publish(
                    REQUEST_SUCCEEDED,
                    &json!({"operation": operation, "table": table, "status": status, "body": body}),
                );
            }
            Completion::Failed { status, body } => {
                tracing::error!(
                    op = operation.as_str(),
                    table,
                    status = ?status,
                    body = %body,
                    "request failed"
                );
                self.bus.publish(
                    REQUEST_FAILED,
                    &json!({"operation": operation, "table": table, "status": status, "body": body}),
                );
            }
        }
    }
}

impl<T: Transport + 'static> TableClient<T> {
    /// [`TableClient::ensure_schema`] on a background task.
    pub fn spawn_bootstrap(self: &Arc<Self>, tables: Vec<String>) -> JoinHandle<SchemaReport> {
        let client = Arc::clone(self);
        tokio::spawn(async move { client.ensure_schema(&tables).await })
    }
}
