use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// A storage request completed with a 2xx status (or a benign 409 on table creation).
pub const REQUEST_SUCCEEDED: &str = "request.succeeded";
/// A storage request was rejected by the service or could not be dispatched.
pub const REQUEST_FAILED: &str = "request.failed";
/// Schema bootstrap processed every required table.
pub const SCHEMA_READY: &str = "schema.ready";

pub const DEFAULT_CAPACITY: usize = 256;

/// Minimal event envelope (RFC3339 time).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Envelope {
    pub time: String,
    pub kind: String,
    pub payload: Value,
}

impl Envelope {
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

/// Broadcast bus for storage notifications. Publishing never blocks and
/// never fails when nobody is subscribed.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Envelope>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish<T: Serialize>(&self, kind: &str, payload: &T) {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let val =
            serde_json::to_value(payload).unwrap_or_else(|_| serde_json::json!({"_ser":"error"}));
        if self
            .tx
            .send(Envelope {
                time: now,
                kind: kind.to_string(),
                payload: val,
            })
            .is_err()
        {
            tracing::trace!(kind, "event dropped; no subscribers");
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
