//! Wire JSON for entities.
//!
//! Query responses wrap entities in `{"value": [...]}`; anything else is a
//! single-entity acknowledgment. An element without string `PartitionKey` and
//! `RowKey` makes the whole response malformed, while other per-element faults
//! only skip that element.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::error::StoreError;

pub const PARTITION_KEY: &str = "PartitionKey";
pub const ROW_KEY: &str = "RowKey";
pub const TIMESTAMP: &str = "Timestamp";
pub const ODATA_ETAG: &str = "odata.etag";
const VALUE: &str = "value";

#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub partition_key: String,
    pub row_key: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    /// Domain fields in insertion order.
    pub properties: Map<String, Value>,
}

impl Entity {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            timestamp: None,
            etag: None,
            properties: Map::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Integers may arrive as JSON numbers or, for 64-bit values, as strings.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn validate_keys(&self) -> Result<(), StoreError> {
        if self.partition_key.trim().is_empty() {
            return Err(StoreError::InvalidEntity("PartitionKey must not be empty".into()));
        }
        if self.row_key.trim().is_empty() {
            return Err(StoreError::InvalidEntity("RowKey must not be empty".into()));
        }
        Ok(())
    }
}

/// Why one element of a batch was skipped.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ElementError {
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("field {0} has an unexpected type")]
    WrongType(&'static str),
    #[error("invalid timestamp {0}")]
    Timestamp(String),
}

/// Typed view over an [`Entity`].
pub trait TableEntity: Sized {
    fn from_entity(entity: Entity) -> Result<Self, ElementError>;
    fn into_entity(self) -> Entity;
}

impl TableEntity for Entity {
    fn from_entity(entity: Entity) -> Result<Self, ElementError> {
        Ok(entity)
    }

    fn into_entity(self) -> Entity {
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryPage<E> {
    pub entities: Vec<E>,
    /// Elements dropped because they failed to decode.
    pub skipped: usize,
}

impl<E> QueryPage<E> {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    Page(QueryPage<Entity>),
    Single(Option<Entity>),
}

pub fn encode_entity(entity: &Entity) -> Value {
    let mut out = Map::new();
    out.insert(PARTITION_KEY.into(), Value::String(entity.partition_key.clone()));
    out.insert(ROW_KEY.into(), Value::String(entity.row_key.clone()));
    if let Some(ts) = entity.timestamp {
        out.insert(
            TIMESTAMP.into(),
            Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );
    }
    for (k, v) in &entity.properties {
        out.insert(k.clone(), v.clone());
    }
    Value::Object(out)
}

pub fn encode_body(entity: &Entity) -> String {
    encode_entity(entity).to_string()
}

pub fn decode_response(body: &str) -> Result<Decoded, StoreError> {
    if body.trim().is_empty() {
        return Ok(Decoded::Single(None));
    }
    let root = parse(body)?;
    match root.get(VALUE) {
        Some(_) => decode_page(root).map(Decoded::Page),
        None => decode_single_value(root).map(Decoded::Single),
    }
}

pub fn decode_query(body: &str) -> Result<QueryPage<Entity>, StoreError> {
    decode_page(parse(body)?)
}

pub fn decode_query_as<E: TableEntity>(body: &str) -> Result<QueryPage<E>, StoreError> {
    let page = decode_query(body)?;
    let mut skipped = page.skipped;
    let mut entities = Vec::with_capacity(page.entities.len());
    for entity in page.entities {
        let row_key = entity.row_key.clone();
        match E::from_entity(entity) {
            Ok(typed) => entities.push(typed),
            Err(err) => {
                tracing::warn!(row_key = %row_key, %err, "skipping entity");
                skipped += 1;
            }
        }
    }
    Ok(QueryPage { entities, skipped })
}

/// Single-entity acknowledgment; an empty body carries no entity.
pub fn decode_single(body: &str) -> Result<Option<Entity>, StoreError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    decode_single_value(parse(body)?)
}

fn parse(body: &str) -> Result<Value, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::Decode(format!("invalid json: {e}")))
}

fn decode_page(root: Value) -> Result<QueryPage<Entity>, StoreError> {
    let Value::Object(mut root) = root else {
        return Err(StoreError::Decode("response is not an object".into()));
    };
    let items = match root.remove(VALUE) {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(StoreError::Decode("`value` is not an array".into())),
        None => return Err(StoreError::Decode("response has no `value` array".into())),
    };
    let mut entities = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(fields) = item else {
            return Err(StoreError::Decode(format!("element {index} is not an object")));
        };
        match entity_from_fields(fields) {
            Ok(Ok(entity)) => entities.push(entity),
            Ok(Err(err)) => {
                tracing::warn!(index, %err, "skipping malformed element");
                skipped += 1;
            }
            Err(missing) => {
                return Err(StoreError::Decode(format!(
                    "element {index} is missing {missing}"
                )))
            }
        }
    }
    Ok(QueryPage { entities, skipped })
}

fn decode_single_value(root: Value) -> Result<Option<Entity>, StoreError> {
    let Value::Object(fields) = root else {
        return Err(StoreError::Decode("acknowledgment is not an object".into()));
    };
    match entity_from_fields(fields) {
        Ok(Ok(entity)) => Ok(Some(entity)),
        Ok(Err(err)) => Err(StoreError::Decode(err.to_string())),
        Err(missing) => Err(StoreError::Decode(format!("acknowledgment is missing {missing}"))),
    }
}

/// Outer error: required key absent (fatal for the response).
/// Inner error: element-level fault.
fn entity_from_fields(
    mut fields: Map<String, Value>,
) -> Result<Result<Entity, ElementError>, &'static str> {
    let partition_key = take_key(&mut fields, PARTITION_KEY)?;
    let row_key = take_key(&mut fields, ROW_KEY)?;
    let timestamp = match fields.remove(TIMESTAMP) {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => match DateTime::parse_from_rfc3339(&raw) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(_) => return Ok(Err(ElementError::Timestamp(raw))),
        },
        Some(_) => return Ok(Err(ElementError::WrongType(TIMESTAMP))),
    };
    let etag = match fields.remove(ODATA_ETAG) {
        Some(Value::String(tag)) => Some(tag),
        _ => None,
    };
    fields.retain(|k, _| !k.starts_with("odata.") && !k.contains("@odata."));
    Ok(Ok(Entity {
        partition_key,
        row_key,
        timestamp,
        etag,
        properties: fields,
    }))
}

fn take_key(fields: &mut Map<String, Value>, name: &'static str) -> Result<String, &'static str> {
    match fields.remove(name) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn encodes_keys_then_timestamp_then_properties() {
        let at = Utc.with_ymd_and_hms(2030, 1, 1, 12, 30, 0).unwrap();
        let entity = Entity::new("Scores", "r1")
            .with_timestamp(at)
            .with("PlayerName", "AAA")
            .with("Score", 123);
        let body = encode_body(&entity);
        assert_eq!(
            body,
            r#"{"PartitionKey":"Scores","RowKey":"r1","Timestamp":"2030-01-01T12:30:00Z","PlayerName":"AAA","Score":123}"#
        );
    }

    #[test]
    fn partial_batch_keeps_good_elements() {
        let body = r#"{"value":[{"PartitionKey":"Scores","RowKey":"r1","PlayerName":"AAA","Score":5},{"PartitionKey":"Scores","RowKey":"r2","Score":7}]}"#;
        let page = decode_query(body).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page.skipped, 0);
        assert_eq!(page.entities[0].get_str("PlayerName"), Some("AAA"));
        assert_eq!(page.entities[0].get_i64("Score"), Some(5));
        assert_eq!(page.entities[1].get_str("PlayerName"), None);
    }

    #[test]
    fn bad_timestamp_skips_only_that_element() {
        let body = json!({"value": [
            {"PartitionKey": "Scores", "RowKey": "r1", "Timestamp": "yesterday"},
            {"PartitionKey": "Scores", "RowKey": "r2", "Timestamp": "2024-05-20T12:00:00.1234567Z"}
        ]})
        .to_string();
        let page = decode_query(&body).unwrap();
        assert_eq!(page.skipped, 1);
        assert_eq!(page.entities.len(), 1);
        assert_eq!(page.entities[0].row_key, "r2");
        assert!(page.entities[0].timestamp.is_some());
    }

    #[test]
    fn missing_keys_make_the_whole_response_malformed() {
        let body = r#"{"value":[{"PartitionKey":"Scores","RowKey":"r1"},{"PartitionKey":"Scores","PlayerName":"BBB"}]}"#;
        let err = decode_query(body).unwrap_err();
        assert!(matches!(err, StoreError::Decode(msg) if msg.contains("RowKey")));
    }

    #[test]
    fn top_level_garbage_is_a_decode_error() {
        assert!(matches!(decode_query("<html>"), Err(StoreError::Decode(_))));
        assert!(matches!(decode_query(r#"{"value": 3}"#), Err(StoreError::Decode(_))));
    }

    #[test]
    fn response_without_value_is_a_single_acknowledgment() {
        let body = r#"{"odata.etag":"W/\"datetime'2030'\"","PartitionKey":"Scores","RowKey":"r1","Score":9}"#;
        match decode_response(body).unwrap() {
            Decoded::Single(Some(entity)) => {
                assert_eq!(entity.row_key, "r1");
                assert_eq!(entity.etag.as_deref(), Some("W/\"datetime'2030'\""));
                assert!(entity.get("odata.etag").is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(decode_response("").unwrap(), Decoded::Single(None));
        assert!(matches!(
            decode_response(r#"{"value":[]}"#).unwrap(),
            Decoded::Page(page) if page.is_empty()
        ));
    }

    #[test]
    fn round_trip_preserves_field_order() {
        let at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let entity = Entity::new("Scores", "0000000123-abc")
            .with_timestamp(at)
            .with("Zeta", "last-alphabetically")
            .with("PlayerName", "AAA")
            .with("Score", 123)
            .with("Alpha", true);
        let decoded = decode_single(&encode_body(&entity)).unwrap().unwrap();
        assert_eq!(decoded, entity);
        let names: Vec<&str> = decoded.properties.keys().map(String::as_str).collect();
        assert_eq!(names, ["Zeta", "PlayerName", "Score", "Alpha"]);
    }

    #[test]
    fn empty_keys_fail_validation() {
        assert!(Entity::new("Scores", "r1").validate_keys().is_ok());
        assert!(matches!(
            Entity::new("", "r1").validate_keys(),
            Err(StoreError::InvalidEntity(_))
        ));
        assert!(matches!(
            Entity::new("Scores", " ").validate_keys(),
            Err(StoreError::InvalidEntity(_))
        ));
    }

    #[test]
    fn integers_accept_string_encoding() {
        let entity = Entity::new("Scores", "r1")
            .with("Score", "42")
            .with("Bad", "x");
        assert_eq!(entity.get_i64("Score"), Some(42));
        assert_eq!(entity.get_i64("Bad"), None);
    }
}
