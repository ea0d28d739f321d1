use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::client::{EntityQuery, TableClient};
use crate::codec::{ElementError, Entity, QueryPage, TableEntity};
use crate::error::StoreError;
use crate::schema::HIGHSCORES_TABLE;
use crate::transport::Transport;

pub const DEFAULT_PARTITION: &str = "Scores";
pub const DEFAULT_TOP: u32 = 10;
pub const PLAYER_NAME: &str = "PlayerName";
pub const SCORE: &str = "Score";
/// Largest score that still fits the ten-digit row key prefix.
pub const MAX_SCORE: i64 = 9_999_999_999;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HighScore {
    pub partition_key: String,
    pub row_key: String,
    pub player_name: String,
    pub score: i64,
    pub timestamp: Option<DateTime<Utc>>,
}

impl HighScore {
    /// New submission. The row key is `{score:010}-{uuid}` so row order follows score.
    pub fn new(
        partition_key: &str,
        player_name: &str,
        score: i64,
    ) -> Result<Self, StoreError> {
        let player_name = player_name.trim();
        if player_name.is_empty() {
            return Err(StoreError::InvalidEntity("player name is required".into()));
        }
        if score < 0 {
            return Err(StoreError::InvalidEntity(format!(
                "score must not be negative (got {score})"
            )));
        }
        if score > MAX_SCORE {
            return Err(StoreError::InvalidEntity(format!(
                "score must not exceed {MAX_SCORE} (got {score})"
            )));
        }
        Ok(Self {
            partition_key: partition_key.to_string(),
            row_key: format!("{score:010}-{}", Uuid::new_v4()),
            player_name: player_name.to_string(),
            score,
            timestamp: Some(Utc::now()),
        })
    }
}

impl TableEntity for HighScore {
    fn from_entity(entity: Entity) -> Result<Self, ElementError> {
        let player_name = match entity.get(PLAYER_NAME) {
            None => return Err(ElementError::MissingField(PLAYER_NAME)),
            Some(v) => v
                .as_str()
                .ok_or(ElementError::WrongType(PLAYER_NAME))?
                .to_string(),
        };
        let score = match entity.get(SCORE) {
            None => return Err(ElementError::MissingField(SCORE)),
            Some(_) => entity.get_i64(SCORE).ok_or(ElementError::WrongType(SCORE))?,
        };
        Ok(Self {
            partition_key: entity.partition_key,
            row_key: entity.row_key,
            player_name,
            score,
            timestamp: entity.timestamp,
        })
    }

    fn into_entity(self) -> Entity {
        let mut entity = Entity::new(self.partition_key, self.row_key)
            .with(PLAYER_NAME, self.player_name)
            .with(SCORE, self.score);
        entity.timestamp = self.timestamp;
        entity
    }
}

/// Highest score first; ties keep the earlier row key first. Truncates to `top`.
pub fn rank(mut scores: Vec<HighScore>, top: usize) -> Vec<HighScore> {
    scores.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.row_key.cmp(&b.row_key)));
    scores.truncate(top);
    scores
}

/// High-score table for one partition.
pub struct Leaderboard<T: Transport> {
    client: Arc<TableClient<T>>,
    table: String,
    partition: String,
}

impl<T: Transport> Leaderboard<T> {
    pub fn new(client: Arc<TableClient<T>>) -> Self {
        Self {
            client,
            table: HIGHSCORES_TABLE.to_string(),
            partition: DEFAULT_PARTITION.to_string(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub async fn submit(&self, player_name: &str, score: i64) -> Result<HighScore, StoreError> {
        let high_score = HighScore::new(&self.partition, player_name, score)?;
        self.client
            .insert_entity(&self.table, &high_score.clone().into_entity())
            .await?;
        tracing::info!(player = %high_score.player_name, score, "score submitted");
        Ok(high_score)
    }

    /// Top `n` scores, re-sorted locally since server ordering is best-effort.
    pub async fn top(&self, n: u32) -> Result<QueryPage<HighScore>, StoreError> {
        if n == 0 {
            return Ok(QueryPage {
                entities: Vec::new(),
                skipped: 0,
            });
        }
        let query = EntityQuery::new()
            .filter(EntityQuery::partition_eq(&self.partition))
            .top(n)
            .order_by(format!("{SCORE} desc"));
        let page = self.client.query_as::<HighScore>(&self.table, &query).await?;
        let limit = usize::try_from(n).unwrap_or(usize::MAX);
        Ok(QueryPage {
            entities: rank(page.entities, limit),
            skipped: page.skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_query_as;
    use crate::endpoint::EnvironmentResolver;
    use crate::test_support::RecordingTransport;

    fn score(player: &str, value: i64, row: &str) -> HighScore {
        HighScore {
            partition_key: DEFAULT_PARTITION.into(),
            row_key: row.into(),
            player_name: player.into(),
            score: value,
            timestamp: None,
        }
    }

    #[test]
    fn row_key_sorts_with_score() {
        let hs = HighScore::new("Scores", "  AAA ", 123).unwrap();
        assert_eq!(hs.player_name, "AAA");
        assert!(hs.row_key.starts_with("0000000123-"));
        assert_eq!(hs.row_key.len(), 10 + 1 + 36);
        assert!(hs.timestamp.is_some());
    }

    #[test]
    fn rejects_blank_players_and_negative_scores() {
        assert!(matches!(
            HighScore::new("Scores", "   ", 1),
            Err(StoreError::InvalidEntity(_))
        ));
        assert!(matches!(
            HighScore::new("Scores", "AAA", -5),
            Err(StoreError::InvalidEntity(_))
        ));
    }

    #[test]
    fn scores_beyond_the_row_key_width_are_rejected() {
        let max = HighScore::new("Scores", "AAA", MAX_SCORE).unwrap();
        assert!(max.row_key.starts_with("9999999999-"));
        assert!(max.row_key > HighScore::new("Scores", "AAA", MAX_SCORE - 1).unwrap().row_key);
        assert!(matches!(
            HighScore::new("Scores", "AAA", MAX_SCORE + 1),
            Err(StoreError::InvalidEntity(_))
        ));
    }

    #[tokio::test]
    async fn top_zero_sends_no_query() {
        let transport = Arc::new(RecordingTransport::default());
        let client = Arc::new(
            TableClient::new(&EnvironmentResolver::development(), transport.clone()).unwrap(),
        );
        let page = Leaderboard::new(client).top(0).await.unwrap();
        assert!(page.entities.is_empty());
        assert_eq!(page.skipped, 0);
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn typed_decode_skips_elements_missing_player_name() {
        let body = r#"{"value":[{"PartitionKey":"Scores","RowKey":"r1","PlayerName":"AAA","Score":5},{"PartitionKey":"Scores","RowKey":"r2","Score":7}]}"#;
        let page = decode_query_as::<HighScore>(body).unwrap();
        assert_eq!(page.skipped, 1);
        assert_eq!(page.entities, vec![score("AAA", 5, "r1")]);
    }

    #[test]
    fn typed_decode_accepts_string_scores() {
        let body = r#"{"value":[{"PartitionKey":"Scores","RowKey":"r1","PlayerName":"AAA","Score":"77"}]}"#;
        let page = decode_query_as::<HighScore>(body).unwrap();
        assert_eq!(page.entities[0].score, 77);
    }

    #[test]
    fn rank_orders_descending_and_truncates() {
        let ranked = rank(
            vec![
                score("low", 3, "c"),
                score("high", 90, "a"),
                score("tie-b", 50, "e"),
                score("tie-a", 50, "d"),
            ],
            3,
        );
        let names: Vec<&str> = ranked.iter().map(|s| s.player_name.as_str()).collect();
        assert_eq!(names, ["high", "tie-a", "tie-b"]);
    }

    #[test]
    fn entity_conversion_round_trips() {
        let hs = score("AAA", 123, "r1");
        let back = HighScore::from_entity(hs.clone().into_entity()).unwrap();
        assert_eq!(back, hs);
    }
}
