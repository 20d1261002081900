use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::codec::{
    decode_embedding, decode_metadata, decode_timestamp, encode_embedding, encode_metadata,
    encode_timestamp,
};
use super::{session_scope, NodeStore};
use crate::config::DatabaseConfig;
use crate::embedding::cosine_similarity;
use crate::error::{StorageError, StorageResult};
use crate::semantic::{ReasoningDirection, SemanticNode, SemanticZone, ZoneThresholds};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Columns shared by every node query, minus the embedding pair.
const NODE_COLUMNS: &str = "id, topic, delta_s, lambda_observe AS direction, module_used, insight, timestamp, \
     session_id, project_id, parent_id, \
     CASE WHEN typeof(metadata) = 'text' THEN metadata END AS metadata_text, \
     CASE WHEN typeof(metadata) = 'blob' THEN metadata END AS metadata_blob";

/// Embedding split by storage class: JSON text (current) or raw bytes (legacy).
const EMBEDDING_COLUMNS: &str = "CASE WHEN typeof(embedding) = 'text' THEN embedding END AS embedding_text, \
     CASE WHEN typeof(embedding) = 'blob' THEN embedding END AS embedding_blob";

const NO_EMBEDDING_COLUMNS: &str = "NULL AS embedding_text, NULL AS embedding_blob";

/// Most recent first; rowid breaks timestamp ties by insertion order.
const RECENT_ORDER: &str = "ORDER BY timestamp DESC, rowid DESC";

/// SQLite-backed node store
#[derive(Clone)]
pub struct SqliteNodeStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteNodeStore {
    /// Create a new SQLite node store
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        Self::with_pool(pool).await
    }

    /// Create a private in-memory store (single connection, lives as long as the pool)
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> StorageResult<Self> {
        let store = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn select(include_embeddings: bool) -> String {
        format!(
            "SELECT {}, {} FROM semantic_nodes",
            NODE_COLUMNS,
            if include_embeddings {
                EMBEDDING_COLUMNS
            } else {
                NO_EMBEDDING_COLUMNS
            }
        )
    }
}

#[async_trait]
impl NodeStore for SqliteNodeStore {
    async fn add_node(&self, node: &SemanticNode) -> StorageResult<()> {
        let embedding = node
            .embedding
            .as_deref()
            .map(encode_embedding)
            .transpose()?;
        let metadata = encode_metadata(&node.metadata)?;

        let _guard = self.write_lock.lock().await;

        let result = sqlx::query(
            r#"
            INSERT INTO semantic_nodes
                (id, topic, delta_s, lambda_observe, module_used, insight, timestamp,
                 session_id, project_id, parent_id, embedding, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&node.id)
        .bind(&node.topic)
        .bind(node.delta_s)
        .bind(node.direction.symbol())
        .bind(&node.module_used)
        .bind(&node.insight)
        .bind(encode_timestamp(&node.timestamp))
        .bind(&node.session_id)
        .bind(&node.project_id)
        .bind(&node.parent_id)
        .bind(&embedding)
        .bind(&metadata)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::DuplicateId {
                id: node.id.clone(),
            });
        }

        debug!(
            node_id = %node.id,
            session_id = %node.session_id,
            delta_s = node.delta_s,
            "Node stored"
        );
        Ok(())
    }

    async fn get_node(&self, id: &str) -> StorageResult<Option<SemanticNode>> {
        let query = format!("{} WHERE id = ?", Self::select(true));
        let row: Option<NodeRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(SemanticNode::try_from).transpose()
    }

    async fn get_recent(
        &self,
        n: usize,
        session_id: Option<&str>,
        include_embeddings: bool,
    ) -> StorageResult<Vec<SemanticNode>> {
        let session_id = session_id.and_then(session_scope);
        let query = format!(
            "{} WHERE (? IS NULL OR session_id = ?) {} LIMIT ?",
            Self::select(include_embeddings),
            RECENT_ORDER
        );
        let rows: Vec<NodeRow> = sqlx::query_as(&query)
            .bind(session_id)
            .bind(session_id)
            .bind(limit(n))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(SemanticNode::try_from).collect()
    }

    async fn get_by_zone(
        &self,
        zone: SemanticZone,
        limit_n: usize,
        thresholds: &ZoneThresholds,
    ) -> StorageResult<Vec<SemanticNode>> {
        let (lower, upper) = thresholds.bounds(zone);
        let query = format!(
            "{} WHERE (? IS NULL OR delta_s >= ?) AND (? IS NULL OR delta_s < ?) {} LIMIT ?",
            Self::select(false),
            RECENT_ORDER
        );
        let rows: Vec<NodeRow> = sqlx::query_as(&query)
            .bind(lower)
            .bind(lower)
            .bind(upper)
            .bind(upper)
            .bind(limit(limit_n))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(SemanticNode::try_from).collect()
    }

    async fn find_similar(
        &self,
        query_embedding: &[f64],
        top_k: usize,
        min_similarity: f64,
    ) -> StorageResult<Vec<(SemanticNode, f64)>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        // Full scan; rows arrive most recent first so the stable sort below
        // keeps recency order among equal similarities.
        let query = format!(
            "{} WHERE embedding IS NOT NULL {}",
            Self::select(true),
            RECENT_ORDER
        );
        let rows: Vec<NodeRow> = sqlx::query_as(&query).fetch_all(&self.pool).await?;

        let mut results = Vec::new();
        for row in rows {
            let id = row.id.clone();
            let node = match SemanticNode::try_from(row) {
                Ok(node) => node,
                Err(e) => {
                    warn!(node_id = %id, error = %e, "Skipping unreadable node in similarity scan");
                    continue;
                }
            };
            if let Some(embedding) = &node.embedding {
                let similarity = cosine_similarity(query_embedding, embedding);
                if similarity >= min_similarity {
                    results.push((node, similarity));
                }
            }
        }

        results.sort_by(|a, b| b.1.total_cmp(&a.1));
        results.truncate(top_k);
        Ok(results)
    }

    async fn get_session_tree(&self, session_id: &str) -> StorageResult<Vec<SemanticNode>> {
        let query = format!(
            "{} WHERE session_id = ? ORDER BY timestamp ASC, rowid ASC",
            Self::select(false)
        );
        let rows: Vec<NodeRow> = sqlx::query_as(&query)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(SemanticNode::try_from).collect()
    }
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

// Internal row type for SQLx mapping
#[derive(sqlx::FromRow)]
struct NodeRow {
    id: String,
    topic: String,
    delta_s: f64,
    direction: String,
    module_used: String,
    insight: String,
    timestamp: String,
    session_id: Option<String>,
    project_id: Option<String>,
    parent_id: Option<String>,
    metadata_text: Option<String>,
    metadata_blob: Option<Vec<u8>>,
    embedding_text: Option<String>,
    embedding_blob: Option<Vec<u8>>,
}

impl TryFrom<NodeRow> for SemanticNode {
    type Error = StorageError;

    fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
        let direction = ReasoningDirection::from_str(&row.direction)
            .map_err(|message| StorageError::Serialization { message })?;

        Ok(Self {
            timestamp: decode_timestamp(&row.timestamp)?,
            embedding: decode_embedding(
                row.embedding_text.as_deref(),
                row.embedding_blob.as_deref(),
            )?,
            metadata: decode_metadata(row.metadata_text.as_deref(), row.metadata_blob.as_deref())?,
            id: row.id,
            topic: row.topic,
            delta_s: row.delta_s,
            direction,
            module_used: row.module_used,
            insight: row.insight,
            session_id: row.session_id.unwrap_or_default(),
            project_id: row.project_id.unwrap_or_default(),
            parent_id: row.parent_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn store() -> SqliteNodeStore {
        SqliteNodeStore::new_in_memory()
            .await
            .expect("Failed to create in-memory store")
    }

    fn node(topic: &str, delta_s: f64) -> SemanticNode {
        SemanticNode::new(topic, delta_s, ReasoningDirection::Convergent, "bash", "insight")
    }

    #[tokio::test]
    async fn test_get_recent_respects_limit_and_order() {
        let store = store().await;
        let base = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
        for i in 0..5 {
            let n = node(&format!("step {}", i), 0.1)
                .with_timestamp(base + ChronoDuration::seconds(i));
            store.add_node(&n).await.unwrap();
        }

        let recent = store.get_recent(3, None, false).await.unwrap();
        let topics: Vec<&str> = recent.iter().map(|n| n.topic.as_str()).collect();
        assert_eq!(topics, vec!["step 4", "step 3", "step 2"]);
    }

    #[tokio::test]
    async fn test_equal_timestamps_fall_back_to_insertion_order() {
        let store = store().await;
        let ts = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
        store.add_node(&node("first", 0.1).with_timestamp(ts)).await.unwrap();
        store.add_node(&node("second", 0.1).with_timestamp(ts)).await.unwrap();

        let recent = store.get_recent(2, None, false).await.unwrap();
        assert_eq!(recent[0].topic, "second");
        assert_eq!(recent[1].topic, "first");
    }

    #[tokio::test]
    async fn test_get_recent_without_embeddings_skips_vectors() {
        let store = store().await;
        store
            .add_node(&node("vec", 0.2).with_embedding(vec![1.0, 0.0]))
            .await
            .unwrap();

        let without = store.get_recent(1, None, false).await.unwrap();
        assert!(without[0].embedding.is_none());

        let with = store.get_recent(1, None, true).await.unwrap();
        assert_eq!(with[0].embedding, Some(vec![1.0, 0.0]));
    }

    #[tokio::test]
    async fn test_get_node() {
        let store = store().await;
        let n = node("lookup", 0.3).with_metadata("exit_code", json!(0));
        store.add_node(&n).await.unwrap();

        assert_eq!(store.get_node(&n.id).await.unwrap(), Some(n));
        assert!(store.get_node("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_direction_is_a_serialization_error() {
        let store = store().await;
        sqlx::query(
            "INSERT INTO semantic_nodes (id, topic, delta_s, lambda_observe, module_used, insight, timestamp) \
             VALUES ('bad', 't', 0.1, '??', 'm', 'i', '2026-01-15T12:00:00.000000000Z')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let err = store.get_node("bad").await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_find_similar_skips_nodes_without_embeddings() {
        let store = store().await;
        store.add_node(&node("plain", 0.1)).await.unwrap();
        store
            .add_node(&node("vec", 0.1).with_embedding(vec![1.0, 0.0]))
            .await
            .unwrap();

        let results = store.find_similar(&[1.0, 0.0], 5, -1.0).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.topic, "vec");
        assert_eq!(results[0].1, 1.0);
        assert!(store.find_similar(&[1.0, 0.0], 0, -1.0).await.unwrap().is_empty());
    }
}
