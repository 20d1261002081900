//! Storage layer for reasoning nodes.
//!
//! Nodes are append-only: they are inserted once and never updated. The
//! [`NodeStore`] trait is the seam; [`SqliteNodeStore`] is the durable
//! implementation.

mod codec;
mod sqlite;

pub use sqlite::SqliteNodeStore;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::semantic::{SemanticNode, SemanticZone, SessionTree, ZoneThresholds};

/// Nodes exported when no session filter is given.
pub const EXPORT_LIMIT: usize = 1000;

/// Persistence operations for semantic nodes.
///
/// Implementations must serialize writers, allow concurrent readers, and
/// make each insert atomic from a reader's point of view.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Insert a node. Fails with `DuplicateId` if the id already exists.
    async fn add_node(&self, node: &SemanticNode) -> StorageResult<()>;

    /// Fetch one node, embedding included.
    async fn get_node(&self, id: &str) -> StorageResult<Option<SemanticNode>>;

    /// Up to `n` most recent nodes, newest first, optionally for one session.
    ///
    /// An empty `session_id` is treated like `None` (see [`session_scope`]).
    /// With `include_embeddings == false` the embedding column is not read.
    async fn get_recent(
        &self,
        n: usize,
        session_id: Option<&str>,
        include_embeddings: bool,
    ) -> StorageResult<Vec<SemanticNode>>;

    /// Up to `limit` most recent nodes whose ΔS falls in `zone`.
    async fn get_by_zone(
        &self,
        zone: SemanticZone,
        limit: usize,
        thresholds: &ZoneThresholds,
    ) -> StorageResult<Vec<SemanticNode>>;

    /// Nodes whose embedding has cosine similarity `>= min_similarity` with
    /// `query`, best first (ties: most recent first), at most `top_k`.
    async fn find_similar(
        &self,
        query: &[f64],
        top_k: usize,
        min_similarity: f64,
    ) -> StorageResult<Vec<(SemanticNode, f64)>>;

    /// Every node of a session, oldest first, without embeddings.
    async fn get_session_tree(&self, session_id: &str) -> StorageResult<Vec<SemanticNode>>;

    /// Export a session's tree, or the latest [`EXPORT_LIMIT`] nodes when
    /// `session_id` is `None`. Nodes are in chronological order.
    async fn export_tree(&self, session_id: Option<&str>) -> StorageResult<SessionTree> {
        let session_id = session_id.and_then(session_scope);
        let nodes = match session_id {
            Some(id) => self.get_session_tree(id).await?,
            None => {
                let mut nodes = self.get_recent(EXPORT_LIMIT, None, false).await?;
                nodes.reverse();
                nodes
            }
        };

        Ok(SessionTree::new(session_id.map(str::to_string), nodes))
    }
}

/// Session filter for a context's session id: an empty id means every session.
pub fn session_scope(session_id: &str) -> Option<&str> {
    (!session_id.is_empty()).then_some(session_id)
}
