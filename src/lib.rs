//! # Semantic Trajectory
//!
//! Tracks an agent's reasoning as a tree of semantic nodes and measures how
//! far each new step drifts from where the reasoning was heading.
//!
//! ## Features
//!
//! - **Zones**: ΔS (semantic tension) bucketed into SAFE / TRANSITIONAL / RISK / DANGER
//! - **Embeddings**: provider-agnostic embedder with an LRU cache and timeout
//! - **Trajectory math**: cosine similarity, tension, decay-weighted trajectories
//! - **Node store**: SQLite persistence with exact round-trip and legacy decoding
//! - **Recorder**: post-tool-use events turned into a per-session reasoning tree
//! - **Guard**: pre-tool-use tension check with bridge suggestions
//!
//! ## Architecture
//!
//! ```text
//! Host hook event → SemanticGuard / SemanticRecorder → NodeStore (SQLite)
//!                              ↓
//!                     Embedder → EmbeddingProvider
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use semantic_trajectory::{Config, SemanticRecorder, SqliteNodeStore};
//! use semantic_trajectory::semantic::{HookContext, HookEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     semantic_trajectory::logging::init_logging(&config.logging);
//!     let store = Arc::new(SqliteNodeStore::new(&config.database).await?);
//!     let recorder = SemanticRecorder::new(store, config.recorder.clone());
//!
//!     let event = HookContext::new(HookEvent::PostToolUse, "session-1");
//!     let outcome = recorder.record(&event, Some(0.2), false).await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration loaded from the environment.
pub mod config;
/// Text embedding capability and similarity math.
pub mod embedding;
/// Error types and result aliases for the crate.
pub mod error;
/// Pre-tool-use tension guard.
pub mod guard;
/// Tracing subscriber setup.
pub mod logging;
/// Post-tool-use node recorder.
pub mod recorder;
/// Node model, zones and host hook types.
pub mod semantic;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use embedding::{CachedEmbedder, Embedder, EmbeddingProvider};
pub use error::{AppError, AppResult};
pub use guard::SemanticGuard;
pub use recorder::{RecordOutcome, SemanticRecorder, SkipReason};
pub use semantic::{classify_zone, ReasoningDirection, SemanticNode, SemanticZone, ZoneThresholds};
pub use storage::{NodeStore, SqliteNodeStore};
