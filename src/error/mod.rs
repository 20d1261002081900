use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Trajectory error: {0}")]
    Trajectory(#[from] TrajectoryError),
}

/// Node store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Duplicate node id: {id}")]
    DuplicateId { id: String },

    #[error("Serialization failed: {message}")]
    Serialization { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl StorageError {
    /// Whether the failure came from the database being unreachable rather
    /// than from the request itself.
    pub fn is_unavailable(&self) -> bool {
        match self {
            StorageError::Connection { .. } => true,
            StorageError::Sqlx(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// Embedding provider errors
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding provider failed: {message}")]
    Provider { message: String },

    #[error("Embedding request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Malformed embedding response: {message}")]
    MalformedResponse { message: String },
}

/// Invalid input to the trajectory math
#[derive(Debug, Error, PartialEq)]
pub enum TrajectoryError {
    #[error("At least one embedding required")]
    EmptyHistory,

    #[error("Weights length {weights} != embeddings length {embeddings}")]
    WeightsLength { weights: usize, embeddings: usize },

    #[error("Embedding {index} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Result type alias for trajectory math
pub type TrajectoryResult<T> = Result<T, TrajectoryError>;
