use std::env;
use std::path::PathBuf;

use crate::error::AppError;
use crate::semantic::ZoneThresholds;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Embedding configuration
    pub embedding: EmbeddingConfig,
    /// Recorder configuration
    pub recorder: RecorderConfig,
    /// Guard configuration
    pub guard: GuardConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug")
    pub level: String,
    /// Output format for log messages
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    /// Human-readable format with colors
    Pretty,
    /// JSON structured format
    Json,
}

/// Embedding provider and cache configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Model identifier sent to the provider
    pub model: String,
    /// Expected vector length
    pub dimensions: usize,
    /// Maximum cached texts; 0 disables the cache.
    pub cache_size: usize,
    /// Provider request timeout in milliseconds
    pub timeout_ms: u64,
}

/// Recorder tuning
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Character budget for a node's insight text.
    pub insight_limit: usize,
    /// Successful steps with a shorter insight are skipped.
    pub min_insight_len: usize,
    /// Tools never worth recording (compared lowercase).
    pub trivial_tools: Vec<String>,
    /// Recent nodes used to compute a trajectory when ΔS is not supplied.
    pub trajectory_window: usize,
    /// Sessions whose current parent is remembered.
    pub max_tracked_sessions: usize,
}

/// Pre-tool-use guard behaviour
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Zone boundaries used for the decision
    pub thresholds: ZoneThresholds,
    /// Block DANGER calls that have no bridge instead of warning
    pub block_in_danger: bool,
    /// Suggest bridge topics in the RISK zone
    pub inject_bridge_context: bool,
    /// Recent nodes forming the trajectory
    pub trajectory_window: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/semantic.db".to_string()),
            ),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let embedding = EmbeddingConfig {
            model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| EmbeddingConfig::default().model),
            dimensions: parse_var("EMBEDDING_DIMENSIONS", 1536),
            cache_size: parse_var("EMBEDDING_CACHE_SIZE", 1000),
            timeout_ms: parse_var("EMBEDDING_TIMEOUT_MS", 30000),
        };

        let defaults = ZoneThresholds::default();
        let thresholds = ZoneThresholds::new(
            parse_var("ZONE_SAFE", defaults.safe),
            parse_var("ZONE_TRANSITIONAL", defaults.transitional),
            parse_var("ZONE_RISK", defaults.risk),
        )
        .map_err(|message| AppError::Config { message })?;

        let trajectory_window = parse_var("TRAJECTORY_WINDOW", 5);

        let recorder = RecorderConfig {
            trajectory_window,
            max_tracked_sessions: parse_var("RECORDER_MAX_SESSIONS", 1024),
            ..RecorderConfig::default()
        };

        let guard = GuardConfig {
            thresholds,
            block_in_danger: parse_var("GUARD_BLOCK_IN_DANGER", false),
            inject_bridge_context: parse_var("GUARD_INJECT_BRIDGE_CONTEXT", true),
            trajectory_window,
        };

        Ok(Config {
            database,
            logging,
            embedding,
            recorder,
            guard,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            cache_size: 1000,
            timeout_ms: 30000,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            insight_limit: 200,
            min_insight_len: 10,
            trivial_tools: vec!["echo".to_string(), "pwd".to_string(), "whoami".to_string()],
            trajectory_window: 5,
            max_tracked_sessions: 1024,
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            thresholds: ZoneThresholds::default(),
            block_in_danger: false,
            inject_bridge_context: true,
            trajectory_window: 5,
        }
    }
}
