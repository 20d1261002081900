//! Column encodings for the `semantic_nodes` table.
//!
//! Embeddings and metadata are written as JSON text. Rows written by the
//! earlier format hold the same JSON as raw bytes in a BLOB; those are
//! still read, never written.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::collections::HashMap;

use crate::error::{StorageError, StorageResult};

/// Fixed-width RFC 3339 with nanoseconds, so text order is time order.
pub(crate) fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    // Naive ISO timestamps from older rows are taken as UTC
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| StorageError::Serialization {
            message: format!("Invalid timestamp '{}': {}", raw, e),
        })
}

pub(crate) fn encode_embedding(embedding: &[f64]) -> StorageResult<String> {
    serde_json::to_string(embedding).map_err(|e| StorageError::Serialization {
        message: format!("Failed to encode embedding: {}", e),
    })
}

/// Decode an embedding column read as (text value, blob value).
///
/// The current JSON text branch is tried first, then the legacy blob branch.
pub(crate) fn decode_embedding(
    text: Option<&str>,
    legacy: Option<&[u8]>,
) -> StorageResult<Option<Vec<f64>>> {
    if let Some(text) = text {
        return parse_json(text, "embedding").map(Some);
    }
    match legacy {
        Some(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|e| StorageError::Serialization {
                message: format!("Legacy embedding is not UTF-8: {}", e),
            })?;
            parse_json(text, "legacy embedding").map(Some)
        }
        None => Ok(None),
    }
}

/// Empty metadata is stored as NULL.
pub(crate) fn encode_metadata(
    metadata: &HashMap<String, serde_json::Value>,
) -> StorageResult<Option<String>> {
    if metadata.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(metadata)
        .map(Some)
        .map_err(|e| StorageError::Serialization {
            message: format!("Failed to encode metadata: {}", e),
        })
}

pub(crate) fn decode_metadata(
    text: Option<&str>,
    legacy: Option<&[u8]>,
) -> StorageResult<HashMap<String, serde_json::Value>> {
    let text = match (text, legacy) {
        (Some(text), _) => text,
        (None, Some(bytes)) => {
            std::str::from_utf8(bytes).map_err(|e| StorageError::Serialization {
                message: format!("Legacy metadata is not UTF-8: {}", e),
            })?
        }
        (None, None) => return Ok(HashMap::new()),
    };
    parse_json(text, "metadata")
}

fn parse_json<T: serde::de::DeserializeOwned>(text: &str, what: &str) -> StorageResult<T> {
    serde_json::from_str(text).map_err(|e| StorageError::Serialization {
        message: format!("Failed to decode {}: {}", what, e),
    })
}
