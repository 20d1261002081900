//! Reasoning-node data model and risk zones.
//!
//! A [`SemanticNode`] is one recorded reasoning step. Its tension value
//! (ΔS) is classified into a [`SemanticZone`] on demand; the zone is never
//! stored alongside the node.

mod hook;


pub use hook::{HookContext, HookEvent, HookResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Upper bound of the tension range (opposite direction).
pub const MAX_DELTA_S: f64 = 2.0;

/// Direction of reasoning flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasoningDirection {
    /// Moving toward a conclusion.
    #[serde(rename = "->")]
    Convergent,
    /// Exploring alternatives or backtracking.
    #[serde(rename = "<-")]
    Divergent,
    /// Iterating on itself.
    #[serde(rename = "<>")]
    Recursive,
}

impl ReasoningDirection {
    /// Compact symbol used in summaries and in the persisted row.
    pub fn symbol(&self) -> &'static str {
        match self {
            ReasoningDirection::Convergent => "->",
            ReasoningDirection::Divergent => "<-",
            ReasoningDirection::Recursive => "<>",
        }
    }
}

impl std::fmt::Display for ReasoningDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

impl std::str::FromStr for ReasoningDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "->" | "convergent" => Ok(ReasoningDirection::Convergent),
            "<-" | "divergent" => Ok(ReasoningDirection::Divergent),
            "<>" | "recursive" => Ok(ReasoningDirection::Recursive),
            _ => Err(format!("Unknown reasoning direction: {}", s)),
        }
    }
}

/// Knowledge boundary zone derived from ΔS, ordered from safest to riskiest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticZone {
    /// Well-known territory.
    Safe,
    /// Moving between concepts.
    Transitional,
    /// Approaching unknown territory.
    Risk,
    /// High hallucination risk.
    Danger,
}

impl SemanticZone {
    /// Every zone, in ascending order of risk.
    pub const ALL: [SemanticZone; 4] = [
        SemanticZone::Safe,
        SemanticZone::Transitional,
        SemanticZone::Risk,
        SemanticZone::Danger,
    ];
}

impl std::fmt::Display for SemanticZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SemanticZone::Safe => write!(f, "safe"),
            SemanticZone::Transitional => write!(f, "transitional"),
            SemanticZone::Risk => write!(f, "risk"),
            SemanticZone::Danger => write!(f, "danger"),
        }
    }
}

impl std::str::FromStr for SemanticZone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "safe" => Ok(SemanticZone::Safe),
            "transitional" => Ok(SemanticZone::Transitional),
            "risk" => Ok(SemanticZone::Risk),
            "danger" => Ok(SemanticZone::Danger),
            _ => Err(format!("Unknown semantic zone: {}", s)),
        }
    }
}

/// Zone boundaries: `SAFE < safe <= TRANSITIONAL < transitional <= RISK < risk <= DANGER`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneThresholds {
    /// Upper bound of SAFE.
    pub safe: f64,
    /// Upper bound of TRANSITIONAL.
    pub transitional: f64,
    /// Upper bound of RISK; anything at or above is DANGER.
    pub risk: f64,
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        Self {
            safe: 0.4,
            transitional: 0.6,
            risk: 0.85,
        }
    }
}

impl ZoneThresholds {
    /// Build a threshold set, rejecting non-finite or non-ascending values.
    pub fn new(safe: f64, transitional: f64, risk: f64) -> Result<Self, String> {
        if !(safe.is_finite() && transitional.is_finite() && risk.is_finite()) {
            return Err("zone thresholds must be finite".to_string());
        }
        if !(safe < transitional && transitional < risk) {
            return Err(format!(
                "zone thresholds must ascend: safe={} transitional={} risk={}",
                safe, transitional, risk
            ));
        }
        Ok(Self {
            safe,
            transitional,
            risk,
        })
    }

    /// Classify a tension value against these thresholds.
    pub fn classify(&self, delta_s: f64) -> SemanticZone {
        classify_zone(delta_s, self)
    }

    /// Half-open `[lower, upper)` ΔS range covered by `zone`. `None` means
    /// unbounded on that side.
    pub fn bounds(&self, zone: SemanticZone) -> (Option<f64>, Option<f64>) {
        match zone {
            SemanticZone::Safe => (None, Some(self.safe)),
            SemanticZone::Transitional => (Some(self.safe), Some(self.transitional)),
            SemanticZone::Risk => (Some(self.transitional), Some(self.risk)),
            SemanticZone::Danger => (Some(self.risk), None),
        }
    }
}

/// Map a tension value to its zone.
///
/// Total over all inputs: anything that is not below the `risk` threshold
/// (including values above 2 and NaN) lands in [`SemanticZone::Danger`].
pub fn classify_zone(delta_s: f64, thresholds: &ZoneThresholds) -> SemanticZone {
    if delta_s < thresholds.safe {
        SemanticZone::Safe
    } else if delta_s < thresholds.transitional {
        SemanticZone::Transitional
    } else if delta_s < thresholds.risk {
        SemanticZone::Risk
    } else {
        SemanticZone::Danger
    }
}

/// One recorded reasoning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticNode {
    /// Unique node identifier.
    pub id: String,
    /// Tool name plus its most salient argument.
    pub topic: String,
    /// Semantic tension in `[0, 2]`.
    pub delta_s: f64,
    /// Reasoning flow classification.
    pub direction: ReasoningDirection,
    /// Tool or capability that produced the step.
    pub module_used: String,
    /// Compressed summary of the step's result.
    pub insight: String,
    /// When the node was created.
    pub timestamp: DateTime<Utc>,
    /// Owning session.
    #[serde(default)]
    pub session_id: String,
    /// Reserved for project isolation; may be empty.
    #[serde(default)]
    pub project_id: String,
    /// Embedding vector, when one was computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f64>>,
    /// Preceding convergent node in the same session.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Small auxiliary facts (exit code, working directory, ...).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SemanticNode {
    /// Create a node with a fresh id and the current time.
    ///
    /// `delta_s` is clamped into `[0, 2]`; NaN is treated as maximal tension.
    pub fn new(
        topic: impl Into<String>,
        delta_s: f64,
        direction: ReasoningDirection,
        module_used: impl Into<String>,
        insight: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            delta_s: clamp_delta_s(delta_s),
            direction,
            module_used: module_used.into(),
            insight: insight.into(),
            timestamp: Utc::now(),
            session_id: String::new(),
            project_id: String::new(),
            embedding: None,
            parent_id: None,
            metadata: HashMap::new(),
        }
    }

    /// Set the session
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Set the project
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    /// Set the parent node
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set the parent node if there is one
    pub fn with_optional_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = parent_id;
        self
    }

    /// Attach an embedding
    pub fn with_embedding(mut self, embedding: Vec<f64>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Override the creation time
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Add one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Zone under the default thresholds.
    pub fn zone(&self) -> SemanticZone {
        classify_zone(self.delta_s, &ZoneThresholds::default())
    }

    /// Zone under a caller-chosen threshold set.
    pub fn zone_with(&self, thresholds: &ZoneThresholds) -> SemanticZone {
        classify_zone(self.delta_s, thresholds)
    }

    /// Text fed to the embedder for this node.
    pub fn embedding_text(&self) -> String {
        format!("{}: {}", self.topic, self.insight)
    }
}

pub(crate) fn clamp_delta_s(delta_s: f64) -> f64 {
    if delta_s.is_nan() {
        MAX_DELTA_S
    } else {
        delta_s.clamp(0.0, MAX_DELTA_S)
    }
}

/// Exported reasoning tree for a session (or for recent history).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTree {
    /// Export format version.
    pub version: String,
    /// When the export was produced.
    pub exported_at: DateTime<Utc>,
    /// Session filter, if any.
    pub session_id: Option<String>,
    /// Number of exported nodes.
    pub node_count: usize,
    /// Nodes in chronological order.
    pub nodes: Vec<SemanticNode>,
    /// Node count per zone name, every zone present.
    pub zone_summary: BTreeMap<String, usize>,
}

impl SessionTree {
    /// Build an export from chronologically ordered nodes.
    pub fn new(session_id: Option<String>, nodes: Vec<SemanticNode>) -> Self {
        let mut zone_summary: BTreeMap<String, usize> = SemanticZone::ALL
            .iter()
            .map(|z| (z.to_string(), 0))
            .collect();
        for node in &nodes {
            *zone_summary.entry(node.zone().to_string()).or_insert(0) += 1;
        }

        Self {
            version: "1.0".to_string(),
            exported_at: Utc::now(),
            session_id,
            node_count: nodes.len(),
            nodes,
            zone_summary,
        }
    }
}
