//! Post-tool-use recorder.
//!
//! Turns each completed tool call into a [`SemanticNode`] and links it into
//! the session's reasoning tree. Each session has an implicit current parent:
//! a convergent node becomes the parent of whatever is recorded next, while
//! divergent and recursive nodes leave it unchanged.

use serde_json::json;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::RecorderConfig;
use crate::embedding::{compute_trajectory_embedding, semantic_tension, Embedder};
use crate::error::AppResult;
use crate::semantic::{
    clamp_delta_s, HookContext, HookEvent, HookResult, ReasoningDirection, SemanticNode,
    SessionTree,
};
use crate::storage::{session_scope, NodeStore};

/// Tool input keys tried in order when naming a node's topic, with an
/// optional character cap on the value.
const TOPIC_KEYS: [(&str, Option<usize>); 4] = [
    ("file_path", None),
    ("path", None),
    ("command", Some(50)),
    ("query", Some(50)),
];

const ELLIPSIS: &str = "...";

/// Why an event was deliberately not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Successful step with almost no output.
    ShortSuccess,
    /// Tool is on the low-value list.
    TrivialTool,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::ShortSuccess => write!(f, "short successful result"),
            SkipReason::TrivialTool => write!(f, "trivial tool"),
        }
    }
}

/// What [`SemanticRecorder::record`] did with an event.
///
/// Failures are reported through the `Err` side of the result, so a skip is
/// never confused with a store that could not be written.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// Not a post-tool-use event.
    Ignored,
    /// Filtered as noise.
    Skipped(SkipReason),
    /// Stored.
    Recorded {
        /// The persisted node.
        node: SemanticNode,
        /// One-line human-readable summary.
        summary: String,
    },
}

impl RecordOutcome {
    /// The recorded node, if any
    pub fn node(&self) -> Option<&SemanticNode> {
        match self {
            RecordOutcome::Recorded { node, .. } => Some(node),
            _ => None,
        }
    }
}

impl From<RecordOutcome> for HookResult {
    fn from(outcome: RecordOutcome) -> Self {
        match outcome {
            RecordOutcome::Ignored | RecordOutcome::Skipped(_) => HookResult::allow(),
            RecordOutcome::Recorded { node, summary } => {
                HookResult::allow().with_message(summary).with_node(node)
            }
        }
    }
}

/// Records tool calls as reasoning nodes, tracking a current parent per session.
///
/// At most `max_tracked_sessions` parents are held; the least recently
/// active session is dropped first and its next node starts a new root.
pub struct SemanticRecorder {
    store: Arc<dyn NodeStore>,
    embedder: Option<Arc<dyn Embedder>>,
    config: RecorderConfig,
    parents: Mutex<LruCache<String, String>>,
}

impl SemanticRecorder {
    /// Create a recorder without an embedder; nodes are stored without vectors.
    pub fn new(store: Arc<dyn NodeStore>, config: RecorderConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_tracked_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            embedder: None,
            config,
            parents: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Embed every recorded node's `"<topic>: <insight>"` text
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Current parent node of a session
    pub async fn current_parent(&self, session_id: &str) -> Option<String> {
        self.parents.lock().await.get(session_id).cloned()
    }

    /// Forget any parent left over for this session.
    pub async fn start_session(&self, session_id: &str) {
        self.parents.lock().await.pop(session_id);
        info!(session_id = %session_id, "Session started");
    }

    /// Export the session's tree and reset its parent.
    pub async fn end_session(&self, session_id: &str) -> AppResult<SessionTree> {
        let tree = self.store.export_tree(Some(session_id)).await?;
        self.parents.lock().await.pop(session_id);
        info!(
            session_id = %session_id,
            node_count = tree.node_count,
            "Session ended"
        );
        Ok(tree)
    }

    /// Record a completed tool call.
    ///
    /// `delta_s` is the caller's pre-computed tension. When it is absent the
    /// recorder computes it from the session's recent trajectory if it can,
    /// and otherwise stores `0.0`; metadata key `delta_s_source` says which
    /// (`"caller"`, `"computed"` or `"default"`). `force` bypasses the
    /// triviality filter.
    pub async fn record(
        &self,
        context: &HookContext,
        delta_s: Option<f64>,
        force: bool,
    ) -> AppResult<RecordOutcome> {
        if context.event != HookEvent::PostToolUse {
            return Ok(RecordOutcome::Ignored);
        }

        let direction = infer_direction(context.exit_code);
        let topic = extract_topic(context);
        let insight = compress_insight(
            context.tool_result.as_deref(),
            context.tool(),
            self.config.insight_limit,
        );

        if !force {
            if let Some(reason) = self.skip_reason(context, &insight) {
                debug!(
                    session_id = %context.session_id,
                    tool = %context.tool(),
                    reason = %reason,
                    "Skipping trivial step"
                );
                return Ok(RecordOutcome::Skipped(reason));
            }
        }

        let parent_id = self.current_parent(&context.session_id).await;
        let mut node = SemanticNode::new(topic, 0.0, direction, context.tool(), insight)
            .with_session(context.session_id.clone())
            .with_optional_parent(parent_id)
            .with_metadata("exit_code", json!(context.exit_code))
            .with_metadata("working_directory", json!(context.working_directory));

        if let Some(embedder) = &self.embedder {
            match embedder.embed(&node.embedding_text()).await {
                Ok(embedding) => node.embedding = Some(embedding),
                Err(e) => warn!(
                    session_id = %context.session_id,
                    error = %e,
                    "Embedding failed, recording node without vector"
                ),
            }
        }

        let (value, source) = match delta_s {
            Some(value) => (clamp_delta_s(value), "caller"),
            None => match self.tension_from_history(&node).await? {
                Some(value) => (value, "computed"),
                None => {
                    warn!(
                        session_id = %context.session_id,
                        topic = %node.topic,
                        "No ΔS supplied and none computable, storing 0.0"
                    );
                    (0.0, "default")
                }
            },
        };
        node.delta_s = value;
        node.metadata.insert("delta_s_source".to_string(), json!(source));

        self.store.add_node(&node).await?;

        if direction == ReasoningDirection::Convergent {
            self.parents
                .lock()
                .await
                .put(context.session_id.clone(), node.id.clone());
        }

        let summary = format!(
            "Recorded: {} (ΔS={:.3}, {})",
            node.topic,
            node.delta_s,
            direction.symbol()
        );
        info!(
            node_id = %node.id,
            session_id = %node.session_id,
            delta_s = node.delta_s,
            direction = %direction,
            "Node recorded"
        );

        Ok(RecordOutcome::Recorded { node, summary })
    }

    fn skip_reason(&self, context: &HookContext, insight: &str) -> Option<SkipReason> {
        if insight.chars().count() < self.config.min_insight_len && context.exit_code == Some(0) {
            return Some(SkipReason::ShortSuccess);
        }
        let tool = context.tool_name.as_deref()?;
        self.config
            .trivial_tools
            .iter()
            .any(|t| t.eq_ignore_ascii_case(tool))
            .then_some(SkipReason::TrivialTool)
    }

    /// ΔS of `node` against the session's recent trajectory, when both exist.
    async fn tension_from_history(&self, node: &SemanticNode) -> AppResult<Option<f64>> {
        let Some(current) = &node.embedding else {
            return Ok(None);
        };
        if self.config.trajectory_window == 0 {
            return Ok(None);
        }

        let recent = self
            .store
            .get_recent(
                self.config.trajectory_window,
                session_scope(&node.session_id),
                true,
            )
            .await?;
        // Newest first from the store; the trajectory wants oldest first.
        let history: Vec<Vec<f64>> = recent
            .into_iter()
            .rev()
            .filter_map(|n| n.embedding)
            .collect();
        if history.is_empty() {
            return Ok(None);
        }

        match compute_trajectory_embedding(&history, None) {
            Ok(expected) => Ok(Some(semantic_tension(current, &expected))),
            Err(e) => {
                warn!(session_id = %node.session_id, error = %e, "Unusable trajectory history");
                Ok(None)
            }
        }
    }
}

/// Coarse outcome heuristic: success or no code is convergent, exit code 1
/// divergent, anything else recursive. It does not look at content.
pub fn infer_direction(exit_code: Option<i64>) -> ReasoningDirection {
    match exit_code {
        None | Some(0) => ReasoningDirection::Convergent,
        Some(1) => ReasoningDirection::Divergent,
        Some(_) => ReasoningDirection::Recursive,
    }
}

/// Tool name plus its most salient argument, e.g. `"Read: /src/main.rs"`.
pub fn extract_topic(context: &HookContext) -> String {
    let tool = context.tool();
    let Some(input) = &context.tool_input else {
        return tool.to_string();
    };

    TOPIC_KEYS
        .iter()
        .find_map(|(key, cap)| {
            let value = input.get(*key)?;
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let text = match cap {
                Some(cap) => text.chars().take(*cap).collect(),
                None => text,
            };
            Some(format!("{}: {}", tool, text))
        })
        .unwrap_or_else(|| tool.to_string())
}

/// Bounded preview of a tool result, never longer than `limit` characters.
///
/// Long multi-line output keeps its first and last two lines when that fits;
/// otherwise the head and tail of the text are joined by an ellipsis.
pub fn compress_insight(result: Option<&str>, tool: &str, limit: usize) -> String {
    let text = match result {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => format!("Executed {}", tool),
    };
    if text.chars().count() <= limit {
        return text;
    }

    let lines: Vec<&str> = text.lines().collect();
    if lines.len() > 5 {
        let n = lines.len();
        let preview = [lines[0], lines[1], ELLIPSIS, lines[n - 2], lines[n - 1]].join("\n");
        if preview.chars().count() <= limit {
            return preview;
        }
    }

    head_tail(&text, limit)
}

fn head_tail(text: &str, limit: usize) -> String {
    let marker = ELLIPSIS.chars().count();
    if limit <= marker {
        return text.chars().take(limit).collect();
    }

    let chars: Vec<char> = text.chars().collect();
    let budget = limit - marker;
    let head = budget - budget / 2;
    let tail = budget / 2;

    let mut out: String = chars[..head].iter().collect();
    out.push_str(ELLIPSIS);
    out.extend(&chars[chars.len() - tail..]);
    out
}
