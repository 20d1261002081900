//! Pre-tool-use tension check.
//!
//! Before a tool runs, the guard embeds a short description of the pending
//! call and measures its ΔS against the session's recent trajectory. The
//! resulting zone decides whether the call proceeds silently, proceeds with
//! a warning, or (when configured) is blocked.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::GuardConfig;
use crate::embedding::similarity::midpoint;
use crate::embedding::{compute_trajectory_embedding, cosine_similarity, semantic_tension, Embedder};
use crate::error::AppResult;
use crate::semantic::{HookContext, HookEvent, HookResult, SemanticNode, SemanticZone};
use crate::storage::{session_scope, NodeStore};

const INPUT_PREVIEW_CHARS: usize = 500;
const PROMPT_PREVIEW_CHARS: usize = 300;

/// Minimum similarity to the midpoint for a bridge candidate.
const BRIDGE_MIN_SIMILARITY: f64 = 0.3;
/// A bridge must sit this close to the midpoint relative to either endpoint.
const BRIDGE_MIDPOINT_RATIO: f64 = 0.8;

/// Measures ΔS for pending tool calls.
pub struct SemanticGuard {
    store: Arc<dyn NodeStore>,
    embedder: Arc<dyn Embedder>,
    config: GuardConfig,
}

impl SemanticGuard {
    /// Create a guard over a store and the embedder that produced its vectors
    pub fn new(store: Arc<dyn NodeStore>, embedder: Arc<dyn Embedder>, config: GuardConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Decide on a pending tool call.
    ///
    /// Non pre-tool-use events are allowed untouched. Embedding failures
    /// never block; the call is allowed without comment.
    pub async fn check(&self, context: &HookContext) -> AppResult<HookResult> {
        if context.event != HookEvent::PreToolUse {
            return Ok(HookResult::allow());
        }

        let text = build_context_text(context);
        if text.is_empty() {
            return Ok(HookResult::allow());
        }

        let current = match self.embedder.embed(&text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(session_id = %context.session_id, error = %e, "Guard embedding failed");
                return Ok(HookResult::allow());
            }
        };

        let recent = self
            .store
            .get_recent(
                self.config.trajectory_window,
                session_scope(&context.session_id),
                true,
            )
            .await?;
        if recent.is_empty() {
            return Ok(HookResult::allow()
                .with_message("No trajectory history - proceeding without ΔS check"));
        }

        let history: Vec<Vec<f64>> = recent
            .into_iter()
            .rev()
            .filter_map(|n| n.embedding)
            .collect();
        if history.is_empty() {
            return Ok(HookResult::allow());
        }

        let expected = compute_trajectory_embedding(&history, None)?;
        let delta_s = semantic_tension(&current, &expected);
        let zone = self.config.thresholds.classify(delta_s);
        debug!(
            session_id = %context.session_id,
            tool = %context.tool(),
            delta_s,
            zone = %zone,
            "Tension measured"
        );

        Ok(self.handle_zone(context, &text, delta_s, zone).await)
    }

    async fn handle_zone(
        &self,
        context: &HookContext,
        text: &str,
        delta_s: f64,
        zone: SemanticZone,
    ) -> HookResult {
        match zone {
            SemanticZone::Safe => HookResult::allow(),
            SemanticZone::Transitional => {
                HookResult::allow().with_message(format!("ΔS={:.3} (transitional zone)", delta_s))
            }
            SemanticZone::Risk => {
                let mut result = HookResult::allow().with_message(format!(
                    "ΔS={:.3} (risk zone) - approaching unknown territory",
                    delta_s
                ));
                if self.config.inject_bridge_context {
                    if let Some(tool) = &context.tool_name {
                        let bridges = self.bridges_or_none(text, tool, 2).await;
                        if let Some(topics) = bridges.filter(|b| !b.is_empty()).map(topic_list) {
                            result = result.with_context(format!(
                                "Consider connecting through these related concepts: {}",
                                topics
                            ));
                        }
                    }
                }
                result
            }
            SemanticZone::Danger if self.config.block_in_danger => {
                match self.bridges_or_none(text, context.tool(), 3).await {
                    Some(bridges) if bridges.is_empty() => {
                        warn!(session_id = %context.session_id, delta_s, "Blocking tool call");
                        HookResult::blocked(format!(
                            "BLOCKED: ΔS={:.3} (danger zone) - no bridge to known territory. Request clarification.",
                            delta_s
                        ))
                    }
                    Some(bridges) => HookResult::allow()
                        .with_message(format!(
                            "ΔS={:.3} (danger zone) - high hallucination risk, but bridge found",
                            delta_s
                        ))
                        .with_context(format!(
                            "CAUTION: You're entering unfamiliar territory. Consider grounding through: {}",
                            topic_list(bridges)
                        )),
                    None => danger_warning(delta_s),
                }
            }
            SemanticZone::Danger => danger_warning(delta_s),
        }
    }

    /// Stored nodes that sit between two topics in embedding space.
    ///
    /// Candidates are the nodes nearest the midpoint of the two topic
    /// embeddings; a candidate is kept when its similarity to the midpoint
    /// exceeds 0.8 times its similarity to the closer endpoint.
    pub async fn find_bridge(
        &self,
        current_topic: &str,
        target_topic: &str,
        top_k: usize,
    ) -> AppResult<Vec<SemanticNode>> {
        let current = self.embedder.embed(current_topic).await?;
        let target = self.embedder.embed(target_topic).await?;
        let mid = midpoint(&current, &target);

        let candidates = self
            .store
            .find_similar(&mid, top_k.saturating_mul(2), BRIDGE_MIN_SIMILARITY)
            .await?;

        let bridges = candidates
            .into_iter()
            .filter(|(node, sim_to_mid)| {
                node.embedding.as_deref().is_some_and(|embedding| {
                    let nearest = cosine_similarity(embedding, &current)
                        .max(cosine_similarity(embedding, &target));
                    *sim_to_mid > nearest * BRIDGE_MIDPOINT_RATIO
                })
            })
            .map(|(node, _)| node)
            .take(top_k)
            .collect();

        Ok(bridges)
    }

    async fn bridges_or_none(
        &self,
        current_topic: &str,
        target_topic: &str,
        top_k: usize,
    ) -> Option<Vec<SemanticNode>> {
        match self.find_bridge(current_topic, target_topic, top_k).await {
            Ok(bridges) => Some(bridges),
            Err(e) => {
                warn!(error = %e, "Bridge search failed");
                None
            }
        }
    }
}

fn danger_warning(delta_s: f64) -> HookResult {
    HookResult::allow()
        .with_message(format!(
            "ΔS={:.3} (danger zone) - high hallucination risk. Proceed with caution.",
            delta_s
        ))
        .with_context(
            "WARNING: You're entering unfamiliar territory with no clear connection to prior \
             context. Consider asking for clarification or explicitly noting uncertainty.",
        )
}

fn topic_list(nodes: Vec<SemanticNode>) -> String {
    nodes
        .into_iter()
        .map(|n| n.topic)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `Tool: … | Input: … | Prompt: …`, each part present only when known.
pub(crate) fn build_context_text(context: &HookContext) -> String {
    let mut parts = Vec::new();

    if let Some(tool) = &context.tool_name {
        parts.push(format!("Tool: {}", tool));
    }
    if let Some(input) = context.tool_input.as_ref().filter(|m| !m.is_empty()) {
        let rendered = serde_json::Value::Object(input.clone()).to_string();
        let preview = if rendered.chars().count() > INPUT_PREVIEW_CHARS {
            let head: String = rendered.chars().take(INPUT_PREVIEW_CHARS).collect();
            format!("{}...", head)
        } else {
            rendered
        };
        parts.push(format!("Input: {}", preview));
    }
    if let Some(prompt) = context.prompt.as_deref().filter(|p| !p.is_empty()) {
        let preview: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
        parts.push(format!("Prompt: {}", preview));
    }

    parts.join(" | ")
}
