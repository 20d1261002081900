use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SemanticNode;

/// Host lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    /// A session begins.
    SessionStart,
    /// A session ends.
    SessionEnd,
    /// A tool is about to run.
    PreToolUse,
    /// A tool has finished.
    PostToolUse,
    /// The agent produced a response.
    PostResponse,
    /// The user submitted a prompt.
    #[serde(rename = "UserPromptSubmit")]
    UserPrompt,
    /// The conversation is about to be compacted.
    PreCompact,
    /// Host notification.
    Notification,
    /// The agent stopped.
    Stop,
    /// A subagent started.
    SubagentStart,
    /// A permission prompt is pending.
    PermissionRequest,
}

impl HookEvent {
    /// Name the host uses for this event.
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::SessionStart => "SessionStart",
            HookEvent::SessionEnd => "SessionEnd",
            HookEvent::PreToolUse => "PreToolUse",
            HookEvent::PostToolUse => "PostToolUse",
            HookEvent::PostResponse => "PostResponse",
            HookEvent::UserPrompt => "UserPromptSubmit",
            HookEvent::PreCompact => "PreCompact",
            HookEvent::Notification => "Notification",
            HookEvent::Stop => "Stop",
            HookEvent::SubagentStart => "SubagentStart",
            HookEvent::PermissionRequest => "PermissionRequest",
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HookEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SessionStart" => Ok(HookEvent::SessionStart),
            "SessionEnd" => Ok(HookEvent::SessionEnd),
            "PreToolUse" => Ok(HookEvent::PreToolUse),
            "PostToolUse" => Ok(HookEvent::PostToolUse),
            "PostResponse" => Ok(HookEvent::PostResponse),
            "UserPromptSubmit" => Ok(HookEvent::UserPrompt),
            "PreCompact" => Ok(HookEvent::PreCompact),
            "Notification" => Ok(HookEvent::Notification),
            "Stop" => Ok(HookEvent::Stop),
            "SubagentStart" => Ok(HookEvent::SubagentStart),
            "PermissionRequest" => Ok(HookEvent::PermissionRequest),
            _ => Err(format!("Unknown hook event: {}", s)),
        }
    }
}

/// One event delivered by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HookContext {
    /// Event kind.
    pub event: HookEvent,
    /// Session the event belongs to.
    pub session_id: String,
    /// Tool involved, for tool events.
    pub tool_name: Option<String>,
    /// Tool arguments.
    pub tool_input: Option<serde_json::Map<String, serde_json::Value>>,
    /// Tool output text.
    pub tool_result: Option<String>,
    /// Tool exit status, when it has one.
    pub exit_code: Option<i64>,
    /// User prompt, for prompt events.
    pub prompt: Option<String>,
    /// Host working directory.
    pub working_directory: Option<String>,
    /// When the event was received.
    pub timestamp: DateTime<Utc>,
}

/// Wire shape of the host's event payload.
#[derive(Debug, Deserialize)]
struct HookPayload {
    session_id: Option<String>,
    tool_name: Option<String>,
    tool_input: Option<serde_json::Value>,
    tool_result: Option<serde_json::Value>,
    exit_code: Option<i64>,
    prompt: Option<String>,
    cwd: Option<String>,
}

impl HookContext {
    /// Create an empty context for an event
    pub fn new(event: HookEvent, session_id: impl Into<String>) -> Self {
        Self {
            event,
            session_id: session_id.into(),
            tool_name: None,
            tool_input: None,
            tool_result: None,
            exit_code: None,
            prompt: None,
            working_directory: None,
            timestamp: Utc::now(),
        }
    }

    /// Parse the host's JSON payload for `event`.
    ///
    /// A non-object `tool_input` is dropped; a non-string `tool_result` is
    /// kept as its JSON text.
    pub fn from_hook_json(
        value: serde_json::Value,
        event: HookEvent,
    ) -> Result<Self, serde_json::Error> {
        let payload: HookPayload = serde_json::from_value(value)?;

        let tool_input = match payload.tool_input {
            Some(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        };
        let tool_result = payload.tool_result.and_then(|v| match v {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        });

        Ok(Self {
            event,
            session_id: payload.session_id.unwrap_or_default(),
            tool_name: payload.tool_name,
            tool_input,
            tool_result,
            exit_code: payload.exit_code,
            prompt: payload.prompt,
            working_directory: payload.cwd,
            timestamp: Utc::now(),
        })
    }

    /// Set the tool name and its input arguments
    pub fn with_tool(
        mut self,
        tool_name: impl Into<String>,
        tool_input: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        self.tool_name = Some(tool_name.into());
        self.tool_input = Some(tool_input);
        self
    }

    /// Set the tool's textual result
    pub fn with_result(mut self, tool_result: impl Into<String>) -> Self {
        self.tool_result = Some(tool_result.into());
        self
    }

    /// Set the process exit code
    pub fn with_exit_code(mut self, exit_code: i64) -> Self {
        self.exit_code = Some(exit_code);
        self
    }

    /// Set the user prompt
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Set the working directory
    pub fn with_working_directory(mut self, cwd: impl Into<String>) -> Self {
        self.working_directory = Some(cwd.into());
        self
    }

    /// Tool name, or `"unknown"`.
    pub fn tool(&self) -> &str {
        self.tool_name.as_deref().unwrap_or("unknown")
    }
}

/// Answer returned to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HookResult {
    /// Let the action proceed.
    pub allow: bool,
    /// Stop the action.
    pub block: bool,
    /// Shown to the user.
    pub message: Option<String>,
    /// Injected into the agent's context.
    pub additional_context: Option<String>,
    /// Node recorded for this event.
    pub node: Option<SemanticNode>,
}

impl Default for HookResult {
    fn default() -> Self {
        Self::allow()
    }
}

impl HookResult {
    /// Allow without comment
    pub fn allow() -> Self {
        Self {
            allow: true,
            block: false,
            message: None,
            additional_context: None,
            node: None,
        }
    }

    /// Block the pending action
    pub fn blocked(message: impl Into<String>) -> Self {
        Self {
            allow: false,
            block: true,
            message: Some(message.into()),
            additional_context: None,
            node: None,
        }
    }

    /// Attach a message for the host to display
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach context to inject into the agent
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.additional_context = Some(context.into());
        self
    }

    /// Attach the recorded node
    pub fn with_node(mut self, node: SemanticNode) -> Self {
        self.node = Some(node);
        self
    }

    /// Process exit code expected by the host: 0 allow, 1 error, 2 block.
    pub fn exit_code(&self) -> i32 {
        if self.block {
            2
        } else if !self.allow {
            1
        } else {
            0
        }
    }

    /// JSON body written back to the host.
    pub fn to_hook_json(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        if let Some(message) = &self.message {
            out.insert("message".to_string(), message.clone().into());
        }
        if let Some(context) = &self.additional_context {
            out.insert("additionalContext".to_string(), context.clone().into());
        }
        serde_json::Value::Object(out)
    }
}
