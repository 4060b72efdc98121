//! Per-session activity log of tool calls and answers.

use serde::Serialize;

/// A single entry in the activity log.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    /// Timestamp (RFC 3339)
    pub timestamp: String,

    /// Entry type
    pub kind: ActivityKind,

    /// Content of the entry
    pub content: String,
}

/// Types of activity entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Model commentary attached to a tool batch
    Thinking,
    /// Tool is being called
    ToolCall,
    /// Tool returned a result
    ToolResult,
    /// Tool returned a structured failure
    ToolError,
    /// Model produced a final answer
    Response,
    /// The turn ended with an error
    Error,
}

impl ActivityEntry {
    pub fn now(kind: ActivityKind, content: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            kind,
            content: content.into(),
        }
    }
}

/// Truncate a string for display purposes.
pub fn truncate_for_log(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((idx, _)) => format!("{}... [truncated]", &s[..idx]),
    }
}
