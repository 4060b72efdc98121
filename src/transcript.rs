//! Conversation transcript.
//!
//! The transcript is an append-only log of turns. It is owned by a single
//! [`Session`](crate::agent::Session) and handed to the model gateway as a
//! read-only slice on every request.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Text typed by the human
    User,
    /// Model output, either an answer or a batch of tool requests
    Assistant,
    /// Outcome of one tool invocation
    ToolResult,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    /// Correlates the request with its eventual tool-result turn
    pub invocation_id: String,

    /// Name of the tool in the registry
    pub tool_name: String,

    /// Serialized JSON arguments, exactly as the model produced them
    pub arguments_payload: String,
}

impl ToolInvocationRequest {
    pub fn new(
        invocation_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments_payload: impl Into<String>,
    ) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            tool_name: tool_name.into(),
            arguments_payload: arguments_payload.into(),
        }
    }
}

/// One immutable entry in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,

    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pending_invocations: Vec<ToolInvocationRequest>,

    #[serde(skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
}

impl Turn {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Tool requests carried by an assistant turn (empty for other roles).
    pub fn pending_invocations(&self) -> &[ToolInvocationRequest] {
        &self.pending_invocations
    }

    /// For tool-result turns, the invocation this result answers.
    pub fn invocation_id(&self) -> Option<&str> {
        self.invocation_id.as_deref()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("Invocation id '{0}' is already used in this transcript")]
    DuplicateInvocationId(String),

    #[error("Assistant turn carries neither text nor tool requests")]
    EmptyAssistantTurn,

    #[error("No pending invocation with id '{0}'")]
    NoPendingInvocation(String),

    #[error("Invocation '{expected}' must be resolved before '{got}'")]
    OutOfOrderResult { expected: String, got: String },
}

/// Ordered, append-only conversation log.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::User,
            content: Some(content.into()),
            pending_invocations: Vec::new(),
            invocation_id: None,
        });
    }

    /// Append an assistant turn.
    ///
    /// Commentary and tool requests may both be present; at least one must
    /// be. Invocation ids must be unique across the whole transcript.
    pub fn push_assistant(
        &mut self,
        content: Option<String>,
        invocations: Vec<ToolInvocationRequest>,
    ) -> Result<(), TranscriptError> {
        if content.is_none() && invocations.is_empty() {
            return Err(TranscriptError::EmptyAssistantTurn);
        }

        let mut seen: HashSet<&str> = self
            .turns
            .iter()
            .flat_map(|t| t.pending_invocations.iter())
            .map(|inv| inv.invocation_id.as_str())
            .collect();
        for inv in &invocations {
            if !seen.insert(inv.invocation_id.as_str()) {
                return Err(TranscriptError::DuplicateInvocationId(
                    inv.invocation_id.clone(),
                ));
            }
        }

        self.turns.push(Turn {
            role: Role::Assistant,
            content,
            pending_invocations: invocations,
            invocation_id: None,
        });
        Ok(())
    }

    /// Append the result of the next unresolved invocation of the latest
    /// assistant turn. Results must arrive in request order.
    pub fn push_tool_result(
        &mut self,
        invocation_id: &str,
        content: impl Into<String>,
    ) -> Result<(), TranscriptError> {
        match self.unresolved_invocations().first() {
            Some(next) if next.invocation_id == invocation_id => {}
            Some(next) => {
                let pending = self
                    .unresolved_invocations()
                    .iter()
                    .any(|inv| inv.invocation_id == invocation_id);
                return Err(if pending {
                    TranscriptError::OutOfOrderResult {
                        expected: next.invocation_id.clone(),
                        got: invocation_id.to_string(),
                    }
                } else {
                    TranscriptError::NoPendingInvocation(invocation_id.to_string())
                });
            }
            None => {
                return Err(TranscriptError::NoPendingInvocation(
                    invocation_id.to_string(),
                ))
            }
        }

        self.turns.push(Turn {
            role: Role::ToolResult,
            content: Some(content.into()),
            pending_invocations: Vec::new(),
            invocation_id: Some(invocation_id.to_string()),
        });
        Ok(())
    }

    /// Invocations of the latest assistant turn that have no result yet,
    /// in request order.
    pub fn unresolved_invocations(&self) -> &[ToolInvocationRequest] {
        let Some(pos) = self.turns.iter().rposition(|t| t.role == Role::Assistant) else {
            return &[];
        };
        let resolved = self.turns[pos + 1..]
            .iter()
            .take_while(|t| t.role == Role::ToolResult)
            .count();
        let invocations = &self.turns[pos].pending_invocations;
        if resolved >= invocations.len() || pos + 1 + resolved != self.turns.len() {
            return &[];
        }
        &invocations[resolved..]
    }

    /// True while the latest assistant turn still waits on tool results.
    pub fn has_pending(&self) -> bool {
        !self.unresolved_invocations().is_empty()
    }
}
