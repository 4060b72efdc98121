//! Model gateway: the boundary to the language-model service.
//!
//! The loop only ever sees [`ModelTurn`] values. How the transcript is
//! rendered on the wire, and how long a request may take, is up to each
//! [`LlmClient`] implementation.

mod openai;

#[cfg(test)]
pub(crate) mod mock;

pub use openai::OpenAiClient;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::tools::ToolSchema;
use crate::transcript::{ToolInvocationRequest, Turn};

/// What the model decided to do with the transcript it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelTurn {
    /// Natural-language answer for the user.
    FinalAnswer { text: String },
    /// One or more tool invocations, with optional commentary.
    ToolRequests {
        requests: Vec<ToolInvocationRequest>,
        text: Option<String>,
    },
}

impl ModelTurn {
    /// Give requests whose id already appears earlier in `transcript` a
    /// fresh id. Some backends number calls per response, so `call_0`
    /// comes back on every step. Ids repeated inside this response are
    /// left alone and still rejected by the transcript.
    pub fn refresh_reused_ids(&mut self, transcript: &[Turn]) {
        let ModelTurn::ToolRequests { requests, .. } = self else {
            return;
        };

        let used: HashSet<&str> = transcript
            .iter()
            .flat_map(|t| t.pending_invocations())
            .map(|inv| inv.invocation_id.as_str())
            .collect();
        if used.is_empty() {
            return;
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for req in requests.iter() {
            *counts.entry(req.invocation_id.clone()).or_default() += 1;
        }

        for req in requests.iter_mut() {
            if counts[&req.invocation_id] == 1 && used.contains(req.invocation_id.as_str()) {
                let fresh = fresh_invocation_id();
                debug!("Reassigning reused invocation id {} -> {}", req.invocation_id, fresh);
                req.invocation_id = fresh;
            }
        }
    }
}

/// New `call_<uuid>` invocation id.
pub fn fresh_invocation_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Gateway failures. Both are fatal to the current user turn.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Model service unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

/// Request/response contract with a language model.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Ask the model for its next turn given the full transcript and the
    /// tools it may call.
    async fn complete(
        &self,
        transcript: &[Turn],
        tools: &[ToolSchema],
    ) -> Result<ModelTurn, GatewayError>;
}
