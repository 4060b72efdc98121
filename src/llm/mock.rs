//! Scripted gateway for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{GatewayError, LlmClient, ModelTurn};
use crate::tools::ToolSchema;
use crate::transcript::{ToolInvocationRequest, Turn};

/// Replays queued responses in order; once the queue is empty, repeats
/// `fallback` if set.
#[derive(Default)]
pub(crate) struct ScriptedClient {
    script: Mutex<VecDeque<Result<ModelTurn, GatewayError>>>,
    fallback: Option<ModelTurn>,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedClient {
    pub(crate) fn new(script: Vec<Result<ModelTurn, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// A model stuck requesting the same tool forever.
    pub(crate) fn looping(tool_name: &str, arguments: &str) -> Self {
        Self {
            fallback: Some(ModelTurn::ToolRequests {
                requests: vec![ToolInvocationRequest::new("loop", tool_name, arguments)],
                text: None,
            }),
            ..Self::default()
        }
    }

    /// Transcript snapshots received, one per call.
    pub(crate) fn seen(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(
        &self,
        transcript: &[Turn],
        _tools: &[ToolSchema],
    ) -> Result<ModelTurn, GatewayError> {
        let call = {
            let mut seen = self.seen.lock().unwrap();
            seen.push(transcript.to_vec());
            seen.len()
        };

        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }

        match &self.fallback {
            // Fresh ids per call so the transcript accepts every batch.
            Some(ModelTurn::ToolRequests { requests, text }) => Ok(ModelTurn::ToolRequests {
                requests: requests
                    .iter()
                    .map(|r| {
                        ToolInvocationRequest::new(
                            format!("{}_{}", r.invocation_id, call),
                            r.tool_name.clone(),
                            r.arguments_payload.clone(),
                        )
                    })
                    .collect(),
                text: text.clone(),
            }),
            Some(other) => Ok(other.clone()),
            None => Err(GatewayError::Unavailable("script exhausted".to_string())),
        }
    }
}
