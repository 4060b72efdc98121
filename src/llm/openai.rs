//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{fresh_invocation_id, GatewayError, LlmClient, ModelTurn};
use crate::config::Config;
use crate::tools::ToolSchema;
use crate::transcript::{Role, ToolInvocationRequest, Turn};

/// Client for any service speaking the OpenAI chat-completions protocol.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    system_prompt: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            system_prompt: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        Self::new(
            config.api_key.clone(),
            config.base_url.clone(),
            config.default_model.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Prepend a system message to every request. It is not part of the
    /// transcript.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    fn build_request(&self, transcript: &[Turn], tools: &[ToolSchema]) -> ChatRequest {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(WireMessage {
                role: "system",
                content: Some(prompt.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }
        messages.extend(transcript.iter().map(render_turn));

        ChatRequest {
            model: self.model.clone(),
            messages,
            tools: tools
                .iter()
                .map(|t| WireTool {
                    tool_type: "function",
                    function: WireFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireToolCallFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCallFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

fn function_type() -> String {
    "function".to_string()
}

fn render_turn(turn: &Turn) -> WireMessage {
    match turn.role() {
        Role::User => WireMessage {
            role: "user",
            content: turn.content().map(str::to_string),
            tool_calls: None,
            tool_call_id: None,
        },
        Role::Assistant => {
            let calls: Vec<WireToolCall> = turn
                .pending_invocations()
                .iter()
                .map(|inv| WireToolCall {
                    id: Some(inv.invocation_id.clone()),
                    call_type: function_type(),
                    function: WireToolCallFunction {
                        name: inv.tool_name.clone(),
                        arguments: inv.arguments_payload.clone(),
                    },
                })
                .collect();
            WireMessage {
                role: "assistant",
                content: turn.content().map(str::to_string),
                tool_calls: (!calls.is_empty()).then_some(calls),
                tool_call_id: None,
            }
        }
        Role::ToolResult => WireMessage {
            role: "tool",
            content: turn.content().map(str::to_string),
            tool_calls: None,
            tool_call_id: turn.invocation_id().map(str::to_string),
        },
    }
}

/// Turn a raw chat-completions body into a [`ModelTurn`].
fn parse_response(body: &str) -> Result<ModelTurn, GatewayError> {
    let response: ChatResponse = serde_json::from_str(body).map_err(|e| {
        GatewayError::MalformedResponse(format!("{} - Response: {}", e, excerpt(body, 200)))
    })?;

    let message = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::MalformedResponse("response has no choices".to_string()))?
        .message;

    let calls = message.tool_calls.unwrap_or_default();
    if !calls.is_empty() {
        let requests = calls
            .into_iter()
            .map(|tc| {
                ToolInvocationRequest::new(
                    tc.id
                        .filter(|id| !id.is_empty())
                        .unwrap_or_else(fresh_invocation_id),
                    tc.function.name,
                    tc.function.arguments,
                )
            })
            .collect();
        return Ok(ModelTurn::ToolRequests {
            requests,
            text: message.content.filter(|c| !c.is_empty()),
        });
    }

    match message.content {
        Some(text) => Ok(ModelTurn::FinalAnswer { text }),
        None => Err(GatewayError::MalformedResponse(
            "message has neither content nor tool calls".to_string(),
        )),
    }
}

fn excerpt(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        transcript: &[Turn],
        tools: &[ToolSchema],
    ) -> Result<ModelTurn, GatewayError> {
        let request = self.build_request(transcript, tools);

        debug!(
            "Sending request to {}: {} messages, {} tools",
            self.model,
            request.messages.len(),
            request.tools.len()
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("HTTP error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Unavailable(format!(
                "API error {}: {}",
                status,
                excerpt(&body, 500)
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("Failed to read response: {}", e)))?;

        debug!("LLM response: {}", excerpt(&body, 500));

        let mut turn = parse_response(&body)?;
        turn.refresh_reused_ids(transcript);
        Ok(turn)
    }
}
