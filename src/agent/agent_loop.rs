//! Core agent loop implementation.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{Config, DEFAULT_MAX_HOPS};
use crate::llm::{GatewayError, LlmClient, ModelTurn};
use crate::tools::ToolRegistry;
use crate::transcript::{ToolInvocationRequest, Transcript, TranscriptError};

use super::activity::{truncate_for_log, ActivityEntry, ActivityKind};

/// Where a session currently is in its conversation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next line from the user
    AwaitingUserInput,
    /// A model request is in flight
    ModelPending,
    /// Tool requests from the latest assistant turn are being run
    ToolsPending,
    /// The user quit; no further input is accepted
    Terminated,
}

/// Loop behaviour knobs.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum tool hops per user message (`None` = unbounded)
    pub max_hops: Option<usize>,

    /// Inputs that end the session
    pub quit_commands: Vec<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_hops: Some(DEFAULT_MAX_HOPS),
            quit_commands: vec!["quit".to_string(), "q".to_string()],
        }
    }
}

impl LoopConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_hops: config.max_hops,
            ..Self::default()
        }
    }
}

/// How a user message was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered
    Answer(String),
    /// The input was a quit command
    Terminated,
}

/// Errors that end the current user turn. The session stays usable.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("No final answer after {max_hops} tool hops; giving up on this message")]
    RunawayLoopExceeded { max_hops: usize },

    #[error("Session has already terminated")]
    SessionTerminated,

    #[error("Transcript rejected a tool result: {0}")]
    Transcript(#[from] TranscriptError),
}

/// One conversation with the model: owns the transcript and drives the
/// model/tool round trips for each user message.
pub struct Session {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    config: LoopConfig,
    transcript: Transcript,
    state: SessionState,
    activity: Vec<ActivityEntry>,
}

impl Session {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<ToolRegistry>, config: LoopConfig) -> Self {
        Self {
            llm,
            tools,
            config,
            transcript: Transcript::new(),
            state: SessionState::AwaitingUserInput,
            activity: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Take the activity recorded since the last drain.
    pub fn drain_activity(&mut self) -> Vec<ActivityEntry> {
        std::mem::take(&mut self.activity)
    }

    /// Whether `input` is one of the configured quit commands.
    pub fn is_quit(&self, input: &str) -> bool {
        let input = input.trim();
        self.config.quit_commands.iter().any(|q| q == input)
    }

    /// Process one line of user input to completion, including every
    /// model/tool round trip it triggers.
    pub async fn handle_input(&mut self, input: &str) -> Result<TurnOutcome, TurnError> {
        if self.state == SessionState::Terminated {
            return Err(TurnError::SessionTerminated);
        }

        if self.is_quit(input) {
            info!("Session terminated after {} turns", self.transcript.len());
            self.state = SessionState::Terminated;
            return Ok(TurnOutcome::Terminated);
        }

        self.transcript.push_user(input);
        info!("User message accepted ({} turns)", self.transcript.len());

        let result = self.run_turn().await;
        self.state = SessionState::AwaitingUserInput;

        if let Err(e) = &result {
            error!("Turn failed: {}", e);
            self.activity
                .push(ActivityEntry::now(ActivityKind::Error, e.to_string()));
        }
        result
    }

    async fn run_turn(&mut self) -> Result<TurnOutcome, TurnError> {
        let schemas = self.tools.schemas();
        let mut hops = 0usize;

        loop {
            self.state = SessionState::ModelPending;
            debug!("Calling model (hop {})", hops);

            let mut turn = self.llm.complete(self.transcript.turns(), &schemas).await?;
            turn.refresh_reused_ids(self.transcript.turns());

            match turn {
                ModelTurn::FinalAnswer { text } => {
                    self.transcript
                        .push_assistant(Some(text.clone()), Vec::new())
                        .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
                    self.activity.push(ActivityEntry::now(
                        ActivityKind::Response,
                        truncate_for_log(&text, 2000),
                    ));
                    return Ok(TurnOutcome::Answer(text));
                }
                ModelTurn::ToolRequests { requests, text } => {
                    if requests.is_empty() {
                        return Err(GatewayError::MalformedResponse(
                            "tool request batch is empty".to_string(),
                        )
                        .into());
                    }
                    if let Some(max_hops) = self.config.max_hops {
                        if hops >= max_hops {
                            warn!("Hop limit ({}) reached, dropping further tool requests", max_hops);
                            return Err(TurnError::RunawayLoopExceeded { max_hops });
                        }
                    }
                    hops += 1;

                    self.transcript
                        .push_assistant(text.clone(), requests.clone())
                        .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
                    if let Some(text) = text {
                        self.activity
                            .push(ActivityEntry::now(ActivityKind::Thinking, text));
                    }

                    self.state = SessionState::ToolsPending;
                    self.run_tools(&requests).await?;
                }
            }
        }
    }

    /// Run a batch sequentially, appending one tool-result turn per request
    /// in the order the model issued them.
    async fn run_tools(&mut self, requests: &[ToolInvocationRequest]) -> Result<(), TurnError> {
        for request in requests {
            info!(
                "Calling tool: {} with args: {}",
                request.tool_name, request.arguments_payload
            );
            self.activity.push(ActivityEntry::now(
                ActivityKind::ToolCall,
                format!(
                    "Calling function: {} with arguments: {}",
                    request.tool_name, request.arguments_payload
                ),
            ));

            let (kind, content) = match self
                .tools
                .invoke(&request.tool_name, &request.arguments_payload)
                .await
            {
                Ok(output) => (ActivityKind::ToolResult, output),
                Err(e) => {
                    warn!("Tool {} failed: {}", request.tool_name, e);
                    (ActivityKind::ToolError, e.to_tool_content())
                }
            };

            self.activity.push(ActivityEntry::now(
                kind,
                format!(
                    "Ran {} with arguments {} for a result of {}",
                    request.tool_name,
                    request.arguments_payload,
                    truncate_for_log(&content, 1000)
                ),
            ));
            self.transcript
                .push_tool_result(&request.invocation_id, content)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedClient;
    use crate::transcript::Role;
    use tokio_test::{assert_err, assert_ok};

    fn weather_call(id: &str, city: &str) -> ToolInvocationRequest {
        ToolInvocationRequest::new(id, "get_weather", format!(r#"{{"city":"{}"}}"#, city))
    }

    fn session(client: Arc<ScriptedClient>, config: LoopConfig) -> Session {
        Session::new(client, Arc::new(ToolRegistry::with_defaults()), config)
    }

    fn answer(text: &str) -> Result<ModelTurn, GatewayError> {
        Ok(ModelTurn::FinalAnswer {
            text: text.to_string(),
        })
    }

    fn requests(calls: Vec<ToolInvocationRequest>) -> Result<ModelTurn, GatewayError> {
        Ok(ModelTurn::ToolRequests {
            requests: calls,
            text: None,
        })
    }

    #[tokio::test]
    async fn weather_question_runs_one_tool_hop() {
        let client = Arc::new(ScriptedClient::new(vec![
            requests(vec![weather_call("call_1", "Greece")]),
            answer("It's 33°C in Greece."),
        ]));
        let mut session = session(client.clone(), LoopConfig::default());

        let outcome = assert_ok!(session.handle_input("What is the weather in Greece?").await);
        assert_eq!(outcome, TurnOutcome::Answer("It's 33°C in Greece.".to_string()));
        assert_eq!(session.state(), SessionState::AwaitingUserInput);

        let turns = session.transcript().turns();
        let roles: Vec<Role> = turns.iter().map(|t| t.role()).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::ToolResult, Role::Assistant]
        );
        assert_eq!(turns[1].content(), None);
        assert_eq!(turns[1].pending_invocations().len(), 1);
        assert_eq!(turns[2].invocation_id(), Some("call_1"));
        assert_eq!(
            turns[2].content(),
            Some("The weather in Greece is 33 degrees celsius.")
        );
        assert_eq!(turns[3].content(), Some("It's 33°C in Greece."));

        // The second model call already saw the tool result.
        let seen = client.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].len(), 1);
        assert_eq!(seen[1].len(), 3);

        let kinds: Vec<ActivityKind> = session.drain_activity().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ActivityKind::ToolCall, ActivityKind::ToolResult, ActivityKind::Response]
        );
        assert!(session.drain_activity().is_empty());
    }

    #[tokio::test]
    async fn quit_terminates_without_new_turns() {
        let client = Arc::new(ScriptedClient::new(Vec::new()));
        let mut session = session(client.clone(), LoopConfig::default());

        let outcome = assert_ok!(session.handle_input("quit").await);
        assert_eq!(outcome, TurnOutcome::Terminated);
        assert_eq!(session.state(), SessionState::Terminated);
        assert!(session.transcript().is_empty());
        assert_eq!(client.calls(), 0);

        let err = assert_err!(session.handle_input("hello?").await);
        assert!(matches!(err, TurnError::SessionTerminated));
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn short_quit_command_with_whitespace() {
        let client = Arc::new(ScriptedClient::new(Vec::new()));
        let mut session = session(client, LoopConfig::default());
        assert_eq!(
            assert_ok!(session.handle_input("  q\n").await),
            TurnOutcome::Terminated
        );
    }

    #[tokio::test]
    async fn unknown_tool_becomes_tool_result_and_loop_continues() {
        let client = Arc::new(ScriptedClient::new(vec![
            requests(vec![ToolInvocationRequest::new(
                "call_1",
                "get_stock_price",
                r#"{"symbol":"ACME"}"#,
            )]),
            answer("I can't look up stock prices."),
        ]));
        let mut session = session(client.clone(), LoopConfig::default());

        let outcome = assert_ok!(session.handle_input("Price of ACME?").await);
        assert_eq!(
            outcome,
            TurnOutcome::Answer("I can't look up stock prices.".to_string())
        );
        assert_eq!(client.calls(), 2);

        let result = &session.transcript().turns()[2];
        assert_eq!(result.role(), Role::ToolResult);
        assert!(result.content().unwrap_or_default().contains("UnknownTool"));
    }

    #[tokio::test]
    async fn malformed_arguments_are_reported_to_the_model() {
        let client = Arc::new(ScriptedClient::new(vec![
            requests(vec![ToolInvocationRequest::new("call_1", "get_weather", "{city")]),
            answer("Sorry."),
        ]));
        let mut session = session(client, LoopConfig::default());

        assert_ok!(session.handle_input("weather?").await);
        let result = &session.transcript().turns()[2];
        assert!(result
            .content()
            .unwrap_or_default()
            .starts_with("Error (MalformedArguments)"));
        assert!(session
            .drain_activity()
            .iter()
            .any(|e| e.kind == ActivityKind::ToolError));
    }

    #[tokio::test]
    async fn gateway_failure_leaves_transcript_untouched() {
        let client = Arc::new(ScriptedClient::new(vec![
            Err(GatewayError::Unavailable("connection refused".to_string())),
            answer("Back online."),
        ]));
        let mut session = session(client, LoopConfig::default());

        let err = assert_err!(session.handle_input("hello").await);
        assert!(matches!(err, TurnError::Gateway(GatewayError::Unavailable(_))));
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.state(), SessionState::AwaitingUserInput);

        let outcome = assert_ok!(session.handle_input("hello again").await);
        assert_eq!(outcome, TurnOutcome::Answer("Back online.".to_string()));
        assert_eq!(session.transcript().len(), 3);
    }

    #[tokio::test]
    async fn gateway_failure_mid_chain_keeps_resolved_tool_results() {
        let client = Arc::new(ScriptedClient::new(vec![
            requests(vec![weather_call("call_1", "Oslo")]),
            Err(GatewayError::MalformedResponse("garbage".to_string())),
        ]));
        let mut session = session(client, LoopConfig::default());

        let err = assert_err!(session.handle_input("Oslo?").await);
        assert!(matches!(err, TurnError::Gateway(GatewayError::MalformedResponse(_))));
        assert_eq!(session.transcript().len(), 3);
        assert!(!session.transcript().has_pending());
    }

    #[tokio::test]
    async fn looping_model_stops_at_hop_limit() {
        let client = Arc::new(ScriptedClient::looping("get_weather", r#"{"city":"Rome"}"#));
        let config = LoopConfig {
            max_hops: Some(3),
            ..LoopConfig::default()
        };
        let mut session = session(client.clone(), config);

        let err = assert_err!(session.handle_input("Rome?").await);
        assert!(matches!(err, TurnError::RunawayLoopExceeded { max_hops: 3 }));
        assert_eq!(client.calls(), 4);
        // user + 3 x (assistant, tool result); the fourth request is dropped
        assert_eq!(session.transcript().len(), 7);
        assert!(!session.transcript().has_pending());
        assert_eq!(session.state(), SessionState::AwaitingUserInput);
        assert_eq!(
            session.drain_activity().last().map(|e| e.kind),
            Some(ActivityKind::Error)
        );
    }

    #[tokio::test]
    async fn multi_tool_batch_preserves_request_order() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(ModelTurn::ToolRequests {
                requests: vec![
                    weather_call("b", "Berlin"),
                    weather_call("a", "Athens"),
                    weather_call("c", "Cairo"),
                ],
                text: Some("Checking three cities.".to_string()),
            }),
            requests(vec![weather_call("d", "Dublin")]),
            answer("All warm."),
        ]));
        let mut session = session(client, LoopConfig::default());

        assert_ok!(session.handle_input("Compare cities").await);

        let turns = session.transcript().turns();
        assert_eq!(turns[1].content(), Some("Checking three cities."));
        let expected: Vec<&str> = turns[1]
            .pending_invocations()
            .iter()
            .map(|inv| inv.invocation_id.as_str())
            .collect();
        let resolved: Vec<&str> = turns[2..5]
            .iter()
            .filter_map(|t| t.invocation_id())
            .collect();
        assert_eq!(expected, resolved);
        assert_eq!(turns[5].role(), Role::Assistant);
        assert_eq!(turns[6].invocation_id(), Some("d"));
        assert_eq!(turns.len(), 8);
    }

    #[tokio::test]
    async fn ids_reused_across_steps_do_not_break_the_chain() {
        let client = Arc::new(ScriptedClient::new(vec![
            requests(vec![weather_call("call_0", "Oslo")]),
            requests(vec![weather_call("call_0", "Rome")]),
            answer("Oslo is cold, Rome is warm."),
        ]));
        let mut session = session(client.clone(), LoopConfig::default());

        let outcome = assert_ok!(session.handle_input("two cities").await);
        assert_eq!(
            outcome,
            TurnOutcome::Answer("Oslo is cold, Rome is warm.".to_string())
        );
        assert_eq!(client.calls(), 3);

        let turns = session.transcript().turns();
        assert_eq!(turns.len(), 6);
        let second_id = turns[3].pending_invocations()[0].invocation_id.clone();
        assert_ne!(second_id, "call_0");
        assert_eq!(turns[2].invocation_id(), Some("call_0"));
        assert_eq!(turns[4].invocation_id(), Some(second_id.as_str()));
    }

    #[tokio::test]
    async fn duplicate_invocation_ids_are_a_malformed_response() {
        let client = Arc::new(ScriptedClient::new(vec![requests(vec![
            weather_call("same", "Lima"),
            weather_call("same", "Quito"),
        ])]));
        let mut session = session(client, LoopConfig::default());

        let err = assert_err!(session.handle_input("weather").await);
        assert!(matches!(err, TurnError::Gateway(GatewayError::MalformedResponse(_))));
        assert_eq!(session.transcript().len(), 1);
    }

    #[tokio::test]
    async fn final_answer_runs_no_tools() {
        let client = Arc::new(ScriptedClient::new(vec![answer("Hi there.")]));
        let mut session = session(client.clone(), LoopConfig::default());

        assert_ok!(session.handle_input("hello").await);
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(client.calls(), 1);
        let kinds: Vec<ActivityKind> = session.drain_activity().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ActivityKind::Response]);
    }

    #[tokio::test]
    async fn unbounded_hops_when_cap_disabled() {
        let mut script: Vec<_> = (0..40)
            .map(|i| requests(vec![weather_call(&format!("call_{}", i), "Paris")]))
            .collect();
        script.push(answer("Done."));
        let client = Arc::new(ScriptedClient::new(script));
        let config = LoopConfig {
            max_hops: None,
            ..LoopConfig::default()
        };
        let mut session = session(client.clone(), config);

        let outcome = assert_ok!(session.handle_input("Paris, repeatedly").await);
        assert_eq!(outcome, TurnOutcome::Answer("Done.".to_string()));
        assert_eq!(client.calls(), 41);
    }
}
