//! Tool Agent - interactive command-line entry point.
//!
//! Reads one message per line from stdin and prints the model's answers
//! together with the tool calls made on the way.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tool_agent::agent::{
    build_system_prompt, ActivityKind, LoopConfig, Session, TurnOutcome,
};
use tool_agent::llm::OpenAiClient;
use tool_agent::tools::ToolRegistry;
use tool_agent::Config;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PROMPT: &str = "Send a message to the LLM... ";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tool_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: model={}, max_hops={:?}",
        config.default_model, config.max_hops
    );

    let tools = Arc::new(ToolRegistry::with_defaults());
    let system_prompt = config
        .system_prompt
        .clone()
        .unwrap_or_else(|| build_system_prompt(&tools));
    let llm = Arc::new(OpenAiClient::from_config(&config)?.with_system_prompt(system_prompt));

    let mut session = Session::new(llm, tools, LoopConfig::from_config(&config));

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout.write_all(PROMPT.as_bytes()).await?;
        stdout.flush().await?;

        // End of input counts as quitting.
        let input = lines.next_line().await?.unwrap_or_else(|| "quit".to_string());

        if !session.is_quit(&input) {
            println!("User: {}", input.trim_end());
        }

        let result = session.handle_input(&input).await;
        if matches!(result, Ok(TurnOutcome::Terminated)) {
            break;
        }

        for entry in session.drain_activity() {
            match entry.kind {
                ActivityKind::ToolCall
                | ActivityKind::ToolResult
                | ActivityKind::ToolError
                | ActivityKind::Thinking => println!("{}", entry.content),
                ActivityKind::Response | ActivityKind::Error => {}
            }
        }

        match result {
            Ok(TurnOutcome::Answer(text)) => println!("AI: {}", text),
            Ok(TurnOutcome::Terminated) => break,
            Err(e) => println!("Error: {}", e),
        }
    }

    if config.dump_transcript {
        println!(
            "messages: {}",
            serde_json::to_string_pretty(session.transcript())?
        );
    }

    Ok(())
}
