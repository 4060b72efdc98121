//! # Tool Agent
//!
//! A minimal conversational agent that lets a language model call local
//! tools.
//!
//! This library provides:
//! - An append-only conversation [`transcript`]
//! - A [`tools`] registry with JSON-schema described capabilities
//! - A model gateway contract with an OpenAI-compatible client ([`llm`])
//! - The orchestration loop driving model/tool round trips ([`agent`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tool_agent::{agent::{LoopConfig, Session}, llm::OpenAiClient, tools::ToolRegistry, Config};
//!
//! let config = Config::from_env()?;
//! let llm = Arc::new(OpenAiClient::from_config(&config)?);
//! let mut session = Session::new(llm, Arc::new(ToolRegistry::with_defaults()), LoopConfig::from_config(&config));
//! let outcome = session.handle_input("What is the weather in Greece?").await?;
//! ```

pub mod agent;
pub mod config;
pub mod llm;
pub mod tools;
pub mod transcript;

pub use config::Config;
