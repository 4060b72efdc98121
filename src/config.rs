//! Configuration management for the tool agent.
//!
//! Configuration can be set via environment variables:
//! - `OPENAI_API_KEY` - Required. API key for the model service.
//! - `OPENAI_BASE_URL` - Optional. OpenAI-compatible endpoint. Defaults to `https://api.openai.com/v1`.
//! - `DEFAULT_MODEL` - Optional. The model to use. Defaults to `gpt-4o-mini`.
//! - `REQUEST_TIMEOUT_SECS` - Optional. Model request timeout. Defaults to `120`.
//! - `MAX_HOPS` - Optional. Maximum tool round trips per user message. Defaults to `25`;
//!   `unlimited` removes the cap.
//! - `SYSTEM_PROMPT` - Optional. Replaces the generated system prompt.
//! - `DUMP_TRANSCRIPT` - Optional. Print the transcript as JSON on quit. Defaults to `false`.

use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAX_HOPS: usize = 25;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the model service
    pub api_key: String,

    /// Base URL of the OpenAI-compatible service
    pub base_url: String,

    /// Model identifier
    pub default_model: String,

    /// Per-request timeout for the model service
    pub request_timeout_secs: u64,

    /// Maximum tool hops per user message (`None` = unbounded)
    pub max_hops: Option<usize>,

    /// System prompt override
    pub system_prompt: Option<String>,

    /// Print the transcript when the session ends
    pub dump_transcript: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENAI_API_KEY` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;

        let base_url = lookup("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let default_model = lookup("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let request_timeout_secs = lookup("REQUEST_TIMEOUT_SECS")
            .map(|v| {
                v.trim().parse::<u64>().map_err(|e| {
                    ConfigError::InvalidValue("REQUEST_TIMEOUT_SECS".to_string(), format!("{}", e))
                })
            })
            .transpose()?
            .unwrap_or(120);

        let max_hops = match lookup("MAX_HOPS") {
            None => Some(DEFAULT_MAX_HOPS),
            Some(v) => parse_hops(&v)
                .map_err(|e| ConfigError::InvalidValue("MAX_HOPS".to_string(), e))?,
        };

        let system_prompt = lookup("SYSTEM_PROMPT").filter(|v| !v.trim().is_empty());

        let dump_transcript = lookup("DUMP_TRANSCRIPT")
            .map(|v| {
                parse_bool(&v)
                    .map_err(|e| ConfigError::InvalidValue("DUMP_TRANSCRIPT".to_string(), e))
            })
            .transpose()?
            .unwrap_or(false);

        Ok(Self {
            api_key,
            base_url,
            default_model,
            request_timeout_secs,
            max_hops,
            system_prompt,
            dump_transcript,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, default_model: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model,
            request_timeout_secs: 120,
            max_hops: Some(DEFAULT_MAX_HOPS),
            system_prompt: None,
            dump_transcript: false,
        }
    }
}

fn parse_hops(value: &str) -> Result<Option<usize>, String> {
    match value.trim().to_lowercase().as_str() {
        "unlimited" | "none" => Ok(None),
        other => match other.parse::<usize>() {
            Ok(0) => Err("must be at least 1 (use 'unlimited' to disable the cap)".to_string()),
            Ok(n) => Ok(Some(n)),
            Err(e) => Err(format!("{}", e)),
        },
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}
