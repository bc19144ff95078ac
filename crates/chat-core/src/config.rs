use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::assistant::{AssistantConfig, DEFAULT_INSTRUCTIONS, TurnSettings};
use crate::config_env::{
    optional_trimmed_env, parse_u16_env, parse_u64_env, path_env, require_non_empty_env,
    string_env,
};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_BIND_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_ASSISTANT_NAME: &str = "Falafel Theory Assistant";
const DEFAULT_ASSISTANT_MODEL: &str = "gpt-4.1";
const DEFAULT_KNOWLEDGE_SOURCE: &str = "Falafel Theory Full Book.pdf";
const DEFAULT_RECORD_PATH: &str = "assistant.json";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_RUN_TIMEOUT_SECONDS: u64 = 120;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load .env file: {0}")]
    Dotenv(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_host: String,
    pub port: u16,
    pub log_format: LogFormat,
    pub openai: OpenAiConfig,
    pub assistant: AssistantConfig,
    pub assistant_record_path: PathBuf,
    pub turn: TurnSettings,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = string_env("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL);
        validate_base_url(&base_url)?;

        let instructions = match optional_trimmed_env("ASSISTANT_INSTRUCTIONS_FILE") {
            Some(path) => {
                let raw = fs::read_to_string(&path)
                    .map_err(|source| ConfigError::ReadFile { path, source })?;
                raw.trim().to_string()
            }
            None => DEFAULT_INSTRUCTIONS.to_string(),
        };
        if instructions.is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "assistant instructions must not be empty".to_string(),
            ));
        }

        let poll_interval_ms = parse_u64_env("CHAT_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;
        let run_timeout_seconds =
            parse_u64_env("CHAT_RUN_TIMEOUT_SECONDS", DEFAULT_RUN_TIMEOUT_SECONDS)?;
        if poll_interval_ms == 0 || run_timeout_seconds == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "CHAT_POLL_INTERVAL_MS and CHAT_RUN_TIMEOUT_SECONDS must be positive".to_string(),
            ));
        }

        Ok(Self {
            bind_host: string_env("BIND_HOST", DEFAULT_BIND_HOST),
            port: parse_u16_env("PORT", DEFAULT_PORT)?,
            log_format: parse_log_format(optional_trimmed_env("LOG_FORMAT").as_deref())?,
            openai: OpenAiConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key: require_non_empty_env("OPENAI_API_KEY")?,
                request_timeout_ms: parse_u64_env(
                    "OPENAI_REQUEST_TIMEOUT_MS",
                    DEFAULT_REQUEST_TIMEOUT_MS,
                )?,
            },
            assistant: AssistantConfig {
                name: string_env("ASSISTANT_NAME", DEFAULT_ASSISTANT_NAME),
                instructions,
                model: string_env("ASSISTANT_MODEL", DEFAULT_ASSISTANT_MODEL),
                knowledge_source_path: path_env(
                    "ASSISTANT_KNOWLEDGE_SOURCE",
                    DEFAULT_KNOWLEDGE_SOURCE,
                ),
            },
            assistant_record_path: path_env("ASSISTANT_RECORD_PATH", DEFAULT_RECORD_PATH),
            turn: TurnSettings {
                poll_interval: Duration::from_millis(poll_interval_ms),
                run_timeout: Duration::from_secs(run_timeout_seconds),
            },
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_host, self.port)
            .parse()
            .map_err(|_| {
                ConfigError::InvalidConfiguration(format!(
                    "BIND_HOST '{}' is not a valid IP address",
                    self.bind_host
                ))
            })
    }
}

/// Loads `.env` from the working directory or its ancestors. A missing file is not an error.
pub fn load_dotenv() -> Result<(), ConfigError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(ConfigError::Dotenv(err.to_string())),
    }
}

fn validate_base_url(base_url: &str) -> Result<(), ConfigError> {
    if base_url.starts_with("http://") || base_url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidConfiguration(
            "OPENAI_BASE_URL must start with http:// or https://".to_string(),
        ))
    }
}

fn parse_log_format(raw: Option<&str>) -> Result<LogFormat, ConfigError> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        None | Some("text") => Ok(LogFormat::Text),
        Some("json") => Ok(LogFormat::Json),
        Some(other) => Err(ConfigError::InvalidConfiguration(format!(
            "LOG_FORMAT must be text or json, got '{other}'"
        ))),
    }
}
