use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
const DEFAULT_OPENAI_WS_URL: &str = "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview";
const DEFAULT_GEMINI_WS_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
const DEFAULT_JOB_QUEUE_URL: &str = "http://127.0.0.1:8500";
const DEFAULT_JOB_QUEUE_TIMEOUT_SECS: u64 = 10;

/// The realtime voice provider the voicebot is bridged to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "gemini" => Ok(Provider::Gemini),
            other => Err(format!("'{other}' is not a supported provider (openai, gemini)")),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub provider: Provider,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_ws_url: String,
    /// The API key is appended as a `key` query parameter when connecting.
    pub gemini_ws_url: String,
    /// Base URL of the diagram job queue, without a trailing slash.
    pub job_queue_url: String,
    /// Bound on enqueue and status requests to the job queue.
    pub job_queue_timeout: Duration,
    pub tts_model: String,
    pub tts_voice: String,
    pub log_level: Level,
    pub prompts_path: PathBuf,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = var_or(name, default);
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("'{raw}': {e}")))
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address: SocketAddr = parse_var("BIND_ADDRESS", DEFAULT_BIND_ADDRESS)?;
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let provider: Provider = parse_var("REALTIME_PROVIDER", "openai")?;

        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok();
        // Narration speech always goes through OpenAI, whichever realtime provider is used.
        if openai_api_key.is_none() {
            let reason = match provider {
                Provider::OpenAI => "OPENAI_API_KEY must be set for 'openai' provider",
                Provider::Gemini => "OPENAI_API_KEY must be set for narration speech",
            };
            return Err(ConfigError::MissingVar(reason.to_string()));
        }
        if provider == Provider::Gemini && gemini_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "GEMINI_API_KEY must be set for 'gemini' provider".to_string(),
            ));
        }

        let job_queue_url = var_or("JOB_QUEUE_URL", DEFAULT_JOB_QUEUE_URL)
            .trim_end_matches('/')
            .to_string();
        let timeout_secs: u64 = parse_var(
            "JOB_QUEUE_TIMEOUT_SECS",
            &DEFAULT_JOB_QUEUE_TIMEOUT_SECS.to_string(),
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "JOB_QUEUE_TIMEOUT_SECS".to_string(),
                "must be at least 1 second".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            database_url,
            provider,
            openai_api_key,
            gemini_api_key,
            openai_ws_url: var_or("OPENAI_WS_URL", DEFAULT_OPENAI_WS_URL),
            gemini_ws_url: var_or("GEMINI_WS_URL", DEFAULT_GEMINI_WS_URL),
            job_queue_url,
            job_queue_timeout: Duration::from_secs(timeout_secs),
            tts_model: var_or("TTS_MODEL", "gpt-4o-mini-tts"),
            tts_voice: var_or("TTS_VOICE", "shimmer"),
            log_level: parse_var("RUST_LOG", "INFO")?,
            prompts_path: PathBuf::from(var_or("PROMPTS_PATH", "./prompts")),
        })
    }
}
