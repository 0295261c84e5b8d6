//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Inference server configuration
    pub inference: InferenceConfig,
    /// Persistence configuration
    pub storage: StorageConfig,
    /// Rendering and platform configuration
    pub presentation: PresentationConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Inference server configuration
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Base URL of the Ollama server, e.g. `http://localhost:11434`
    pub base_url: String,
    /// Timeout for a single inference call (in seconds)
    pub timeout_secs: u64,
    /// How long the server keeps the model loaded after a call
    pub keep_alive: String,
    /// Context window passed as `options.num_ctx`
    pub num_ctx: u32,
    /// Model used when a user has no history yet
    pub default_model: String,
}

impl InferenceConfig {
    /// Request timeout for inference calls
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Persistence configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to the SQLite history database
    pub db_path: String,
    /// Path to the newline-separated model list
    pub models_file: String,
}

/// Rendering and platform configuration
#[derive(Debug, Clone)]
pub struct PresentationConfig {
    /// Maximum characters per response page
    pub max_response_length: usize,
    /// Inactivity period after which a pager locks (in seconds)
    pub pager_idle_timeout_secs: u64,
    /// Base URL of the chat platform REST API
    pub platform_api_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 8080,
                host: "0.0.0.0".to_string(),
            },
            inference: InferenceConfig {
                base_url: "http://localhost:11434".to_string(),
                timeout_secs: 300,
                keep_alive: "24h".to_string(),
                num_ctx: 16384,
                default_model: "dolphin-mistral".to_string(),
            },
            storage: StorageConfig {
                db_path: "conversation_history.db".to_string(),
                models_file: "available_models.txt".to_string(),
            },
            presentation: PresentationConfig {
                max_response_length: 2048,
                pager_idle_timeout_secs: 900,
                platform_api_url: "https://discord.com/api/v10".to_string(),
            },
        }
    }
}

/// Read a variable and parse it, falling back when unset or malformed
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server: ServerConfig {
                port: env_or("PORT", defaults.server.port),
                host: env_or("HOST", defaults.server.host),
            },
            inference: InferenceConfig {
                base_url: env_or("OLLAMA_IP", defaults.inference.base_url)
                    .trim_end_matches('/')
                    .to_string(),
                timeout_secs: env_or("INFERENCE_TIMEOUT_SECS", defaults.inference.timeout_secs),
                keep_alive: env_or("OLLAMA_KEEP_ALIVE", defaults.inference.keep_alive),
                num_ctx: env_or("OLLAMA_NUM_CTX", defaults.inference.num_ctx),
                default_model: env_or("DEFAULT_MODEL", defaults.inference.default_model),
            },
            storage: StorageConfig {
                db_path: env_or("HISTORY_DB_PATH", defaults.storage.db_path),
                models_file: env_or("MODELS_FILE", defaults.storage.models_file),
            },
            presentation: PresentationConfig {
                max_response_length: env_or(
                    "MAX_RESPONSE_LENGTH",
                    defaults.presentation.max_response_length,
                ),
                pager_idle_timeout_secs: env_or(
                    "PAGER_IDLE_TIMEOUT_SECS",
                    defaults.presentation.pager_idle_timeout_secs,
                ),
                platform_api_url: env_or(
                    "PLATFORM_API_URL",
                    defaults.presentation.platform_api_url,
                ),
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Pager idle timeout as a `Duration`
    pub fn pager_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.presentation.pager_idle_timeout_secs)
    }
}
