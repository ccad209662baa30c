//! Application configuration.
//!
//! Values come from defaults overridden by environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `GROQ_CHAT_DATA_DIR` | [`AppConfig::data_dir`] |
//! | `GROQ_CHAT_API_URL` | [`ApiConfig::base_url`] |
//! | `GROQ_CHAT_LOCALES_DIR` | [`AppConfig::locales_dir`] |
//! | `GROQ_CHAT_API_KEY` | [`AppConfig::api_key_seed`] |

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::attachments::MAX_ATTACHMENT_BYTES;
use crate::error::{ChatError, ChatResult};
use crate::pipeline::RetryPolicy;

/// Default OpenAI-compatible endpoint base.
pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1";
/// Database file created inside the data directory.
pub const DATABASE_FILE: &str = "groq-chat.sqlite";

/// Environment variable names.
pub mod env_keys {
    /// Data directory.
    pub const DATA_DIR: &str = "GROQ_CHAT_DATA_DIR";
    /// API base URL.
    pub const API_URL: &str = "GROQ_CHAT_API_URL";
    /// Localization resource directory.
    pub const LOCALES_DIR: &str = "GROQ_CHAT_LOCALES_DIR";
    /// API key used when none is stored.
    pub const API_KEY: &str = "GROQ_CHAT_API_KEY";
}

/// Top-level configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the local database.
    pub data_dir: PathBuf,
    /// Directory with `{code}.json` resources; bundled copies when unset.
    pub locales_dir: Option<PathBuf>,
    /// API key applied when the stored settings have none.
    #[serde(skip)]
    pub api_key_seed: Option<String>,
    /// HTTP settings.
    pub api: ApiConfig,
    /// Send pipeline settings.
    pub pipeline: PipelineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            locales_dir: None,
            api_key_seed: None,
            api: ApiConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Defaults overridden by the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by `lookup(name)` for each known variable.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut config = Self::default();
        if let Some(dir) = read(env_keys::DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = read(env_keys::API_URL) {
            config.api.base_url = url;
        }
        config.locales_dir = read(env_keys::LOCALES_DIR).map(PathBuf::from);
        config.api_key_seed = read(env_keys::API_KEY);
        config
    }

    /// Set the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the localization directory.
    #[must_use]
    pub fn with_locales_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.locales_dir = Some(dir.into());
        self
    }

    /// Set the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api.base_url = url.into();
        self
    }

    /// Path of the database file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ChatResult<()> {
        Url::parse(&self.api.base_url)?;

        if self.api.request_timeout.is_zero() {
            return Err(ChatError::InvalidConfig(
                "api.request_timeout must be > 0".to_string(),
            ));
        }
        if self.api.connect_timeout.is_zero() {
            return Err(ChatError::InvalidConfig(
                "api.connect_timeout must be > 0".to_string(),
            ));
        }
        self.pipeline.validate()
    }
}

/// HTTP client settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Endpoint base; `/chat/completions` is appended.
    pub base_url: String,
    /// Deadline for whole (non-streamed) requests.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Connection timeout.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Send pipeline settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum interval between accepted sends.
    #[serde(with = "duration_ms")]
    pub cooldown: Duration,
    /// Number of trailing chat messages sent as context.
    pub history_window: usize,
    /// Retry policy for failed requests.
    pub retry: RetryPolicy,
    /// Attachment size ceiling in bytes.
    pub max_attachment_bytes: u64,
    /// Whether replies are streamed by default.
    pub streaming: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(1000),
            history_window: 16,
            retry: RetryPolicy::default(),
            max_attachment_bytes: MAX_ATTACHMENT_BYTES,
            streaming: true,
        }
    }
}

impl PipelineConfig {
    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range.
    pub fn validate(&self) -> ChatResult<()> {
        if self.history_window == 0 {
            return Err(ChatError::InvalidConfig(
                "pipeline.history_window must be > 0".to_string(),
            ));
        }
        if self.max_attachment_bytes == 0 {
            return Err(ChatError::InvalidConfig(
                "pipeline.max_attachment_bytes must be > 0".to_string(),
            ));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(ChatError::InvalidConfig(
                "pipeline.retry.base_delay must not exceed max_delay".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("groq-chat")
}

/// Serde module for Duration serialization (whole seconds).
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde module for Duration serialization (milliseconds).
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
