//! User settings record and its persistence.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};
use crate::storage::{self, KeyValueStore, SETTINGS_KEY};

/// Prefix every Groq API key starts with.
pub const API_KEY_PREFIX: &str = "gsk_";
/// Keys must be strictly longer than this.
pub const API_KEY_MIN_LEN: usize = 20;

/// Default completion model (vision capable).
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

/// Basic format check for an API key.
#[must_use]
pub fn validate_api_key(key: &str) -> bool {
    key.starts_with(API_KEY_PREFIX) && key.chars().count() > API_KEY_MIN_LEN
}

/// UI and response language.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Czech (default).
    #[default]
    Czech,
    /// English.
    English,
}

impl Language {
    /// Resource code of the localization file.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Czech => "cs",
            Self::English => "en",
        }
    }

    /// Resolve a language from either its name or its resource code.
    #[must_use]
    pub fn from_name(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "czech" | "cs" => Some(Self::Czech),
            "english" | "en" => Some(Self::English),
            _ => None,
        }
    }

    /// System instruction that pins the model to this language.
    #[must_use]
    pub const fn system_prompt(self) -> &'static str {
        match self {
            Self::English => {
                "You are a helpful AI assistant with vision support. You MUST respond ONLY in English, regardless of the user's input language. You can analyze images and answer questions in English."
            }
            Self::Czech => {
                "Jsi užitečný AI asistent s podporou vision. MUSÍŠ odpovídat VÝHRADNĚ v češtině, bez ohledu na jazyk vstupu uživatele. Můžeš analyzovat obrázky a odpovídat na otázky v češtině."
            }
        }
    }
}

/// Transcript font size preference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontSize {
    /// Compact text.
    Small,
    /// Default size.
    #[default]
    Normal,
    /// Large text.
    Big,
}

impl FontSize {
    /// Parse the stored name.
    #[must_use]
    pub fn from_name(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "small" => Some(Self::Small),
            "normal" => Some(Self::Normal),
            "big" => Some(Self::Big),
            _ => None,
        }
    }
}

/// Process-wide settings record.
///
/// Stored keys use the browser client's camelCase names; any key missing
/// from storage falls back to its default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Bearer credential for the completion API.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum completion tokens.
    pub max_tokens: u32,
    /// Transcript font size.
    pub font_size: FontSize,
    /// UI and response language.
    pub language: Language,
    /// Whether chats are persisted between sessions.
    pub save_history: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 1.0,
            max_tokens: 1024,
            font_size: FontSize::Normal,
            language: Language::Czech,
            save_history: true,
        }
    }
}

impl Settings {
    /// Validate value ranges.
    ///
    /// The API key is not checked here: an empty key may be
    /// saved, it only blocks sending.
    ///
    /// # Errors
    /// Returns an error if any value is out of range.
    pub fn validate(&self) -> ChatResult<()> {
        if self.model.trim().is_empty() {
            return Err(ChatError::Validation("model must not be empty".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ChatError::Validation(format!(
                "temperature must be within 0..=2, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(ChatError::Validation(
                "max_tokens must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the stored key passes the format check.
    #[must_use]
    pub fn has_valid_api_key(&self) -> bool {
        validate_api_key(&self.api_key)
    }
}

/// What changed during a [`SettingsStore::save`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SettingsChange {
    /// The UI language differs from the previous value.
    pub language_changed: bool,
    /// The API key differs from the previous value.
    pub api_key_changed: bool,
    /// The history toggle differs from the previous value.
    pub history_changed: bool,
}

/// Settings holder with load/save against local storage.
pub struct SettingsStore {
    current: Settings,
    storage: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    /// Load settings, merging stored values over defaults.
    ///
    /// A malformed stored record is logged and replaced by defaults.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn load(storage: Arc<dyn KeyValueStore>) -> ChatResult<Self> {
        let current = match storage::get_json::<Settings>(storage.as_ref(), SETTINGS_KEY).await {
            Ok(Some(settings)) => settings,
            Ok(None) => Settings::default(),
            Err(storage::StorageError::Serialization(err)) => {
                tracing::warn!("Ignoring malformed stored settings: {err}");
                Settings::default()
            }
            Err(err) => return Err(err.into()),
        };
        tracing::debug!(
            language = ?current.language,
            model = %current.model,
            history = current.save_history,
            "Settings loaded"
        );
        Ok(Self { current, storage })
    }

    /// Current settings snapshot.
    #[must_use]
    pub const fn current(&self) -> &Settings {
        &self.current
    }

    /// Replace the settings record and persist it.
    ///
    /// # Errors
    /// Returns an error if validation or storage access fails; on error the
    /// previous settings stay in effect.
    pub async fn save(&mut self, next: Settings) -> ChatResult<SettingsChange> {
        next.validate()?;
        storage::set_json(self.storage.as_ref(), SETTINGS_KEY, &next).await?;

        let change = SettingsChange {
            language_changed: next.language != self.current.language,
            api_key_changed: next.api_key != self.current.api_key,
            history_changed: next.save_history != self.current.save_history,
        };
        self.current = next;
        tracing::info!(?change, "Settings saved");
        Ok(change)
    }
}
