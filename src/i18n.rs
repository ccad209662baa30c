//! Localized UI strings.
//!
//! Each language has one JSON resource mapping dotted keys (`app.newChatTitle`)
//! to display strings. Lookups never fail: a missing key resolves to the key
//! itself.

use std::path::Path;

use serde_json::Value;

use crate::settings::Language;

/// Language used when a resource cannot be loaded.
pub const DEFAULT_LANGUAGE: Language = Language::Czech;

const BUNDLED_CS: &str = include_str!("../locales/cs.json");
const BUNDLED_EN: &str = include_str!("../locales/en.json");

/// Key → string resolver for one language.
#[derive(Clone, Debug)]
pub struct Localizer {
    language: Language,
    translations: Value,
}

impl Localizer {
    /// Resolver with no translations (every key resolves to itself).
    #[must_use]
    pub const fn empty(language: Language) -> Self {
        Self {
            language,
            translations: Value::Null,
        }
    }

    /// Resolver over the resources compiled into the binary.
    #[must_use]
    pub fn bundled(language: Language) -> Self {
        let raw = match language {
            Language::Czech => BUNDLED_CS,
            Language::English => BUNDLED_EN,
        };
        match serde_json::from_str(raw) {
            Ok(translations) => Self {
                language,
                translations,
            },
            Err(err) => {
                tracing::error!("Bundled locale {} is malformed: {err}", language.code());
                Self::empty(language)
            }
        }
    }

    /// Load `{dir}/{code}.json`, falling back to the default language and
    /// finally to an empty resolver.
    pub async fn load(dir: &Path, language: Language) -> Self {
        match read_resource(dir, language).await {
            Ok(translations) => Self {
                language,
                translations,
            },
            Err(err) => {
                tracing::warn!(
                    "Failed to load {}.json from {}: {err}",
                    language.code(),
                    dir.display()
                );
                if language == DEFAULT_LANGUAGE {
                    return Self::empty(language);
                }
                match read_resource(dir, DEFAULT_LANGUAGE).await {
                    Ok(translations) => Self {
                        language: DEFAULT_LANGUAGE,
                        translations,
                    },
                    Err(err) => {
                        tracing::warn!("Default locale unavailable as well: {err}");
                        Self::empty(DEFAULT_LANGUAGE)
                    }
                }
            }
        }
    }

    /// Load from `dir` when given, otherwise use the bundled resources.
    pub async fn resolve(dir: Option<&Path>, language: Language) -> Self {
        match dir {
            Some(dir) => Self::load(dir, language).await,
            None => Self::bundled(language),
        }
    }

    /// Language whose resource is loaded.
    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }

    /// Resolve a dotted key.
    #[must_use]
    pub fn t(&self, key: &str) -> String {
        let mut value = &self.translations;
        for part in key.split('.') {
            match value.get(part) {
                Some(next) => value = next,
                None => return key.to_string(),
            }
        }
        match value.as_str() {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => key.to_string(),
        }
    }
}

async fn read_resource(dir: &Path, language: Language) -> Result<Value, std::io::Error> {
    let path = dir.join(format!("{}.json", language.code()));
    let raw = tokio::fs::read_to_string(&path).await?;
    serde_json::from_str(&raw).map_err(std::io::Error::other)
}
