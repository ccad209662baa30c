//! Parsing of terminal input lines.

use std::path::PathBuf;

use thiserror::Error;

use crate::settings::{FontSize, Language, Settings};

/// Errors produced while parsing a command line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The command name is not known.
    #[error("unknown command /{0}, type /help")]
    Unknown(String),

    /// A required argument is missing.
    #[error("/{command} needs {what}")]
    MissingArgument {
        /// Command name.
        command: &'static str,
        /// Description of the missing argument.
        what: &'static str,
    },

    /// An argument could not be parsed.
    #[error("invalid value for {field}: {value}")]
    InvalidValue {
        /// Field or argument name.
        field: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Settings field addressable with `/set`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingField {
    /// `apiKey`
    ApiKey,
    /// `model`
    Model,
    /// `temperature`
    Temperature,
    /// `maxTokens`
    MaxTokens,
    /// `fontSize`
    FontSize,
    /// `language`
    Language,
    /// `history`
    History,
}

impl SettingField {
    /// Resolve a field name, case-insensitively.
    #[must_use]
    pub fn from_name(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "apikey" | "key" => Some(Self::ApiKey),
            "model" => Some(Self::Model),
            "temperature" | "temp" => Some(Self::Temperature),
            "maxtokens" => Some(Self::MaxTokens),
            "fontsize" => Some(Self::FontSize),
            "language" | "lang" => Some(Self::Language),
            "history" | "savehistory" => Some(Self::History),
            _ => None,
        }
    }

    /// Display name as accepted by `/set`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ApiKey => "apiKey",
            Self::Model => "model",
            Self::Temperature => "temperature",
            Self::MaxTokens => "maxTokens",
            Self::FontSize => "fontSize",
            Self::Language => "language",
            Self::History => "history",
        }
    }

    /// Write `value` into `settings`.
    ///
    /// Only the syntax is checked here; ranges are validated when the
    /// settings are saved.
    ///
    /// # Errors
    /// Returns [`CommandError::InvalidValue`] if `value` does not parse.
    pub fn apply(self, settings: &mut Settings, value: &str) -> Result<(), CommandError> {
        let invalid = || CommandError::InvalidValue {
            field: self.name(),
            value: value.to_string(),
        };
        match self {
            Self::ApiKey => settings.api_key = value.to_string(),
            Self::Model => settings.model = value.to_string(),
            Self::Temperature => settings.temperature = value.parse().map_err(|_| invalid())?,
            Self::MaxTokens => settings.max_tokens = value.parse().map_err(|_| invalid())?,
            Self::FontSize => settings.font_size = FontSize::from_name(value).ok_or_else(invalid)?,
            Self::Language => settings.language = Language::from_name(value).ok_or_else(invalid)?,
            Self::History => settings.save_history = parse_switch(value).ok_or_else(invalid)?,
        }
        Ok(())
    }
}

/// One line of user input.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Send text as a message.
    Send(String),
    /// `/new`
    New,
    /// `/chats`
    Chats,
    /// `/switch <n|id>`
    Switch(String),
    /// `/delete <n|id>`
    Delete(String),
    /// `/rename <n|id> <title>`
    Rename {
        /// Chat number or id.
        target: String,
        /// New title.
        title: String,
    },
    /// `/attach <path>...`
    Attach(Vec<PathBuf>),
    /// `/detach <n|id>`
    Detach(String),
    /// `/files`
    Files,
    /// `/regenerate`
    Regenerate,
    /// `/stream on|off`
    Stream(bool),
    /// `/set <field> <value>`
    Set {
        /// Field to change.
        field: SettingField,
        /// Raw value.
        value: String,
    },
    /// `/settings`
    Settings,
    /// `/help`
    Help,
    /// `/quit`
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    ///
    /// Lines not starting with `/` are sent as they are; a leading `//`
    /// sends the text with one slash removed.
    ///
    /// # Errors
    /// Returns a [`CommandError`] for unknown commands or bad arguments.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        if line.starts_with("//") {
            return Ok(Some(Self::Send(line[1..].to_string())));
        }
        let Some(body) = line.strip_prefix('/') else {
            return Ok(Some(Self::Send(line.to_string())));
        };

        let (name, rest) = match body.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (body, ""),
        };
        let command = match name.to_ascii_lowercase().as_str() {
            "new" => Self::New,
            "chats" | "list" => Self::Chats,
            "switch" => Self::Switch(required(rest, "switch", "a chat number or id")?),
            "delete" => Self::Delete(required(rest, "delete", "a chat number or id")?),
            "rename" => {
                let (target, title) = rest.split_once(char::is_whitespace).ok_or(
                    CommandError::MissingArgument {
                        command: "rename",
                        what: "a chat number or id and a title",
                    },
                )?;
                Self::Rename {
                    target: target.to_string(),
                    title: title.trim().to_string(),
                }
            }
            "attach" => {
                let paths: Vec<PathBuf> = rest.split_whitespace().map(PathBuf::from).collect();
                if paths.is_empty() {
                    return Err(CommandError::MissingArgument {
                        command: "attach",
                        what: "at least one file path",
                    });
                }
                Self::Attach(paths)
            }
            "detach" => Self::Detach(required(rest, "detach", "an attachment number or id")?),
            "files" => Self::Files,
            "regenerate" | "regen" => Self::Regenerate,
            "stream" => {
                let value = required(rest, "stream", "on or off")?;
                Self::Stream(parse_switch(&value).ok_or(CommandError::InvalidValue {
                    field: "stream",
                    value,
                })?)
            }
            "set" => {
                let (field, value) = rest.split_once(char::is_whitespace).ok_or(
                    CommandError::MissingArgument {
                        command: "set",
                        what: "a field and a value",
                    },
                )?;
                let field = SettingField::from_name(field).ok_or_else(|| CommandError::InvalidValue {
                    field: "field",
                    value: field.to_string(),
                })?;
                Self::Set {
                    field,
                    value: value.trim().to_string(),
                }
            }
            "settings" => Self::Settings,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn required(rest: &str, command: &'static str, what: &'static str) -> Result<String, CommandError> {
    if rest.is_empty() {
        Err(CommandError::MissingArgument { command, what })
    } else {
        Ok(rest.to_string())
    }
}

fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}
