//! Chat, message and content types.

use serde::{Deserialize, Serialize};

use crate::attachments::Attachment;
use crate::error::{ChatError, ChatResult};
use crate::i18n::Localizer;
use crate::ids::ChatId;

/// Maximum number of characters kept from the first message in a title.
pub const TITLE_MAX_CHARS: usize = 30;

/// Author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction injected by the client.
    System,
    /// Message typed by the user.
    User,
    /// Model reply.
    Assistant,
}

/// Image reference inside a content part.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// Data URL (or remote URL) of the image.
    #[serde(default)]
    pub url: String,
}

/// One typed element of a multi-part message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text.
        #[serde(default)]
        text: String,
    },
    /// Inline or remote image.
    ImageUrl {
        /// The image reference.
        #[serde(default = "empty_image_url")]
        image_url: ImageUrl,
    },
    /// Any part type this client does not understand.
    #[serde(other)]
    Unknown,
}

fn empty_image_url() -> ImageUrl {
    ImageUrl { url: String::new() }
}

impl ContentPart {
    /// Text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Image part pointing at `url`.
    #[must_use]
    pub fn image(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }

    fn is_well_formed(&self) -> bool {
        match self {
            Self::Text { text } => !text.trim().is_empty(),
            Self::ImageUrl { image_url } => !image_url.url.is_empty(),
            Self::Unknown => false,
        }
    }
}

/// Message body: either plain text or an ordered list of parts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text body.
    Text(String),
    /// Multi-part body (text and images).
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Whether the content carries nothing worth sending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }

    /// First text found in the content (empty when there is none).
    #[must_use]
    pub fn first_text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Parts(parts) => parts
                .iter()
                .find_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .unwrap_or(""),
        }
    }

    /// Whether any image part is present.
    #[must_use]
    pub fn has_images(&self) -> bool {
        matches!(self, Self::Parts(parts) if parts.iter().any(|p| matches!(p, ContentPart::ImageUrl { .. })))
    }

    /// Text shown in a transcript; image-only content uses `image_placeholder`.
    #[must_use]
    pub fn display_text(&self, image_placeholder: &str) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => {
                let text = parts
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                let text = text.trim();
                if text.is_empty() {
                    image_placeholder.to_string()
                } else {
                    text.to_string()
                }
            }
        }
    }

    /// Copy keeping only well-formed parts; `None` if nothing remains.
    #[must_use]
    pub fn normalized(&self) -> Option<Self> {
        match self {
            Self::Text(text) => (!text.trim().is_empty()).then(|| Self::Text(text.clone())),
            Self::Parts(parts) => {
                let kept: Vec<ContentPart> = parts
                    .iter()
                    .filter(|part| part.is_well_formed())
                    .cloned()
                    .collect();
                (!kept.is_empty()).then_some(Self::Parts(kept))
            }
        }
    }
}

/// One message of a chat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author.
    pub role: Role,
    /// Body.
    pub content: MessageContent,
    /// Files sent along with a user message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Build a user message.
    ///
    /// # Errors
    /// Returns a validation error when the content is empty.
    pub fn user(content: MessageContent, attachments: Vec<Attachment>) -> ChatResult<Self> {
        Self::checked(Role::User, content, attachments)
    }

    /// Build an assistant message.
    ///
    /// # Errors
    /// Returns a validation error when the text is empty.
    pub fn assistant(text: impl Into<String>) -> ChatResult<Self> {
        Self::checked(Role::Assistant, MessageContent::Text(text.into()), Vec::new())
    }

    fn checked(role: Role, content: MessageContent, attachments: Vec<Attachment>) -> ChatResult<Self> {
        if content.is_empty() {
            return Err(ChatError::Validation(format!(
                "{role:?} message content must not be empty"
            )));
        }
        Ok(Self {
            role,
            content,
            attachments,
        })
    }
}

/// One conversation thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Identifier.
    pub id: ChatId,
    /// Display title.
    pub title: String,
    /// Ordered messages.
    pub messages: Vec<Message>,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl Chat {
    /// Empty chat.
    #[must_use]
    pub fn new(id: ChatId, title: impl Into<String>, created_at: i64) -> Self {
        Self {
            id,
            title: title.into(),
            messages: Vec::new(),
            created_at,
        }
    }
}

/// Title for a chat whose first message has `content`.
#[must_use]
pub fn derive_title(content: &MessageContent, i18n: &Localizer) -> String {
    let text = content.first_text().trim();
    if !text.is_empty() {
        let mut title: String = text.chars().take(TITLE_MAX_CHARS).collect();
        if text.chars().count() > TITLE_MAX_CHARS {
            title.push_str("...");
        }
        return title;
    }
    if content.has_images() {
        return i18n.t("app.analyzingImage");
    }
    i18n.t("app.newChatTitle")
}
