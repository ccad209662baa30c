//! View interface.
//!
//! The session never draws anything itself; it reports state changes as
//! [`ChatEvent`]s to a [`ChatView`]. A front end renders them however it
//! likes (the bundled terminal view prints them).

use std::time::Duration;

use crate::attachments::{Attachment, PreviewHandle};
use crate::chat::{ChatSummary, Message, Role};
use crate::i18n::Localizer;
use crate::ids::AttachmentId;

/// Category of a user-facing notice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    /// Sent again before the cooldown elapsed.
    RateLimited,
    /// API key missing, malformed, or client not initialized.
    InvalidCredentials,
    /// Attachment above the size ceiling.
    AttachmentTooLarge,
    /// Attachment data could not be prepared.
    AttachmentFailed,
    /// Only non-image attachments and no text.
    UnsupportedAttachment,
    /// A failed request will be retried.
    Retrying {
        /// Retry number, starting at 1.
        attempt: u32,
        /// Wait before the retry.
        delay: Duration,
    },
    /// The request failed after all retries.
    ApiError,
    /// The user stopped the request.
    Cancelled,
    /// The model answered with no content.
    EmptyResponse,
    /// Any other failure.
    Unexpected,
    /// Settings were saved.
    SettingsSaved,
    /// Settings were rejected.
    SettingsInvalid,
}

impl NoticeKind {
    /// Whether the notice reports a failure.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        !matches!(
            self,
            Self::Retrying { .. } | Self::Cancelled | Self::SettingsSaved
        )
    }
}

/// Localized message shown to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    /// Category.
    pub kind: NoticeKind,
    /// Display text.
    pub message: String,
}

impl Notice {
    /// Build a notice.
    #[must_use]
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Attachment as shown in the composer or transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentView {
    /// Identifier.
    pub id: AttachmentId,
    /// File name.
    pub name: String,
    /// MIME type.
    pub mime: String,
    /// Size in bytes.
    pub size: u64,
    /// Preview handle for queued images.
    pub preview: Option<PreviewHandle>,
}

impl From<&Attachment> for AttachmentView {
    fn from(attachment: &Attachment) -> Self {
        Self {
            id: attachment.id,
            name: attachment.name.clone(),
            mime: attachment.mime.clone(),
            size: attachment.size,
            preview: attachment.preview().cloned(),
        }
    }
}

/// Message as shown in a transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Author.
    pub role: Role,
    /// Display text.
    pub text: String,
    /// Attached files.
    pub attachments: Vec<AttachmentView>,
}

impl RenderedMessage {
    /// Render a stored message.
    #[must_use]
    pub fn from_message(message: &Message, i18n: &Localizer) -> Self {
        Self {
            role: message.role,
            text: message.content.display_text(&i18n.t("app.imageOnly")),
            attachments: message.attachments.iter().map(AttachmentView::from).collect(),
        }
    }

    /// Render a transcript, skipping system messages.
    #[must_use]
    pub fn transcript(messages: &[Message], i18n: &Localizer) -> Vec<Self> {
        messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Self::from_message(m, i18n))
            .collect()
    }
}

/// State change reported to the view.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    /// The chat list (titles, order, active flag) changed.
    ChatListChanged(Vec<ChatSummary>),
    /// The whole transcript must be redrawn.
    TranscriptReplaced(Vec<RenderedMessage>),
    /// One message was added to the transcript.
    MessageAppended(RenderedMessage),
    /// A streamed assistant reply started.
    AssistantStarted,
    /// The streamed assistant reply grew.
    AssistantUpdated {
        /// Full text received so far.
        text: String,
    },
    /// Typing indicator shown or hidden.
    TypingChanged(bool),
    /// Send and regenerate controls disabled (`busy`) or re-enabled.
    ControlsChanged {
        /// Whether a send is in flight.
        busy: bool,
    },
    /// Whether the send control should be enabled.
    SendAvailabilityChanged(bool),
    /// Composer text replaced.
    ComposerChanged(String),
    /// Pending attachment list changed.
    PendingAttachmentsChanged(Vec<AttachmentView>),
    /// Transient message for the user.
    Notice(Notice),
}

/// Observer receiving session events.
pub trait ChatView: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: ChatEvent);

    /// Ask the user to confirm a destructive action.
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}
