//! Send/stream pipeline building blocks.
//!
//! A send goes through compose → dispatch (with retries) → consume → commit.
//! The session drives the steps; this module holds the pieces that do not
//! need session state.

pub mod dispatch;
pub mod history;
pub mod inflight;
pub mod retry;

pub use dispatch::{ResponseEvent, ResponseMode, dispatch};
pub use history::{build_messages, sanitize_history};
pub use inflight::StopHandle;
pub use retry::{RetryPolicy, with_retry};

use crate::attachments::Attachment;
use crate::chat::{ContentPart, MessageContent};

/// Why a send was refused before anything was mutated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// No text and no attachments.
    Empty,
    /// Another send is in flight.
    Busy,
    /// Sent again within the cooldown.
    Cooldown,
    /// No usable API key or client.
    InvalidCredentials,
    /// An attachment could not be prepared.
    AttachmentFailed,
    /// Nothing sendable (only non-image attachments).
    UnsupportedAttachment,
}

/// Result of a send attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Refused up front.
    Rejected(RejectReason),
    /// The reply was committed.
    Completed,
    /// The model returned nothing; no reply was committed.
    EmptyReply,
    /// The user stopped the send.
    Cancelled,
    /// The request failed after all retries.
    Failed,
}

/// Wire content for `text` plus processed attachments.
///
/// With attachments, the content is a part list: the text first (when
/// present), then one image part per image attachment. Non-image attachments
/// contribute nothing. Returns `None` when nothing sendable remains.
#[must_use]
pub fn compose_content(text: &str, attachments: &[Attachment]) -> Option<MessageContent> {
    if attachments.is_empty() {
        return (!text.is_empty()).then(|| MessageContent::Text(text.to_string()));
    }

    let mut parts = Vec::with_capacity(attachments.len() + 1);
    if !text.is_empty() {
        parts.push(ContentPart::text(text));
    }
    parts.extend(
        attachments
            .iter()
            .filter(|a| a.is_image())
            .filter_map(|a| a.inline.as_deref().map(ContentPart::image)),
    );
    (!parts.is_empty()).then_some(MessageContent::Parts(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::{IncomingFile, materialize};

    fn processed(files: Vec<IncomingFile>) -> Vec<Attachment> {
        let pending: Vec<_> = files.into_iter().map(Attachment::from_file).collect();
        materialize(&pending).unwrap()
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(
            compose_content("Hello", &[]),
            Some(MessageContent::Text("Hello".to_string()))
        );
        assert_eq!(compose_content("", &[]), None);
    }

    #[test]
    fn test_text_then_images_in_order() {
        let attachments = processed(vec![
            IncomingFile::new("a.png", "image/png", vec![1u8]),
            IncomingFile::new("notes.txt", "text/plain", vec![2u8]),
            IncomingFile::new("b.gif", "image/gif", vec![3u8]),
        ]);
        let Some(MessageContent::Parts(parts)) = compose_content("look", &attachments) else {
            panic!("expected parts");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], ContentPart::text("look"));
        assert_eq!(parts[1], ContentPart::image("data:image/png;base64,AQ=="));
        assert_eq!(parts[2], ContentPart::image("data:image/gif;base64,Aw=="));
    }

    #[test]
    fn test_only_non_images_and_no_text() {
        let attachments = processed(vec![IncomingFile::new("a.pdf", "application/pdf", vec![1u8])]);
        assert_eq!(compose_content("", &attachments), None);
        assert_eq!(
            compose_content("see file", &attachments),
            Some(MessageContent::Parts(vec![ContentPart::text("see file")]))
        );
    }
}
