//! Request history assembly.

use crate::api::WireMessage;
use crate::chat::{Message, MessageContent, Role};
use crate::settings::Language;

/// Last `window` messages, normalized, with empty ones dropped.
#[must_use]
pub fn sanitize_history(history: &[Message], window: usize) -> Vec<WireMessage> {
    let start = history.len().saturating_sub(window);
    history[start..]
        .iter()
        .filter_map(|message| {
            message.content.normalized().map(|content| WireMessage {
                role: message.role,
                content,
            })
        })
        .collect()
}

/// Language instruction followed by the sanitized history.
#[must_use]
pub fn build_messages(language: Language, history: &[Message], window: usize) -> Vec<WireMessage> {
    let mut messages = Vec::with_capacity(window.min(history.len()) + 1);
    messages.push(WireMessage {
        role: Role::System,
        content: MessageContent::Text(language.system_prompt().to_string()),
    });
    messages.extend(sanitize_history(history, window));
    messages
}
