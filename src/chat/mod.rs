//! Chats, messages and the chat store.

pub mod message;
pub mod store;

pub use message::{Chat, ContentPart, ImageUrl, Message, MessageContent, Role, derive_title};
pub use store::{ChatStore, ChatSummary, DeleteOutcome};
