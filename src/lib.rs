//! Terminal chat client for Groq's OpenAI-compatible completion API.
//!
//! Conversations with vision-capable models, streamed replies, image
//! attachments and a local chat history. Everything the client knows lives
//! in one [`ChatSession`]; front ends observe it through [`ChatView`].

// Forbidden practices
#![deny(warnings)]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(dead_code)]
#![deny(non_camel_case_types)]
#![deny(unused_imports)]
#![deny(unused_variables)]
#![deny(unused_must_use)]
#![deny(non_snake_case)]
#![deny(non_upper_case_globals)]
#![deny(nonstandard_style)]
#![forbid(unsafe_op_in_unsafe_fn)]
// Clippy discipline
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::missing_const_for_fn)]
#![deny(clippy::unwrap_in_result)]
#![deny(clippy::module_inception)]
#![deny(clippy::redundant_clone)]
#![deny(clippy::shadow_unrelated)]
#![deny(clippy::too_many_arguments)]
#![deny(clippy::cognitive_complexity)]
#![deny(overflowing_literals)]
#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

/// Completion API client and SSE decoding.
#[allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]
pub mod api;
/// File attachments, size limits and previews.
#[allow(clippy::module_name_repetitions, clippy::cast_possible_truncation)]
pub mod attachments;
/// Chats, messages and the chat store.
#[allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
pub mod chat;
/// Process configuration.
#[allow(clippy::module_name_repetitions)]
pub mod config;
/// Error types.
#[allow(clippy::module_name_repetitions)]
pub mod error;
/// Events reported to the view.
#[allow(clippy::module_name_repetitions)]
pub mod events;
/// Localized strings.
pub mod i18n;
/// Identifier types.
pub mod ids;
/// Send/stream pipeline.
#[allow(
    clippy::missing_errors_doc,
    clippy::future_not_send,
    clippy::significant_drop_tightening
)]
pub mod pipeline;
/// The session context object.
#[allow(
    clippy::missing_errors_doc,
    clippy::too_many_lines,
    clippy::significant_drop_tightening
)]
pub mod session;
/// User settings.
#[allow(clippy::module_name_repetitions)]
pub mod settings;
/// Entry helpers to start the client.
pub mod start;
/// Local key-value persistence.
#[allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
pub mod storage;
/// Terminal front end.
#[allow(
    clippy::missing_errors_doc,
    clippy::significant_drop_tightening,
    clippy::option_if_let_else
)]
pub mod terminal;

#[cfg(test)]
#[allow(clippy::redundant_pub_crate, clippy::missing_const_for_fn)]
mod testing;

pub use config::AppConfig;
pub use error::{ChatError, ChatResult};
pub use events::{ChatEvent, ChatView};
pub use session::ChatSession;
pub use settings::Settings;
