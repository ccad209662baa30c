//! Line-oriented rendering of session events.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use crate::chat::{ChatSummary, Role};
use crate::events::{AttachmentView, ChatEvent, ChatView, Notice, RenderedMessage};
use crate::i18n::Localizer;
use crate::ids::ChatId;
use crate::settings::Settings;

type Sink = Box<dyn Write + Send>;

struct Inner {
    out: Sink,
    err: Sink,
    i18n: Localizer,
    /// Bytes of the streamed reply already printed.
    streamed: Option<usize>,
    active: Option<ChatId>,
    answer: Option<bool>,
}

impl Inner {
    fn out(&mut self, args: fmt::Arguments<'_>) {
        if let Err(err) = self.out.write_fmt(args).and_then(|()| self.out.flush()) {
            tracing::debug!("Terminal write failed: {err}");
        }
    }

    fn err(&mut self, args: fmt::Arguments<'_>) {
        if let Err(err) = self.err.write_fmt(args).and_then(|()| self.err.flush()) {
            tracing::debug!("Terminal write failed: {err}");
        }
    }

    fn label(&self, role: Role) -> String {
        match role {
            Role::User => self.i18n.t("app.you"),
            Role::Assistant => self.i18n.t("app.assistant"),
            Role::System => "system".to_string(),
        }
    }

    fn finish_stream(&mut self) {
        if self.streamed.take().is_some() {
            self.out(format_args!("\n"));
        }
    }

    fn message(&mut self, message: &RenderedMessage) {
        let label = self.label(message.role);
        self.out(format_args!("{label}: {}\n", message.text));
        if !message.attachments.is_empty() {
            let names = file_names(&message.attachments);
            self.out(format_args!("  [{names}]\n"));
        }
    }

    fn notice(&mut self, notice: &Notice) {
        self.finish_stream();
        let marker = if notice.kind.is_error() { '!' } else { '*' };
        self.err(format_args!("{marker} {}\n", notice.message));
    }
}

fn file_names(attachments: &[AttachmentView]) -> String {
    attachments
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Hide all but the prefix and the last four characters of a key.
#[must_use]
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    let head: String = chars[..4].iter().collect();
    format!("{head}****{tail}")
}

/// [`ChatView`] printing to the terminal.
///
/// Transcript output goes to stdout, notices to stderr. Streamed replies are
/// printed incrementally as they grow.
pub struct TerminalView {
    inner: Mutex<Inner>,
}

impl TerminalView {
    /// View over the process stdout and stderr.
    #[must_use]
    pub fn stdio(i18n: Localizer) -> Self {
        Self::with_sinks(Box::new(io::stdout()), Box::new(io::stderr()), i18n)
    }

    /// View writing to arbitrary sinks.
    #[must_use]
    pub fn with_sinks(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>, i18n: Localizer) -> Self {
        Self {
            inner: Mutex::new(Inner {
                out,
                err,
                i18n,
                streamed: None,
                active: None,
                answer: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Use `i18n` for labels from now on.
    pub fn set_localizer(&self, i18n: Localizer) {
        self.lock().i18n = i18n;
    }

    /// Answer the next [`ChatView::confirm`] call.
    pub fn answer_next_confirm(&self, answer: bool) {
        self.lock().answer = Some(answer);
    }

    /// Print the input prompt.
    pub fn prompt(&self) {
        self.lock().out(format_args!("> "));
    }

    /// Print a confirmation question without a line break.
    pub fn ask(&self, question: &str) {
        self.lock().out(format_args!("{question} [y/N] "));
    }

    /// Print an informational line.
    pub fn info(&self, text: &str) {
        self.lock().out(format_args!("{text}\n"));
    }

    /// Print an error line.
    pub fn error(&self, text: &str) {
        self.lock().err(format_args!("! {text}\n"));
    }

    /// Print the numbered chat list.
    pub fn print_chats(&self, chats: &[ChatSummary]) {
        let mut inner = self.lock();
        let heading = inner.i18n.t("app.chats");
        inner.out(format_args!("{heading}:\n"));
        for (i, chat) in chats.iter().enumerate() {
            let marker = if chat.active { '*' } else { ' ' };
            inner.out(format_args!("{marker} {:>2}. {}  ({})\n", i + 1, chat.title, chat.id));
        }
    }

    /// Print the numbered pending attachments.
    pub fn print_files(&self, files: &[AttachmentView]) {
        let mut inner = self.lock();
        let heading = inner.i18n.t("app.attachments");
        inner.out(format_args!("{heading}: {}\n", files.len()));
        for (i, file) in files.iter().enumerate() {
            inner.out(format_args!(
                "  {:>2}. {} ({}, {} B)  {}\n",
                i + 1,
                file.name,
                file.mime,
                file.size,
                file.id
            ));
        }
    }

    /// Print the settings with the API key masked.
    pub fn print_settings(&self, settings: &Settings, streaming: bool) {
        let mut inner = self.lock();
        inner.out(format_args!(
            "apiKey      {}\nmodel       {}\ntemperature {}\nmaxTokens   {}\nfontSize    {:?}\nlanguage    {}\nhistory     {}\nstream      {}\n",
            mask_key(&settings.api_key),
            settings.model,
            settings.temperature,
            settings.max_tokens,
            settings.font_size,
            settings.language.code(),
            if settings.save_history { "on" } else { "off" },
            if streaming { "on" } else { "off" },
        ));
    }
}

impl ChatView for TerminalView {
    fn on_event(&self, event: ChatEvent) {
        let mut inner = self.lock();
        match event {
            ChatEvent::ChatListChanged(chats) => {
                let Some(active) = chats.into_iter().find(|c| c.active) else {
                    return;
                };
                if inner.active.as_ref() != Some(&active.id) {
                    inner.finish_stream();
                    inner.out(format_args!("== {} ==\n", active.title));
                    inner.active = Some(active.id);
                }
            }
            ChatEvent::TranscriptReplaced(messages) => {
                inner.finish_stream();
                for message in &messages {
                    inner.message(message);
                }
            }
            ChatEvent::MessageAppended(message) => {
                inner.finish_stream();
                inner.message(&message);
            }
            ChatEvent::AssistantStarted => {
                inner.finish_stream();
                let label = inner.label(Role::Assistant);
                inner.out(format_args!("{label}: "));
                inner.streamed = Some(0);
            }
            ChatEvent::AssistantUpdated { text } => {
                let Some(printed) = inner.streamed else {
                    return;
                };
                if let Some(delta) = text.get(printed..) {
                    inner.out(format_args!("{delta}"));
                    inner.streamed = Some(text.len());
                }
            }
            ChatEvent::TypingChanged(true) => {
                let typing = inner.i18n.t("app.typing");
                inner.err(format_args!("{typing}\n"));
            }
            ChatEvent::TypingChanged(false) | ChatEvent::ControlsChanged { busy: false } => {
                inner.finish_stream();
            }
            ChatEvent::PendingAttachmentsChanged(files) => {
                if !files.is_empty() {
                    let heading = inner.i18n.t("app.attachments");
                    let names = file_names(&files);
                    inner.out(format_args!("{heading}: {names}\n"));
                }
            }
            ChatEvent::Notice(notice) => inner.notice(&notice),
            ChatEvent::ControlsChanged { busy: true }
            | ChatEvent::SendAvailabilityChanged(_)
            | ChatEvent::ComposerChanged(_) => {}
        }
    }

    fn confirm(&self, _prompt: &str) -> bool {
        self.lock().answer.take().unwrap_or(false)
    }
}
