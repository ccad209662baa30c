//! Terminal front end.
//!
//! Reads one command per line, drives the [`ChatSession`] and renders its
//! events through a [`TerminalView`]. Ctrl-C stops a send in flight and
//! quits when idle.

pub mod command;
pub mod view;

pub use command::{Command, CommandError, SettingField};
pub use view::{TerminalView, mask_key};

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;

use crate::attachments::IncomingFile;
use crate::error::ChatResult;
use crate::ids::ChatId;
use crate::pipeline::StopHandle;
use crate::session::ChatSession;

const HELP: &str = "\
Type a message and press Enter to send it.
  /new                     start a new chat
  /chats                   list chats
  /switch <n|id>           open a chat
  /delete <n|id>           delete a chat
  /rename <n|id> <title>   rename a chat
  /attach <path>...        queue files for the next message
  /detach <n|id>           drop a queued file
  /files                   list queued files
  /regenerate              ask again for the last reply
  /stream on|off           stream replies as they arrive
  /set <field> <value>     apiKey, model, temperature, maxTokens, fontSize, language, history
  /settings                show settings
  /help                    show this help
  /quit                    exit
Ctrl-C stops a reply in progress.";

/// Binds terminal input to a session.
pub struct TerminalController {
    session: ChatSession,
    view: Arc<TerminalView>,
}

impl TerminalController {
    /// Controller over `session`, which must report to `view`.
    #[must_use]
    pub const fn new(session: ChatSession, view: Arc<TerminalView>) -> Self {
        Self { session, view }
    }

    /// The driven session.
    #[must_use]
    pub const fn session(&self) -> &ChatSession {
        &self.session
    }

    /// Run on stdin until `/quit`, end of input, or Ctrl-C while idle.
    ///
    /// # Errors
    /// Returns an error if stdin cannot be read.
    pub async fn run(self) -> ChatResult<()> {
        let quit = CancellationToken::new();
        let watcher = tokio::spawn(watch_interrupts(self.session.stop_handle(), quit.clone()));
        let result = self.run_with(BufReader::new(tokio::io::stdin()), quit).await;
        watcher.abort();
        result
    }

    /// Run on `input` until `/quit`, end of input, or `quit` is cancelled.
    ///
    /// # Errors
    /// Returns an error if `input` cannot be read.
    pub async fn run_with<R>(mut self, input: R, quit: CancellationToken) -> ChatResult<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        self.view.info("/help lists the commands.");
        loop {
            self.view.prompt();
            let line = tokio::select! {
                () = quit.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                break;
            };
            match Command::parse(&line) {
                Ok(None) => {}
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => self.execute(command, &mut lines).await?,
                Err(err) => self.view.error(&err.to_string()),
            }
        }
        tracing::info!("Terminal session ended");
        Ok(())
    }

    async fn execute<R>(&mut self, command: Command, lines: &mut Lines<R>) -> ChatResult<()>
    where
        R: AsyncBufRead + Unpin,
    {
        match command {
            Command::Send(text) => {
                self.session.set_composer(text);
                let outcome = self.session.send().await;
                tracing::debug!(?outcome, "Send finished");
            }
            Command::New => {
                self.session.create_chat().await;
            }
            Command::Chats => self.view.print_chats(&self.session.chat_list()),
            Command::Switch(target) => match self.resolve_chat(&target) {
                Some(id) => {
                    self.session.switch_chat(&id).await;
                }
                None => self.view.error(&format!("no chat {target}")),
            },
            Command::Delete(target) => {
                let Some(id) = self.resolve_chat(&target) else {
                    self.view.error(&format!("no chat {target}"));
                    return Ok(());
                };
                self.view.ask(&self.session.i18n().t("app.deleteChatConfirm"));
                let answer = lines.next_line().await?.unwrap_or_default();
                self.view
                    .answer_next_confirm(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"));
                self.session.delete_chat(&id).await;
            }
            Command::Rename { target, title } => match self.resolve_chat(&target) {
                Some(id) => {
                    if !self.session.rename_chat(&id, &title).await {
                        self.view.error("title unchanged");
                    }
                }
                None => self.view.error(&format!("no chat {target}")),
            },
            Command::Attach(paths) => {
                let mut files = Vec::with_capacity(paths.len());
                for path in paths {
                    match IncomingFile::from_path(&path).await {
                        Ok(file) => files.push(file),
                        Err(err) => self.view.error(&format!("{}: {err}", path.display())),
                    }
                }
                if !files.is_empty() {
                    self.session.add_attachments(files);
                }
            }
            Command::Detach(target) => {
                let pending = self.session.pending_attachments();
                let found = resolve_index(&target, pending.len())
                    .and_then(|i| pending.get(i))
                    .or_else(|| pending.iter().find(|a| a.id.to_string() == target))
                    .map(|a| a.id);
                match found {
                    Some(id) => {
                        self.session.remove_attachment(&id);
                        self.view.print_files(&self.session.pending_attachments());
                    }
                    None => self.view.error(&format!("no attachment {target}")),
                }
            }
            Command::Files => self.view.print_files(&self.session.pending_attachments()),
            Command::Regenerate => {
                if self.session.regenerate().await.is_none() {
                    self.view.error("nothing to regenerate");
                }
            }
            Command::Stream(on) => self.session.set_streaming(on),
            Command::Set { field, value } => {
                let mut next = self.session.settings().clone();
                match field.apply(&mut next, &value) {
                    Ok(()) => {
                        if self.session.save_settings(next).await {
                            self.view.set_localizer(self.session.i18n().clone());
                        }
                    }
                    Err(err) => self.view.error(&err.to_string()),
                }
            }
            Command::Settings => self
                .view
                .print_settings(self.session.settings(), self.session.streaming()),
            Command::Help => self.view.info(HELP),
            Command::Quit => {}
        }
        Ok(())
    }

    /// Chat by 1-based position in the list or by id.
    fn resolve_chat(&self, target: &str) -> Option<ChatId> {
        let chats = self.session.chat_list();
        resolve_index(target, chats.len())
            .and_then(|i| chats.get(i))
            .or_else(|| chats.iter().find(|c| c.id.as_str() == target))
            .map(|c| c.id.clone())
    }
}

fn resolve_index(target: &str, len: usize) -> Option<usize> {
    let n: usize = target.parse().ok()?;
    (1..=len).contains(&n).then(|| n - 1)
}

/// Stop the send in flight on Ctrl-C, or request quit when idle.
async fn watch_interrupts(stop: StopHandle, quit: CancellationToken) {
    loop {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {err}");
            return;
        }
        if !stop.stop() {
            quit.cancel();
            return;
        }
    }
}
