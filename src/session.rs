//! Chat session: the single owner of all client state.
//!
//! A [`ChatSession`] ties together settings, localization, chats, the
//! attachment queue, the composer text and the completion client. Front ends
//! call its operations and render the [`ChatEvent`]s it reports to the
//! [`ChatView`].

use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::{ClientFactory, CompletionClient, CompletionRequest};
use crate::attachments::{self, AttachmentManager, IncomingFile};
use crate::chat::{ChatStore, ChatSummary, Message, Role, derive_title};
use crate::config::{AppConfig, PipelineConfig};
use crate::error::{ChatError, ChatResult};
use crate::events::{AttachmentView, ChatEvent, ChatView, Notice, NoticeKind, RenderedMessage};
use crate::i18n::Localizer;
use crate::ids::{AttachmentId, ChatId};
use crate::pipeline::{
    RejectReason, ResponseEvent, ResponseMode, SendOutcome, StopHandle, build_messages,
    compose_content, dispatch,
};
use crate::settings::{Settings, SettingsStore};
use crate::storage::KeyValueStore;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// All state of one running client.
pub struct ChatSession {
    settings: SettingsStore,
    i18n: Localizer,
    locales_dir: Option<PathBuf>,
    chats: ChatStore,
    attachments: AttachmentManager,
    composer: String,
    streaming: bool,
    client: Option<Arc<dyn CompletionClient>>,
    connector: Arc<dyn ClientFactory>,
    view: Arc<dyn ChatView>,
    stop: StopHandle,
    last_send: Option<Instant>,
    pipeline: PipelineConfig,
}

impl ChatSession {
    /// Load settings and history and render the initial state.
    ///
    /// A fresh chat is created when no history is available.
    ///
    /// # Errors
    /// Returns an error if the settings cannot be read from storage.
    pub async fn start(
        config: &AppConfig,
        storage: Arc<dyn KeyValueStore>,
        connector: Arc<dyn ClientFactory>,
        view: Arc<dyn ChatView>,
    ) -> ChatResult<Self> {
        let settings = SettingsStore::load(Arc::clone(&storage)).await?;
        let current = settings.current().clone();
        let i18n = Localizer::resolve(config.locales_dir.as_deref(), current.language).await;

        let mut chats = ChatStore::new(storage, current.save_history);
        if let Err(err) = chats.restore().await {
            tracing::error!("Failed to restore chats: {err}");
        }

        let mut session = Self {
            settings,
            i18n,
            locales_dir: config.locales_dir.clone(),
            chats,
            attachments: AttachmentManager::new(config.pipeline.max_attachment_bytes),
            composer: String::new(),
            streaming: config.pipeline.streaming,
            client: None,
            connector,
            stop: StopHandle::new(Arc::clone(&view)),
            view,
            last_send: None,
            pipeline: config.pipeline.clone(),
        };
        session.client = session.connect_client(&current.api_key);
        if session.chats.is_empty() {
            session.create_chat_inner().await;
        }

        session.emit_chat_list();
        session.emit_transcript();
        session.emit_pending();
        tracing::info!(
            chats = session.chats.len(),
            language = session.i18n.language().code(),
            "Session started"
        );
        Ok(session)
    }

    /// Current settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        self.settings.current()
    }

    /// Active localization.
    #[must_use]
    pub const fn i18n(&self) -> &Localizer {
        &self.i18n
    }

    /// Chats, newest first.
    #[must_use]
    pub fn chat_list(&self) -> Vec<ChatSummary> {
        self.chats.list()
    }

    /// Id of the active chat.
    #[must_use]
    pub fn active_chat_id(&self) -> Option<&ChatId> {
        self.chats.active_id()
    }

    /// Messages of the active chat.
    #[must_use]
    pub fn active_messages(&self) -> &[Message] {
        self.chats
            .active()
            .map(|chat| chat.messages.as_slice())
            .unwrap_or_default()
    }

    /// Composer text.
    #[must_use]
    pub fn composer(&self) -> &str {
        &self.composer
    }

    /// Queued attachments.
    #[must_use]
    pub fn pending_attachments(&self) -> Vec<AttachmentView> {
        self.attachments.pending().iter().map(AttachmentView::from).collect()
    }

    /// Whether replies are streamed.
    #[must_use]
    pub const fn streaming(&self) -> bool {
        self.streaming
    }

    /// Switch between streamed and whole replies.
    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    /// Handle for stopping a send from another task.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Whether a send is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.stop.is_active()
    }

    /// Whether the send control should be enabled.
    #[must_use]
    pub fn can_send(&self) -> bool {
        !self.composer.trim().is_empty() || !self.attachments.is_empty()
    }

    /// Replace the composer text.
    pub fn set_composer(&mut self, text: impl Into<String>) {
        self.composer = text.into();
        self.emit(ChatEvent::SendAvailabilityChanged(self.can_send()));
    }

    /// Queue files for the next message; oversized files are reported.
    pub fn add_attachments(&mut self, files: Vec<IncomingFile>) {
        for err in self.attachments.add(files) {
            self.notify(
                NoticeKind::AttachmentTooLarge,
                format!("{}: {}", self.i18n.t("app.fileTooLarge"), err.file_name()),
            );
        }
        self.emit_pending();
    }

    /// Drop one queued attachment.
    pub fn remove_attachment(&mut self, id: &AttachmentId) -> bool {
        let removed = self.attachments.remove(id);
        if removed {
            self.emit_pending();
        }
        removed
    }

    /// Start a new empty chat and make it active.
    pub async fn create_chat(&mut self) -> ChatId {
        let id = self.create_chat_inner().await;
        self.composer.clear();
        self.attachments.clear_all();
        self.emit(ChatEvent::ComposerChanged(String::new()));
        self.emit_pending();
        id
    }

    /// Make `id` the active chat. No-op if unknown or already active.
    pub async fn switch_chat(&mut self, id: &ChatId) -> bool {
        if !self.chats.switch_to(id) {
            return false;
        }
        self.attachments.clear_all();
        self.emit_pending();
        self.emit_transcript();
        self.emit_chat_list();
        self.persist().await;
        true
    }

    /// Delete `id` after the view confirms.
    ///
    /// The chat set never becomes empty: deleting the last chat creates a
    /// fresh one.
    pub async fn delete_chat(&mut self, id: &ChatId) -> bool {
        if self.chats.get(id).is_none() || !self.view.confirm(&self.i18n.t("app.deleteChatConfirm")) {
            return false;
        }
        let fallback_title = self.i18n.t("app.newChatTitle");
        let Some(outcome) = self.chats.delete(id, &fallback_title, now_ms()) else {
            return false;
        };

        if outcome.switched_to.is_some() {
            self.attachments.clear_all();
            if outcome.created {
                self.composer.clear();
                self.emit(ChatEvent::ComposerChanged(String::new()));
            }
            self.emit_pending();
            self.emit_transcript();
        }
        self.emit_chat_list();
        self.persist().await;
        true
    }

    /// Retitle `id`. Returns `false` for empty or unchanged titles.
    pub async fn rename_chat(&mut self, id: &ChatId, title: &str) -> bool {
        if !self.chats.rename(id, title) {
            return false;
        }
        self.emit_chat_list();
        self.persist().await;
        true
    }

    /// Validate, persist and apply new settings.
    pub async fn save_settings(&mut self, next: Settings) -> bool {
        let change = match self.settings.save(next).await {
            Ok(change) => change,
            Err(err) => {
                tracing::warn!("Settings rejected: {err}");
                self.notify(
                    NoticeKind::SettingsInvalid,
                    format!("{}: {err}", self.i18n.t("app.settingsInvalid")),
                );
                return false;
            }
        };

        let current = self.settings.current().clone();
        if change.language_changed {
            self.i18n = Localizer::resolve(self.locales_dir.as_deref(), current.language).await;
            self.emit_chat_list();
            self.emit_transcript();
        }
        if change.api_key_changed || self.client.is_none() {
            self.client = self.connect_client(&current.api_key);
        }
        if change.history_changed {
            self.chats.set_history_enabled(current.save_history);
            self.persist().await;
        }
        self.notify(NoticeKind::SettingsSaved, self.i18n.t("app.settingsSaved"));
        true
    }

    /// Stop the send in flight, if any.
    pub fn stop(&self) -> bool {
        self.stop.stop()
    }

    /// Send the composer text and pending attachments.
    ///
    /// Never fails: every problem is reported to the view and summarized in
    /// the returned [`SendOutcome`].
    pub async fn send(&mut self) -> SendOutcome {
        let text = self.composer.trim().to_string();
        if text.is_empty() && self.attachments.is_empty() {
            return SendOutcome::Rejected(RejectReason::Empty);
        }
        if self.stop.is_active() {
            return SendOutcome::Rejected(RejectReason::Busy);
        }

        let now = Instant::now();
        if self
            .last_send
            .is_some_and(|last| now.duration_since(last) < self.pipeline.cooldown)
        {
            self.notify(NoticeKind::RateLimited, self.i18n.t("app.waitBeforeSend"));
            return SendOutcome::Rejected(RejectReason::Cooldown);
        }
        self.last_send = Some(now);

        let client = match &self.client {
            Some(client) if self.settings.current().has_valid_api_key() => Arc::clone(client),
            _ => {
                self.notify(
                    NoticeKind::InvalidCredentials,
                    self.i18n.t("app.invalidApiKeyError"),
                );
                return SendOutcome::Rejected(RejectReason::InvalidCredentials);
            }
        };

        let Some(guard) = self.stop.begin() else {
            return SendOutcome::Rejected(RejectReason::Busy);
        };
        let outcome = match self.run_turn(text, client.as_ref(), guard.token()).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => {
                self.emit(ChatEvent::TypingChanged(false));
                self.notify(NoticeKind::Cancelled, self.i18n.t("app.requestCancelled"));
                SendOutcome::Cancelled
            }
            Err(err) => {
                self.emit(ChatEvent::TypingChanged(false));
                tracing::error!("Send failed: {err}");
                let (kind, key) = match err {
                    ChatError::Http(_)
                    | ChatError::Api { .. }
                    | ChatError::Decode(_)
                    | ChatError::MalformedResponse(_) => (NoticeKind::ApiError, "app.apiCommunicationError"),
                    _ => (NoticeKind::Unexpected, "app.unexpectedError"),
                };
                self.notify(kind, format!("{}: {err}", self.i18n.t(key)));
                SendOutcome::Failed
            }
        };
        drop(guard);
        outcome
    }

    async fn run_turn(
        &mut self,
        text: String,
        client: &dyn CompletionClient,
        cancel: &CancellationToken,
    ) -> ChatResult<SendOutcome> {
        let chat_id = match self.chats.active_id() {
            Some(id) => id.clone(),
            None => self.create_chat_inner().await,
        };

        let processed = match attachments::materialize(self.attachments.pending()) {
            Ok(processed) => processed,
            Err(err) => {
                tracing::error!("Attachment processing failed: {err}");
                self.notify(
                    NoticeKind::AttachmentFailed,
                    format!("{}: {}", self.i18n.t("app.imageProcessingError"), err.file_name()),
                );
                return Ok(SendOutcome::Rejected(RejectReason::AttachmentFailed));
            }
        };
        let Some(content) = compose_content(&text, &processed) else {
            self.notify(
                NoticeKind::UnsupportedAttachment,
                self.i18n.t("app.unsupportedAttachment"),
            );
            return Ok(SendOutcome::Rejected(RejectReason::UnsupportedAttachment));
        };

        let message = Message::user(content, processed)?;
        self.emit(ChatEvent::MessageAppended(RenderedMessage {
            role: Role::User,
            text: if text.is_empty() { self.i18n.t("app.noText") } else { text },
            attachments: message.attachments.iter().map(AttachmentView::from).collect(),
        }));

        let language = self.settings.current().language;
        let (messages, titled) = {
            let chat = self
                .chats
                .get_mut(&chat_id)
                .ok_or_else(|| ChatError::Validation(format!("chat {chat_id} not found")))?;
            chat.messages.push(message);
            let titled = chat.messages.len() == 1;
            if titled {
                chat.title = derive_title(&chat.messages[0].content, &self.i18n);
            }
            (
                build_messages(language, &chat.messages, self.pipeline.history_window),
                titled,
            )
        };
        if titled {
            self.emit_chat_list();
        }

        self.composer.clear();
        self.attachments.clear_all();
        self.emit(ChatEvent::ComposerChanged(String::new()));
        self.emit_pending();

        let settings = self.settings.current();
        let request = CompletionRequest {
            messages,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_completion_tokens: settings.max_tokens,
            top_p: 1.0,
            stop: None,
        };
        let mode = if self.streaming {
            ResponseMode::Streaming
        } else {
            ResponseMode::Whole
        };

        self.emit(ChatEvent::TypingChanged(true));
        let view = Arc::clone(&self.view);
        let i18n = &self.i18n;
        let reply = dispatch(
            client,
            &request,
            mode,
            &self.pipeline.retry,
            cancel,
            |attempt, delay, _| {
                let message = format!(
                    "{} {}{}",
                    i18n.t("app.connectionError"),
                    delay.as_secs(),
                    i18n.t("app.seconds")
                );
                view.on_event(ChatEvent::Notice(Notice::new(
                    NoticeKind::Retrying { attempt, delay },
                    message,
                )));
            },
            |event| match event {
                ResponseEvent::Opened => {
                    view.on_event(ChatEvent::TypingChanged(false));
                    if mode == ResponseMode::Streaming {
                        view.on_event(ChatEvent::AssistantStarted);
                    }
                }
                ResponseEvent::Partial(text) => view.on_event(ChatEvent::AssistantUpdated {
                    text: text.to_string(),
                }),
                ResponseEvent::Complete(_) => {}
            },
        )
        .await?;

        if cancel.is_cancelled() {
            tracing::info!(chat = %chat_id, "Reply discarded after cancellation");
            return Err(ChatError::Cancelled);
        }
        if reply.trim().is_empty() {
            tracing::warn!(chat = %chat_id, "Model returned an empty reply");
            self.notify(NoticeKind::EmptyResponse, self.i18n.t("app.emptyResponse"));
            return Ok(SendOutcome::EmptyReply);
        }

        let message = Message::assistant(reply)?;
        if mode == ResponseMode::Whole {
            self.emit(ChatEvent::MessageAppended(RenderedMessage::from_message(
                &message, &self.i18n,
            )));
        }
        if let Some(chat) = self.chats.get_mut(&chat_id) {
            chat.messages.push(message);
        }
        self.persist().await;
        tracing::info!(chat = %chat_id, "Reply committed");
        Ok(SendOutcome::Completed)
    }

    /// Replay the last user message.
    ///
    /// Returns `None` (and changes nothing) unless the active chat ends in a
    /// user message, optionally followed by the assistant reply, with at
    /// least two messages in total.
    pub async fn regenerate(&mut self) -> Option<SendOutcome> {
        if self.stop.is_active() {
            return None;
        }
        let chat = self.chats.active_mut()?;
        let len = chat.messages.len();
        if len < 2 {
            return None;
        }
        let user_index = match chat.messages[len - 1].role {
            Role::Assistant => len - 2,
            Role::User => len - 1,
            Role::System => return None,
        };
        if chat.messages[user_index].role != Role::User {
            return None;
        }

        let user = chat.messages.remove(user_index);
        chat.messages.truncate(user_index);
        tracing::debug!(chat = %chat.id, "Regenerating last reply");

        self.composer = user.content.first_text().to_string();
        self.attachments.clear_all();
        self.attachments.restore(user.attachments);
        self.emit_transcript();
        self.emit(ChatEvent::ComposerChanged(self.composer.clone()));
        self.emit_pending();

        Some(self.send().await)
    }

    async fn create_chat_inner(&mut self) -> ChatId {
        let id = self.chats.create(self.i18n.t("app.newChatTitle"), now_ms());
        self.emit_chat_list();
        self.emit_transcript();
        self.persist().await;
        id
    }

    fn connect_client(&self, api_key: &str) -> Option<Arc<dyn CompletionClient>> {
        if api_key.trim().is_empty() {
            return None;
        }
        match self.connector.connect(api_key) {
            Ok(client) => Some(client),
            Err(err) => {
                tracing::error!("Failed to initialize completion client: {err}");
                None
            }
        }
    }

    async fn persist(&self) {
        if let Err(err) = self.chats.persist().await {
            tracing::error!("Failed to persist chats: {err}");
        }
    }

    fn emit(&self, event: ChatEvent) {
        self.view.on_event(event);
    }

    fn notify(&self, kind: NoticeKind, message: String) {
        self.emit(ChatEvent::Notice(Notice::new(kind, message)));
    }

    fn emit_chat_list(&self) {
        self.emit(ChatEvent::ChatListChanged(self.chats.list()));
    }

    fn emit_transcript(&self) {
        self.emit(ChatEvent::TranscriptReplaced(RenderedMessage::transcript(
            self.active_messages(),
            &self.i18n,
        )));
    }

    fn emit_pending(&self) {
        self.emit(ChatEvent::PendingAttachmentsChanged(self.pending_attachments()));
        self.emit(ChatEvent::SendAvailabilityChanged(self.can_send()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::attachments::Attachment;
    use crate::chat::{ContentPart, MessageContent};
    use crate::settings::Language;
    use crate::storage::{self, CHATS_BACKUP_KEY, CHATS_KEY, MemoryKeyValueStore, SETTINGS_KEY};
    use crate::testing::{RecordingView, Reply, ScriptedClient, ScriptedConnector, TEST_API_KEY};

    struct Harness {
        session: ChatSession,
        view: Arc<RecordingView>,
        client: Arc<ScriptedClient>,
        connector: Arc<ScriptedConnector>,
        storage: Arc<MemoryKeyValueStore>,
    }

    async fn harness_with(configure: impl FnOnce(&mut Settings)) -> Harness {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let mut settings = Settings {
            api_key: TEST_API_KEY.to_string(),
            language: Language::English,
            ..Settings::default()
        };
        configure(&mut settings);
        storage::set_json(storage.as_ref(), SETTINGS_KEY, &settings)
            .await
            .unwrap();
        start(storage).await
    }

    async fn harness() -> Harness {
        harness_with(|_| {}).await
    }

    async fn start(storage: Arc<MemoryKeyValueStore>) -> Harness {
        let client = Arc::new(ScriptedClient::default());
        let connector = Arc::new(ScriptedConnector::new(client.clone()));
        let view = Arc::new(RecordingView::new());
        let mut config = AppConfig::default();
        config.pipeline.streaming = false;
        let session = ChatSession::start(&config, storage.clone(), connector.clone(), view.clone())
            .await
            .unwrap();
        Harness {
            session,
            view,
            client,
            connector,
            storage,
        }
    }

    async fn past_cooldown() {
        tokio::time::advance(Duration::from_millis(1000)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_hello_example() {
        let mut h = harness().await;
        h.client.push(Reply::whole("Hi there!"));

        h.session.set_composer("Hello");
        assert_eq!(h.session.send().await, SendOutcome::Completed);

        let messages = h.session.active_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, MessageContent::Text("Hello".to_string()));
        assert_eq!(messages[1].content, MessageContent::Text("Hi there!".to_string()));
        assert_eq!(h.session.chat_list()[0].title, "Hello");
        assert!(h.session.composer().is_empty());
        assert!(!h.session.is_busy());

        let request = &h.client.requests()[0];
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.top_p, 1.0);
        assert_eq!(request.max_completion_tokens, 1024);

        let events = h.view.events();
        assert!(events.contains(&ChatEvent::ControlsChanged { busy: true }));
        assert_eq!(events.last(), Some(&ChatEvent::ControlsChanged { busy: false }));
        assert!(h.view.notices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_whitespace_never_reaches_the_api() {
        let mut h = harness().await;
        h.view.clear();
        h.session.set_composer("  \n\t ");
        assert_eq!(
            h.session.send().await,
            SendOutcome::Rejected(RejectReason::Empty)
        );
        assert_eq!(h.client.calls(), 0);
        assert!(h.session.active_messages().is_empty());
        assert!(h.view.notices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_allows_one_call() {
        let mut h = harness().await;
        h.client.push(Reply::whole("one"));
        h.client.push(Reply::whole("two"));

        h.session.set_composer("first");
        assert_eq!(h.session.send().await, SendOutcome::Completed);
        h.session.set_composer("second");
        assert_eq!(
            h.session.send().await,
            SendOutcome::Rejected(RejectReason::Cooldown)
        );
        assert_eq!(h.client.calls(), 1);
        assert_eq!(h.session.composer(), "second");
        assert_eq!(h.view.notices(), vec![NoticeKind::RateLimited]);

        past_cooldown().await;
        assert_eq!(h.session.send().await, SendOutcome::Completed);
        assert_eq!(h.client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_key_blocks_send() {
        let mut h = harness_with(|s| s.api_key = "sk-nope".to_string()).await;
        h.session.set_composer("Hello");
        assert_eq!(
            h.session.send().await,
            SendOutcome::Rejected(RejectReason::InvalidCredentials)
        );
        assert_eq!(h.client.calls(), 0);
        assert_eq!(h.view.notices(), vec![NoticeKind::InvalidCredentials]);
        assert!(h.session.active_messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_stream_never_commits() {
        let mut h = harness().await;
        h.session.set_streaming(true);
        let stop = h.session.stop_handle();
        h.client.push(Reply::stream_with_hook(&["par", "tial", "!"], 1, move || {
            stop.stop();
        }));

        h.session.set_composer("Tell me a story");
        assert_eq!(h.session.send().await, SendOutcome::Cancelled);

        let messages = h.session.active_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert!(!h.session.is_busy());

        let events = h.view.events();
        assert!(events.contains(&ChatEvent::AssistantStarted));
        assert!(events.contains(&ChatEvent::AssistantUpdated {
            text: "par".to_string()
        }));
        assert!(!events.contains(&ChatEvent::AssistantUpdated {
            text: "partial".to_string()
        }));
        assert_eq!(h.view.notices(), vec![NoticeKind::Cancelled]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_waiting_for_whole_reply() {
        let mut h = harness().await;
        h.client.push(Reply::Hang);
        let stop = h.session.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            assert!(stop.stop());
        });

        h.session.set_composer("Hello");
        assert_eq!(h.session.send().await, SendOutcome::Cancelled);
        assert_eq!(h.session.active_messages().len(), 1);
        assert!(!h.view.notices().contains(&NoticeKind::ApiError));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_reports_failure() {
        let mut h = harness().await;
        for _ in 0..4 {
            h.client.push(Reply::Fail(503));
        }

        let started = Instant::now();
        h.session.set_composer("Hello");
        assert_eq!(h.session.send().await, SendOutcome::Failed);
        assert_eq!(started.elapsed().as_millis(), 7000);
        assert_eq!(h.client.calls(), 4);

        let retries: Vec<_> = h
            .view
            .notices()
            .into_iter()
            .filter_map(|kind| match kind {
                NoticeKind::Retrying { attempt, delay } => Some((attempt, delay.as_millis())),
                _ => None,
            })
            .collect();
        assert_eq!(retries, vec![(1, 1000), (2, 2000), (3, 4000)]);
        assert_eq!(h.view.notices().last(), Some(&NoticeKind::ApiError));

        let messages = h.session.active_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert!(!h.session.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers() {
        let mut h = harness().await;
        h.client.push(Reply::Fail(500));
        h.client.push(Reply::whole("finally"));

        h.session.set_composer("Hello");
        assert_eq!(h.session.send().await, SendOutcome::Completed);
        assert_eq!(h.session.active_messages().len(), 2);
        assert!(!h.view.notices().contains(&NoticeKind::ApiError));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_reply_is_not_committed() {
        let mut h = harness().await;
        h.client.push(Reply::whole("   "));
        h.session.set_composer("Hello");
        assert_eq!(h.session.send().await, SendOutcome::EmptyReply);
        assert_eq!(h.session.active_messages().len(), 1);
        assert_eq!(h.view.notices(), vec![NoticeKind::EmptyResponse]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_regenerate_is_noop_without_exchange() {
        let mut h = harness().await;
        assert_eq!(h.session.regenerate().await, None);
        assert_eq!(h.client.calls(), 0);

        // A lone user message is fewer than two messages.
        h.session.set_composer("Hello");
        assert_eq!(h.session.send().await, SendOutcome::Failed);
        assert_eq!(h.session.active_messages().len(), 1);
        let calls = h.client.calls();
        assert_eq!(h.session.regenerate().await, None);
        assert_eq!(h.client.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_regenerate_replays_last_turn() {
        let mut h = harness().await;
        h.client.push(Reply::whole("first answer"));
        h.session.set_composer("Hello");
        h.session.send().await;

        past_cooldown().await;
        h.client.push(Reply::whole("second answer"));
        assert_eq!(h.session.regenerate().await, Some(SendOutcome::Completed));

        let messages = h.session.active_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[1].content,
            MessageContent::Text("second answer".to_string())
        );
        let replay = &h.client.requests()[1];
        assert_eq!(replay.messages.len(), 2);
        assert_eq!(
            replay.messages[1].content,
            MessageContent::Text("Hello".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_never_leaves_zero_chats() {
        let mut h = harness().await;
        let only = h.session.active_chat_id().unwrap().clone();

        h.view.set_confirm(false);
        assert!(!h.session.delete_chat(&only).await);
        assert_eq!(h.session.chat_list().len(), 1);

        h.view.set_confirm(true);
        assert!(h.session.delete_chat(&only).await);
        let list = h.session.chat_list();
        assert_eq!(list.len(), 1);
        assert_ne!(list[0].id, only);
        assert_eq!(h.session.active_chat_id(), Some(&list[0].id));
        assert_eq!(list[0].title, "New chat");
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_attachment_is_rejected() {
        let mut h = harness().await;
        h.session.add_attachments(vec![IncomingFile::new(
            "huge.png",
            "image/png",
            vec![0u8; 6 * 1024 * 1024],
        )]);
        assert!(h.session.pending_attachments().is_empty());
        assert_eq!(h.view.notices(), vec![NoticeKind::AttachmentTooLarge]);
        assert!(!h.session.can_send());
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_only_message() {
        let mut h = harness().await;
        h.client.push(Reply::whole("A red square."));
        h.session.add_attachments(vec![IncomingFile::new("red.png", "image/png", vec![1u8, 2, 3])]);
        assert!(h.session.can_send());

        assert_eq!(h.session.send().await, SendOutcome::Completed);
        assert!(h.session.pending_attachments().is_empty());
        assert_eq!(h.session.attachments.previews().live_count(), 0);
        assert_eq!(h.session.chat_list()[0].title, "Image analysis");

        let user = &h.session.active_messages()[0];
        assert_eq!(
            user.content,
            MessageContent::Parts(vec![ContentPart::image("data:image/png;base64,AQID")])
        );
        assert_eq!(user.attachments.len(), 1);
        assert!(h.view.events().iter().any(|event| matches!(
            event,
            ChatEvent::MessageAppended(RenderedMessage { role: Role::User, text, .. }) if text == "(no text)"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attachment_failure_aborts_send() {
        let mut h = harness().await;
        let mut broken = Attachment::from_file(IncomingFile::new("lost.png", "image/png", vec![1u8]));
        broken.inline = None;
        let broken: Attachment = serde_json::from_value(serde_json::to_value(&broken).unwrap()).unwrap();
        h.session.attachments.restore(vec![broken]);
        h.session.set_composer("what is this?");

        assert_eq!(
            h.session.send().await,
            SendOutcome::Rejected(RejectReason::AttachmentFailed)
        );
        assert_eq!(h.client.calls(), 0);
        assert!(h.session.active_messages().is_empty());
        assert_eq!(h.session.pending_attachments().len(), 1);
        assert_eq!(h.session.composer(), "what is this?");
        assert!(!h.session.is_busy());
        assert_eq!(h.view.notices(), vec![NoticeKind::AttachmentFailed]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_releases_pending_attachments() {
        let mut h = harness().await;
        let first = h.session.active_chat_id().unwrap().clone();
        h.session.create_chat().await;
        h.session.add_attachments(vec![IncomingFile::new("a.png", "image/png", vec![1u8])]);
        assert_eq!(h.session.attachments.previews().live_count(), 1);

        assert!(h.session.switch_chat(&first).await);
        assert!(!h.session.switch_chat(&first).await);
        assert!(h.session.pending_attachments().is_empty());
        assert_eq!(h.session.attachments.previews().live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_survives_restart() {
        let mut h = harness().await;
        h.client.push(Reply::whole("Hi!"));
        h.session.set_composer("Hello");
        h.session.send().await;
        let id = h.session.active_chat_id().unwrap().clone();
        let expected = h.session.active_messages().to_vec();

        let restarted = start(h.storage.clone()).await;
        assert_eq!(restarted.session.active_chat_id(), Some(&id));
        assert_eq!(restarted.session.active_messages(), expected.as_slice());
    }

    #[tokio::test(start_paused = true)]
    async fn test_regenerate_resends_image_attachments() {
        let mut h = harness().await;
        h.client.push(Reply::whole("A dot."));
        h.session.set_composer("look");
        h.session.add_attachments(vec![IncomingFile::new("dot.png", "image/png", vec![1u8])]);
        assert_eq!(h.session.send().await, SendOutcome::Completed);

        past_cooldown().await;
        h.view.clear();
        h.client.push(Reply::whole("Still a dot."));
        assert_eq!(h.session.regenerate().await, Some(SendOutcome::Completed));

        assert!(h.view.events().iter().any(|event| matches!(
            event,
            ChatEvent::PendingAttachmentsChanged(files) if files.len() == 1 && files[0].name == "dot.png"
        )));
        let replay = &h.client.requests()[1];
        assert_eq!(
            replay.messages[1].content,
            MessageContent::Parts(vec![
                ContentPart::text("look"),
                ContentPart::image("data:image/png;base64,AQ=="),
            ])
        );
        let user = &h.session.active_messages()[0];
        assert_eq!(user.attachments.len(), 1);
        assert!(h.session.pending_attachments().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_history_is_kept_aside() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let settings = Settings {
            api_key: TEST_API_KEY.to_string(),
            language: Language::English,
            ..Settings::default()
        };
        storage::set_json(storage.as_ref(), SETTINGS_KEY, &settings)
            .await
            .unwrap();
        let stored = r#"{"c1":{"id":"c1","title":"Keep me","createdAt":1,"messages":[
            {"role":"user","content":"hi","attachments":[{"id":42,"name":"a.png","size":1,"type":"image/png"}]}]}}"#;
        storage.set(CHATS_KEY, stored.to_string()).await.unwrap();

        let h = start(storage.clone()).await;
        let list = h.session.chat_list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "New chat");

        let backup = storage.get(CHATS_BACKUP_KEY).await.unwrap().unwrap();
        assert!(backup.contains("Keep me"));
        let current = storage.get(CHATS_KEY).await.unwrap().unwrap();
        assert!(!current.contains("Keep me"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_history_is_not_restored() {
        let mut h = harness_with(|s| s.save_history = false).await;
        h.client.push(Reply::whole("Hi!"));
        h.session.set_composer("Hello");
        h.session.send().await;

        let restarted = start(h.storage.clone()).await;
        assert!(restarted.session.active_messages().is_empty());
        assert_eq!(restarted.session.chat_list().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_settings_applies_language_and_key() {
        let mut h = harness_with(|s| s.api_key = String::new()).await;
        assert_eq!(h.connector.connects(), 0);

        let next = Settings {
            api_key: TEST_API_KEY.to_string(),
            language: Language::Czech,
            ..h.session.settings().clone()
        };
        assert!(h.session.save_settings(next).await);
        assert_eq!(h.session.i18n().language(), Language::Czech);
        assert_eq!(h.connector.connects(), 1);
        assert!(h.view.notices().contains(&NoticeKind::SettingsSaved));

        h.client.push(Reply::whole("Ahoj"));
        h.session.set_composer("Ahoj");
        assert_eq!(h.session.send().await, SendOutcome::Completed);
        assert_eq!(
            h.client.requests()[0].messages[0].content,
            MessageContent::Text(Language::Czech.system_prompt().to_string())
        );

        let invalid = Settings {
            temperature: 9.0,
            ..h.session.settings().clone()
        };
        assert!(!h.session.save_settings(invalid).await);
        assert_eq!(h.view.notices().last(), Some(&NoticeKind::SettingsInvalid));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rename_chat() {
        let mut h = harness().await;
        let id = h.session.active_chat_id().unwrap().clone();
        assert!(!h.session.rename_chat(&id, "  ").await);
        assert!(h.session.rename_chat(&id, "Trip plans").await);
        assert_eq!(h.session.chat_list()[0].title, "Trip plans");
    }
}
