//! Test doubles shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::api::{ClientFactory, CompletionClient, CompletionRequest, FragmentStream};
use crate::error::{ChatError, ChatResult};
use crate::events::{ChatEvent, ChatView, NoticeKind};

/// Key that passes the format check.
pub(crate) const TEST_API_KEY: &str = "gsk_test_0123456789abcdef";

type Hook = Arc<dyn Fn() + Send + Sync>;

/// One scripted answer of a [`ScriptedClient`].
pub(crate) enum Reply {
    Whole(String),
    Stream {
        fragments: Vec<String>,
        hook: Option<(usize, Hook)>,
    },
    Fail(u16),
    Hang,
}

impl Reply {
    pub(crate) fn whole(text: &str) -> Self {
        Self::Whole(text.to_string())
    }

    pub(crate) fn stream(fragments: &[&str]) -> Self {
        Self::Stream {
            fragments: fragments.iter().map(ToString::to_string).collect(),
            hook: None,
        }
    }

    /// Stream that runs `hook` right before yielding fragment `at`.
    pub(crate) fn stream_with_hook(fragments: &[&str], at: usize, hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self::Stream {
            fragments: fragments.iter().map(ToString::to_string).collect(),
            hook: Some((at, Arc::new(hook))),
        }
    }

    pub(crate) fn stream_cancelling(fragments: &[&str], at: usize, token: CancellationToken) -> Self {
        Self::stream_with_hook(fragments, at, move || token.cancel())
    }
}

/// Client answering from a script; unscripted calls fail with 500.
#[derive(Default)]
pub(crate) struct ScriptedClient {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::default(),
        }
    }

    pub(crate) fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self, request: &CompletionRequest) -> Reply {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Fail(500))
    }
}

fn api_error(status: u16) -> ChatError {
    ChatError::Api {
        status,
        message: "scripted failure".to_string(),
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> ChatResult<String> {
        match self.next(request) {
            Reply::Whole(text) => Ok(text),
            Reply::Stream { fragments, .. } => Ok(fragments.concat()),
            Reply::Fail(status) => Err(api_error(status)),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn stream(&self, request: &CompletionRequest) -> ChatResult<FragmentStream> {
        match self.next(request) {
            Reply::Whole(text) => {
                let stream: FragmentStream = Box::pin(futures::stream::iter(vec![Ok::<_, ChatError>(text)]));
                Ok(stream)
            }
            Reply::Stream { fragments, hook } => {
                let stream: FragmentStream = Box::pin(
                    futures::stream::iter(fragments.into_iter().enumerate()).map(move |(i, fragment)| {
                        if let Some((at, hook)) = &hook {
                            if *at == i {
                                hook();
                            }
                        }
                        Ok::<_, ChatError>(fragment)
                    }),
                );
                Ok(stream)
            }
            Reply::Fail(status) => Err(api_error(status)),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Factory handing out one shared [`ScriptedClient`].
pub(crate) struct ScriptedConnector {
    client: Arc<ScriptedClient>,
    connects: AtomicUsize,
}

impl ScriptedConnector {
    pub(crate) fn new(client: Arc<ScriptedClient>) -> Self {
        Self {
            client,
            connects: AtomicUsize::new(0),
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl ClientFactory for ScriptedConnector {
    fn connect(&self, _api_key: &str) -> ChatResult<Arc<dyn CompletionClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.client.clone())
    }
}

/// View that records every event.
pub(crate) struct RecordingView {
    events: Mutex<Vec<ChatEvent>>,
    confirm: AtomicBool,
}

impl RecordingView {
    pub(crate) fn new() -> Self {
        Self {
            events: Mutex::default(),
            confirm: AtomicBool::new(true),
        }
    }

    pub(crate) fn set_confirm(&self, answer: bool) {
        self.confirm.store(answer, Ordering::SeqCst);
    }

    pub(crate) fn events(&self) -> Vec<ChatEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub(crate) fn notices(&self) -> Vec<NoticeKind> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ChatEvent::Notice(notice) => Some(notice.kind),
                _ => None,
            })
            .collect()
    }
}

impl ChatView for RecordingView {
    fn on_event(&self, event: ChatEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn confirm(&self, _prompt: &str) -> bool {
        self.confirm.load(Ordering::SeqCst)
    }
}
