//! In-flight send state shared with stop requests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::events::{ChatEvent, ChatView};

/// The send in flight, if any. Each send gets a fresh generation so a
/// stale guard never clears a newer send.
#[derive(Default)]
struct InFlight {
    generation: u64,
    token: Option<CancellationToken>,
}

/// Cloneable handle to stop the send in flight.
///
/// The session holds one and begins/ends sends through it; clones can be
/// moved to other tasks (a Ctrl-C handler) while the session itself is
/// borrowed by `send`.
#[derive(Clone)]
pub struct StopHandle {
    state: Arc<Mutex<InFlight>>,
    view: Arc<dyn ChatView>,
}

impl StopHandle {
    /// Handle reporting to `view`.
    #[must_use]
    pub fn new(view: Arc<dyn ChatView>) -> Self {
        Self {
            state: Arc::new(Mutex::new(InFlight::default())),
            view,
        }
    }

    fn lock(&self) -> MutexGuard<'_, InFlight> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a send is in flight.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().token.is_some()
    }

    /// Cancel the send in flight and hide the typing indicator.
    ///
    /// Returns `false` (and does nothing) when nothing is in flight.
    pub fn stop(&self) -> bool {
        let Some(token) = self.lock().token.take() else {
            return false;
        };
        token.cancel();
        tracing::info!("Send stopped by user");
        self.view.on_event(ChatEvent::TypingChanged(false));
        true
    }

    /// Mark a send as started. `None` if one is already in flight.
    pub(crate) fn begin(&self) -> Option<SendGuard> {
        let token = CancellationToken::new();
        let generation = {
            let mut state = self.lock();
            if state.token.is_some() {
                return None;
            }
            state.generation = state.generation.wrapping_add(1);
            state.token = Some(token.clone());
            state.generation
        };
        self.view.on_event(ChatEvent::ControlsChanged { busy: true });
        Some(SendGuard {
            handle: self.clone(),
            token,
            generation,
        })
    }
}

/// Keeps the in-flight state for one send; clears it when dropped.
pub(crate) struct SendGuard {
    handle: StopHandle,
    token: CancellationToken,
    generation: u64,
}

impl SendGuard {
    /// Token cancelled by [`StopHandle::stop`].
    pub(crate) const fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        {
            let mut state = self.handle.lock();
            if state.generation == self.generation {
                state.token = None;
            }
        }
        self.handle
            .view
            .on_event(ChatEvent::ControlsChanged { busy: false });
    }
}
