//! Preview handles for pending attachments.

use std::collections::HashSet;
use std::fmt;

use uuid::Uuid;

/// Opaque reference a view can use to show an attachment preview.
///
/// A handle is valid from [`PreviewRegistry::issue`] until
/// [`PreviewRegistry::revoke`]; revoked handles must not be used again.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PreviewHandle(String);

impl PreviewHandle {
    /// Borrow the handle string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues and revokes preview handles and tracks which ones are live.
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    live: HashSet<PreviewHandle>,
}

impl PreviewRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh handle.
    pub fn issue(&mut self) -> PreviewHandle {
        let handle = PreviewHandle(format!("preview:{}", Uuid::new_v4()));
        self.live.insert(handle.clone());
        handle
    }

    /// Release a handle. Returns `false` if it was not live.
    pub fn revoke(&mut self, handle: &PreviewHandle) -> bool {
        self.live.remove(handle)
    }

    /// Whether `handle` is still valid.
    #[must_use]
    pub fn is_live(&self, handle: &PreviewHandle) -> bool {
        self.live.contains(handle)
    }

    /// Number of outstanding handles.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}
