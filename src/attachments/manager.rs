//! Pending attachment queue.

use crate::ids::AttachmentId;

use super::{Attachment, AttachmentError, IncomingFile, MAX_ATTACHMENT_BYTES, PreviewRegistry};

/// Attachments waiting for the next send.
#[derive(Debug)]
pub struct AttachmentManager {
    pending: Vec<Attachment>,
    previews: PreviewRegistry,
    max_bytes: u64,
}

impl Default for AttachmentManager {
    fn default() -> Self {
        Self::new(MAX_ATTACHMENT_BYTES)
    }
}

impl AttachmentManager {
    /// Empty queue with the given size ceiling.
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        Self {
            pending: Vec::new(),
            previews: PreviewRegistry::new(),
            max_bytes,
        }
    }

    /// Queue `files`. Oversized files are skipped and reported.
    pub fn add(&mut self, files: Vec<IncomingFile>) -> Vec<AttachmentError> {
        let mut rejected = Vec::new();
        for file in files {
            let size = file.size();
            if size > self.max_bytes {
                tracing::warn!(name = %file.name, size, "Attachment rejected: too large");
                rejected.push(AttachmentError::TooLarge {
                    name: file.name,
                    size,
                    max: self.max_bytes,
                });
                continue;
            }
            let mut attachment = Attachment::from_file(file);
            if attachment.is_image() {
                attachment.set_preview(Some(self.previews.issue()));
            }
            tracing::debug!(id = %attachment.id, name = %attachment.name, "Attachment queued");
            self.pending.push(attachment);
        }
        rejected
    }

    /// Re-queue attachments taken from a stored message.
    pub fn restore(&mut self, attachments: Vec<Attachment>) {
        for mut attachment in attachments {
            let preview = attachment.is_image().then(|| self.previews.issue());
            attachment.set_preview(preview);
            self.pending.push(attachment);
        }
    }

    /// Drop one attachment. Returns `false` if it was not queued.
    pub fn remove(&mut self, id: &AttachmentId) -> bool {
        let Some(index) = self.pending.iter().position(|a| &a.id == id) else {
            return false;
        };
        let mut attachment = self.pending.remove(index);
        if let Some(handle) = attachment.take_preview() {
            self.previews.revoke(&handle);
        }
        true
    }

    /// Drop everything and release every preview.
    pub fn clear_all(&mut self) {
        for mut attachment in self.pending.drain(..) {
            if let Some(handle) = attachment.take_preview() {
                self.previews.revoke(&handle);
            }
        }
    }

    /// Queued attachments in insertion order.
    #[must_use]
    pub fn pending(&self) -> &[Attachment] {
        &self.pending
    }

    /// Number of queued attachments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Registry of issued previews.
    #[must_use]
    pub const fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }
}
