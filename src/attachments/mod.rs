//! Files queued for the next message.
//!
//! Images are encoded eagerly into a `data:` URL when they are added so the
//! send pipeline only has to collect the inline data. Other files are kept
//! as raw bytes; they are listed with the message but never sent to the
//! model.

pub mod manager;
pub mod preview;

pub use manager::AttachmentManager;
pub use preview::{PreviewHandle, PreviewRegistry};

use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::AttachmentId;

/// Largest accepted attachment (5 MiB).
pub const MAX_ATTACHMENT_BYTES: u64 = 5 * 1024 * 1024;

/// Attachment failures.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// The file exceeds the size ceiling.
    #[error("{name} is too large ({size} bytes, max {max})")]
    TooLarge {
        /// File name.
        name: String,
        /// Actual size in bytes.
        size: u64,
        /// Ceiling in bytes.
        max: u64,
    },
    /// Neither raw bytes nor inline data are available.
    #[error("{name} has no data to send")]
    Unavailable {
        /// File name.
        name: String,
    },
}

impl AttachmentError {
    /// Name of the offending file.
    #[must_use]
    pub fn file_name(&self) -> &str {
        match self {
            Self::TooLarge { name, .. } | Self::Unavailable { name } => name,
        }
    }
}

/// A file selected by the user, before it is queued.
#[derive(Clone, Debug)]
pub struct IncomingFile {
    /// File name shown to the user.
    pub name: String,
    /// MIME type.
    pub mime: String,
    /// File contents.
    pub bytes: Arc<[u8]>,
}

impl IncomingFile {
    /// Wrap in-memory contents.
    #[must_use]
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let mime = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self::new(name, mime, bytes))
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// A queued or stored attachment.
///
/// Only the identity, metadata and inline data URL are persisted; raw bytes
/// and the preview handle live for the session only. Equality compares the
/// persisted fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attachment {
    /// Identifier.
    pub id: AttachmentId,
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type.
    #[serde(rename = "type")]
    pub mime: String,
    /// `data:` URL for images.
    #[serde(rename = "base64", default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<String>,
    #[serde(skip)]
    bytes: Option<Arc<[u8]>>,
    #[serde(skip)]
    preview: Option<PreviewHandle>,
}

impl PartialEq for Attachment {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.size == other.size
            && self.mime == other.mime
            && self.inline == other.inline
    }
}

impl Attachment {
    /// Build an attachment from an incoming file; images are encoded inline.
    #[must_use]
    pub fn from_file(file: IncomingFile) -> Self {
        let size = file.size();
        let inline = is_image_mime(&file.mime).then(|| data_url(&file.mime, &file.bytes));
        Self {
            id: AttachmentId::new(),
            name: file.name,
            size,
            mime: file.mime,
            inline,
            bytes: Some(file.bytes),
            preview: None,
        }
    }

    /// Whether this is an image.
    #[must_use]
    pub fn is_image(&self) -> bool {
        is_image_mime(&self.mime)
    }

    /// Preview handle, while queued.
    #[must_use]
    pub const fn preview(&self) -> Option<&PreviewHandle> {
        self.preview.as_ref()
    }

    pub(crate) fn set_preview(&mut self, preview: Option<PreviewHandle>) {
        self.preview = preview;
    }

    pub(crate) fn take_preview(&mut self) -> Option<PreviewHandle> {
        self.preview.take()
    }

    /// Copy suitable for storing in a message (no preview handle).
    #[must_use]
    pub fn detached(&self) -> Self {
        let mut copy = self.clone();
        copy.preview = None;
        copy
    }

    /// Inline `data:` URL, encoding the raw bytes if needed.
    ///
    /// # Errors
    /// Returns an error when neither inline data nor bytes are available.
    pub fn data_url(&self) -> Result<String, AttachmentError> {
        if let Some(inline) = &self.inline {
            return Ok(inline.clone());
        }
        match &self.bytes {
            Some(bytes) => Ok(data_url(&self.mime, bytes)),
            None => Err(AttachmentError::Unavailable {
                name: self.name.clone(),
            }),
        }
    }
}

/// Resolve the inline data of every image in `pending`.
///
/// Returns detached copies with `inline` filled in for images. Any failure
/// aborts the whole batch.
///
/// # Errors
/// Returns the first attachment that could not be resolved.
pub fn materialize(pending: &[Attachment]) -> Result<Vec<Attachment>, AttachmentError> {
    pending
        .iter()
        .map(|attachment| {
            let mut copy = attachment.detached();
            if copy.is_image() {
                copy.inline = Some(attachment.data_url()?);
            }
            Ok(copy)
        })
        .collect()
}

fn is_image_mime(mime: &str) -> bool {
    mime.starts_with("image/")
}

fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_images_are_encoded_eagerly() {
        let attachment = Attachment::from_file(IncomingFile::new("a.png", "image/png", vec![1u8, 2, 3]));
        assert_eq!(attachment.inline.as_deref(), Some("data:image/png;base64,AQID"));

        let doc = Attachment::from_file(IncomingFile::new("a.txt", "text/plain", vec![1u8]));
        assert!(doc.inline.is_none());
        assert!(!doc.is_image());
    }

    #[test]
    fn test_stored_image_without_data_fails_materialization() {
        let mut attachment = Attachment::from_file(IncomingFile::new("a.png", "image/png", vec![1u8]));
        let json = {
            attachment.inline = None;
            serde_json::to_string(&attachment).unwrap()
        };
        let restored: Attachment = serde_json::from_str(&json).unwrap();

        let err = materialize(&[restored]).unwrap_err();
        assert_eq!(err.file_name(), "a.png");
    }

    #[test]
    fn test_persisted_fields_only() {
        let attachment = Attachment::from_file(IncomingFile::new("a.png", "image/png", vec![9u8]));
        let value = serde_json::to_value(&attachment).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object["type"], "image/png");
        assert!(object.contains_key("base64"));
        assert_eq!(object.len(), 5);

        let back: Attachment = serde_json::from_value(value).unwrap();
        assert_eq!(back, attachment);
        assert!(back.preview().is_none());
    }

    #[tokio::test]
    async fn test_from_path_guesses_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, [0xffu8, 0xd8]).unwrap();

        let file = IncomingFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "photo.jpg");
        assert_eq!(file.mime, "image/jpeg");
        assert_eq!(file.size(), 2);
    }
}
