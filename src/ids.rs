//! Identifier types for chats and attachments.
//!
//! Chat identifiers keep the storage format of the browser client
//! (millisecond timestamp followed by a random base-36 suffix) so that
//! persisted histories stay readable. They are not checked for collisions;
//! uniqueness is best effort for a single local user.
//!
//! ## Cargo features used by this module
//! - `uuid_v7`: attachment ids use `UUIDv7` instead of `UUIDv4`.

use core::fmt;
use core::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of the random suffix appended to chat ids.
const CHAT_ID_SUFFIX_LEN: usize = 11;

/// Alphabet used for the random suffix.
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate an ID intended to have good insert locality.
#[inline]
#[must_use]
fn uuid_time_ordered() -> Uuid {
    #[cfg(feature = "uuid_v7")]
    {
        Uuid::now_v7()
    }
    #[cfg(not(feature = "uuid_v7"))]
    {
        Uuid::new_v4()
    }
}

/// Declare a UUID newtype with a consistent API.
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $name:ident,
        generator = $make:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl Default for $name {
            #[inline]
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            /// Create a new identifier.
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self($make())
            }

            /// Borrow the underlying UUID.
            #[inline]
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

define_uuid_id!(
    /// Identifier of a pending or stored attachment.
    AttachmentId,
    generator = uuid_time_ordered
);

/// Identifier of a chat thread.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    /// Generate a new chat id from the given millisecond timestamp.
    #[must_use]
    pub fn generate(now_ms: i64) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..CHAT_ID_SUFFIX_LEN)
            .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
            .collect();
        Self(format!("{now_ms}{suffix}"))
    }

    /// Wrap an existing id string.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChatId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_id_starts_with_timestamp() {
        let id = ChatId::generate(1_700_000_000_000);
        assert!(id.as_str().starts_with("1700000000000"));
        assert_eq!(id.as_str().len(), 13 + CHAT_ID_SUFFIX_LEN);
        assert!(
            id.as_str()[13..]
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
        );
    }

    #[test]
    fn test_chat_id_serializes_as_plain_string() {
        let id = ChatId::from_raw("123abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"123abc\"");
    }

    #[test]
    fn test_attachment_id_roundtrip_from_str() {
        let id = AttachmentId::new();
        let parsed: AttachmentId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
