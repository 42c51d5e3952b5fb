//! Cache entry model and on-disk envelope.
//!
//! Backends see opaque bytes. Each payload is prefixed with a JSON metadata
//! header and a `|` separator so tags and lifetime can be recovered on read
//! without a second lookup.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use time::OffsetDateTime;

use super::error::StoreError;
use super::keys::CacheKey;

const SEPARATOR: u8 = b'|';

/// Metadata carried in front of every stored payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub identifier: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub lifetime: Option<u64>,
    /// Unix timestamp (seconds) of the write.
    pub stored_at: i64,
}

/// One entry as returned by the store.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub identifier: CacheKey,
    pub payload: Bytes,
    /// `None` when the envelope was unreadable and the store degraded.
    pub metadata: Option<EntryMetadata>,
}

impl CacheEntry {
    pub fn tags(&self) -> &[String] {
        self.metadata
            .as_ref()
            .map(|meta| meta.tags.as_slice())
            .unwrap_or_default()
    }

    pub fn lifetime(&self) -> Option<u64> {
        self.metadata.as_ref().and_then(|meta| meta.lifetime)
    }

    /// Seconds since the entry was written, clamped at zero.
    pub fn age(&self, now: OffsetDateTime) -> Option<u64> {
        let stored_at = self.metadata.as_ref()?.stored_at;
        Some(u64::try_from(now.unix_timestamp() - stored_at).unwrap_or(0))
    }

    /// Seconds left before soft expiry; `None` for entries without a lifetime.
    pub fn remaining_lifetime(&self, now: OffsetDateTime) -> Option<u64> {
        let lifetime = self.lifetime()?;
        let age = self.age(now)?;
        Some(lifetime.saturating_sub(age))
    }

    /// An entry is stale once its age exceeds its lifetime.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        match (self.lifetime(), self.age(now)) {
            (Some(lifetime), Some(age)) => age > lifetime,
            _ => false,
        }
    }
}

/// Serialize metadata and payload into the stored byte form.
pub(crate) fn encode_envelope(
    metadata: &EntryMetadata,
    payload: &[u8],
) -> Result<Bytes, StoreError> {
    let header = serde_json::to_vec(metadata).map_err(|source| StoreError::Encode {
        identifier: metadata.identifier.clone(),
        source,
    })?;
    let mut buf = BytesMut::with_capacity(header.len() + 1 + payload.len());
    buf.put_slice(&header);
    buf.put_u8(SEPARATOR);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Split stored bytes into metadata and payload.
pub(crate) fn decode_envelope(
    identifier: &str,
    raw: &Bytes,
) -> Result<(EntryMetadata, Bytes), StoreError> {
    if !raw.contains(&SEPARATOR) {
        return Err(StoreError::MissingMetadata {
            identifier: identifier.to_string(),
        });
    }

    let (metadata, rest) =
        split_json_prefix::<EntryMetadata>(raw).map_err(|source| StoreError::InvalidMetadata {
            identifier: identifier.to_string(),
            source,
        })?;

    match rest.first() {
        Some(&SEPARATOR) => Ok((metadata, rest.slice(1..))),
        _ => Err(StoreError::MissingMetadata {
            identifier: identifier.to_string(),
        }),
    }
}

/// Parse one JSON value from the front of `raw` and return the remaining bytes.
///
/// JSON strings may legitimately contain the separator, so the header is
/// located by parsing rather than by searching for the first `|`.
pub(crate) fn split_json_prefix<T: DeserializeOwned>(
    raw: &Bytes,
) -> Result<(T, Bytes), serde_json::Error> {
    let mut stream = serde_json::Deserializer::from_slice(raw).into_iter::<T>();
    let value = match stream.next() {
        Some(result) => result?,
        None => {
            return Err(serde::de::Error::custom("empty entry header"));
        }
    };
    let offset = stream.byte_offset();
    Ok((value, raw.slice(offset..)))
}

/// Storage form of a full HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

#[derive(Serialize, Deserialize)]
struct StoredHead {
    status: u16,
    headers: Vec<(String, String)>,
}

impl StoredResponse {
    /// JSON head immediately followed by the raw body.
    pub fn to_bytes(&self, identifier: &str) -> Result<Bytes, StoreError> {
        let head = StoredHead {
            status: self.status,
            headers: self.headers.clone(),
        };
        let head = serde_json::to_vec(&head).map_err(|source| StoreError::Encode {
            identifier: identifier.to_string(),
            source,
        })?;
        let mut buf = BytesMut::with_capacity(head.len() + self.body.len());
        buf.put_slice(&head);
        buf.put_slice(&self.body);
        Ok(buf.freeze())
    }

    pub fn from_bytes(identifier: &str, raw: &Bytes) -> Result<Self, StoreError> {
        let (head, body) = split_json_prefix::<StoredHead>(raw).map_err(|err| {
            StoreError::MalformedPayload {
                identifier: identifier.to_string(),
                reason: err.to_string(),
            }
        })?;
        Ok(Self {
            status: head.status,
            headers: head.headers,
            body,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
