//! Cache key and content hash derivation.

use std::fmt;

use sha2::{Digest, Sha256};
use url::form_urlencoded;

/// Opaque identifier of one cached page.
///
/// Derived from the request host, path and the allow-listed query parameters
/// in a stable order, so ignored parameters and parameter ordering never
/// produce distinct entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from request parts. `params` must already be filtered.
    pub fn from_parts(host: Option<&str>, path: &str, params: &[(String, String)]) -> Self {
        Self(hash_hex(key_material(host, path, params).as_bytes()))
    }

    /// Wrap an identifier that is already a key (e.g. a fragment identifier).
    pub fn from_identifier(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn key_material(host: Option<&str>, path: &str, params: &[(String, String)]) -> String {
    let host = host.map(str::to_ascii_lowercase).unwrap_or_default();
    let path = if path.is_empty() { "/" } else { path };

    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut material = format!("{host}{path}");
    if !sorted.is_empty() {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(sorted.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish();
        material.push('?');
        material.push_str(&query);
    }
    material
}

/// Lowercase hex SHA-256 digest.
pub fn hash_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Quoted strong validator for a response body.
pub fn etag_for(body: &[u8]) -> String {
    format!("\"{}\"", hash_hex(body))
}
