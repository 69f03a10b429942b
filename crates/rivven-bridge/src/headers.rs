//! Record headers and content-type resolution
//!
//! Broker records carry an ordered list of `(key, bytes)` headers in which a
//! key may repeat; lookups use last-wins semantics. [`ContentTypeResolver`]
//! reads the content type from whichever known alias is present first.

use crate::error::{BridgeError, BridgeResult};
use crate::mime::MimeType;
use std::collections::{BTreeMap, HashMap};

/// Header keys recognised as carrying the content type, in priority order
pub const CONTENT_TYPE_ALIASES: [&str; 3] = ["content-type", "Content-Type", "contentType"];

/// Canonical key written on outbound envelopes
pub const CONTENT_TYPE_HEADER: &str = "content-type";

/// Ordered, multi-valued record headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<u8>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping earlier values with the same key
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Builder-style [`Headers::add`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.add(key, value);
        self
    }

    /// Replace every value for `key` with a single value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        let key = key.into();
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, value.into()));
    }

    /// Drop every value for `key`
    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    /// The last value recorded for `key`
    pub fn last_header(&self, key: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// The last value for `key` as UTF-8 text
    pub fn last_str(&self, key: &str) -> Option<&str> {
        self.last_header(key)
            .and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Vec<u8>>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<&BTreeMap<String, String>> for Headers {
    fn from(map: &BTreeMap<String, String>) -> Self {
        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// Anything that can answer a last-wins header lookup
pub trait HeaderLookup {
    fn lookup(&self, key: &str) -> Option<&[u8]>;
}

impl HeaderLookup for Headers {
    fn lookup(&self, key: &str) -> Option<&[u8]> {
        self.last_header(key)
    }
}

impl HeaderLookup for BTreeMap<String, String> {
    fn lookup(&self, key: &str) -> Option<&[u8]> {
        self.get(key).map(String::as_bytes)
    }
}

impl HeaderLookup for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<&[u8]> {
        self.get(key).map(String::as_bytes)
    }
}

/// Extracts a [`MimeType`] from record headers
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentTypeResolver;

impl ContentTypeResolver {
    /// Resolve the content type.
    ///
    /// The first alias of [`CONTENT_TYPE_ALIASES`] that is present wins; its
    /// last value is parsed. Fails with `MissingContentType` when no alias
    /// is present.
    pub fn resolve<H: HeaderLookup + ?Sized>(headers: &H) -> BridgeResult<MimeType> {
        let raw = Self::raw(headers).ok_or(BridgeError::MissingContentType)?;
        let text = std::str::from_utf8(raw).map_err(|e| {
            BridgeError::malformed(String::from_utf8_lossy(raw), format!("not UTF-8: {}", e))
        })?;
        MimeType::parse(text)
    }

    /// Whether any content-type alias is present
    pub fn is_present<H: HeaderLookup + ?Sized>(headers: &H) -> bool {
        Self::raw(headers).is_some()
    }

    fn raw<H: HeaderLookup + ?Sized>(headers: &H) -> Option<&[u8]> {
        CONTENT_TYPE_ALIASES
            .iter()
            .find_map(|alias| headers.lookup(alias))
    }
}
