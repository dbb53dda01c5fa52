//! Needle metadata header block.
//!
//! A needle may carry a small RFC 822-style header block after its
//! checksum (`Name: value\r\n` lines). The engine treats the block as
//! opaque storage for upper layers with two restrictions:
//!
//! - only allow-listed header names ([`ALLOWED_HEADERS`]) survive
//!   serialization — everything else is silently dropped on write;
//! - the serialized block is truncated at `u16::MAX` bytes, the widest
//!   length the needle header's `infosize` field can describe.
//!
//! Header names are canonicalized (`content-type` → `Content-Type`) so
//! lookups and the on-disk form are case-insensitive in effect.

use std::collections::BTreeMap;

use super::NeedleError;

/// Header names that are persisted; all others are dropped on write.
pub const ALLOWED_HEADERS: [&str; 2] = ["Content-Type", "X-Filename"];

/// Serialized metadata blocks never exceed what `infosize:u16` can hold.
const MAX_BLOCK_LEN: usize = u16::MAX as usize;

/// An ordered multi-map of canonicalized header names to values.
///
/// Keys are stored canonicalized and sorted, so serialization is
/// deterministic: the same logical headers always produce the same
/// bytes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MetaHeaders {
    entries: BTreeMap<String, Vec<String>>,
}

impl MetaHeaders {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all values of `name` with a single `value`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .insert(canonical_key(name), vec![value.into()]);
    }

    /// Appends `value` to the values of `name`.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .entry(canonical_key(name))
            .or_default()
            .push(value.into());
    }

    /// Returns the first value of `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&canonical_key(name))
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Number of header names present (not filtered by the allow-list).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no headers are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the allow-listed headers as `Name: value\r\n` lines.
    ///
    /// Names are emitted in sorted order, one line per value. The result
    /// is truncated at `u16::MAX` bytes so it always fits the needle
    /// header's `infosize` field.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, values) in &self.entries {
            if !ALLOWED_HEADERS.contains(&name.as_str()) {
                continue;
            }
            for value in values {
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(b": ");
                out.extend_from_slice(value.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
        }
        if out.len() > MAX_BLOCK_LEN {
            out.truncate(MAX_BLOCK_LEN);
        }
        out
    }

    /// Parses a serialized header block back into a map.
    ///
    /// Accepts both `\r\n` and bare `\n` line endings, and folds
    /// continuation lines (leading space or tab) into the previous
    /// value. A non-empty line without a colon is rejected.
    pub fn parse(bytes: &[u8]) -> Result<Self, NeedleError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| NeedleError::InvalidMetadata(format!("not valid UTF-8: {e}")))?;

        let mut headers = Self::new();
        let mut last_key: Option<String> = None;

        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                // Folded continuation of the previous header value.
                let key = last_key.as_ref().ok_or_else(|| {
                    NeedleError::InvalidMetadata("continuation line without a header".into())
                })?;
                if let Some(values) = headers.entries.get_mut(key) {
                    if let Some(value) = values.last_mut() {
                        value.push(' ');
                        value.push_str(line.trim());
                    }
                }
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                NeedleError::InvalidMetadata(format!("malformed header line: {line:?}"))
            })?;
            let key = canonical_key(name);
            headers
                .entries
                .entry(key.clone())
                .or_default()
                .push(value.trim().to_string());
            last_key = Some(key);
        }
        Ok(headers)
    }
}

/// Canonicalizes a header name: each `-`-separated segment gets an
/// uppercase first letter and lowercase remainder (`x-filename` →
/// `X-Filename`).
fn canonical_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, segment) in name.trim().split('-').enumerate() {
        if i > 0 {
            out.push('-');
        }
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.extend(chars.flat_map(char::to_lowercase));
        }
    }
    out
}
