//! FileId codec — the external handle to a stored object.
//!
//! A file id is the triple `(volume id, key, cookie)` with the textual
//! form `<volumeId>,<hex>[_<delta>]`, where `<hex>` is the
//! concatenation of the key (8 big-endian bytes) and the cookie
//! (4 big-endian bytes) with leading zero bytes suppressed. The decoded
//! hex is always at least 5 bytes: the last 4 are the cookie, the
//! prefix — left-padded with zeros back to 8 bytes — is the key.
//!
//! The optional `_<delta>` suffix adds a decimal offset to the parsed
//! key, letting one URL pack several adjacent object references.
//!
//! `parse` and `format` round-trip: `FileId::parse(&fid.to_string())`
//! yields `fid` back.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use crate::volume::VolumeId;

/// Combined width of key and cookie in the hex part.
const KEY_HASH_LEN: usize = 12;

/// Minimum decoded length of the hex part: 4 cookie bytes plus at
/// least one key byte.
const MIN_KEY_HASH_LEN: usize = 5;

// ------------------------------------------------------------------------------------------------
// Error types
// ------------------------------------------------------------------------------------------------

/// Errors returned when parsing a textual file id.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FileIdError {
    /// Not of the form `<volumeId>,<hex>` with two non-empty parts.
    #[error("invalid file id {0:?}: expected <volumeId>,<keyhex>")]
    Malformed(String),

    /// The volume id part is not a base-10 `u32`.
    #[error("invalid volume id {0:?}")]
    InvalidVolumeId(String),

    /// The key/cookie part is not valid hex.
    #[error("invalid key hash hex {0:?}")]
    InvalidHex(String),

    /// The decoded key/cookie part is outside 5..=12 bytes.
    #[error("key hash decodes to {0} bytes, expected 5 to 12")]
    KeyHashLength(usize),

    /// The `_<delta>` suffix is not a decimal integer.
    #[error("invalid delta suffix {0:?}")]
    InvalidDelta(String),
}

// ------------------------------------------------------------------------------------------------
// FileId
// ------------------------------------------------------------------------------------------------

/// The external handle to one stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileId {
    /// Volume holding the object.
    pub volume_id: VolumeId,

    /// Needle key within the volume.
    pub key: u64,

    /// Anti-enumeration cookie required for retrieval.
    pub cookie: u32,
}

impl FileId {
    /// Builds a file id from its parts.
    pub fn new(volume_id: VolumeId, key: u64, cookie: u32) -> Self {
        Self {
            volume_id,
            key,
            cookie,
        }
    }

    /// Parses `<volumeId>,<hex>[_<delta>]`.
    pub fn parse(fid: &str) -> Result<Self, FileIdError> {
        let (vid_part, key_hash_part) = fid
            .split_once(',')
            .ok_or_else(|| FileIdError::Malformed(fid.to_string()))?;
        if vid_part.is_empty() || key_hash_part.is_empty() {
            return Err(FileIdError::Malformed(fid.to_string()));
        }

        let volume_id: VolumeId = vid_part
            .parse()
            .map_err(|_| FileIdError::InvalidVolumeId(vid_part.to_string()))?;

        let (key_hash_part, delta) = match key_hash_part.rsplit_once('_') {
            Some((head, tail)) if !head.is_empty() => {
                let delta: u64 = tail
                    .parse()
                    .map_err(|_| FileIdError::InvalidDelta(tail.to_string()))?;
                (head, delta)
            }
            _ => (key_hash_part, 0),
        };

        let (key, cookie) = parse_key_hash(key_hash_part)?;
        Ok(Self {
            volume_id,
            key: key.wrapping_add(delta),
            cookie,
        })
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = [0u8; KEY_HASH_LEN];
        BigEndian::write_u64(&mut bytes[0..8], self.key);
        BigEndian::write_u32(&mut bytes[8..12], self.cookie);
        // Suppress leading zero bytes, but never shorten the hex part
        // below the 5 decoded bytes the parser requires.
        let first_nonzero = bytes.iter().position(|b| *b != 0).unwrap_or(KEY_HASH_LEN);
        let start = first_nonzero.min(KEY_HASH_LEN - MIN_KEY_HASH_LEN);

        write!(f, "{},", self.volume_id)?;
        for b in &bytes[start..] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Key/cookie hex codec
// ------------------------------------------------------------------------------------------------

/// Splits the decoded hex into `(key, cookie)`: the last 4 bytes are
/// the cookie, the prefix is the key left-padded to 8 bytes.
fn parse_key_hash(hex: &str) -> Result<(u64, u32), FileIdError> {
    let bytes = decode_hex(hex)?;
    if !(MIN_KEY_HASH_LEN..=KEY_HASH_LEN).contains(&bytes.len()) {
        return Err(FileIdError::KeyHashLength(bytes.len()));
    }
    let split = bytes.len() - 4;
    let mut key_bytes = [0u8; 8];
    key_bytes[8 - split..].copy_from_slice(&bytes[..split]);
    let key = BigEndian::read_u64(&key_bytes);
    let cookie = BigEndian::read_u32(&bytes[split..]);
    Ok((key, cookie))
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, FileIdError> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return Err(FileIdError::InvalidHex(hex.to_string()));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| FileIdError::InvalidHex(hex.to_string()))
        })
        .collect()
}
