//! Needle record codec.
//!
//! A **needle** is one stored object plus its metadata, laid out as a
//! single contiguous on-disk record. Records are written append-only
//! and are always padded to an 8-byte boundary, which lets the volume
//! index address 32 GiB of data with a 32-bit offset (offsets are
//! stored in units of [`PAD_LEN`]).
//!
//! # On-disk layout
//!
//! ```text
//! Header(24) = cookie:u32_be | id:u64_be | size:u32_be |
//!              flags:u8 | infosize:u16_be | reserved:u8[5]
//! Payload    = size bytes
//! Checksum   = crc32_be(Payload)
//! Metadata   = infosize bytes (RFC 822-style header block)
//! Padding    = zero bytes to 8-byte alignment
//! ```
//!
//! All integers are big-endian. The CRC32 covers the payload exactly —
//! not the header or metadata.
//!
//! # Reading discipline
//!
//! - [`Needle::read`] fetches header + payload + checksum as one block,
//!   verifies the CRC, then reads the metadata block if present.
//!   A checksum disagreement is [`NeedleError::CrcMismatch`]; a short
//!   read is [`NeedleError::UnexpectedEof`].
//! - [`Needle::peek_header`] reads only the 24-byte header and returns
//!   the number of bytes to skip to reach the next record, enabling
//!   sequential scans that never touch payloads.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

pub mod meta;

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

pub use meta::MetaHeaders;

// ------------------------------------------------------------------------------------------------
// Format constants
// ------------------------------------------------------------------------------------------------

/// Alignment of every record; offsets are stored in units of this.
pub const PAD_LEN: u32 = 8;

/// Fixed needle header length in bytes.
pub const NEEDLE_HEADER_SIZE: u32 = 24;

/// Length of the big-endian CRC32 that follows the payload.
pub const CHECKSUM_LEN: u32 = 4;

/// Flag bit 0: the payload is gzip-compressed. The engine only stores
/// the bit; compression itself happens in upper layers.
pub const FLAG_GZIPPED: u8 = 1 << 0;

// ------------------------------------------------------------------------------------------------
// Error types
// ------------------------------------------------------------------------------------------------

/// Errors returned by needle encode/decode operations.
#[derive(Debug, Error)]
pub enum NeedleError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stored CRC32 disagrees with the checksum of the payload read
    /// from disk.
    #[error("crc mismatch: stored {stored:08x}, computed {computed:08x}")]
    CrcMismatch {
        /// Checksum stored after the payload.
        stored: u32,
        /// Checksum recomputed over the payload bytes.
        computed: u32,
    },

    /// The record ended before all announced bytes could be read.
    #[error("unexpected end of file inside a needle record")]
    UnexpectedEof,

    /// The metadata block could not be parsed as an RFC 822 header
    /// block.
    #[error("invalid metadata block: {0}")]
    InvalidMetadata(String),

    /// The payload does not fit the `size:u32` header field.
    #[error("payload length {0} exceeds the u32 record limit")]
    PayloadTooLarge(usize),
}

/// Collapses `read_exact`'s `UnexpectedEof` kind into the dedicated
/// short-read variant; everything else stays an I/O error.
fn short_read(e: io::Error) -> NeedleError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        NeedleError::UnexpectedEof
    } else {
        NeedleError::Io(e)
    }
}

// ------------------------------------------------------------------------------------------------
// Needle
// ------------------------------------------------------------------------------------------------

/// One stored object: identifier, payload, checksum, flags and optional
/// metadata headers.
///
/// The `cookie` is a random 32-bit value chosen when the object is
/// created; retrieval requires presenting it alongside the key, which
/// makes needle ids impractical to enumerate.
#[derive(Debug, Default, Clone)]
pub struct Needle {
    /// Anti-enumeration salt required for retrieval.
    pub cookie: u32,

    /// Needle identifier, unique within a volume.
    pub id: u64,

    /// Payload length in bytes; set from `data` on append.
    pub size: u32,

    /// The object payload.
    pub data: Vec<u8>,

    /// CRC32 over the payload.
    pub checksum: u32,

    /// Flag bits; see [`FLAG_GZIPPED`].
    pub flags: u8,

    /// Allow-listed metadata headers stored alongside the payload.
    pub meta: MetaHeaders,

    /// Serialized metadata length as stored in the header.
    pub(crate) info_size: u16,
}

impl Needle {
    /// Creates a needle ready to be written: the checksum is computed
    /// over `data` immediately.
    pub fn new(id: u64, cookie: u32, data: Vec<u8>) -> Self {
        let checksum = crc32fast::hash(&data);
        Self {
            cookie,
            id,
            data,
            checksum,
            ..Self::default()
        }
    }

    /// Creates an empty needle carrying only an id, for lookups and
    /// deletions.
    pub fn with_id(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// True when flag bit 0 marks the payload as gzip-compressed.
    pub fn is_gzipped(&self) -> bool {
        self.flags & FLAG_GZIPPED != 0
    }

    /// Marks the payload as gzip-compressed.
    pub fn set_gzipped(&mut self) {
        self.flags |= FLAG_GZIPPED;
    }

    /// Appends the full record to `w`: header, payload, checksum,
    /// metadata, zero padding.
    ///
    /// Sets `self.size` from the payload length before encoding and
    /// returns it. The metadata block is serialized through the
    /// allow-list (see [`MetaHeaders::to_bytes`]).
    pub fn append<W: Write>(&mut self, w: &mut W) -> Result<u32, NeedleError> {
        let info = self.meta.to_bytes();
        self.append_with_meta_bytes(w, &info)
    }

    /// Appends the record with an already-serialized metadata block.
    ///
    /// Compaction uses this to carry metadata bytes verbatim from the
    /// source record, which keeps the rewritten record byte-length
    /// identical to the original.
    pub(crate) fn append_with_meta_bytes<W: Write>(
        &mut self,
        w: &mut W,
        info: &[u8],
    ) -> Result<u32, NeedleError> {
        self.size = u32::try_from(self.data.len())
            .map_err(|_| NeedleError::PayloadTooLarge(self.data.len()))?;
        // `MetaHeaders::to_bytes` already truncates; raw blocks read
        // back from disk were bounded by `infosize:u16` to begin with.
        let info = &info[..info.len().min(u16::MAX as usize)];
        self.info_size = info.len() as u16;

        let mut header = [0u8; NEEDLE_HEADER_SIZE as usize];
        BigEndian::write_u32(&mut header[0..4], self.cookie);
        BigEndian::write_u64(&mut header[4..12], self.id);
        BigEndian::write_u32(&mut header[12..16], self.size);
        header[16] = self.flags;
        BigEndian::write_u16(&mut header[17..19], self.info_size);

        w.write_all(&header)?;
        w.write_all(&self.data)?;

        let mut checksum = [0u8; CHECKSUM_LEN as usize];
        BigEndian::write_u32(&mut checksum, self.checksum);
        w.write_all(&checksum)?;

        if !info.is_empty() {
            w.write_all(info)?;
        }

        let padding = padding_len(self.size, self.info_size);
        if padding > 0 {
            w.write_all(&[0u8; PAD_LEN as usize][..padding as usize])?;
        }
        Ok(self.size)
    }

    /// Reads a full record whose payload length is already known from
    /// the index.
    ///
    /// Header, payload and checksum are fetched as one block; the CRC
    /// is verified before the metadata block is read. Returns the
    /// number of bytes in the fixed block.
    pub fn read<R: Read>(&mut self, r: &mut R, size: u32) -> Result<usize, NeedleError> {
        let block_len =
            (u64::from(NEEDLE_HEADER_SIZE) + u64::from(size) + u64::from(CHECKSUM_LEN)) as usize;
        let mut block = vec![0u8; block_len];
        r.read_exact(&mut block).map_err(short_read)?;

        self.decode_header(&block[..NEEDLE_HEADER_SIZE as usize]);
        let payload_end = (NEEDLE_HEADER_SIZE + size) as usize;
        self.data = block[NEEDLE_HEADER_SIZE as usize..payload_end].to_vec();
        self.checksum = BigEndian::read_u32(&block[payload_end..]);

        let computed = crc32fast::hash(&self.data);
        if self.checksum != computed {
            return Err(NeedleError::CrcMismatch {
                stored: self.checksum,
                computed,
            });
        }

        if self.info_size > 0 {
            let mut info = vec![0u8; self.info_size as usize];
            r.read_exact(&mut info).map_err(short_read)?;
            self.meta = MetaHeaders::parse(&info)?;
        }
        Ok(block_len)
    }

    /// Reads just the 24-byte header and returns the needle (header
    /// fields only) plus the number of bytes between the header and the
    /// next record: `size + checksum + infosize + padding`.
    ///
    /// Returns `Ok(None)` on a clean end of file at a record boundary;
    /// a header cut short mid-way is [`NeedleError::UnexpectedEof`].
    pub fn peek_header<R: Read>(r: &mut R) -> Result<Option<(Needle, u32)>, NeedleError> {
        let mut header = [0u8; NEEDLE_HEADER_SIZE as usize];
        let mut filled = 0;
        while filled < header.len() {
            let n = r.read(&mut header[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(NeedleError::UnexpectedEof);
            }
            filled += n;
        }

        let mut needle = Needle::default();
        needle.decode_header(&header);
        // u64 math: a corrupt size field must not overflow the sum.
        let jump = u64::from(needle.size)
            + u64::from(CHECKSUM_LEN)
            + u64::from(needle.info_size)
            + u64::from(padding_len(needle.size, needle.info_size));
        Ok(Some((needle, jump as u32)))
    }

    fn decode_header(&mut self, header: &[u8]) {
        self.cookie = BigEndian::read_u32(&header[0..4]);
        self.id = BigEndian::read_u64(&header[4..12]);
        self.size = BigEndian::read_u32(&header[12..16]);
        self.flags = header[16];
        self.info_size = BigEndian::read_u16(&header[17..19]);
    }
}

/// Zero bytes needed to bring a record to 8-byte alignment.
pub(crate) fn padding_len(size: u32, info_size: u16) -> u32 {
    let unpadded = u64::from(size)
        + u64::from(NEEDLE_HEADER_SIZE)
        + u64::from(info_size)
        + u64::from(CHECKSUM_LEN);
    ((u64::from(PAD_LEN) - (unpadded % u64::from(PAD_LEN))) % u64::from(PAD_LEN)) as u32
}
