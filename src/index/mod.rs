//! Volume index — in-memory compact map plus its persistent mirror.
//!
//! Two layers live here:
//!
//! - [`CompactMap`] — an in-memory ordered map from needle key to
//!   `(offset, size)`, tuned for the append-heavy workload where keys
//!   arrive mostly in increasing order.
//! - [`NeedleMap`] — wraps one [`CompactMap`] and a handle to the
//!   volume's `.idx` file. Every mutation is appended to the file
//!   before the in-memory map is touched, so the file is a replayable
//!   log of index mutations: on startup the map is rebuilt by reading
//!   it left-to-right.
//!
//! Index entries use `size == 0` as the tombstone marker; a deleted key
//! stays in the map (and is skipped by the volume layer) until the next
//! compaction rewrites the index from scratch.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

mod compact_map;
mod needle_map;

use thiserror::Error;

pub use compact_map::{CompactMap, CompactSection, SECTION_CAPACITY};
pub use needle_map::{NeedleMap, INDEX_RECORD_SIZE};

// ------------------------------------------------------------------------------------------------
// Error types
// ------------------------------------------------------------------------------------------------

/// Errors returned by persistent index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Underlying I/O error on the `.idx` file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// Index entry
// ------------------------------------------------------------------------------------------------

/// One index entry: where a needle lives and how large its payload is.
///
/// `offset` is stored in units of the 8-byte pad length, which makes
/// 32 GiB of data addressable with 32 bits. `size == 0` marks a
/// deleted needle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeedleValue {
    /// Needle identifier.
    pub key: u64,

    /// Record offset in the data file, in units of the pad length.
    pub offset: u32,

    /// Payload length in bytes; `0` is a tombstone.
    pub size: u32,
}

impl NeedleValue {
    /// True when this entry is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.size == 0
    }
}
