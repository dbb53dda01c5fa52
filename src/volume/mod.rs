//! Volume — one `.dat`/`.idx` pair serving reads, writes and deletes.
//!
//! A volume owns exactly one append-only data file, one persistent
//! index file, and the in-memory [`NeedleMap`] built from it. All
//! operations take the volume's single mutex for their full duration,
//! including the disk I/O: this serializes data-file seeks against the
//! index update that follows every append, which is what makes the
//! "map references only fully written records" recovery story hold.
//! Callers that need parallelism spread load across volumes.
//!
//! # Lifecycle
//!
//! ```text
//! open ──► serve read/write/delete ──► compact ──► commit_compact ──► (reloaded) ──► close
//! ```
//!
//! Opening replays the `.idx` file; a fresh volume writes its
//! superblock, an existing one opened with [`ReplicaType::Nil`] reads
//! it back. Compaction writes a shadow `.cpd`/`.cpx` pair which
//! `commit_compact` renames over the originals before reloading.
//!
//! # Durability
//!
//! Individual writes are not fsynced. A torn append leaves trailing
//! garbage in the data file, but the needle map is only updated after
//! a successful append, so the garbage is unreferenced and the next
//! compaction drops it.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

mod compact;
mod repair;
mod super_block;

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::{info, trace};

use crate::index::{IndexError, NeedleMap};
use crate::needle::{Needle, NeedleError, PAD_LEN};

pub use repair::rebuild_index_file;
pub use super_block::{ReplicaType, SuperBlock, SUPER_BLOCK_SIZE, SUPER_BLOCK_VERSION};

// ------------------------------------------------------------------------------------------------
// Error types
// ------------------------------------------------------------------------------------------------

/// Errors returned by volume operations.
#[derive(Debug, Error)]
pub enum VolumeError {
    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error from the needle record codec (including CRC mismatches).
    #[error("needle error: {0}")]
    Needle(#[from] NeedleError),

    /// Error from the persistent index.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// The key is absent or tombstoned in the needle map.
    #[error("needle not found")]
    NotFound,

    /// The superblock is truncated, has the wrong version, or carries
    /// an unknown replica type.
    #[error("invalid superblock: {0}")]
    InvalidSuperblock(String),

    /// The data file grew past the 32 GiB range a 32-bit aligned
    /// offset can address.
    #[error("data file offset {0} exceeds the addressable range")]
    OffsetOverflow(u64),

    /// Internal consistency error (poisoned lock).
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// VolumeId
// ------------------------------------------------------------------------------------------------

/// Volume identifier; textual form is plain base-10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeId(u32);

impl VolumeId {
    /// Wraps a raw id.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw id.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VolumeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// ------------------------------------------------------------------------------------------------
// Volume
// ------------------------------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct VolumeInner {
    pub(crate) data_file: File,
    pub(crate) needle_map: NeedleMap,
    pub(crate) super_block: SuperBlock,
}

/// One volume: a data file, its index, and the mutex serializing all
/// access to them.
#[derive(Debug)]
pub struct Volume {
    id: VolumeId,
    dir: PathBuf,
    inner: Mutex<VolumeInner>,
}

impl Volume {
    /// Opens the volume at `<dir>/<id>.dat` / `<dir>/<id>.idx`,
    /// creating both files if absent.
    ///
    /// With [`ReplicaType::Nil`] the replica type is read from the
    /// superblock (the data file must already have one); any other
    /// type writes a fresh superblock iff the data file is empty.
    /// The needle map is rebuilt by replaying the index file.
    pub fn open(
        dir: impl AsRef<Path>,
        id: VolumeId,
        replica_type: ReplicaType,
    ) -> Result<Self, VolumeError> {
        let dir = dir.as_ref().to_path_buf();
        let inner = load(&dir, id, replica_type)?;
        Ok(Self {
            id,
            dir,
            inner: Mutex::new(inner),
        })
    }

    /// This volume's identifier.
    pub fn id(&self) -> VolumeId {
        self.id
    }

    /// Appends `needle` to the data file and records its new location.
    ///
    /// The index update is conditional: a concurrent reappearance of an
    /// older revision never moves the entry backwards — only an offset
    /// strictly beyond the current one wins. Returns the payload length
    /// written.
    pub fn write(&self, needle: &mut Needle) -> Result<u32, VolumeError> {
        let mut inner = self.lock()?;
        let offset = inner.data_file.seek(SeekFrom::End(0))?;
        let written = needle.append(&mut inner.data_file)?;

        let aligned = u32::try_from(offset / u64::from(PAD_LEN))
            .map_err(|_| VolumeError::OffsetOverflow(offset))?;
        let stale = inner
            .needle_map
            .get(needle.id)
            .is_some_and(|nv| u64::from(nv.offset) * u64::from(PAD_LEN) >= offset);
        if !stale {
            inner.needle_map.put(needle.id, aligned, needle.size)?;
        }
        trace!(volume = %self.id, key = needle.id, offset, size = needle.size, "wrote needle");
        Ok(written)
    }

    /// Reads the needle identified by `needle.id`, populating its
    /// payload, checksum, flags and metadata.
    ///
    /// Returns [`VolumeError::NotFound`] for absent or tombstoned keys
    /// and propagates [`NeedleError::CrcMismatch`] on corrupted
    /// payloads — the index entry is kept, since the on-disk record may
    /// still be recoverable.
    pub fn read(&self, needle: &mut Needle) -> Result<usize, VolumeError> {
        let mut inner = self.lock()?;
        let nv = inner
            .needle_map
            .get(needle.id)
            .filter(|nv| nv.offset > 0 && nv.size > 0)
            .ok_or(VolumeError::NotFound)?;
        inner
            .data_file
            .seek(SeekFrom::Start(u64::from(nv.offset) * u64::from(PAD_LEN)))?;
        Ok(needle.read(&mut inner.data_file, nv.size)?)
    }

    /// Deletes the needle identified by `needle.id`.
    ///
    /// Marks the map entry deleted, then appends a payload-less
    /// tombstone record to the data file (its checksum field is left
    /// as-is; compaction skips the record by map lookup). Returns the
    /// payload bytes reclaimed, or `0` if the key was not present.
    pub fn delete(&self, needle: &mut Needle) -> Result<u32, VolumeError> {
        let mut inner = self.lock()?;
        let Some(nv) = inner.needle_map.get(needle.id) else {
            return Ok(0);
        };
        inner.needle_map.delete(needle.id)?;
        needle.data.clear();
        inner.data_file.seek(SeekFrom::End(0))?;
        needle.append(&mut inner.data_file)?;
        trace!(volume = %self.id, key = needle.id, reclaimed = nv.size, "deleted needle");
        Ok(nv.size)
    }

    /// Data file length in bytes, or `-1` if it cannot be stat'ed.
    pub fn size(&self) -> i64 {
        match self.lock() {
            Ok(inner) => inner
                .data_file
                .metadata()
                .map(|m| m.len() as i64)
                .unwrap_or(-1),
            Err(_) => -1,
        }
    }

    /// True when the cluster keeps more than one copy of this volume.
    pub fn needs_replication(&self) -> bool {
        self.lock()
            .map(|inner| inner.super_block.replica_type.copy_count() > 1)
            .unwrap_or(false)
    }

    /// Number of live needles in the index.
    pub fn live_needle_count(&self) -> u64 {
        self.lock().map(|inner| inner.needle_map.live_count()).unwrap_or(0)
    }

    /// Flushes both files to stable storage.
    pub fn close(&self) -> Result<(), VolumeError> {
        let mut inner = self.lock()?;
        inner.needle_map.close()?;
        inner.data_file.sync_all()?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, VolumeInner>, VolumeError> {
        self.inner
            .lock()
            .map_err(|_| VolumeError::Internal("volume mutex poisoned".into()))
    }

    pub(crate) fn data_path(&self) -> PathBuf {
        self.dir.join(format!("{}.dat", self.id))
    }

    pub(crate) fn index_path(&self) -> PathBuf {
        self.dir.join(format!("{}.idx", self.id))
    }

    pub(crate) fn compact_data_path(&self) -> PathBuf {
        self.dir.join(format!("{}.cpd", self.id))
    }

    pub(crate) fn compact_index_path(&self) -> PathBuf {
        self.dir.join(format!("{}.cpx", self.id))
    }
}

// ------------------------------------------------------------------------------------------------
// Loading
// ------------------------------------------------------------------------------------------------

pub(crate) fn load(
    dir: &Path,
    id: VolumeId,
    replica_type: ReplicaType,
) -> Result<VolumeInner, VolumeError> {
    let data_path = dir.join(format!("{id}.dat"));
    let mut data_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(&data_path)?;

    let super_block = if replica_type == ReplicaType::Nil {
        read_super_block(&mut data_file)?
    } else {
        maybe_write_super_block(&mut data_file, replica_type)?
    };

    let index_path = dir.join(format!("{id}.idx"));
    let index_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(&index_path)?;
    let needle_map = NeedleMap::load(index_file)?;

    info!(
        volume = %id,
        dir = %dir.display(),
        replica = ?super_block.replica_type,
        live = needle_map.live_count(),
        "volume loaded"
    );
    Ok(VolumeInner {
        data_file,
        needle_map,
        super_block,
    })
}

fn read_super_block(data_file: &mut File) -> Result<SuperBlock, VolumeError> {
    data_file.seek(SeekFrom::Start(0))?;
    let mut bytes = [0u8; SUPER_BLOCK_SIZE];
    data_file.read_exact(&mut bytes).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            VolumeError::InvalidSuperblock("data file too short".into())
        } else {
            VolumeError::Io(e)
        }
    })?;
    SuperBlock::parse(&bytes)
}

fn maybe_write_super_block(
    data_file: &mut File,
    replica_type: ReplicaType,
) -> Result<SuperBlock, VolumeError> {
    let super_block = SuperBlock::new(replica_type);
    if data_file.metadata()?.len() == 0 {
        data_file.write_all(&super_block.to_bytes())?;
        info!(replica = ?replica_type, "superblock written");
    }
    Ok(super_block)
}
