//! Offline volume compaction — copy-live pass plus atomic swap.
//!
//! Compaction reclaims the space held by deleted and overwritten
//! needles in two phases, both under the volume lock:
//!
//! 1. [`Volume::compact`] scans the data file header-by-header and
//!    copies every record the live needle map still points at into a
//!    shadow `.cpd` data file, writing a matching `.cpx` index as it
//!    goes. Dead revisions, tombstoned entries and trailing garbage
//!    from torn appends are skipped without reading their payloads.
//! 2. [`Volume::commit_compact`] renames the shadow pair over the
//!    `.dat`/`.idx` originals (atomic per file) and reloads the
//!    volume from the new files.
//!
//! If the copy pass fails, the shadow files are removed and the volume
//! is untouched. A failure between the two renames leaves the volume
//! inconsistent; the old index still matches the old data file when the
//! first rename failed, otherwise the pre-compaction pair must be
//! restored from a copy.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{info, trace, warn};

use crate::index::NeedleMap;
use crate::needle::{Needle, NeedleError, CHECKSUM_LEN, NEEDLE_HEADER_SIZE, PAD_LEN};

use super::{load, SuperBlock, Volume, VolumeError, SUPER_BLOCK_SIZE};

impl Volume {
    /// Phase 1: writes the shadow `.cpd`/`.cpx` pair holding only the
    /// live needles. The volume keeps serving from the original files
    /// until [`Volume::commit_compact`].
    pub fn compact(&self) -> Result<(), VolumeError> {
        let inner = self.lock()?;
        info!(volume = %self.id(), "compaction started");
        let result = copy_live_needles(
            &self.data_path(),
            &self.compact_data_path(),
            &self.compact_index_path(),
            &inner.needle_map,
        );
        if result.is_err() {
            let _ = fs::remove_file(self.compact_data_path());
            let _ = fs::remove_file(self.compact_index_path());
        }
        result
    }

    /// Phase 2: swaps the shadow pair in and reloads the volume.
    pub fn commit_compact(&self) -> Result<(), VolumeError> {
        let mut inner = self.lock()?;
        inner.data_file.sync_all()?;
        fs::rename(self.compact_data_path(), self.data_path())?;
        fs::rename(self.compact_index_path(), self.index_path())?;

        let replica_type = inner.super_block.replica_type;
        *inner = load(&self.dir, self.id(), replica_type)?;
        info!(
            volume = %self.id(),
            live = inner.needle_map.live_count(),
            "compaction committed"
        );
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Copy-live pass
// ------------------------------------------------------------------------------------------------

fn copy_live_needles(
    src_path: &Path,
    dst_path: &Path,
    idx_path: &Path,
    live: &NeedleMap,
) -> Result<(), VolumeError> {
    let mut src = OpenOptions::new().read(true).open(src_path)?;
    let mut dst = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(dst_path)?;
    let idx = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(idx_path)?;

    copy_super_block(&mut src, &mut dst)?;
    let mut new_map = NeedleMap::new(idx);

    let mut old_offset = SUPER_BLOCK_SIZE as u64;
    let mut new_offset = SUPER_BLOCK_SIZE as u64;
    loop {
        let (mut needle, jump) = match Needle::peek_header(&mut src) {
            Ok(Some(peeked)) => peeked,
            Ok(None) => break,
            // A torn final append is unreferenced by definition; the
            // scan simply ends before it.
            Err(NeedleError::UnexpectedEof) => {
                warn!(offset = old_offset, "torn record at end of data file, dropping");
                break;
            }
            Err(e) => return Err(e.into()),
        };
        let jump = u64::from(jump);

        let live_at_offset = live.get(needle.id).filter(|nv| {
            u64::from(nv.offset) * u64::from(PAD_LEN) == old_offset && !nv.is_deleted()
        });
        match live_at_offset {
            None => {
                // Dead revision or tombstoned entry; payload never read.
                trace!(key = needle.id, offset = old_offset, "skipping dead needle");
                src.seek(SeekFrom::Current(jump as i64))?;
            }
            Some(nv) => {
                let aligned = u32::try_from(new_offset / u64::from(PAD_LEN))
                    .map_err(|_| VolumeError::OffsetOverflow(new_offset))?;

                let mut block = vec![0u8; (needle.size + CHECKSUM_LEN) as usize];
                src.read_exact(&mut block)?;
                block.truncate(needle.size as usize);
                needle.data = block;
                needle.checksum = crc32fast::hash(&needle.data);

                let mut meta = vec![0u8; usize::from(needle.info_size)];
                if !meta.is_empty() {
                    src.read_exact(&mut meta)?;
                }
                needle.append_with_meta_bytes(&mut dst, &meta)?;
                new_map.put(needle.id, aligned, needle.size)?;

                trace!(
                    key = needle.id,
                    old_offset,
                    new_offset,
                    size = nv.size,
                    "copied live needle"
                );
                let consumed =
                    u64::from(needle.size + CHECKSUM_LEN) + u64::from(needle.info_size);
                src.seek(SeekFrom::Current((jump - consumed) as i64))?;
                new_offset += jump + u64::from(NEEDLE_HEADER_SIZE);
            }
        }
        old_offset += jump + u64::from(NEEDLE_HEADER_SIZE);
    }

    dst.sync_all()?;
    new_map.close()?;
    info!(
        live = new_map.live_count(),
        new_size = new_offset,
        "copy-live pass finished"
    );
    Ok(())
}

/// Carries the 8-byte superblock over verbatim.
fn copy_super_block(src: &mut File, dst: &mut File) -> Result<(), VolumeError> {
    let mut header = [0u8; SUPER_BLOCK_SIZE];
    src.read_exact(&mut header).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            VolumeError::InvalidSuperblock("data file too short".into())
        } else {
            VolumeError::Io(e)
        }
    })?;
    // Reject a source file this engine would not have produced.
    SuperBlock::parse(&header)?;
    dst.write_all(&header)?;
    Ok(())
}
