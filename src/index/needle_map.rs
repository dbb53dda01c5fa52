//! Persistent needle map — compact map plus the `.idx` mutation log.
//!
//! # On-disk layout
//!
//! The index file is an append-only stream of 16-byte records:
//!
//! ```text
//! key:u64_be | offset:u32_be | size:u32_be
//! ```
//!
//! `offset == 0` denotes a deletion. Replay is left-to-right, later
//! records overriding earlier ones; a truncated final record is ignored
//! and overwritten by the next append. Appends are not fsynced — the
//! map is rebuilt from whatever prefix survives a crash, and the data
//! file's own offset-scan recovery covers the rest.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ByteOrder};
use tracing::{debug, warn};

use super::{CompactMap, IndexError, NeedleValue};

/// Size of one persistent index record.
pub const INDEX_RECORD_SIZE: usize = 16;

/// In-memory needle index backed by a persistent mutation log.
///
/// Every [`put`](NeedleMap::put) and [`delete`](NeedleMap::delete)
/// appends one record to the `.idx` file before updating the in-memory
/// [`CompactMap`], making the file a write-ahead-like log: replaying it
/// restores the map exactly.
#[derive(Debug)]
pub struct NeedleMap {
    map: CompactMap,
    index_file: File,
    live_count: u64,
    deleted_count: u64,
}

impl NeedleMap {
    /// Wraps a fresh (empty) index file. Used for newly created volumes
    /// and for the shadow index written during compaction.
    pub fn new(index_file: File) -> Self {
        Self {
            map: CompactMap::new(),
            index_file,
            live_count: 0,
            deleted_count: 0,
        }
    }

    /// Rebuilds the map by replaying `index_file` from the start.
    ///
    /// Each complete 16-byte record is applied in order: `offset != 0`
    /// is an upsert, `offset == 0` a deletion. A truncated final record
    /// stops the replay with a warning; the write cursor is left at the
    /// end of the last complete record so the next append overwrites
    /// the torn tail.
    pub fn load(mut index_file: File) -> Result<Self, IndexError> {
        index_file.seek(SeekFrom::Start(0))?;

        let mut map = CompactMap::new();
        let mut live_count = 0u64;
        let mut deleted_count = 0u64;
        let mut consumed = 0u64;

        let mut reader = BufReader::new(&index_file);
        let mut record = [0u8; INDEX_RECORD_SIZE];
        loop {
            match read_record(&mut reader, &mut record)? {
                ReadOutcome::Complete => {}
                ReadOutcome::CleanEof => break,
                ReadOutcome::Truncated(got) => {
                    warn!(
                        offset = consumed,
                        partial_bytes = got,
                        "truncated index record, ignoring tail"
                    );
                    break;
                }
            }
            let key = BigEndian::read_u64(&record[0..8]);
            let offset = BigEndian::read_u32(&record[8..12]);
            let size = BigEndian::read_u32(&record[12..16]);
            if offset != 0 {
                apply_set(&mut map, &mut live_count, key, offset, size);
            } else {
                apply_delete(&mut map, &mut live_count, &mut deleted_count, key);
            }
            consumed += INDEX_RECORD_SIZE as u64;
        }
        drop(reader);
        index_file.seek(SeekFrom::Start(consumed))?;

        debug!(
            replayed = consumed / INDEX_RECORD_SIZE as u64,
            live = live_count,
            deleted = deleted_count,
            "needle map replayed"
        );
        Ok(Self {
            map,
            index_file,
            live_count,
            deleted_count,
        })
    }

    /// Appends an upsert record, then updates the in-memory map.
    ///
    /// Returns the number of live entries after the insert.
    pub fn put(&mut self, key: u64, offset: u32, size: u32) -> Result<u64, IndexError> {
        self.append_record(key, offset, size)?;
        apply_set(&mut self.map, &mut self.live_count, key, offset, size);
        Ok(self.live_count)
    }

    /// Appends a deletion record (`offset == 0` sentinel), then marks
    /// the in-memory entry deleted.
    pub fn delete(&mut self, key: u64) -> Result<(), IndexError> {
        self.append_record(key, 0, 0)?;
        apply_delete(
            &mut self.map,
            &mut self.live_count,
            &mut self.deleted_count,
            key,
        );
        Ok(())
    }

    /// Looks up `key`. Tombstoned entries are returned as-is; callers
    /// check [`NeedleValue::is_deleted`].
    pub fn get(&self, key: u64) -> Option<NeedleValue> {
        self.map.get(key)
    }

    /// Number of entries currently live (`size > 0`).
    pub fn live_count(&self) -> u64 {
        self.live_count
    }

    /// Number of deletions applied over the map's lifetime.
    pub fn deleted_count(&self) -> u64 {
        self.deleted_count
    }

    /// The underlying in-memory map.
    pub fn compact_map(&self) -> &CompactMap {
        &self.map
    }

    /// Flushes the index file to stable storage.
    pub fn close(&mut self) -> Result<(), IndexError> {
        self.index_file.sync_all()?;
        Ok(())
    }

    fn append_record(&mut self, key: u64, offset: u32, size: u32) -> Result<(), IndexError> {
        let mut record = [0u8; INDEX_RECORD_SIZE];
        BigEndian::write_u64(&mut record[0..8], key);
        BigEndian::write_u32(&mut record[8..12], offset);
        BigEndian::write_u32(&mut record[12..16], size);
        self.index_file.write_all(&record)?;
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Replay helpers
// ------------------------------------------------------------------------------------------------

enum ReadOutcome {
    Complete,
    CleanEof,
    Truncated(usize),
}

/// Reads one full record, distinguishing a clean end of file at a
/// record boundary from a torn final record.
fn read_record<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<ReadOutcome, IndexError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            return Ok(if filled == 0 {
                ReadOutcome::CleanEof
            } else {
                ReadOutcome::Truncated(filled)
            });
        }
        filled += n;
    }
    Ok(ReadOutcome::Complete)
}

fn apply_set(map: &mut CompactMap, live_count: &mut u64, key: u64, offset: u32, size: u32) {
    let was_live = map.get(key).is_some_and(|v| !v.is_deleted());
    map.set(key, offset, size);
    match (was_live, size > 0) {
        (false, true) => *live_count += 1,
        (true, false) => *live_count -= 1,
        _ => {}
    }
}

fn apply_delete(map: &mut CompactMap, live_count: &mut u64, deleted_count: &mut u64, key: u64) {
    if let Some(prev) = map.get(key) {
        if !prev.is_deleted() {
            *live_count -= 1;
        }
        *deleted_count += 1;
    }
    map.delete(key);
}
