//! Index rebuild — regenerate a lost or corrupted `.idx` file.
//!
//! The data file alone carries enough structure to reconstruct the
//! index: a sequential header scan visits every record in write order,
//! so replaying `put` for each payload-carrying record and `delete`
//! for each payload-less tombstone reproduces exactly the map that
//! replaying the original index file would have built.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{info, warn};

use crate::index::NeedleMap;
use crate::needle::{Needle, NeedleError, NEEDLE_HEADER_SIZE, PAD_LEN};

use super::{SuperBlock, VolumeError, VolumeId, SUPER_BLOCK_SIZE};

/// Rebuilds `<dir>/<id>.idx` from `<dir>/<id>.dat`, replacing any
/// existing index file.
///
/// The volume must not be open while this runs. Fails if the data file
/// is missing or its superblock is invalid; a torn record at the end of
/// the data file ends the scan with a warning, matching the replay
/// policy for truncated index files.
pub fn rebuild_index_file(dir: impl AsRef<Path>, id: VolumeId) -> Result<(), VolumeError> {
    let dir = dir.as_ref();
    let data_path = dir.join(format!("{id}.dat"));
    let index_path = dir.join(format!("{id}.idx"));

    let mut data_file = OpenOptions::new().read(true).open(&data_path)?;
    let mut header = [0u8; SUPER_BLOCK_SIZE];
    data_file.read_exact(&mut header).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            VolumeError::InvalidSuperblock("data file too short".into())
        } else {
            VolumeError::Io(e)
        }
    })?;
    SuperBlock::parse(&header)?;

    let index_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&index_path)?;
    let mut needle_map = NeedleMap::new(index_file);

    let mut offset = SUPER_BLOCK_SIZE as u64;
    loop {
        let (needle, jump) = match Needle::peek_header(&mut data_file) {
            Ok(Some(peeked)) => peeked,
            Ok(None) => break,
            Err(NeedleError::UnexpectedEof) => {
                warn!(offset, "torn record at end of data file, scan stopped");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if needle.size > 0 {
            let aligned = u32::try_from(offset / u64::from(PAD_LEN))
                .map_err(|_| VolumeError::OffsetOverflow(offset))?;
            needle_map.put(needle.id, aligned, needle.size)?;
        } else {
            // Payload-less records are the tombstones appended by
            // delete; replay them so deleted keys stay deleted.
            needle_map.delete(needle.id)?;
        }
        data_file.seek(SeekFrom::Current(i64::from(jump)))?;
        offset += u64::from(jump) + u64::from(NEEDLE_HEADER_SIZE);
    }

    needle_map.close()?;
    info!(
        volume = %id,
        live = needle_map.live_count(),
        "index file rebuilt"
    );
    Ok(())
}
