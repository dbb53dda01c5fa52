//! Integration tests for the public volume API.
//!
//! These tests exercise the full storage stack (file id → volume →
//! needle map → data file → compaction) through the public
//! `needledb::{FileId, Needle, Volume, ...}` surface only. No internal
//! modules are referenced.
//!
//! ## Coverage areas
//! - **Lifecycle**: open, write, read, delete, close, reopen
//! - **Addressing**: FileId round-trips feeding volume operations
//! - **Persistence**: data and deletions survive close → reopen
//! - **Compaction**: live needles survive, dead space is reclaimed
//! - **Concurrency**: multi-thread writers against one volume
//!
//! ## See also
//! - `volume::tests` — internal volume unit tests
//! - `needle::tests` — record codec unit tests
//! - `index::tests` — compact map and needle map unit tests

use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use needledb::volume::VolumeError;
use needledb::{FileId, Needle, ReplicaType, Volume, VolumeId};

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

const VOLUME: u32 = 234;

fn open(dir: &TempDir) -> Volume {
    Volume::open(dir.path(), VolumeId::new(VOLUME), ReplicaType::Copy00).expect("open volume")
}

fn reopen(dir: &TempDir) -> Volume {
    Volume::open(dir.path(), VolumeId::new(VOLUME), ReplicaType::Nil).expect("reopen volume")
}

// ================================================================================================
// Addressing
// ================================================================================================

/// # Scenario
/// A file id minted for a stored needle addresses it back.
///
/// # Actions
/// 1. Write a needle.
/// 2. Format its `FileId`, parse the text form.
/// 3. Read through the parsed id's key, compare cookies.
///
/// # Expected behavior
/// The parsed id equals the minted one and the read returns the
/// original payload with the cookie the writer chose.
#[test]
fn file_id_addresses_a_stored_needle() {
    let dir = TempDir::new().unwrap();
    let volume = open(&dir);

    let mut needle = Needle::new(0x11ED, 0x5EED_C0DE, b"addressed".to_vec());
    volume.write(&mut needle).unwrap();

    let fid = FileId::new(volume.id(), needle.id, needle.cookie);
    let parsed = FileId::parse(&fid.to_string()).unwrap();
    assert_eq!(parsed, fid);
    assert_eq!(parsed.volume_id, VolumeId::new(VOLUME));

    let mut lookup = Needle::with_id(parsed.key);
    volume.read(&mut lookup).unwrap();
    assert_eq!(lookup.data, b"addressed");
    assert_eq!(lookup.cookie, parsed.cookie, "cookie check is the caller's gate");
}

// ================================================================================================
// Lifecycle & persistence
// ================================================================================================

/// # Scenario
/// Full write → overwrite → delete → reopen lifecycle.
///
/// # Expected behavior
/// The latest revision is served before the delete, the delete
/// tombstones the key, and both facts survive a reopen (with the
/// replica type read back from the superblock).
#[test]
fn state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let volume = open(&dir);
        volume.write(&mut Needle::new(1, 7, b"one".to_vec())).unwrap();
        volume.write(&mut Needle::new(2, 7, b"two".to_vec())).unwrap();
        volume.write(&mut Needle::new(2, 7, b"two-v2".to_vec())).unwrap();
        assert_eq!(volume.delete(&mut Needle::with_id(1)).unwrap(), 3);
        volume.close().unwrap();
    }

    let volume = reopen(&dir);
    assert!(matches!(
        volume.read(&mut Needle::with_id(1)).unwrap_err(),
        VolumeError::NotFound
    ));
    let mut lookup = Needle::with_id(2);
    volume.read(&mut lookup).unwrap();
    assert_eq!(lookup.data, b"two-v2");
}

/// # Scenario
/// Reads of keys that were never written.
#[test]
fn missing_keys_are_not_found() {
    let dir = TempDir::new().unwrap();
    let volume = open(&dir);
    assert!(matches!(
        volume.read(&mut Needle::with_id(424242)).unwrap_err(),
        VolumeError::NotFound
    ));
}

// ================================================================================================
// Compaction
// ================================================================================================

/// # Scenario
/// A volume with a mix of live, overwritten and deleted needles is
/// compacted and then reopened.
///
/// # Expected behavior
/// Every live needle keeps its payload and metadata, every deleted key
/// stays deleted, the data file shrinks, and the compacted state is
/// what a fresh replay of the new index reproduces.
#[test]
fn compaction_end_to_end() {
    let dir = TempDir::new().unwrap();
    let volume = open(&dir);

    for id in 1..=200u64 {
        let mut needle = Needle::new(id, id as u32, vec![b'n'; id as usize]);
        needle.meta.set("X-Filename", format!("n-{id}.bin"));
        volume.write(&mut needle).unwrap();
    }
    for id in (1..=200u64).filter(|id| id % 3 == 0) {
        volume.delete(&mut Needle::with_id(id)).unwrap();
    }
    for id in (1..=200u64).filter(|id| id % 10 == 0 && id % 3 != 0) {
        let mut needle = Needle::new(id, id as u32, vec![b'N'; id as usize]);
        needle.meta.set("X-Filename", format!("n-{id}.bin"));
        volume.write(&mut needle).unwrap();
    }
    let size_before = volume.size();

    volume.compact().unwrap();
    volume.commit_compact().unwrap();
    assert!(volume.size() < size_before);

    let check = |volume: &Volume| {
        for id in 1..=200u64 {
            let mut lookup = Needle::with_id(id);
            if id % 3 == 0 {
                assert!(
                    matches!(lookup_err(volume, &mut lookup), VolumeError::NotFound),
                    "deleted id {id}"
                );
            } else {
                volume.read(&mut lookup).unwrap();
                let fill = if id % 10 == 0 { b'N' } else { b'n' };
                assert_eq!(lookup.data, vec![fill; id as usize], "live id {id}");
                assert_eq!(lookup.meta.get("X-Filename"), Some(&*format!("n-{id}.bin")));
            }
        }
    };
    check(&volume);

    // The swapped-in index must replay to the same state.
    volume.close().unwrap();
    drop(volume);
    let volume = reopen(&dir);
    check(&volume);
}

fn lookup_err(volume: &Volume, needle: &mut Needle) -> VolumeError {
    volume.read(needle).unwrap_err()
}

// ================================================================================================
// Concurrency
// ================================================================================================

/// # Scenario
/// Eight threads write disjoint key ranges into one volume while the
/// per-volume mutex serializes every append.
///
/// # Expected behavior
/// All writes land, every key reads back its own payload, and the
/// reported live count equals the total number of keys.
#[test]
fn concurrent_writers_serialize_cleanly() {
    let dir = TempDir::new().unwrap();
    let volume = Arc::new(open(&dir));

    let mut handles = Vec::new();
    for t in 0..8u64 {
        let volume = Arc::clone(&volume);
        handles.push(thread::spawn(move || {
            for i in 0..50u64 {
                let id = t * 1000 + i;
                let mut needle = Needle::new(id, t as u32, format!("t{t}-i{i}").into_bytes());
                volume.write(&mut needle).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(volume.live_needle_count(), 8 * 50);
    for t in 0..8u64 {
        for i in 0..50u64 {
            let mut lookup = Needle::with_id(t * 1000 + i);
            volume.read(&mut lookup).unwrap();
            assert_eq!(lookup.data, format!("t{t}-i{i}").into_bytes());
        }
    }
}

/// # Scenario
/// Readers and writers interleave on one volume.
#[test]
fn concurrent_reads_during_writes() {
    let dir = TempDir::new().unwrap();
    let volume = Arc::new(open(&dir));
    volume
        .write(&mut Needle::new(1, 1, b"stable".to_vec()))
        .unwrap();

    let writer = {
        let volume = Arc::clone(&volume);
        thread::spawn(move || {
            for i in 2..200u64 {
                volume
                    .write(&mut Needle::new(i, 1, vec![b'w'; 64]))
                    .unwrap();
            }
        })
    };
    let reader = {
        let volume = Arc::clone(&volume);
        thread::spawn(move || {
            for _ in 0..200 {
                let mut lookup = Needle::with_id(1);
                volume.read(&mut lookup).unwrap();
                assert_eq!(lookup.data, b"stable");
            }
        })
    };
    writer.join().unwrap();
    reader.join().unwrap();
}
