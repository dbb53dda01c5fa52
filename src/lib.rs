//! # needledb
//!
//! An embeddable **volume storage engine** for billions of small objects
//! ("needles"). Each volume packs many needles into one append-only data
//! file, keeps an in-memory compact index from needle id to file offset,
//! and mirrors every index mutation into a persistent index file so the
//! map can be rebuilt by replay after a crash.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Volume                           │
//! │  ┌──────────────┐   ┌───────────────────────────────┐   │
//! │  │  <id>.dat    │   │          NeedleMap            │   │
//! │  │  superblock  │   │  ┌────────────┐  ┌─────────┐  │   │
//! │  │  needle…     │◄──┼──┤ CompactMap │  │ <id>.idx│  │   │
//! │  │  needle…     │   │  │ (in memory)│  │ (replay)│  │   │
//! │  └──────┬───────┘   │  └────────────┘  └─────────┘  │   │
//! │         │ compact   └───────────────────────────────┘   │
//! │         ▼                                               │
//! │  <id>.cpd + <id>.cpx ── rename ──► <id>.dat + <id>.idx  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`file_id`] | Parse/format `<volumeId>,<keyhex><cookiehex>` object handles |
//! | [`needle`] | On-disk needle record codec — header, payload, CRC32, metadata, padding |
//! | [`index`] | In-memory compact index and the persistent, replayable needle map |
//! | [`volume`] | Volume lifecycle — load, read/write/delete, compaction, index rebuild |
//!
//! ## Key properties
//!
//! - **Append-only writes** — needles are appended to the data file; the
//!   in-memory map is updated only after a successful append, so a torn
//!   write leaves unreferenced garbage that the next compaction reclaims.
//! - **Crash recovery by replay** — the `.idx` file is a log of index
//!   mutations; replaying it left-to-right restores the in-memory map.
//! - **Offline compaction** — a copy-live pass writes a shadow
//!   `.cpd`/`.cpx` pair which is atomically renamed over the originals.
//! - **CRC32 integrity** — every payload is checksummed; corruption is
//!   reported on read without evicting the (possibly recoverable) entry.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use needledb::needle::Needle;
//! use needledb::volume::{ReplicaType, Volume, VolumeId};
//!
//! # fn main() -> Result<(), needledb::volume::VolumeError> {
//! let volume = Volume::open("/tmp/store", VolumeId::new(234), ReplicaType::Copy00)?;
//!
//! // Write
//! let mut needle = Needle::new(101, 0xDEAD_BEEF, b"hello".to_vec());
//! volume.write(&mut needle)?;
//!
//! // Read
//! let mut lookup = Needle::with_id(101);
//! volume.read(&mut lookup)?;
//! assert_eq!(lookup.data, b"hello");
//!
//! // Delete, then reclaim the dead bytes
//! volume.delete(&mut Needle::with_id(101))?;
//! volume.compact()?;
//! volume.commit_compact()?;
//! volume.close()?;
//! # Ok(())
//! # }
//! ```

pub mod file_id;
pub mod index;
pub mod needle;
pub mod volume;

pub use file_id::FileId;
pub use needle::Needle;
pub use volume::{ReplicaType, Volume, VolumeId};
