//! Superblock and replica type.
//!
//! Every non-empty data file starts with an 8-byte superblock:
//!
//! ```text
//! version:u8 | replica_type:u8 | reserved:u8[6]
//! ```
//!
//! The replica type records how many copies of the volume the cluster
//! keeps and where; the engine only stores and reports the byte —
//! placement policy lives upstream.

use super::VolumeError;

/// Superblock length in bytes.
pub const SUPER_BLOCK_SIZE: usize = 8;

/// The only data-file format version this engine produces or accepts.
pub const SUPER_BLOCK_VERSION: u8 = 1;

// ------------------------------------------------------------------------------------------------
// ReplicaType
// ------------------------------------------------------------------------------------------------

/// Replication layout of a volume.
///
/// [`ReplicaType::Nil`] means "take the type from the superblock" when
/// opening an existing volume. The other variants follow the
/// `Copy<rack><datacenter>` naming: the first digit counts extra copies
/// on other racks in the same data center, the second counts extra
/// copies in other data centers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaType {
    /// Unknown — read the actual type from the superblock.
    Nil,
    /// Single copy.
    Copy00,
    /// One extra copy in another data center.
    Copy01,
    /// One extra copy on another rack, same data center.
    Copy10,
    /// One extra copy on another rack and one in another data center.
    Copy11,
    /// Two extra copies on other racks, same data center.
    Copy20,
}

impl ReplicaType {
    /// Decodes the superblock byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Nil),
            1 => Some(Self::Copy00),
            2 => Some(Self::Copy01),
            3 => Some(Self::Copy10),
            4 => Some(Self::Copy11),
            5 => Some(Self::Copy20),
            _ => None,
        }
    }

    /// Encodes the superblock byte.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Nil => 0,
            Self::Copy00 => 1,
            Self::Copy01 => 2,
            Self::Copy10 => 3,
            Self::Copy11 => 4,
            Self::Copy20 => 5,
        }
    }

    /// Total number of copies the cluster keeps, `0` for [`Nil`].
    ///
    /// [`Nil`]: ReplicaType::Nil
    pub fn copy_count(self) -> u32 {
        match self {
            Self::Nil => 0,
            Self::Copy00 => 1,
            Self::Copy01 | Self::Copy10 => 2,
            Self::Copy11 | Self::Copy20 => 3,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// SuperBlock
// ------------------------------------------------------------------------------------------------

/// The 8-byte prefix of a volume data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    /// Format version; always [`SUPER_BLOCK_VERSION`].
    pub version: u8,

    /// Replication layout of this volume.
    pub replica_type: ReplicaType,
}

impl SuperBlock {
    /// A superblock for a freshly created volume.
    pub fn new(replica_type: ReplicaType) -> Self {
        Self {
            version: SUPER_BLOCK_VERSION,
            replica_type,
        }
    }

    /// Encodes the superblock; the six trailing bytes are reserved and
    /// zero.
    pub fn to_bytes(self) -> [u8; SUPER_BLOCK_SIZE] {
        let mut bytes = [0u8; SUPER_BLOCK_SIZE];
        bytes[0] = self.version;
        bytes[1] = self.replica_type.as_byte();
        bytes
    }

    /// Decodes and validates a superblock.
    pub fn parse(bytes: &[u8; SUPER_BLOCK_SIZE]) -> Result<Self, VolumeError> {
        if bytes[0] != SUPER_BLOCK_VERSION {
            return Err(VolumeError::InvalidSuperblock(format!(
                "unsupported version {}",
                bytes[0]
            )));
        }
        let replica_type = ReplicaType::from_byte(bytes[1]).ok_or_else(|| {
            VolumeError::InvalidSuperblock(format!("unknown replica type byte {}", bytes[1]))
        })?;
        Ok(Self {
            version: bytes[0],
            replica_type,
        })
    }
}
