//! FAT32 FSInfo sector
//!
//! Advisory free-cluster bookkeeping. The allocator never trusts these
//! values; they are seeded once at format time and left alone.

use crate::devices::SECTOR_SIZE;

use super::constants::*;

/// The 512-byte FSInfo structure
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct FsInfo {
    /// Must equal FSINFO_LEAD_SIGNATURE
    pub lead_signature: u32,
    pub reserved1: [u8; 480],
    /// Must equal FSINFO_STRUCT_SIGNATURE
    pub structure_signature: u32,
    /// Last known free cluster count, 0xFFFFFFFF if unknown
    pub free_count: u32,
    /// Hint for the next free cluster, 0xFFFFFFFF if unknown
    pub next_free: u32,
    pub reserved2: [u8; 12],
    /// Must equal FSINFO_TRAIL_SIGNATURE
    pub trail_signature: u32,
}

impl FsInfo {
    /// A freshly seeded FSInfo for a just-formatted volume
    pub fn new(free_count: u32, next_free: u32) -> Self {
        FsInfo {
            lead_signature: FSINFO_LEAD_SIGNATURE,
            reserved1: [0; 480],
            structure_signature: FSINFO_STRUCT_SIGNATURE,
            free_count,
            next_free,
            reserved2: [0; 12],
            trail_signature: FSINFO_TRAIL_SIGNATURE,
        }
    }

    /// Serializes into a sector image
    pub fn to_sector(&self) -> [u8; SECTOR_SIZE] {
        let bytes = unsafe {
            core::slice::from_raw_parts(
                self as *const FsInfo as *const u8,
                core::mem::size_of::<FsInfo>(),
            )
        };

        let mut buf = [0u8; SECTOR_SIZE];
        buf[..bytes.len()].copy_from_slice(bytes);
        buf
    }
}
