//! FAT32 file allocation table entry

use super::constants::*;

/// A decoded 28-bit FAT entry: either free, a link to the next cluster
/// in a chain, an end-of-chain marker, or a bad-cluster marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatEntry {
    /// Cluster number or special value, already masked to 28 bits
    pub value: u32,
}

impl FatEntry {
    /// Decodes a raw 32-bit table value, dropping the reserved top bits
    pub fn from_raw(raw: u32) -> Self {
        FatEntry {
            value: raw & FAT_ENTRY_MASK,
        }
    }

    /// End-of-chain marker
    pub fn end_of_chain() -> Self {
        FatEntry { value: FAT_EOC }
    }

    /// Returns true if this cluster is unused
    pub fn is_free(&self) -> bool {
        self.value == 0
    }

    /// Returns true if this entry marks the end of a cluster chain
    pub fn is_end_of_chain(&self) -> bool {
        self.value >= FAT_EOC
    }

    /// Returns true if this cluster is marked bad
    pub fn is_bad(&self) -> bool {
        self.value == FAT_BAD_CLUSTER
    }
}
