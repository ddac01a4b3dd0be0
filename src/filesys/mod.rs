//! Filesystem layer
//!
//! Holds the FAT32 volume manager and the error taxonomy shared by its
//! operations.

use core::result::Result;

use crate::devices::DeviceError;
use crate::partition::PartitionError;

pub mod fat32;

pub use fat32::Fat32;

/// Step of volume formatting that failed, carried by
/// [`FsError::FormatFailed`] so callers see exactly which on-disk
/// structure did not land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatStep {
    BootSector,
    BackupBootSector,
    FsInfo,
    Fat,
    RootDirectory,
}

/// Errors surfaced by filesystem operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Sector I/O failed underneath
    Device(DeviceError),
    /// Partition geometry lookup failed
    Partition(PartitionError),
    /// Boot sector signature or type tag did not validate on mount
    InvalidBootSector,
    /// A format step could not be written
    FormatFailed(FormatStep),
    /// Partition too small to hold the reserved area, both FATs, and at
    /// least one data cluster
    VolumeTooSmall,
    /// Cluster allocation scanned the whole table without a free entry
    VolumeFull,
    /// No free slot in the directory's single sector
    DirectoryFull,
    /// Cluster number outside the valid data-cluster range
    InvalidCluster,
    /// A FAT walk ended before the expected chain length
    ChainCorruption,
    /// A FAT write landed in the first copy but not the second; the two
    /// copies now disagree
    PartialMirrorWrite,
    /// Name did not resolve to an entry
    NotFound,
    /// Path component used as a directory is not one
    NotADirectory,
    /// Empty or unusable file name
    InvalidName,
}

impl From<DeviceError> for FsError {
    fn from(err: DeviceError) -> Self {
        FsError::Device(err)
    }
}

impl From<PartitionError> for FsError {
    fn from(err: PartitionError) -> Self {
        FsError::Partition(err)
    }
}

/// Shorthand for filesystem results
pub type FsResult<T> = Result<T, FsError>;
