//! Block device management.
//!
//! This module defines the single-sector I/O contract the partition
//! manager and the filesystem are built on, plus the devices that
//! implement it:
//! - The polled ATA/IDE driver for real hardware
//! - An in-memory device used by the filesystem tests

use core::result::Result;

pub mod ata;
pub mod memory;

pub use ata::{AtaController, Channel, DriveDescriptor, PollBudget, Role};
pub use memory::MemoryBlockDevice;

/// Size of a disk sector in bytes
pub const SECTOR_SIZE: usize = 512;

/// Errors surfaced by the block device layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// The drive never cleared busy / asserted data-ready within the
    /// polling budget
    Timeout,
    /// Drive index outside the 4-slot table
    InvalidDrive,
    /// No drive present at the requested slot, or no drive selected
    MediaAbsent,
    /// Sector address beyond the end of the device
    OutOfRange,
}

/// A device addressed in whole 512-byte sectors.
///
/// LBAs are absolute; callers working inside a partition add the
/// partition start themselves.
pub trait BlockDevice {
    /// Reads one sector into `buf`
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), DeviceError>;

    /// Writes one sector from `buf`
    fn write_sector(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> Result<(), DeviceError>;

    /// Total capacity in sectors, 0 if unknown
    fn total_sectors(&self) -> u32;
}
