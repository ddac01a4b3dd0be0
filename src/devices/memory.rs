//! In-memory block device implementation

use alloc::vec;
use alloc::vec::Vec;
use core::result::Result;

use super::{BlockDevice, DeviceError, SECTOR_SIZE};

/// Block device that stores sectors in memory
pub struct MemoryBlockDevice {
    /// Sector payloads, each SECTOR_SIZE bytes
    sectors: Vec<[u8; SECTOR_SIZE]>,
}

impl MemoryBlockDevice {
    /// Creates a new zero-filled memory device with given sector count
    pub fn new(total_sectors: u32) -> Self {
        let sectors = vec![[0u8; SECTOR_SIZE]; total_sectors as usize];
        Self { sectors }
    }

    /// Validates sector number is within bounds
    fn validate_sector(&self, lba: u32) -> Result<(), DeviceError> {
        if lba as usize >= self.sectors.len() {
            return Err(DeviceError::OutOfRange);
        }
        Ok(())
    }
}

impl BlockDevice for MemoryBlockDevice {
    /// Reads sector into buffer
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), DeviceError> {
        self.validate_sector(lba)?;
        buf.copy_from_slice(&self.sectors[lba as usize]);
        Ok(())
    }

    /// Writes buffer to sector
    fn write_sector(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> Result<(), DeviceError> {
        self.validate_sector(lba)?;
        self.sectors[lba as usize].copy_from_slice(buf);
        Ok(())
    }

    /// Total number of sectors
    fn total_sectors(&self) -> u32 {
        self.sectors.len() as u32
    }
}
