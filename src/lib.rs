//! Persistent-storage stack for VicOS: a polled ATA/IDE block driver, an
//! MBR partition-table manager, and a from-scratch FAT32 engine that
//! formats a partition and creates files and directories against raw
//! sectors.
//!
//! Layers only ever call downward: the filesystem asks the partition
//! manager for geometry, and both bottom out in single-sector reads and
//! writes against a [`devices::BlockDevice`].

#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod devices;
pub mod filesys;
pub mod logging;
pub mod partition;

pub use devices::{BlockDevice, DeviceError, SECTOR_SIZE};
