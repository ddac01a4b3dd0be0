//! MBR partition table manager
//!
//! Reads and writes the Master Boot Record on sector 0 of a block
//! device, and can create a single bootable FAT32 partition spanning the
//! whole disk. CHS fields are synthesized from LBA for legacy
//! compatibility only; nothing in this stack addresses by CHS.

use core::result::Result;
use log::{info, warn};

use crate::devices::{BlockDevice, DeviceError, SECTOR_SIZE};

/// Trailing MBR signature
pub const MBR_SIGNATURE: u16 = 0xAA55;

/// Partition type: unused entry
pub const PART_TYPE_EMPTY: u8 = 0x00;

/// Partition type: FAT32 with LBA addressing
pub const PART_TYPE_FAT32_LBA: u8 = 0x0C;

/// Bootable flag in a partition entry
pub const BOOT_FLAG: u8 = 0x80;

/// First usable LBA for the single disk partition (1 MB alignment)
pub const PARTITION_START_LBA: u32 = 2048;

/// Errors surfaced by the partition layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionError {
    /// MBR signature mismatch; callers treat this as "no table yet"
    InvalidTable,
    /// Requested slot is empty or the index is outside 1..=4
    NoSuchPartition,
    /// Sector I/O failed underneath
    Device(DeviceError),
}

impl From<DeviceError> for PartitionError {
    fn from(err: DeviceError) -> Self {
        PartitionError::Device(err)
    }
}

/// One 16-byte slot of the MBR partition table
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct PartitionEntry {
    /// 0x80 = bootable, 0x00 = not bootable
    pub bootable: u8,
    pub start_head: u8,
    pub start_sector: u8,
    pub start_cylinder: u8,
    /// Partition type
    pub system_id: u8,
    pub end_head: u8,
    pub end_sector: u8,
    pub end_cylinder: u8,
    /// LBA of first sector
    pub start_lba: u32,
    /// Number of sectors
    pub sector_count: u32,
}

impl PartitionEntry {
    /// An all-zero, unused entry
    pub fn empty() -> Self {
        PartitionEntry {
            bootable: 0,
            start_head: 0,
            start_sector: 0,
            start_cylinder: 0,
            system_id: PART_TYPE_EMPTY,
            end_head: 0,
            end_sector: 0,
            end_cylinder: 0,
            start_lba: 0,
            sector_count: 0,
        }
    }

    /// True when the slot holds no partition
    pub fn is_empty(&self) -> bool {
        self.system_id == PART_TYPE_EMPTY
    }
}

/// The 512-byte Master Boot Record at LBA 0
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Mbr {
    /// Opaque bootstrap code area
    pub bootstrap: [u8; 446],
    pub partitions: [PartitionEntry; 4],
    /// Must equal MBR_SIGNATURE
    pub signature: u16,
}

impl Mbr {
    /// A zeroed table carrying only the signature
    pub fn empty() -> Self {
        Mbr {
            bootstrap: [0; 446],
            partitions: [PartitionEntry::empty(); 4],
            signature: MBR_SIGNATURE,
        }
    }

    fn from_sector(buf: &[u8; SECTOR_SIZE]) -> Self {
        unsafe { core::ptr::read(buf.as_ptr() as *const Mbr) }
    }

    fn to_sector(&self) -> [u8; SECTOR_SIZE] {
        let bytes = unsafe {
            core::slice::from_raw_parts(
                self as *const Mbr as *const u8,
                core::mem::size_of::<Mbr>(),
            )
        };
        let mut buf = [0u8; SECTOR_SIZE];
        buf[..bytes.len()].copy_from_slice(bytes);
        buf
    }
}

/// Converts an LBA to legacy CHS values using the fixed synthetic
/// geometry of 16 heads per cylinder and 63 sectors per track.
/// Returns (head, sector, cylinder).
pub fn lba_to_chs(lba: u32) -> (u8, u8, u8) {
    const HEADS_PER_CYLINDER: u32 = 16;
    const SECTORS_PER_TRACK: u32 = 63;

    let head = (lba / SECTORS_PER_TRACK) % HEADS_PER_CYLINDER;
    let sector = (lba % SECTORS_PER_TRACK) + 1;
    let cylinder = (lba / (SECTORS_PER_TRACK * HEADS_PER_CYLINDER)) & 0xFF;

    (head as u8, sector as u8, cylinder as u8)
}

/// Partition table operations over one block device.
///
/// Holds no state of its own beyond the device borrow; every call reads
/// or writes the on-disk table directly.
pub struct PartitionManager<'a, D: BlockDevice + ?Sized> {
    device: &'a mut D,
}

impl<'a, D: BlockDevice + ?Sized> PartitionManager<'a, D> {
    pub fn new(device: &'a mut D) -> Self {
        PartitionManager { device }
    }

    /// Reads and validates the MBR from sector 0
    pub fn read_mbr(&mut self) -> Result<Mbr, PartitionError> {
        let mut buf = [0u8; SECTOR_SIZE];
        self.device.read_sector(0, &mut buf)?;

        let mbr = Mbr::from_sector(&buf);
        let signature = mbr.signature;
        if signature != MBR_SIGNATURE {
            warn!("Invalid MBR signature {:#06x}", signature);
            return Err(PartitionError::InvalidTable);
        }

        Ok(mbr)
    }

    /// Writes the MBR back to sector 0 as one atomic sector write
    pub fn write_mbr(&mut self, mbr: &Mbr) -> Result<(), PartitionError> {
        let buf = mbr.to_sector();
        self.device.write_sector(0, &buf)?;
        Ok(())
    }

    /// Writes a zeroed, signed table: the recovery path when no valid
    /// table exists
    pub fn create_empty_table(&mut self) -> Result<(), PartitionError> {
        info!("Creating empty partition table");
        self.write_mbr(&Mbr::empty())
    }

    /// Creates a single bootable FAT32-LBA partition spanning the disk.
    ///
    /// An unreadable or unsigned table is recreated first. Entry 0 gets
    /// the whole disk from LBA 2048; the other entries are cleared.
    pub fn create_boot_partition(&mut self) -> Result<(), PartitionError> {
        let mut mbr = match self.read_mbr() {
            Ok(mbr) => mbr,
            Err(PartitionError::InvalidTable) => {
                self.create_empty_table()?;
                self.read_mbr()?
            }
            Err(err) => return Err(err),
        };

        let total_sectors = self.device.total_sectors();
        if total_sectors <= PARTITION_START_LBA {
            warn!("Disk too small for a partition: {} sectors", total_sectors);
            return Err(PartitionError::Device(DeviceError::MediaAbsent));
        }

        let entry = &mut mbr.partitions[0];
        entry.bootable = BOOT_FLAG;
        entry.system_id = PART_TYPE_FAT32_LBA;
        entry.start_lba = PARTITION_START_LBA;
        entry.sector_count = total_sectors - PARTITION_START_LBA;

        let (head, sector, cylinder) = lba_to_chs(PARTITION_START_LBA);
        entry.start_head = head;
        entry.start_sector = sector;
        entry.start_cylinder = cylinder;

        let (head, sector, cylinder) = lba_to_chs(total_sectors - 1);
        entry.end_head = head;
        entry.end_sector = sector;
        entry.end_cylinder = cylinder;

        for entry in &mut mbr.partitions[1..] {
            *entry = PartitionEntry::empty();
        }

        self.write_mbr(&mbr)?;
        info!(
            "Created boot partition: {} sectors at LBA {}",
            total_sectors - PARTITION_START_LBA,
            PARTITION_START_LBA
        );
        Ok(())
    }

    /// Geometry of partition `index` (1-based): (start_lba, sector_count)
    pub fn partition_info(&mut self, index: usize) -> Result<(u32, u32), PartitionError> {
        if !(1..=4).contains(&index) {
            return Err(PartitionError::NoSuchPartition);
        }

        let mbr = self.read_mbr()?;
        let entry = mbr.partitions[index - 1];
        if entry.is_empty() {
            return Err(PartitionError::NoSuchPartition);
        }

        let start_lba = entry.start_lba;
        let sector_count = entry.sector_count;
        Ok((start_lba, sector_count))
    }

    /// Logs the decoded partition table through the log facade
    pub fn log_partition_table(&mut self) -> Result<(), PartitionError> {
        let mbr = self.read_mbr()?;

        for (i, entry) in mbr.partitions.iter().enumerate() {
            if entry.is_empty() {
                continue;
            }
            let bootable = entry.bootable == BOOT_FLAG;
            let system_id = entry.system_id;
            let start_lba = entry.start_lba;
            let size_mb = entry.sector_count / 2048;
            info!(
                "Partition {}: type {:#04x} start LBA {} size {} MB bootable {}",
                i + 1,
                system_id,
                start_lba,
                size_mb,
                bootable
            );
        }
        Ok(())
    }
}
