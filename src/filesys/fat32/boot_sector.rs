//! FAT32 boot sector structure

use crate::devices::SECTOR_SIZE;

/// The FAT32 boot sector / BIOS parameter block, as laid out on disk.
/// 90 bytes of fields at the front of a 512-byte sector whose last two
/// bytes carry the 0x55 0xAA signature.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct BootSector {
    /// Jump instruction over the parameter block
    pub jump_code: [u8; 3],

    /// Name of the system that formatted the volume
    pub oem_name: [u8; 8],

    /// Number of bytes per sector, fixed at 512 here
    pub bytes_per_sector: u16,

    /// Number of sectors per cluster, a power of two
    pub sectors_per_cluster: u8,

    /// Reserved sectors at start of volume, boot sector included
    pub reserved_sectors: u16,

    /// Number of FAT copies
    pub fat_count: u8,

    /// Root entry count, always 0 for FAT32
    pub root_entries: u16,

    /// 16-bit total sector count, always 0 for FAT32
    pub total_sectors_16: u16,

    /// Media type descriptor
    pub media_descriptor: u8,

    /// 16-bit sectors per FAT, always 0 for FAT32
    pub sectors_per_fat_16: u16,

    /// Sectors per track for legacy geometry
    pub sectors_per_track: u16,

    /// Head count for legacy geometry
    pub head_count: u16,

    /// Sectors preceding the partition
    pub hidden_sectors: u32,

    /// 32-bit total sector count of the volume
    pub total_sectors_32: u32,

    /// Size of each FAT copy in sectors
    pub sectors_per_fat_32: u32,

    /// Mirroring flags
    pub flags: u16,

    /// Filesystem version, 0.0
    pub fat_version: u16,

    /// First cluster of the root directory
    pub root_cluster: u32,

    /// Sector index of the FSInfo structure
    pub fs_info_sector: u16,

    /// Sector index of the backup boot sector
    pub backup_boot_sector: u16,

    /// Reserved
    pub reserved: [u8; 12],

    /// INT 13h drive number
    pub drive_number: u8,

    /// Reserved byte
    pub reserved1: u8,

    /// Extended boot signature
    pub boot_signature: u8,

    /// Volume serial number
    pub volume_id: u32,

    /// Volume label
    pub volume_label: [u8; 11],

    /// Filesystem type string
    pub fs_type: [u8; 8],
}

impl BootSector {
    /// Serializes the parameter block into a sector image, setting the
    /// trailing 0x55 0xAA signature.
    pub fn to_sector(&self) -> [u8; SECTOR_SIZE] {
        let bytes = unsafe {
            core::slice::from_raw_parts(
                self as *const BootSector as *const u8,
                core::mem::size_of::<BootSector>(),
            )
        };

        let mut buf = [0u8; SECTOR_SIZE];
        buf[..bytes.len()].copy_from_slice(bytes);
        buf[510] = 0x55;
        buf[511] = 0xAA;
        buf
    }

    /// Deserializes a sector image; the caller validates signatures.
    pub fn from_sector(buf: &[u8; SECTOR_SIZE]) -> Self {
        unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const BootSector) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_block_is_90_bytes() {
        assert_eq!(core::mem::size_of::<BootSector>(), 90);
    }

    #[test]
    fn test_sector_image_round_trip() {
        let boot = BootSector {
            jump_code: [0xEB, 0x58, 0x90],
            oem_name: *b"VICOS   ",
            bytes_per_sector: 512,
            sectors_per_cluster: 2,
            reserved_sectors: 32,
            fat_count: 2,
            root_entries: 0,
            total_sectors_16: 0,
            media_descriptor: 0xF8,
            sectors_per_fat_16: 0,
            sectors_per_track: 63,
            head_count: 255,
            hidden_sectors: 2048,
            total_sectors_32: 131_072,
            sectors_per_fat_32: 512,
            flags: 0,
            fat_version: 0,
            root_cluster: 2,
            fs_info_sector: 1,
            backup_boot_sector: 6,
            reserved: [0; 12],
            drive_number: 0x80,
            reserved1: 0,
            boot_signature: 0x29,
            volume_id: 0x1234_5678,
            volume_label: *b"VICOS      ",
            fs_type: *b"FAT32   ",
        };

        let sector = boot.to_sector();
        // Fixed offsets of the wire format.
        assert_eq!(&sector[3..11], b"VICOS   ");
        assert_eq!(u16::from_le_bytes([sector[11], sector[12]]), 512);
        assert_eq!(sector[13], 2);
        assert_eq!(sector[510], 0x55);
        assert_eq!(sector[511], 0xAA);

        let decoded = BootSector::from_sector(&sector);
        let sectors_per_fat = decoded.sectors_per_fat_32;
        let total = decoded.total_sectors_32;
        assert_eq!(sectors_per_fat, 512);
        assert_eq!(total, 131_072);
    }
}
