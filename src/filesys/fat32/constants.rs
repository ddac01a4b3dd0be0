//! FAT32 filesystem constants

/// Size of a FAT entry in bytes (32-bit)
pub const FAT_ENTRY_SIZE: usize = 4;

/// Reserved sectors at the front of the volume, boot sector included
pub const RESERVED_SECTORS: u32 = 32;

/// Number of mirrored FAT copies
pub const FAT_COUNT: u8 = 2;

/// Cluster number of the root directory
pub const ROOT_CLUSTER: u32 = 2;

/// Sector index of the FSInfo structure within the reserved area
pub const FSINFO_SECTOR: u32 = 1;

/// Sector index of the backup boot sector within the reserved area
pub const BACKUP_BOOT_SECTOR: u32 = 6;

/// Media descriptor for a fixed disk
pub const MEDIA_DESCRIPTOR: u8 = 0xF8;

/// Only the low 28 bits of a FAT entry are significant
pub const FAT_ENTRY_MASK: u32 = 0x0FFF_FFFF;

/// First value of the end-of-chain marker range
pub const FAT_EOC: u32 = 0x0FFF_FFF8;

/// Bad cluster marker
pub const FAT_BAD_CLUSTER: u32 = 0x0FFF_FFF7;

/// First reserved cluster number; allocation never scans past it
pub const FAT_RESERVED_RANGE: u32 = 0x0FFF_FFF0;

/// Directory entries that fit in one 512-byte sector
pub const DIR_ENTRIES_PER_SECTOR: usize = 16;

/// Size of one directory entry in bytes
pub const DIR_ENTRY_SIZE: usize = 32;

/// Marker for deleted directory entries
pub const DELETED_ENTRY_MARKER: u8 = 0xE5;

/// File attribute: Read-only
pub const ATTR_READ_ONLY: u8 = 0x01;

/// File attribute: Hidden
pub const ATTR_HIDDEN: u8 = 0x02;

/// File attribute: System
pub const ATTR_SYSTEM: u8 = 0x04;

/// File attribute: Volume label
pub const ATTR_VOLUME_ID: u8 = 0x08;

/// File attribute: Directory
pub const ATTR_DIRECTORY: u8 = 0x10;

/// File attribute: Archive
pub const ATTR_ARCHIVE: u8 = 0x20;

/// OEM name stamped into the boot sector
pub const OEM_NAME: [u8; 8] = *b"VICOS   ";

/// Volume label stamped into the boot sector and the root directory
pub const VOLUME_LABEL: [u8; 11] = *b"VICOS      ";

/// Filesystem type tag in the boot sector
pub const FS_TYPE: [u8; 8] = *b"FAT32   ";

/// FSInfo lead signature
pub const FSINFO_LEAD_SIGNATURE: u32 = 0x4161_5252;

/// FSInfo structure signature
pub const FSINFO_STRUCT_SIGNATURE: u32 = 0x6141_7272;

/// FSInfo trailing signature
pub const FSINFO_TRAIL_SIGNATURE: u32 = 0xAA55_0000;
