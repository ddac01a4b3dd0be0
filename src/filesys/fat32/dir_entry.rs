//! FAT32 directory entry structure and 8.3 name handling

use super::constants::*;

/// Fixed date stamped on new entries (no clock in this stack)
const DEFAULT_DATE: u16 = 0x4876;

/// 8.3 format directory entry (32 bytes)
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct DirEntry83 {
    /// 8 character name, space padded
    pub name: [u8; 8],

    /// 3 character extension, space padded
    pub ext: [u8; 3],

    /// File attributes (read-only, directory, volume label, ...)
    pub attributes: u8,

    /// Reserved
    pub reserved: u8,

    /// Creation time, tenths of a second
    pub create_time_tenth: u8,

    /// Creation time
    pub create_time: u16,

    /// Creation date
    pub create_date: u16,

    /// Last access date
    pub access_date: u16,

    /// High 16 bits of the starting cluster
    pub cluster_high: u16,

    /// Modification time
    pub modify_time: u16,

    /// Modification date
    pub modify_date: u16,

    /// Low 16 bits of the starting cluster
    pub cluster_low: u16,

    /// File size in bytes
    pub file_size: u32,
}

impl DirEntry83 {
    /// Creates an entry from an already converted 8.3 name
    pub fn new(name83: [u8; 11], attributes: u8, first_cluster: u32, size: u32) -> Self {
        let mut name = [0u8; 8];
        let mut ext = [0u8; 3];
        name.copy_from_slice(&name83[..8]);
        ext.copy_from_slice(&name83[8..]);

        DirEntry83 {
            name,
            ext,
            attributes,
            reserved: 0,
            create_time_tenth: 0,
            create_time: 0,
            create_date: DEFAULT_DATE,
            access_date: 0,
            cluster_high: (first_cluster >> 16) as u16,
            modify_time: 0,
            modify_date: DEFAULT_DATE,
            cluster_low: (first_cluster & 0xFFFF) as u16,
            file_size: size,
        }
    }

    /// The volume-label entry written into a fresh root directory
    pub fn volume_label(label: [u8; 11]) -> Self {
        DirEntry83::new(label, ATTR_VOLUME_ID, 0, 0)
    }

    /// `.` or `..` entry for a new directory
    pub fn dot_entry(name83: [u8; 11], cluster: u32) -> Self {
        DirEntry83::new(name83, ATTR_DIRECTORY, cluster, 0)
    }

    /// Starting cluster, reassembled from its two halves
    pub fn first_cluster(&self) -> u32 {
        (u32::from(self.cluster_high) << 16) | u32::from(self.cluster_low)
    }

    /// Returns true if entry is empty and ends the directory's valid
    /// entries
    pub fn is_free(&self) -> bool {
        self.name[0] == 0x00
    }

    /// Returns true if entry is marked as deleted and reusable
    pub fn is_deleted(&self) -> bool {
        self.name[0] == DELETED_ENTRY_MARKER
    }

    /// Returns true if entry is a directory
    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    /// Returns true if entry is the volume label
    pub fn is_volume_label(&self) -> bool {
        self.attributes & ATTR_VOLUME_ID != 0
    }

    /// Compares against a converted 8.3 name
    pub fn matches(&self, name83: &[u8; 11]) -> bool {
        self.name[..] == name83[..8] && self.ext[..] == name83[8..]
    }

    /// Reads the entry at `offset` in a directory sector
    pub fn read_from(buf: &[u8], offset: usize) -> Self {
        unsafe { core::ptr::read_unaligned(buf.as_ptr().add(offset) as *const DirEntry83) }
    }

    /// Writes the entry at `offset` in a directory sector
    pub fn write_into(&self, buf: &mut [u8], offset: usize) {
        let bytes = unsafe {
            core::slice::from_raw_parts(self as *const DirEntry83 as *const u8, DIR_ENTRY_SIZE)
        };
        buf[offset..offset + DIR_ENTRY_SIZE].copy_from_slice(bytes);
    }
}

/// Converts a filename to 8.3 form: up to 8 name characters before the
/// first dot and up to 3 extension characters after it, both upper-cased
/// and space-padded.
pub fn filename_to_83(filename: &str) -> [u8; 11] {
    let mut name83 = [b' '; 11];
    let bytes = filename.as_bytes();

    let dot = filename.find('.');
    let name_end = dot.unwrap_or(bytes.len()).min(8);
    for (i, byte) in bytes[..name_end].iter().enumerate() {
        name83[i] = byte.to_ascii_uppercase();
    }

    if let Some(dot) = dot {
        let ext = &bytes[dot + 1..];
        for (i, byte) in ext.iter().take(3).enumerate() {
            name83[8 + i] = byte.to_ascii_uppercase();
        }
    }

    name83
}
