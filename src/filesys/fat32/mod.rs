//! FAT32 filesystem implementation
//!
//! Formats a FAT32 volume inside a partition, keeps the two mirrored FAT
//! copies consistent, and creates directories and files against raw
//! sectors. Directory entries use the on-disk 8.3 layout; each directory
//! is served from the first sector of its cluster, which caps it at 16
//! entries.

use alloc::boxed::Box;
use alloc::vec::Vec;
use log::{debug, error, info, warn};

mod boot_sector;
pub mod constants;
mod dir_entry;
mod fat_entry;
mod fs_info;

pub use boot_sector::BootSector;
pub use dir_entry::{filename_to_83, DirEntry83};
pub use fat_entry::FatEntry;
pub use fs_info::FsInfo;

use constants::*;

use super::{FormatStep, FsError, FsResult};
use crate::devices::{BlockDevice, SECTOR_SIZE};
use crate::partition::PartitionManager;

/// Picks sectors-per-cluster from the partition size, doubling at each
/// size tier from under 32 MB up to 16 GB and beyond.
fn sectors_per_cluster_for(partition_sectors: u32) -> u8 {
    match partition_sectors {
        0..=66_599 => 1,            // < 32 MB
        66_600..=133_199 => 2,      // < 64 MB
        133_200..=266_399 => 4,     // < 128 MB
        266_400..=532_799 => 8,     // < 256 MB
        532_800..=16_777_215 => 16, // < 8 GB
        16_777_216..=33_554_431 => 32, // < 16 GB
        _ => 64,
    }
}

/// Sectors needed to hold one FAT copy for `cluster_count` clusters
fn fat_size_sectors(cluster_count: u32) -> u32 {
    (u64::from(cluster_count) * FAT_ENTRY_SIZE as u64).div_ceil(SECTOR_SIZE as u64) as u32
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// FAT32 volume manager
///
/// Owns the underlying block device plus the volume parameters recorded
/// once by [`Fat32::format`] or [`Fat32::mount`]. All LBAs handed to the
/// device are absolute; the partition start is already folded in.
pub struct Fat32<'a> {
    /// Underlying block device
    pub device: Box<dyn BlockDevice + 'a>,
    /// First LBA of the partition
    partition_start: u32,
    /// First LBA of the first FAT copy
    fat_start: u32,
    /// First LBA of the data region (cluster 2)
    data_start: u32,
    /// Cluster of the root directory
    root_cluster: u32,
    /// Sectors per allocation cluster
    sectors_per_cluster: u8,
    /// Size of each FAT copy in sectors
    sectors_per_fat: u32,
    /// Number of mirrored FAT copies
    fat_count: u8,
    /// Data clusters available on the volume
    cluster_count: u32,
}

impl<'a> Fat32<'a> {
    /// Creates a FAT32 filesystem on the given partition region and
    /// returns the mounted volume.
    ///
    /// Writes, in order: boot sector, backup boot sector, FSInfo, both
    /// FAT copies (reserved entries seeded, remainder zeroed), and a
    /// root directory sector holding the volume label. The first write
    /// that fails aborts the format and names the step in the error.
    pub fn format(
        mut device: Box<dyn BlockDevice + 'a>,
        start_lba: u32,
        sector_count: u32,
    ) -> Result<Self, FsError> {
        info!(
            "Creating FAT32 filesystem: {} sectors at LBA {}",
            sector_count, start_lba
        );

        let sectors_per_cluster = sectors_per_cluster_for(sector_count);
        let estimated_clusters = sector_count / u32::from(sectors_per_cluster);
        let sectors_per_fat = fat_size_sectors(estimated_clusters);

        // Re-derive the cluster count from the data region that remains
        // once the reserved area and both FAT copies are carved out. The
        // layout needs at least one data cluster after both.
        let overhead = RESERVED_SECTORS + u32::from(FAT_COUNT) * sectors_per_fat;
        let cluster_count = sector_count
            .checked_sub(overhead)
            .map(|data_sectors| data_sectors / u32::from(sectors_per_cluster))
            .filter(|&count| count >= 1)
            .ok_or_else(|| {
                warn!("Partition of {} sectors cannot hold a FAT32 volume", sector_count);
                FsError::VolumeTooSmall
            })?;

        let boot = BootSector {
            jump_code: [0xEB, 0x58, 0x90],
            oem_name: OEM_NAME,
            bytes_per_sector: SECTOR_SIZE as u16,
            sectors_per_cluster,
            reserved_sectors: RESERVED_SECTORS as u16,
            fat_count: FAT_COUNT,
            root_entries: 0,
            total_sectors_16: 0,
            media_descriptor: MEDIA_DESCRIPTOR,
            sectors_per_fat_16: 0,
            sectors_per_track: 63,
            head_count: 255,
            hidden_sectors: start_lba,
            total_sectors_32: sector_count,
            sectors_per_fat_32: sectors_per_fat,
            flags: 0,
            fat_version: 0,
            root_cluster: ROOT_CLUSTER,
            fs_info_sector: FSINFO_SECTOR as u16,
            backup_boot_sector: BACKUP_BOOT_SECTOR as u16,
            reserved: [0; 12],
            drive_number: 0x80,
            reserved1: 0,
            boot_signature: 0x29,
            volume_id: 0x1234_5678,
            volume_label: VOLUME_LABEL,
            fs_type: FS_TYPE,
        };

        let boot_image = boot.to_sector();
        device
            .write_sector(start_lba, &boot_image)
            .map_err(|err| format_failure(FormatStep::BootSector, err))?;
        device
            .write_sector(start_lba + BACKUP_BOOT_SECTOR, &boot_image)
            .map_err(|err| format_failure(FormatStep::BackupBootSector, err))?;

        // Cluster 2 is consumed by the root directory; cluster 3 is the
        // first one the allocator will hand out.
        let fs_info = FsInfo::new(cluster_count - 1, 3);
        device
            .write_sector(start_lba + FSINFO_SECTOR, &fs_info.to_sector())
            .map_err(|err| format_failure(FormatStep::FsInfo, err))?;

        // Seed the reserved FAT entries: media descriptor, reserved
        // cluster 1, and end-of-chain for the root directory.
        let fat_start = start_lba + RESERVED_SECTORS;
        let mut fat_seed = [0u8; SECTOR_SIZE];
        write_u32(&mut fat_seed, 0, 0x0FFF_FF00 | u32::from(MEDIA_DESCRIPTOR));
        write_u32(&mut fat_seed, 4, 0x0FFF_FFFF);
        write_u32(&mut fat_seed, 8, 0x0FFF_FFFF);

        let zero = [0u8; SECTOR_SIZE];
        for copy in 0..u32::from(FAT_COUNT) {
            let copy_start = fat_start + copy * sectors_per_fat;
            device
                .write_sector(copy_start, &fat_seed)
                .map_err(|err| format_failure(FormatStep::Fat, err))?;
            for sector in 1..sectors_per_fat {
                device
                    .write_sector(copy_start + sector, &zero)
                    .map_err(|err| format_failure(FormatStep::Fat, err))?;
            }
        }

        // Root directory: a single sector starting with the volume label.
        let data_start = fat_start + u32::from(FAT_COUNT) * sectors_per_fat;
        let mut root = [0u8; SECTOR_SIZE];
        DirEntry83::volume_label(VOLUME_LABEL).write_into(&mut root, 0);
        device
            .write_sector(data_start, &root)
            .map_err(|err| format_failure(FormatStep::RootDirectory, err))?;

        info!(
            "FAT32 filesystem created: {} clusters of {} sectors, FAT {} sectors",
            cluster_count, sectors_per_cluster, sectors_per_fat
        );

        Ok(Fat32 {
            device,
            partition_start: start_lba,
            fat_start,
            data_start,
            root_cluster: ROOT_CLUSTER,
            sectors_per_cluster,
            sectors_per_fat,
            fat_count: FAT_COUNT,
            cluster_count,
        })
    }

    /// Formats the numbered partition, looking its geometry up in the
    /// MBR first.
    pub fn format_partition(
        mut device: Box<dyn BlockDevice + 'a>,
        partition: usize,
    ) -> Result<Self, FsError> {
        let (start_lba, sector_count) = {
            let mut manager = PartitionManager::new(&mut *device);
            manager.partition_info(partition)?
        };
        Self::format(device, start_lba, sector_count)
    }

    /// Mounts an already formatted volume by re-reading its boot sector.
    pub fn mount(
        mut device: Box<dyn BlockDevice + 'a>,
        start_lba: u32,
        sector_count: u32,
    ) -> Result<Self, FsError> {
        let mut buf = [0u8; SECTOR_SIZE];
        device.read_sector(start_lba, &mut buf)?;

        if buf[510] != 0x55 || buf[511] != 0xAA {
            warn!("Boot sector signature missing at LBA {}", start_lba);
            return Err(FsError::InvalidBootSector);
        }

        let boot = BootSector::from_sector(&buf);
        let bytes_per_sector = boot.bytes_per_sector;
        let sectors_per_cluster = boot.sectors_per_cluster;
        let fat_count = boot.fat_count;
        let sectors_per_fat = boot.sectors_per_fat_32;
        let root_cluster = boot.root_cluster;
        let reserved = u32::from(boot.reserved_sectors);

        if boot.fs_type != FS_TYPE
            || usize::from(bytes_per_sector) != SECTOR_SIZE
            || sectors_per_cluster == 0
            || fat_count == 0
            || sectors_per_fat == 0
            || root_cluster < 2
        {
            warn!("Boot sector at LBA {} is not a FAT32 volume", start_lba);
            return Err(FsError::InvalidBootSector);
        }

        let fat_start = start_lba + reserved;
        let fat_sectors = u32::from(fat_count) * sectors_per_fat;
        let data_start = fat_start + fat_sectors;
        let data_sectors = sector_count.saturating_sub(reserved + fat_sectors);
        let cluster_count = data_sectors / u32::from(sectors_per_cluster);

        info!(
            "Mounted FAT32 volume at LBA {}: {} clusters of {} sectors",
            start_lba, cluster_count, sectors_per_cluster
        );

        Ok(Fat32 {
            device,
            partition_start: start_lba,
            fat_start,
            data_start,
            root_cluster,
            sectors_per_cluster,
            sectors_per_fat,
            fat_count,
            cluster_count,
        })
    }

    /// First LBA of the partition
    pub fn partition_start(&self) -> u32 {
        self.partition_start
    }

    /// First LBA of the first FAT copy
    pub fn fat_start(&self) -> u32 {
        self.fat_start
    }

    /// First LBA of the data region
    pub fn data_start(&self) -> u32 {
        self.data_start
    }

    /// Cluster of the root directory
    pub fn root_cluster(&self) -> u32 {
        self.root_cluster
    }

    /// Sectors per allocation cluster
    pub fn sectors_per_cluster(&self) -> u8 {
        self.sectors_per_cluster
    }

    /// Size of one FAT copy in sectors
    pub fn sectors_per_fat(&self) -> u32 {
        self.sectors_per_fat
    }

    /// Data clusters available on the volume
    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    /// First sector of a data cluster; clusters below 2 have no sector.
    pub fn cluster_to_sector(&self, cluster: u32) -> u32 {
        self.data_start + (cluster - 2) * u32::from(self.sectors_per_cluster)
    }

    /// FAT sector and in-sector byte offset of a cluster's entry
    fn fat_location(&self, cluster: u32) -> FsResult<(u32, usize)> {
        // Entries 0 and 1 are reserved but addressable; anything past
        // the table end is not.
        if cluster >= self.cluster_count + 2 {
            return Err(FsError::InvalidCluster);
        }
        let offset = u64::from(cluster) * FAT_ENTRY_SIZE as u64;
        let sector = self.fat_start + (offset / SECTOR_SIZE as u64) as u32;
        let in_sector = (offset % SECTOR_SIZE as u64) as usize;
        Ok((sector, in_sector))
    }

    /// Reads the FAT entry for a cluster from the first copy
    pub fn read_fat_entry(&mut self, cluster: u32) -> FsResult<FatEntry> {
        let (sector, offset) = self.fat_location(cluster)?;
        let mut buf = [0u8; SECTOR_SIZE];
        self.device.read_sector(sector, &mut buf)?;
        Ok(FatEntry::from_raw(read_u32(&buf, offset)))
    }

    /// Writes the FAT entry for a cluster to both copies, preserving the
    /// reserved top four bits.
    ///
    /// A failure on the second copy after the first copy landed leaves
    /// the mirrors inconsistent and is surfaced as
    /// [`FsError::PartialMirrorWrite`], never repaired silently.
    pub fn write_fat_entry(&mut self, cluster: u32, value: u32) -> FsResult<()> {
        let (sector, offset) = self.fat_location(cluster)?;
        let mut buf = [0u8; SECTOR_SIZE];
        self.device.read_sector(sector, &mut buf)?;

        let merged = (read_u32(&buf, offset) & !FAT_ENTRY_MASK) | (value & FAT_ENTRY_MASK);
        write_u32(&mut buf, offset, merged);

        self.device.write_sector(sector, &buf)?;
        self.device
            .write_sector(sector + self.sectors_per_fat, &buf)
            .map_err(|err| {
                error!(
                    "FAT mirror write failed for cluster {}: {:?}; copies disagree",
                    cluster, err
                );
                FsError::PartialMirrorWrite
            })
    }

    /// Finds the first free cluster by linear scan from the root
    /// cluster, marks it end-of-chain, and zero-fills its sectors.
    pub fn allocate_cluster(&mut self) -> FsResult<u32> {
        let limit = (self.cluster_count + 2).min(FAT_RESERVED_RANGE);
        let mut cluster = self.root_cluster;

        while cluster < limit {
            if self.read_fat_entry(cluster)?.is_free() {
                self.write_fat_entry(cluster, FAT_EOC)?;

                let first_sector = self.cluster_to_sector(cluster);
                let zero = [0u8; SECTOR_SIZE];
                for i in 0..u32::from(self.sectors_per_cluster) {
                    self.device.write_sector(first_sector + i, &zero)?;
                }

                debug!("Allocated cluster {}", cluster);
                return Ok(cluster);
            }
            cluster += 1;
        }

        warn!("Cluster allocation failed: volume full");
        Err(FsError::VolumeFull)
    }

    /// Walks a chain from its head to the end-of-chain marker.
    /// Returns (tail cluster, chain length).
    fn chain_tail(&mut self, start_cluster: u32) -> FsResult<(u32, u32)> {
        if start_cluster < 2 {
            return Err(FsError::InvalidCluster);
        }

        let mut current = start_cluster;
        let mut length: u32 = 1;
        loop {
            let next = self.read_fat_entry(current)?;
            if next.is_end_of_chain() {
                return Ok((current, length));
            }
            if next.is_free() || next.is_bad() || length > self.cluster_count {
                error!("FAT chain from cluster {} is corrupt", start_cluster);
                return Err(FsError::ChainCorruption);
            }
            current = next.value;
            length += 1;
        }
    }

    /// Number of clusters in the chain starting at `start_cluster`
    pub fn chain_length(&mut self, start_cluster: u32) -> FsResult<u32> {
        self.chain_tail(start_cluster).map(|(_, length)| length)
    }

    /// Appends one newly allocated cluster at the true tail of a chain
    /// and returns its number.
    pub fn extend_cluster_chain(&mut self, start_cluster: u32) -> FsResult<u32> {
        let (tail, _) = self.chain_tail(start_cluster)?;
        let new_cluster = self.allocate_cluster()?;
        self.write_fat_entry(tail, new_cluster)?;
        Ok(new_cluster)
    }

    /// Splits a path into the cluster of its parent directory and the
    /// final name component, resolving intermediate components against
    /// the first sector of each directory.
    fn locate_parent<'p>(&mut self, path: &'p str) -> FsResult<(u32, &'p str)> {
        let mut components = path.split('/').filter(|c| !c.is_empty());
        let mut leaf = components.next().ok_or(FsError::InvalidName)?;
        let mut dir_cluster = self.root_cluster;

        for next in components {
            let entry = self.find_entry_in_dir(dir_cluster, leaf)?;
            if !entry.is_directory() {
                return Err(FsError::NotADirectory);
            }
            dir_cluster = entry.first_cluster();
            leaf = next;
        }

        Ok((dir_cluster, leaf))
    }

    /// Looks a name up in the first sector of a directory cluster
    fn find_entry_in_dir(&mut self, dir_cluster: u32, name: &str) -> FsResult<DirEntry83> {
        let name83 = filename_to_83(name);
        let mut buf = [0u8; SECTOR_SIZE];
        let sector = self.cluster_to_sector(dir_cluster);
        self.device.read_sector(sector, &mut buf)?;

        for i in 0..DIR_ENTRIES_PER_SECTOR {
            let entry = DirEntry83::read_from(&buf, i * DIR_ENTRY_SIZE);
            if entry.is_free() {
                break;
            }
            if entry.is_deleted() || entry.is_volume_label() {
                continue;
            }
            if entry.matches(&name83) {
                return Ok(entry);
            }
        }

        Err(FsError::NotFound)
    }

    /// Resolves a path to its directory entry
    pub fn find_entry(&mut self, path: &str) -> FsResult<DirEntry83> {
        let (dir_cluster, leaf) = self.locate_parent(path)?;
        self.find_entry_in_dir(dir_cluster, leaf)
    }

    /// Valid entries in the first sector of a directory cluster
    pub fn directory_entries(&mut self, dir_cluster: u32) -> FsResult<Vec<DirEntry83>> {
        let mut buf = [0u8; SECTOR_SIZE];
        let sector = self.cluster_to_sector(dir_cluster);
        self.device.read_sector(sector, &mut buf)?;

        let mut entries = Vec::new();
        for i in 0..DIR_ENTRIES_PER_SECTOR {
            let entry = DirEntry83::read_from(&buf, i * DIR_ENTRY_SIZE);
            if entry.is_free() {
                break;
            }
            if !entry.is_deleted() {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Registers a directory entry for a file or directory.
    ///
    /// Only the first sector of the parent directory is scanned for a
    /// free slot, so a directory holds at most 16 entries; a full sector
    /// fails with [`FsError::DirectoryFull`] and writes nothing.
    pub fn create_entry(
        &mut self,
        path: &str,
        attributes: u8,
        size: u32,
        first_cluster: u32,
    ) -> FsResult<()> {
        let (dir_cluster, leaf) = self.locate_parent(path)?;
        let name83 = filename_to_83(leaf);

        let mut buf = [0u8; SECTOR_SIZE];
        let sector = self.cluster_to_sector(dir_cluster);
        self.device.read_sector(sector, &mut buf)?;

        for i in 0..DIR_ENTRIES_PER_SECTOR {
            let slot = DirEntry83::read_from(&buf, i * DIR_ENTRY_SIZE);
            if slot.is_free() || slot.is_deleted() {
                let entry = DirEntry83::new(name83, attributes, first_cluster, size);
                entry.write_into(&mut buf, i * DIR_ENTRY_SIZE);
                self.device.write_sector(sector, &buf)?;
                return Ok(());
            }
        }

        warn!("No free directory entry for {}", path);
        Err(FsError::DirectoryFull)
    }

    /// Creates a directory: one cluster holding `.` and `..`, plus an
    /// entry in the parent. Returns the new directory's cluster.
    pub fn create_directory(&mut self, path: &str) -> FsResult<u32> {
        // Resolve the parent before allocating so a bad path costs
        // nothing.
        let (parent_cluster, _) = self.locate_parent(path)?;

        let cluster = self.allocate_cluster()?;

        let mut buf = [0u8; SECTOR_SIZE];
        DirEntry83::dot_entry(*b".          ", cluster).write_into(&mut buf, 0);
        DirEntry83::dot_entry(*b"..         ", parent_cluster).write_into(&mut buf, DIR_ENTRY_SIZE);
        self.device
            .write_sector(self.cluster_to_sector(cluster), &buf)?;

        if let Err(err) = self.create_entry(path, ATTR_DIRECTORY, 0, cluster) {
            // Release the cluster so the failure leaves nothing behind.
            let _ = self.write_fat_entry(cluster, 0);
            return Err(err);
        }

        info!("Created directory {}", path);
        Ok(cluster)
    }

    /// Streams `data` into the chain starting at `start_cluster`,
    /// extending the chain first if it is too short. The tail of the
    /// final sector is zero-padded; a length that is an exact multiple
    /// of the cluster size allocates no trailing cluster.
    pub fn write_file_content(&mut self, start_cluster: u32, data: &[u8]) -> FsResult<()> {
        let bytes_per_cluster = usize::from(self.sectors_per_cluster) * SECTOR_SIZE;
        let clusters_needed = data.len().div_ceil(bytes_per_cluster);

        if clusters_needed > 0 {
            let existing = self.chain_length(start_cluster)? as usize;
            for _ in existing..clusters_needed {
                self.extend_cluster_chain(start_cluster)?;
            }
        }

        let sectors_per_cluster = u32::from(self.sectors_per_cluster);
        let mut current = start_cluster;
        let mut sector_in_cluster: u32 = 0;
        let mut offset = 0;

        while offset < data.len() {
            let chunk = (data.len() - offset).min(SECTOR_SIZE);
            let mut buf = [0u8; SECTOR_SIZE];
            buf[..chunk].copy_from_slice(&data[offset..offset + chunk]);
            self.device
                .write_sector(self.cluster_to_sector(current) + sector_in_cluster, &buf)?;

            offset += chunk;
            sector_in_cluster += 1;
            if sector_in_cluster == sectors_per_cluster && offset < data.len() {
                let next = self.read_fat_entry(current)?;
                if next.is_end_of_chain() {
                    error!("Chain ended before {} bytes were written", data.len());
                    return Err(FsError::ChainCorruption);
                }
                current = next.value;
                sector_in_cluster = 0;
            }
        }

        Ok(())
    }

    /// Reads `size` bytes from the chain starting at `start_cluster`
    pub fn read_file_content(&mut self, start_cluster: u32, size: u32) -> FsResult<Vec<u8>> {
        let sectors_per_cluster = u32::from(self.sectors_per_cluster);
        let mut data = Vec::with_capacity(size as usize);
        let mut remaining = size as usize;
        let mut current = start_cluster;
        let mut sector_in_cluster: u32 = 0;

        while remaining > 0 {
            let mut buf = [0u8; SECTOR_SIZE];
            self.device
                .read_sector(self.cluster_to_sector(current) + sector_in_cluster, &mut buf)?;
            let chunk = remaining.min(SECTOR_SIZE);
            data.extend_from_slice(&buf[..chunk]);

            remaining -= chunk;
            sector_in_cluster += 1;
            if sector_in_cluster == sectors_per_cluster && remaining > 0 {
                let next = self.read_fat_entry(current)?;
                if next.is_end_of_chain() {
                    error!("Chain ended before {} bytes were read", size);
                    return Err(FsError::ChainCorruption);
                }
                current = next.value;
                sector_in_cluster = 0;
            }
        }

        Ok(data)
    }

    /// Creates a file: allocates its first cluster, registers the entry
    /// with the final size, then writes the content.
    pub fn create_file_with_content(&mut self, path: &str, data: &[u8]) -> FsResult<()> {
        let cluster = self.allocate_cluster()?;

        if let Err(err) = self.create_entry(path, ATTR_ARCHIVE, data.len() as u32, cluster) {
            // Release the cluster so the failure leaves nothing behind.
            let _ = self.write_fat_entry(cluster, 0);
            return Err(err);
        }

        self.write_file_content(cluster, data)?;
        info!("Created file {} ({} bytes)", path, data.len());
        Ok(())
    }
}

fn format_failure(step: FormatStep, err: crate::devices::DeviceError) -> FsError {
    error!("FAT32 format failed writing {:?}: {:?}", step, err);
    FsError::FormatFailed(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{DeviceError, MemoryBlockDevice};
    use alloc::format;
    use alloc::vec;

    const PARTITION_START: u32 = 2048;
    const SMALL_PARTITION_SECTORS: u32 = 8192; // 4 MB, 1 sector/cluster

    fn format_small() -> Fat32<'static> {
        let device = MemoryBlockDevice::new(PARTITION_START + SMALL_PARTITION_SECTORS);
        Fat32::format(Box::new(device), PARTITION_START, SMALL_PARTITION_SECTORS).unwrap()
    }

    fn count_used_clusters(fs: &mut Fat32) -> u32 {
        let mut used = 0;
        for cluster in 2..fs.cluster_count() + 2 {
            if !fs.read_fat_entry(cluster).unwrap().is_free() {
                used += 1;
            }
        }
        used
    }

    #[test]
    fn test_format_64mb_partition_geometry() {
        let device = MemoryBlockDevice::new(PARTITION_START + 131_072);
        let mut fs = Fat32::format(Box::new(device), PARTITION_START, 131_072).unwrap();

        // 64 MB lands in the 2-sectors-per-cluster tier.
        assert_eq!(fs.sectors_per_cluster(), 2);

        // FAT sized from the estimated cluster count, stable when the
        // same computation is repeated.
        let estimated = 131_072 / 2;
        let expected_fat = fat_size_sectors(estimated);
        assert_eq!(fs.sectors_per_fat(), expected_fat);
        assert_eq!(fs.sectors_per_fat(), fat_size_sectors(131_072 / 2));

        // Cluster count re-derived from the remaining data region, and
        // every cluster has a FAT slot.
        let expected_clusters = (131_072 - 32 - 2 * expected_fat) / 2;
        assert_eq!(fs.cluster_count(), expected_clusters);
        assert!(fat_size_sectors(fs.cluster_count()) <= fs.sectors_per_fat());

        // Boot sector, backup, and FSInfo land where the layout says.
        let mut buf = [0u8; SECTOR_SIZE];
        fs.device.read_sector(PARTITION_START, &mut buf).unwrap();
        assert_eq!(&buf[510..], &[0x55, 0xAA]);
        assert_eq!(buf[13], 2);

        let mut backup = [0u8; SECTOR_SIZE];
        fs.device
            .read_sector(PARTITION_START + 6, &mut backup)
            .unwrap();
        assert_eq!(backup, buf);

        fs.device
            .read_sector(PARTITION_START + 1, &mut buf)
            .unwrap();
        assert_eq!(&buf[0..4], &[0x52, 0x52, 0x61, 0x41]);
    }

    #[test]
    fn test_format_seeds_reserved_fat_entries() {
        let mut fs = format_small();

        let mut buf = [0u8; SECTOR_SIZE];
        let fat_start = fs.fat_start();
        let mirror_start = fat_start + fs.sectors_per_fat();
        for start in [fat_start, mirror_start] {
            fs.device.read_sector(start, &mut buf).unwrap();
            assert_eq!(read_u32(&buf, 0), 0x0FFF_FF00 | u32::from(MEDIA_DESCRIPTOR));
            assert_eq!(read_u32(&buf, 4), 0x0FFF_FFFF);
            assert_eq!(read_u32(&buf, 8), 0x0FFF_FFFF);
        }

        // Root directory holds exactly the volume label.
        let entries = fs.directory_entries(fs.root_cluster()).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_volume_label());
    }

    #[test]
    fn test_format_failure_names_the_step() {
        // Too small to hold even the boot sector at the partition start.
        let device = MemoryBlockDevice::new(64);
        let result = Fat32::format(Box::new(device), PARTITION_START, SMALL_PARTITION_SECTORS);
        assert!(matches!(
            result,
            Err(FsError::FormatFailed(FormatStep::BootSector))
        ));
    }

    #[test]
    fn test_mount_recovers_format_geometry() {
        let fs = format_small();
        let (fat_start, data_start, clusters) =
            (fs.fat_start(), fs.data_start(), fs.cluster_count());

        let Fat32 { device, .. } = fs;
        let mounted = Fat32::mount(device, PARTITION_START, SMALL_PARTITION_SECTORS).unwrap();

        assert_eq!(mounted.fat_start(), fat_start);
        assert_eq!(mounted.data_start(), data_start);
        assert_eq!(mounted.cluster_count(), clusters);
        assert_eq!(mounted.root_cluster(), 2);
    }

    #[test]
    fn test_format_rejects_undersized_partition() {
        // 33 sectors cannot even hold the reserved area plus both FATs;
        // 34 leave a data region too small for a single cluster.
        for sector_count in [33, 34] {
            let device = MemoryBlockDevice::new(4096);
            assert!(matches!(
                Fat32::format(Box::new(device), PARTITION_START, sector_count),
                Err(FsError::VolumeTooSmall)
            ));
        }

        // The smallest geometry with one data cluster still formats.
        let device = MemoryBlockDevice::new(4096);
        let mut fs = Fat32::format(Box::new(device), PARTITION_START, 35).unwrap();
        assert_eq!(fs.cluster_count(), 1);
        assert!(fs.read_fat_entry(2).unwrap().is_end_of_chain());
    }

    #[test]
    fn test_mount_rejects_zero_fat_size() {
        let fs = format_small();
        let Fat32 { mut device, .. } = fs;

        // Corrupt the 32-bit FAT size field at offset 36.
        let mut buf = [0u8; SECTOR_SIZE];
        device.read_sector(PARTITION_START, &mut buf).unwrap();
        buf[36..40].fill(0);
        device.write_sector(PARTITION_START, &buf).unwrap();

        assert!(matches!(
            Fat32::mount(device, PARTITION_START, SMALL_PARTITION_SECTORS),
            Err(FsError::InvalidBootSector)
        ));
    }

    #[test]
    fn test_mount_rejects_unformatted_device() {
        let device = MemoryBlockDevice::new(PARTITION_START + SMALL_PARTITION_SECTORS);
        assert!(matches!(
            Fat32::mount(Box::new(device), PARTITION_START, SMALL_PARTITION_SECTORS),
            Err(FsError::InvalidBootSector)
        ));
    }

    #[test]
    fn test_fat_mirror_invariant() {
        let mut fs = format_small();

        fs.write_fat_entry(10, 0x000A_BCDE).unwrap();

        // Both copies decode to the same 28-bit value.
        let mut first = [0u8; SECTOR_SIZE];
        let mut second = [0u8; SECTOR_SIZE];
        let fat_start = fs.fat_start();
        let mirror_start = fat_start + fs.sectors_per_fat();
        fs.device.read_sector(fat_start, &mut first).unwrap();
        fs.device.read_sector(mirror_start, &mut second).unwrap();
        assert_eq!(read_u32(&first, 40) & FAT_ENTRY_MASK, 0x000A_BCDE);
        assert_eq!(read_u32(&second, 40) & FAT_ENTRY_MASK, 0x000A_BCDE);
        assert_eq!(fs.read_fat_entry(10).unwrap().value, 0x000A_BCDE);
    }

    #[test]
    fn test_fat_write_preserves_reserved_bits() {
        let mut fs = format_small();

        // Plant reserved top bits directly on the device.
        let mut buf = [0u8; SECTOR_SIZE];
        let fat_start = fs.fat_start();
        fs.device.read_sector(fat_start, &mut buf).unwrap();
        write_u32(&mut buf, 20, 0xF000_0000);
        fs.device.write_sector(fat_start, &buf).unwrap();

        fs.write_fat_entry(5, 7).unwrap();

        fs.device.read_sector(fat_start, &mut buf).unwrap();
        assert_eq!(read_u32(&buf, 20), 0xF000_0007);
    }

    /// Fails every write to one specific sector; used to drive the
    /// mirror-write failure path.
    struct FailingSectorDevice {
        inner: MemoryBlockDevice,
        fail_lba: u32,
    }

    impl BlockDevice for FailingSectorDevice {
        fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), DeviceError> {
            self.inner.read_sector(lba, buf)
        }

        fn write_sector(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> Result<(), DeviceError> {
            if lba == self.fail_lba {
                return Err(DeviceError::Timeout);
            }
            self.inner.write_sector(lba, buf)
        }

        fn total_sectors(&self) -> u32 {
            self.inner.total_sectors()
        }
    }

    #[test]
    fn test_partial_mirror_write_is_surfaced() {
        // Format on a healthy device, then remount it with the first
        // mirror sector failing.
        let fs = format_small();
        let mirror_lba = fs.fat_start() + fs.sectors_per_fat();
        let Fat32 { device, .. } = fs;

        let mut inner = MemoryBlockDevice::new(PARTITION_START + SMALL_PARTITION_SECTORS);
        let mut buf = [0u8; SECTOR_SIZE];
        let mut source = device;
        for lba in 0..inner.total_sectors() {
            source.read_sector(lba, &mut buf).unwrap();
            inner.write_sector(lba, &buf).unwrap();
        }

        let failing = FailingSectorDevice {
            inner,
            fail_lba: mirror_lba,
        };
        let mut fs =
            Fat32::mount(Box::new(failing), PARTITION_START, SMALL_PARTITION_SECTORS).unwrap();

        assert_eq!(
            fs.write_fat_entry(3, FAT_EOC),
            Err(FsError::PartialMirrorWrite)
        );
        // The first copy took the write before the mirror failed.
        assert!(fs.read_fat_entry(3).unwrap().is_end_of_chain());
    }

    #[test]
    fn test_allocator_exclusivity() {
        let mut fs = format_small();

        // Linear first-fit starts right after the root cluster.
        let first = fs.allocate_cluster().unwrap();
        let second = fs.allocate_cluster().unwrap();
        let third = fs.allocate_cluster().unwrap();

        assert_eq!(first, 3);
        assert_ne!(first, second);
        assert_ne!(second, third);
        for cluster in [first, second, third] {
            assert!(fs.read_fat_entry(cluster).unwrap().is_end_of_chain());
        }
    }

    #[test]
    fn test_allocated_cluster_is_zero_filled() {
        let mut fs = format_small();

        // Dirty a sector in the data region first.
        let dirty = [0x77u8; SECTOR_SIZE];
        let sector = fs.cluster_to_sector(3);
        fs.device.write_sector(sector, &dirty).unwrap();

        let cluster = fs.allocate_cluster().unwrap();
        assert_eq!(cluster, 3);

        let mut buf = [0xFFu8; SECTOR_SIZE];
        fs.device.read_sector(sector, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_chain_extension_appends_at_true_tail() {
        let mut fs = format_small();

        let head = fs.allocate_cluster().unwrap();
        assert_eq!(fs.chain_length(head).unwrap(), 1);

        let second = fs.extend_cluster_chain(head).unwrap();
        assert_eq!(fs.chain_length(head).unwrap(), 2);
        assert_eq!(fs.read_fat_entry(head).unwrap().value, second);

        // Extending from the head again must still land at the tail.
        let third = fs.extend_cluster_chain(head).unwrap();
        assert_eq!(fs.chain_length(head).unwrap(), 3);
        assert_eq!(fs.read_fat_entry(second).unwrap().value, third);
        assert!(fs.read_fat_entry(third).unwrap().is_end_of_chain());
    }

    #[test]
    fn test_chain_walk_rejects_corruption() {
        let mut fs = format_small();

        assert_eq!(fs.extend_cluster_chain(0), Err(FsError::InvalidCluster));

        // A chain linking into a free cluster is corrupt, not extendable.
        let head = fs.allocate_cluster().unwrap();
        fs.write_fat_entry(head, 1000).unwrap();
        assert_eq!(fs.chain_length(head), Err(FsError::ChainCorruption));
    }

    #[test]
    fn test_create_directory_and_file_scenario() {
        let mut fs = format_small();

        let home_cluster = fs.create_directory("HOME").unwrap();
        fs.create_file_with_content("HOME/A.TXT", b"hi").unwrap();

        // Root gained exactly one entry: a directory named HOME.
        let root_entries = fs.directory_entries(fs.root_cluster()).unwrap();
        assert_eq!(root_entries.len(), 2); // volume label + HOME
        let home = fs.find_entry("HOME").unwrap();
        assert!(home.is_directory());
        assert_eq!(home.first_cluster(), home_cluster);

        // HOME starts with its dot entries and now carries A.TXT.
        let home_entries = fs.directory_entries(home_cluster).unwrap();
        assert_eq!(home_entries.len(), 3);
        assert!(home_entries[0].matches(b".          "));
        assert!(home_entries[1].matches(b"..         "));

        let file = fs.find_entry("HOME/A.TXT").unwrap();
        assert!(file.matches(&filename_to_83("A.TXT")));
        let size = file.file_size;
        assert_eq!(size, 2);

        // The file's first cluster starts with the content bytes.
        let mut buf = [0u8; SECTOR_SIZE];
        let sector = fs.cluster_to_sector(file.first_cluster());
        fs.device.read_sector(sector, &mut buf).unwrap();
        assert_eq!(&buf[..2], b"hi");
        assert_eq!(fs.read_file_content(file.first_cluster(), 2).unwrap(), b"hi");
    }

    #[test]
    fn test_multi_cluster_content_round_trip() {
        let mut fs = format_small();

        let data: Vec<u8> = (0..3000u32).map(|i| (i % 256) as u8).collect();
        fs.create_file_with_content("BIG.BIN", &data).unwrap();

        let entry = fs.find_entry("BIG.BIN").unwrap();
        let size = entry.file_size;
        assert_eq!(size as usize, data.len());
        // 3000 bytes over 512-byte clusters means a 6-cluster chain.
        assert_eq!(fs.chain_length(entry.first_cluster()).unwrap(), 6);
        assert_eq!(
            fs.read_file_content(entry.first_cluster(), size).unwrap(),
            data
        );
    }

    #[test]
    fn test_exact_multiple_allocates_no_trailing_cluster() {
        let mut fs = format_small();

        let cluster = fs.allocate_cluster().unwrap();
        let data = vec![0x5A; 2 * SECTOR_SIZE]; // exactly two clusters
        fs.write_file_content(cluster, &data).unwrap();

        assert_eq!(fs.chain_length(cluster).unwrap(), 2);
    }

    #[test]
    fn test_directory_full_leaves_no_partial_entry() {
        let mut fs = format_small();

        // The volume label occupies one of the 16 root slots.
        for i in 0..15 {
            fs.create_file_with_content(&format!("F{}.TXT", i), b"x")
                .unwrap();
        }
        let used_before = count_used_clusters(&mut fs);

        assert_eq!(
            fs.create_file_with_content("OVER.TXT", b"x"),
            Err(FsError::DirectoryFull)
        );

        assert!(matches!(fs.find_entry("OVER.TXT"), Err(FsError::NotFound)));
        assert_eq!(fs.directory_entries(fs.root_cluster()).unwrap().len(), 16);
        // The cluster allocated for the failed file was released.
        assert_eq!(count_used_clusters(&mut fs), used_before);

        assert_eq!(
            fs.create_directory("OVERDIR"),
            Err(FsError::DirectoryFull)
        );
        assert_eq!(count_used_clusters(&mut fs), used_before);
    }

    #[test]
    fn test_format_partition_uses_mbr_geometry() {
        use crate::partition::PartitionManager;

        let mut device = MemoryBlockDevice::new(32_768); // 16 MB disk
        PartitionManager::new(&mut device)
            .create_boot_partition()
            .unwrap();

        let fs = Fat32::format_partition(Box::new(device), 1).unwrap();
        assert_eq!(fs.partition_start(), 2048);
        assert_eq!(fs.sectors_per_cluster(), 1);
    }

    #[test]
    fn test_volume_full_on_tiny_volume() {
        // Partition with almost no data region: 32 reserved + 2 FATs
        // leaves a handful of clusters.
        let device = MemoryBlockDevice::new(PARTITION_START + 40);
        let mut fs = Fat32::format(Box::new(device), PARTITION_START, 40).unwrap();

        let mut last = Ok(0);
        for _ in 0..=fs.cluster_count() {
            last = fs.allocate_cluster();
            if last.is_err() {
                break;
            }
        }
        assert_eq!(last, Err(FsError::VolumeFull));
    }
}
