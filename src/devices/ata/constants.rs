//! ATA/IDE controller constants

/// I/O base of the primary channel
pub const PRIMARY_BASE: u16 = 0x1F0;

/// I/O base of the secondary channel
pub const SECONDARY_BASE: u16 = 0x170;

/// Data register offset (16-bit PIO window)
pub const REG_DATA: u16 = 0;

/// Error register offset
pub const REG_ERROR: u16 = 1;

/// Sector count register offset
pub const REG_SECTOR_COUNT: u16 = 2;

/// LBA bits 0-7
pub const REG_LBA_LO: u16 = 3;

/// LBA bits 8-15
pub const REG_LBA_MID: u16 = 4;

/// LBA bits 16-23
pub const REG_LBA_HI: u16 = 5;

/// Drive/head register offset (select bits plus LBA bits 24-27)
pub const REG_DRIVE_HEAD: u16 = 6;

/// Status (read) / command (write) register offset
pub const REG_STATUS: u16 = 7;

/// Read sectors with retry
pub const CMD_READ_SECTORS: u8 = 0x20;

/// Write sectors with retry
pub const CMD_WRITE_SECTORS: u8 = 0x30;

/// Identify device
pub const CMD_IDENTIFY: u8 = 0xEC;

/// Device reset, issued before IDENTIFY
pub const CMD_DEVICE_RESET: u8 = 0x08;

/// Status: drive busy
pub const STATUS_BSY: u8 = 0x80;

/// Status: drive ready
pub const STATUS_DRDY: u8 = 0x40;

/// Status: data request ready
pub const STATUS_DRQ: u8 = 0x08;

/// Status: error
pub const STATUS_ERR: u8 = 0x01;

/// Drive/head select value for the master drive
pub const SELECT_MASTER: u8 = 0xA0;

/// Drive/head select value for the slave drive
pub const SELECT_SLAVE: u8 = 0xB0;

/// Number of drive slots (primary/secondary x master/slave)
pub const MAX_DRIVES: usize = 4;

/// 16-bit words transferred per sector
pub const WORDS_PER_SECTOR: usize = 256;

/// Sectors per megabyte at 512 bytes per sector
pub const SECTORS_PER_MB: u32 = 2048;
