//! Polled ATA/IDE disk driver
//!
//! Drives the legacy IDE register file with programmed I/O: IDENTIFY
//! enumeration over the four (channel, role) slots, explicit active-drive
//! selection, and single-sector reads and writes. Every hardware wait is
//! a bounded status poll; a budget that runs out surfaces as
//! [`DeviceError::Timeout`] rather than hanging the caller.
//!
//! All register traffic goes through the [`AtaPorts`] trait so the
//! protocol logic can be exercised against a simulated bus.

use arrayvec::ArrayString;
use core::hint::spin_loop;
use core::result::Result;
use log::{debug, info, warn};

pub mod constants;

pub use constants::MAX_DRIVES;
use constants::*;

use super::{BlockDevice, DeviceError, SECTOR_SIZE};

/// Raw port I/O used by the driver.
///
/// The real backend talks to the x86 I/O space; tests supply a
/// register-level device model instead.
pub trait AtaPorts {
    fn outb(&mut self, port: u16, value: u8);
    fn inb(&mut self, port: u16) -> u8;
    fn outw(&mut self, port: u16, value: u16);
    fn inw(&mut self, port: u16) -> u16;
}

/// Port I/O through the processor's in/out instructions
#[cfg(target_arch = "x86_64")]
pub struct X86PortIo;

#[cfg(target_arch = "x86_64")]
impl AtaPorts for X86PortIo {
    fn outb(&mut self, port: u16, value: u8) {
        unsafe { x86_64::instructions::port::Port::new(port).write(value) }
    }

    fn inb(&mut self, port: u16) -> u8 {
        unsafe { x86_64::instructions::port::Port::new(port).read() }
    }

    fn outw(&mut self, port: u16, value: u16) {
        unsafe { x86_64::instructions::port::Port::new(port).write(value) }
    }

    fn inw(&mut self, port: u16) -> u16 {
        unsafe { x86_64::instructions::port::Port::new(port).read() }
    }
}

/// IDE channel a drive is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Primary,
    Secondary,
}

impl Channel {
    /// I/O base of this channel's register file
    fn base(self) -> u16 {
        match self {
            Channel::Primary => PRIMARY_BASE,
            Channel::Secondary => SECONDARY_BASE,
        }
    }
}

/// Position of a drive on its channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

impl Role {
    /// Drive/head register select bits
    fn select_bits(self) -> u8 {
        match self {
            Role::Master => SELECT_MASTER,
            Role::Slave => SELECT_SLAVE,
        }
    }
}

/// One slot of the drive table, populated by enumeration.
///
/// `size_mb` and `model` are meaningful only when `exists` is true.
#[derive(Debug, Clone)]
pub struct DriveDescriptor {
    pub exists: bool,
    /// ASCII model string from IDENTIFY, trailing spaces trimmed
    pub model: ArrayString<40>,
    /// Capacity in megabytes
    pub size_mb: u32,
    pub channel: Channel,
    pub role: Role,
}

impl DriveDescriptor {
    fn absent(channel: Channel, role: Role) -> Self {
        DriveDescriptor {
            exists: false,
            model: ArrayString::new(),
            size_mb: 0,
            channel,
            role,
        }
    }
}

/// Maximum status polls before a hardware wait is declared timed out.
///
/// Injected at controller construction so tests can shrink it to a few
/// iterations against a simulated bus.
#[derive(Debug, Clone, Copy)]
pub struct PollBudget {
    pub iterations: u32,
}

impl Default for PollBudget {
    fn default() -> Self {
        PollBudget { iterations: 30_000 }
    }
}

/// Polled ATA controller: the 4-slot drive table, the active-drive
/// selector, and single-sector PIO transfers.
pub struct AtaController<P: AtaPorts> {
    ports: P,
    drives: [DriveDescriptor; MAX_DRIVES],
    active: Option<usize>,
    budget: PollBudget,
}

impl<P: AtaPorts> AtaController<P> {
    pub fn new(ports: P, budget: PollBudget) -> Self {
        let drives = [
            DriveDescriptor::absent(Channel::Primary, Role::Master),
            DriveDescriptor::absent(Channel::Primary, Role::Slave),
            DriveDescriptor::absent(Channel::Secondary, Role::Master),
            DriveDescriptor::absent(Channel::Secondary, Role::Slave),
        ];

        AtaController {
            ports,
            drives,
            active: None,
            budget,
        }
    }

    /// Probes all four slots with IDENTIFY and rebuilds the drive table.
    ///
    /// Absence is never an error: a slot that stays busy, answers with
    /// status 0, or carries an ATAPI device is recorded as not present.
    /// The active drive is reset to the first slot found. Returns the
    /// number of drives detected.
    pub fn enumerate_drives(&mut self) -> usize {
        info!("Detecting ATA drives");

        for index in 0..MAX_DRIVES {
            let channel = self.drives[index].channel;
            let role = self.drives[index].role;

            match self.identify(channel, role) {
                Some((model, size_mb)) => {
                    info!(
                        "Drive {}: {} ({} MB) on {:?} {:?}",
                        index, model, size_mb, channel, role
                    );
                    self.drives[index] = DriveDescriptor {
                        exists: true,
                        model,
                        size_mb,
                        channel,
                        role,
                    };
                }
                None => {
                    debug!("No drive at {:?} {:?}", channel, role);
                    self.drives[index] = DriveDescriptor::absent(channel, role);
                }
            }
        }

        self.active = self.drives.iter().position(|d| d.exists);

        let count = self.drives.iter().filter(|d| d.exists).count();
        info!("Found {} ATA disk drive(s)", count);
        count
    }

    /// Runs the IDENTIFY sequence for one slot.
    ///
    /// Returns the trimmed model string and the capacity in megabytes,
    /// or `None` when nothing answers, the answer is an ATAPI signature,
    /// or the slot times out.
    fn identify(&mut self, channel: Channel, role: Role) -> Option<(ArrayString<40>, u32)> {
        let base = channel.base();

        // Select the drive, then reset the channel before probing it.
        self.ports.outb(base + REG_DRIVE_HEAD, role.select_bits());
        self.ports.outb(base + REG_STATUS, CMD_DEVICE_RESET);

        if self.wait_not_busy(base).is_err() {
            return None;
        }

        self.ports.outb(base + REG_SECTOR_COUNT, 0);
        self.ports.outb(base + REG_LBA_LO, 0);
        self.ports.outb(base + REG_LBA_MID, 0);
        self.ports.outb(base + REG_LBA_HI, 0);
        self.ports.outb(base + REG_STATUS, CMD_IDENTIFY);

        // Status of zero means the slot is empty.
        if self.ports.inb(base + REG_STATUS) == 0 {
            return None;
        }

        // Wait for data or an error, within the polling budget.
        let mut budget = self.budget.iterations;
        loop {
            let status = self.ports.inb(base + REG_STATUS);

            if status & STATUS_ERR != 0 {
                // ATAPI devices abort IDENTIFY and latch a signature in
                // the LBA registers. Either way this is not a hard drive.
                let mid = self.ports.inb(base + REG_LBA_MID);
                let hi = self.ports.inb(base + REG_LBA_HI);
                if (mid == 0x14 && hi == 0xEB) || (mid == 0x69 && hi == 0x96) {
                    debug!("ATAPI device at {:?} {:?}, skipping", channel, role);
                }
                return None;
            }

            if status & STATUS_BSY == 0 && status & STATUS_DRQ != 0 {
                break;
            }

            budget = budget.checked_sub(1)?;
            spin_loop();
        }

        let mut data = [0u16; WORDS_PER_SECTOR];
        for word in data.iter_mut() {
            *word = self.ports.inw(base + REG_DATA);
        }

        // Model string lives in words 27-46, two characters per word,
        // high byte first.
        let mut raw = [0u8; 40];
        for i in 0..20 {
            let word = data[27 + i];
            raw[i * 2] = (word >> 8) as u8;
            raw[i * 2 + 1] = (word & 0xFF) as u8;
        }
        let mut end = raw.len();
        while end > 0 && (raw[end - 1] == b' ' || raw[end - 1] == 0) {
            end -= 1;
        }
        let model = core::str::from_utf8(&raw[..end])
            .ok()
            .and_then(|s| ArrayString::from(s).ok())
            .unwrap_or_default();

        // Words 60-61 hold the 28-bit total sector count.
        let sectors = u32::from(data[60]) | (u32::from(data[61]) << 16);
        let size_mb = sectors / SECTORS_PER_MB;

        Some((model, size_mb))
    }

    /// Makes slot `index` the target of subsequent sector I/O.
    ///
    /// On failure the previous selection is left unchanged.
    pub fn select_drive(&mut self, index: usize) -> Result<(), DeviceError> {
        if index >= MAX_DRIVES {
            return Err(DeviceError::InvalidDrive);
        }
        if !self.drives[index].exists {
            return Err(DeviceError::MediaAbsent);
        }

        self.active = Some(index);
        Ok(())
    }

    /// Index of the currently active drive, if any
    pub fn active_drive(&self) -> Option<usize> {
        self.active
    }

    /// The full 4-slot drive table
    pub fn drives(&self) -> &[DriveDescriptor; MAX_DRIVES] {
        &self.drives
    }

    /// Descriptor for one slot
    pub fn drive_info(&self, index: usize) -> Result<&DriveDescriptor, DeviceError> {
        self.drives.get(index).ok_or(DeviceError::InvalidDrive)
    }

    /// Polls the status register until BSY clears
    fn wait_not_busy(&mut self, base: u16) -> Result<(), DeviceError> {
        for _ in 0..self.budget.iterations {
            if self.ports.inb(base + REG_STATUS) & STATUS_BSY == 0 {
                return Ok(());
            }
            spin_loop();
        }
        warn!("Drive never cleared busy");
        Err(DeviceError::Timeout)
    }

    /// Polls the status register until DRQ asserts
    fn wait_data_request(&mut self, base: u16) -> Result<(), DeviceError> {
        for _ in 0..self.budget.iterations {
            if self.ports.inb(base + REG_STATUS) & STATUS_DRQ != 0 {
                return Ok(());
            }
            spin_loop();
        }
        warn!("Drive never asserted data request");
        Err(DeviceError::Timeout)
    }

    /// Selects the active drive and programs a one-sector transfer at
    /// `lba`. Returns the channel base for the data phase.
    fn setup_transfer(&mut self, lba: u32) -> Result<u16, DeviceError> {
        let index = self.active.ok_or(DeviceError::MediaAbsent)?;
        let drive = &self.drives[index];
        let base = drive.channel.base();
        let select = drive.role.select_bits() | ((lba >> 24) & 0x0F) as u8;

        self.ports.outb(base + REG_DRIVE_HEAD, select);
        self.wait_not_busy(base)?;

        self.ports.outb(base + REG_SECTOR_COUNT, 1);
        self.ports.outb(base + REG_LBA_LO, lba as u8);
        self.ports.outb(base + REG_LBA_MID, (lba >> 8) as u8);
        self.ports.outb(base + REG_LBA_HI, (lba >> 16) as u8);

        Ok(base)
    }
}

impl<P: AtaPorts> BlockDevice for AtaController<P> {
    /// Reads one sector from the active drive by polled PIO
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), DeviceError> {
        let base = self.setup_transfer(lba)?;

        self.ports.outb(base + REG_STATUS, CMD_READ_SECTORS);
        self.wait_data_request(base)?;

        for i in 0..WORDS_PER_SECTOR {
            let word = self.ports.inw(base + REG_DATA);
            buf[i * 2] = (word & 0xFF) as u8;
            buf[i * 2 + 1] = (word >> 8) as u8;
        }

        Ok(())
    }

    /// Writes one sector to the active drive by polled PIO
    fn write_sector(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> Result<(), DeviceError> {
        let base = self.setup_transfer(lba)?;

        self.ports.outb(base + REG_STATUS, CMD_WRITE_SECTORS);
        self.wait_data_request(base)?;

        for i in 0..WORDS_PER_SECTOR {
            let word = u16::from(buf[i * 2]) | (u16::from(buf[i * 2 + 1]) << 8);
            self.ports.outw(base + REG_DATA, word);
        }

        Ok(())
    }

    /// Capacity of the active drive in sectors, 0 when none is selected
    fn total_sectors(&self) -> u32 {
        match self.active {
            Some(index) => self.drives[index].size_mb * SECTORS_PER_MB,
            None => 0,
        }
    }
}
