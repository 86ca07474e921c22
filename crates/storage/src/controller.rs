//! The ATA task-file state machine, per spec §4.3.

use crate::backend::{BackendError, DiskBackend, MAX_TRANSFER_SECTORS, SECTOR_SIZE};
use crate::taskfile::{error as err_bits, status, Command, TaskFile};

/// Default timeout for a command to clear BUSY, in microseconds.
pub const BUSY_TIMEOUT_US: u32 = 5_000_000;
/// Default timeout for DRQ to assert after a PIO command, in microseconds.
pub const DRQ_TIMEOUT_US: u32 = 1_000_000;

/// The controller's current transfer phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Idle,
    Identify,
    PioRead,
    PioWrite,
    DmaRead,
    DmaWrite,
    Flushing,
}

/// Errors the public contract and register-level path can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
pub enum StorageError {
    /// BUSY failed to clear within [`BUSY_TIMEOUT_US`].
    #[error("busy-clear timeout")]
    BusyTimeout,
    /// DRQ failed to assert within [`DRQ_TIMEOUT_US`].
    #[error("data-request timeout")]
    DataRequestTimeout,
    /// The requested LBA/count addressing is invalid (e.g. count=0 in LBA-48).
    #[error("invalid addressing")]
    InvalidAddressing,
    /// The command was aborted (unsupported opcode, or backend rejected it).
    #[error("command aborted")]
    Aborted,
    /// Requested sector not present on the backing image.
    #[error("id not found")]
    IdNotFound,
    /// Backend reported an uncorrectable error.
    #[error("uncorrectable error")]
    Uncorrectable,
}

impl From<BackendError> for StorageError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::OutOfRange => StorageError::IdNotFound,
            BackendError::ReadOnly => StorageError::Aborted,
            BackendError::Io => StorageError::Uncorrectable,
        }
    }
}

/// 256-word (512-byte) ATA IDENTIFY DEVICE response.
pub struct IdentityBlock(pub [u16; 256]);

/// The ATA task-file engine: register block, transfer-phase state, a
/// 256-word sector buffer, and a backing [`DiskBackend`].
pub struct AtaController<B: DiskBackend> {
    task_file: TaskFile,
    mode: TransferMode,
    current_lba: u64,
    remaining_sectors: u32,
    sector_buffer: [u16; 256],
    cursor: usize,
    backend: B,
    lba48_supported: bool,
}

impl<B: DiskBackend> AtaController<B> {
    /// Wrap `backend`. LBA-48 is advertised iff the image exceeds 2^28
    /// sectors, per spec §8 "ATA identify".
    pub fn new(backend: B) -> Self {
        let lba48_supported = backend.total_sectors() > (1u64 << 28);
        Self {
            task_file: TaskFile::default(),
            mode: TransferMode::Idle,
            current_lba: 0,
            remaining_sectors: 0,
            sector_buffer: [0; 256],
            cursor: 0,
            backend,
            lba48_supported,
        }
    }

    /// Current transfer phase.
    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    /// Borrow the task-file registers (for register-level emulation).
    pub fn task_file(&self) -> &TaskFile {
        &self.task_file
    }

    fn ata_swap_bytes(dst: &mut [u16], text: &str) {
        let bytes = text.as_bytes();
        for (i, slot) in dst.iter_mut().enumerate() {
            let lo = bytes.get(i * 2).copied().unwrap_or(b' ');
            let hi = bytes.get(i * 2 + 1).copied().unwrap_or(b' ');
            // ATA strings are byte-swapped within each 16-bit word.
            *slot = (u16::from(lo) << 8) | u16::from(hi);
        }
    }

    /// `identify() -> identity_block`.
    pub fn identify(&mut self) -> IdentityBlock {
        let mut words = [0u16; 256];
        words[0] = 0x0040; // fixed, non-removable ATA device
        Self::ata_swap_bytes(&mut words[10..20], self.backend.serial());
        Self::ata_swap_bytes(&mut words[23..27], self.backend.firmware());
        Self::ata_swap_bytes(&mut words[27..47], self.backend.model());

        let total = self.backend.total_sectors();
        let lba28 = total.min(u64::from(u32::MAX)) as u32;
        words[60] = lba28 as u16;
        words[61] = (lba28 >> 16) as u16;

        words[49] = 1 << 9; // LBA supported
        if self.lba48_supported {
            words[83] = 1 << 10; // LBA-48 supported
            words[100] = total as u16;
            words[101] = (total >> 16) as u16;
            words[102] = (total >> 32) as u16;
            words[103] = (total >> 48) as u16;
        }
        words[49] |= 1 << 8; // DMA supported

        self.mode = TransferMode::Idle;
        IdentityBlock(words)
    }

    fn resolve_addressing(&self, lba: u64, count: u32) -> Result<(u64, u32), StorageError> {
        if lba < (1u64 << 28) && count <= MAX_TRANSFER_SECTORS {
            let effective_count = if count == 0 { 256 } else { count };
            Ok((lba, effective_count))
        } else if self.lba48_supported {
            if count == 0 {
                return Err(StorageError::InvalidAddressing);
            }
            Ok((lba, count))
        } else {
            Err(StorageError::InvalidAddressing)
        }
    }

    /// `read_sectors(lba, count, out) -> ok | error`.
    pub fn read_sectors(&mut self, lba: u64, count: u32, out: &mut [u8]) -> Result<(), StorageError> {
        let (lba, count) = self.resolve_addressing(lba, count)?;
        self.mode = TransferMode::PioRead;
        self.task_file.status = status::BUSY;
        let result = self.backend.read_sectors(lba, count, out).map_err(StorageError::from);
        self.task_file.status = if result.is_ok() { status::DRDY } else { status::DRDY | status::ERR };
        self.mode = TransferMode::Idle;
        result
    }

    /// `write_sectors(lba, count, in) -> ok | error`.
    pub fn write_sectors(&mut self, lba: u64, count: u32, data: &[u8]) -> Result<(), StorageError> {
        let (lba, count) = self.resolve_addressing(lba, count)?;
        self.mode = TransferMode::PioWrite;
        self.task_file.status = status::BUSY;
        let result = self.backend.write_sectors(lba, count, data).map_err(StorageError::from);
        self.task_file.status = if result.is_ok() { status::DRDY } else { status::DRDY | status::ERR | status::DWF };
        self.mode = TransferMode::Idle;
        result
    }

    /// `flush_cache() -> ok | error`. A no-op for in-memory backings, an
    /// fsync for file backings (the backend decides).
    pub fn flush_cache(&mut self) -> Result<(), StorageError> {
        self.mode = TransferMode::Flushing;
        let result = self.backend.flush().map_err(StorageError::from);
        self.mode = TransferMode::Idle;
        result
    }

    /// `standby() -> ok | error`. This model has no spin-down state to
    /// track beyond accepting the command.
    pub fn standby(&mut self) -> Result<(), StorageError> {
        self.mode = TransferMode::Idle;
        Ok(())
    }

    /// Register-level command issue: a host write to the command register
    /// latches `opcode` and begins the per-command transfer phase,
    /// per the state-machine description in spec §4.3.
    pub fn issue_command(&mut self, opcode: u8) -> Result<(), StorageError> {
        let command = Command::from_opcode(opcode).ok_or(StorageError::Aborted)?;
        self.task_file.command = opcode;
        self.task_file.status = status::BUSY;

        match command {
            Command::IdentifyDevice => {
                let identity = self.identify();
                self.sector_buffer.copy_from_slice(&identity.0);
                self.cursor = 0;
                self.mode = TransferMode::Identify;
                self.task_file.status = status::DRDY | status::DRQ;
            }
            Command::ReadSectorsPio => {
                self.current_lba = u64::from(self.task_file.lba28());
                self.remaining_sectors = self.task_file.count_lba28();
                self.fetch_sector_for_read()?;
                self.mode = TransferMode::PioRead;
            }
            Command::WriteSectorsPio => {
                self.current_lba = u64::from(self.task_file.lba28());
                self.remaining_sectors = self.task_file.count_lba28();
                self.cursor = 0;
                self.mode = TransferMode::PioWrite;
                self.task_file.status = status::DRDY | status::DRQ;
            }
            Command::ReadDma => {
                self.mode = TransferMode::DmaRead;
                self.task_file.status = status::DRDY;
            }
            Command::WriteDma => {
                self.mode = TransferMode::DmaWrite;
                self.task_file.status = status::DRDY;
            }
            Command::FlushCache => {
                let _ = self.flush_cache();
                self.task_file.status = status::DRDY;
            }
            Command::Standby => {
                let _ = self.standby();
                self.task_file.status = status::DRDY;
            }
        }
        Ok(())
    }

    fn fetch_sector_for_read(&mut self) -> Result<(), StorageError> {
        let mut raw = [0u8; SECTOR_SIZE];
        self.backend.read_sectors(self.current_lba, 1, &mut raw).map_err(|e| {
            self.task_file.status = status::ERR;
            self.task_file.error = match StorageError::from(e) {
                StorageError::IdNotFound => err_bits::IDNF,
                StorageError::Uncorrectable => err_bits::UNC,
                _ => err_bits::ABRT,
            };
            StorageError::from(e)
        })?;
        for (i, word) in self.sector_buffer.iter_mut().enumerate() {
            *word = u16::from_le_bytes([raw[i * 2], raw[i * 2 + 1]]);
        }
        self.cursor = 0;
        self.task_file.status = status::DRDY | status::DRQ;
        Ok(())
    }

    /// Host read of the 16-bit data register. Consumes one word from the
    /// current sector buffer; on the 256th word, fetches the next sector
    /// (PIO read) or clears DRQ (identify), per spec §4.3's PIO cycle.
    pub fn read_data(&mut self) -> Result<u16, StorageError> {
        let word = self.sector_buffer[self.cursor];
        self.cursor += 1;
        if self.cursor == 256 {
            match self.mode {
                TransferMode::PioRead => {
                    self.remaining_sectors = self.remaining_sectors.saturating_sub(1);
                    self.current_lba += 1;
                    if self.remaining_sectors == 0 {
                        self.task_file.status = status::DRDY;
                        self.mode = TransferMode::Idle;
                    } else {
                        self.fetch_sector_for_read()?;
                    }
                }
                _ => {
                    self.task_file.status = status::DRDY;
                    self.mode = TransferMode::Idle;
                }
            }
        }
        Ok(word)
    }

    /// Host write of the 16-bit data register during a PIO write command.
    pub fn write_data(&mut self, value: u16) -> Result<(), StorageError> {
        self.sector_buffer[self.cursor] = value;
        self.cursor += 1;
        if self.cursor == 256 {
            let mut raw = [0u8; SECTOR_SIZE];
            for (i, word) in self.sector_buffer.iter().enumerate() {
                let bytes = word.to_le_bytes();
                raw[i * 2] = bytes[0];
                raw[i * 2 + 1] = bytes[1];
            }
            self.backend.write_sectors(self.current_lba, 1, &raw)?;
            self.current_lba += 1;
            self.remaining_sectors = self.remaining_sectors.saturating_sub(1);
            self.cursor = 0;
            if self.remaining_sectors == 0 {
                self.task_file.status = status::DRDY;
                self.mode = TransferMode::Idle;
            } else {
                self.task_file.status = status::DRDY | status::DRQ;
            }
        }
        Ok(())
    }
}

/// Register offsets within the IDE aperture, one 32-bit word per task-file
/// register (the low 16 bits carry the data register's 16-bit value; other
/// registers use the low 8 bits).
mod offset {
    pub const DATA: u32 = 0;
    pub const ERROR_FEATURES: u32 = 4;
    pub const SECTOR_COUNT: u32 = 8;
    pub const LBA_LOW: u32 = 12;
    pub const LBA_MID: u32 = 16;
    pub const LBA_HIGH: u32 = 20;
    pub const DEVICE_HEAD: u32 = 24;
    pub const STATUS_COMMAND: u32 = 28;
}

impl<B: DiskBackend> platform::memory_bus::IdeAperture for AtaController<B> {
    fn read_word(&mut self, offset: u32) -> u32 {
        match offset {
            offset::DATA => self.read_data().unwrap_or(0) as u32,
            offset::ERROR_FEATURES => u32::from(self.task_file.error),
            offset::SECTOR_COUNT => u32::from(self.task_file.sector_count),
            offset::LBA_LOW => u32::from(self.task_file.lba_low),
            offset::LBA_MID => u32::from(self.task_file.lba_mid),
            offset::LBA_HIGH => u32::from(self.task_file.lba_high),
            offset::DEVICE_HEAD => u32::from(self.task_file.device_head),
            offset::STATUS_COMMAND => u32::from(self.task_file.status),
            _ => 0,
        }
    }

    fn write_word(&mut self, offset: u32, value: u32) {
        match offset {
            offset::DATA => {
                let _ = self.write_data(value as u16);
            }
            offset::ERROR_FEATURES => self.task_file.features = value as u8,
            offset::SECTOR_COUNT => self.task_file.sector_count = value as u8,
            offset::LBA_LOW => self.task_file.lba_low = value as u8,
            offset::LBA_MID => self.task_file.lba_mid = value as u8,
            offset::LBA_HIGH => self.task_file.lba_high = value as u8,
            offset::DEVICE_HEAD => self.task_file.device_head = value as u8,
            offset::STATUS_COMMAND => {
                let _ = self.issue_command(value as u8);
            }
            _ => {}
        }
    }

    fn len(&self) -> u32 {
        32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemDisk;

    #[test]
    fn identify_reports_model_and_lba28_count() {
        let disk = MemDisk::new(1000);
        let mut ctrl = AtaController::new(disk);
        let identity = ctrl.identify();
        assert_eq!(identity.0[60], 1000);
        assert_eq!(identity.0[61], 0);
    }

    #[test]
    fn pio_read_cycle_advances_sector_every_256_words() {
        let mut disk = MemDisk::new(4);
        disk.raw_mut()[SECTOR_SIZE] = 0xAB; // sector 1, byte 0
        let mut ctrl = AtaController::new(disk);
        ctrl.task_file.sector_count = 2;
        ctrl.task_file.lba_low = 0;
        ctrl.issue_command(0x20).unwrap();

        for _ in 0..256 {
            ctrl.read_data().unwrap();
        }
        // Now on sector 1; first word's low byte should be 0xAB.
        let word = ctrl.read_data().unwrap();
        assert_eq!(word & 0xFF, 0xAB);
    }

    #[test]
    fn invalid_lba48_zero_count_rejected() {
        let disk = MemDisk::new(10);
        let mut ctrl = AtaController::new(disk);
        let mut buf = [0u8; 0];
        let result = ctrl.read_sectors(1u64 << 30, 0, &mut buf);
        assert_eq!(result, Err(StorageError::InvalidAddressing));
    }

    #[test]
    fn scenario_four_via_public_contract() {
        let mut disk = MemDisk::new(100);
        disk.raw_mut()[10 * SECTOR_SIZE] = 1;
        disk.raw_mut()[11 * SECTOR_SIZE] = 2;
        disk.raw_mut()[12 * SECTOR_SIZE] = 3;
        disk.raw_mut()[13 * SECTOR_SIZE] = 4;
        let mut ctrl = AtaController::new(disk);
        let mut buf = [0u8; SECTOR_SIZE * 4];
        ctrl.read_sectors(10, 4, &mut buf).unwrap();
        assert_eq!(buf[0], 1);
        assert_eq!(buf[512], 2);
        assert_eq!(buf[1024], 3);
        assert_eq!(buf[1536], 4);
    }
}
