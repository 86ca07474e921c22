//! The disk-image producer/consumer a [`crate::controller::AtaController`]
//! drives, per spec §6 "Disk-image backend".

/// Fixed ATA sector size in bytes.
pub const SECTOR_SIZE: usize = 512;

/// Maximum sectors in a single PIO/DMA transfer (one byte count field).
pub const MAX_TRANSFER_SECTORS: u32 = 256;

/// Errors a backend can surface from a sector operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
pub enum BackendError {
    /// The requested LBA/count range exceeds the backing store.
    #[error("out of range")]
    OutOfRange,
    /// The backend is read-only and a write was attempted.
    #[error("read-only")]
    ReadOnly,
    /// The underlying I/O operation failed (file backend only).
    #[error("i/o error")]
    Io,
}

/// A sector-addressed disk image. Sector size is fixed at
/// [`SECTOR_SIZE`]; `out`/`data` slices are sized `count * SECTOR_SIZE`.
pub trait DiskBackend {
    /// Total sectors addressable on this image.
    fn total_sectors(&self) -> u64;
    /// `true` if writes must be rejected.
    fn is_readonly(&self) -> bool;
    /// Drive identity strings, ATA byte-swapped by the caller.
    fn serial(&self) -> &str;
    fn model(&self) -> &str;
    fn firmware(&self) -> &str;

    /// Read `count` sectors starting at `lba` into `out`.
    fn read_sectors(&mut self, lba: u64, count: u32, out: &mut [u8]) -> Result<(), BackendError>;
    /// Write `count` sectors starting at `lba` from `data`.
    fn write_sectors(&mut self, lba: u64, count: u32, data: &[u8]) -> Result<(), BackendError>;
    /// Flush any buffered writes to durable storage. A no-op for pure
    /// in-memory backings.
    fn flush(&mut self) -> Result<(), BackendError>;
}

/// An in-memory disk image, used by tests and the host simulator's
/// "no real file given" mode.
pub struct MemDisk {
    data: heapless::Vec<u8, { SECTOR_SIZE * 4096 }>,
    sectors: u64,
    readonly: bool,
}

impl MemDisk {
    /// Construct a zero-filled image of `sectors` sectors. `sectors` is
    /// capped at the backing `Vec`'s fixed capacity (4096 sectors, 2 MiB).
    pub fn new(sectors: u64) -> Self {
        let capacity_sectors = (MemDisk::capacity_bytes() / SECTOR_SIZE) as u64;
        let sectors = sectors.min(capacity_sectors);
        let mut data = heapless::Vec::new();
        data.resize((sectors as usize) * SECTOR_SIZE, 0).ok();
        Self { data, sectors, readonly: false }
    }

    const fn capacity_bytes() -> usize {
        SECTOR_SIZE * 4096
    }

    /// Mark the image read-only.
    pub fn set_readonly(&mut self, readonly: bool) {
        self.readonly = readonly;
    }

    /// Mutable access to the raw backing bytes, for test fixtures that seed
    /// specific sector contents (spec §8 scenario 4).
    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl DiskBackend for MemDisk {
    fn total_sectors(&self) -> u64 {
        self.sectors
    }

    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn serial(&self) -> &str {
        "SIMDISK0000000000000"
    }

    fn model(&self) -> &str {
        "CORE-SIM VIRTUAL DISK"
    }

    fn firmware(&self) -> &str {
        "1.0"
    }

    fn read_sectors(&mut self, lba: u64, count: u32, out: &mut [u8]) -> Result<(), BackendError> {
        let end = lba.checked_add(u64::from(count)).ok_or(BackendError::OutOfRange)?;
        if end > self.sectors || out.len() < (count as usize) * SECTOR_SIZE {
            return Err(BackendError::OutOfRange);
        }
        let start = (lba as usize) * SECTOR_SIZE;
        let len = (count as usize) * SECTOR_SIZE;
        out[..len].copy_from_slice(&self.data[start..start + len]);
        Ok(())
    }

    fn write_sectors(&mut self, lba: u64, count: u32, data: &[u8]) -> Result<(), BackendError> {
        if self.readonly {
            return Err(BackendError::ReadOnly);
        }
        let end = lba.checked_add(u64::from(count)).ok_or(BackendError::OutOfRange)?;
        if end > self.sectors || data.len() < (count as usize) * SECTOR_SIZE {
            return Err(BackendError::OutOfRange);
        }
        let start = (lba as usize) * SECTOR_SIZE;
        let len = (count as usize) * SECTOR_SIZE;
        self.data[start..start + len].copy_from_slice(&data[..len]);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(feature = "std")]
pub use file::FileDisk;

#[cfg(feature = "std")]
mod file {
    use super::{BackendError, DiskBackend, SECTOR_SIZE};
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom, Write};

    /// A disk image backed by a real file, for the host simulator.
    pub struct FileDisk {
        file: File,
        sectors: u64,
        readonly: bool,
    }

    impl FileDisk {
        /// Open `path`, inferring sector count from file length.
        pub fn open(path: &std::path::Path, readonly: bool) -> std::io::Result<Self> {
            let file = std::fs::OpenOptions::new().read(true).write(!readonly).open(path)?;
            let len = file.metadata()?.len();
            Ok(Self { file, sectors: len / SECTOR_SIZE as u64, readonly })
        }
    }

    impl DiskBackend for FileDisk {
        fn total_sectors(&self) -> u64 {
            self.sectors
        }
        fn is_readonly(&self) -> bool {
            self.readonly
        }
        fn serial(&self) -> &str {
            "FILEDISK000000000000"
        }
        fn model(&self) -> &str {
            "CORE-SIM FILE-BACKED DISK"
        }
        fn firmware(&self) -> &str {
            "1.0"
        }

        fn read_sectors(&mut self, lba: u64, count: u32, out: &mut [u8]) -> Result<(), BackendError> {
            self.file.seek(SeekFrom::Start(lba * SECTOR_SIZE as u64)).map_err(|_| BackendError::Io)?;
            self.file
                .read_exact(&mut out[..(count as usize) * SECTOR_SIZE])
                .map_err(|_| BackendError::Io)
        }

        fn write_sectors(&mut self, lba: u64, count: u32, data: &[u8]) -> Result<(), BackendError> {
            if self.readonly {
                return Err(BackendError::ReadOnly);
            }
            self.file.seek(SeekFrom::Start(lba * SECTOR_SIZE as u64)).map_err(|_| BackendError::Io)?;
            self.file
                .write_all(&data[..(count as usize) * SECTOR_SIZE])
                .map_err(|_| BackendError::Io)
        }

        fn flush(&mut self) -> Result<(), BackendError> {
            self.file.sync_all().map_err(|_| BackendError::Io)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_four_ata_four_sector_read() {
        let mut disk = MemDisk::new(100);
        disk.raw_mut()[10 * SECTOR_SIZE] = 1;
        disk.raw_mut()[11 * SECTOR_SIZE] = 2;
        disk.raw_mut()[12 * SECTOR_SIZE] = 3;
        disk.raw_mut()[13 * SECTOR_SIZE] = 4;
        let mut buf = [0u8; SECTOR_SIZE * 4];
        disk.read_sectors(10, 4, &mut buf).unwrap();
        assert_eq!(buf[0], 1);
        assert_eq!(buf[512], 2);
        assert_eq!(buf[1024], 3);
        assert_eq!(buf[1536], 4);
    }

    #[test]
    fn write_rejected_on_readonly_image() {
        let mut disk = MemDisk::new(10);
        disk.set_readonly(true);
        let data = [0u8; SECTOR_SIZE];
        assert_eq!(disk.write_sectors(0, 1, &data), Err(BackendError::ReadOnly));
    }

    #[test]
    fn out_of_range_read_rejected() {
        let mut disk = MemDisk::new(10);
        let mut buf = [0u8; SECTOR_SIZE];
        assert_eq!(disk.read_sectors(9, 2, &mut buf), Err(BackendError::OutOfRange));
    }
}
