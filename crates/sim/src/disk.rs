//! Runtime-chosen disk backend: an in-memory image when no `--disk-image`
//! path is given, a file-backed image otherwise. `storage::AtaController`
//! is generic over `DiskBackend`, so this enum picks one concrete type for
//! the lifetime of the process.

use storage::backend::{BackendError, DiskBackend, FileDisk, MemDisk};

/// Dispatches to whichever disk backend this run was configured with.
pub enum SimDisk {
    Memory(MemDisk),
    File(FileDisk),
}

impl DiskBackend for SimDisk {
    fn total_sectors(&self) -> u64 {
        match self {
            Self::Memory(d) => d.total_sectors(),
            Self::File(d) => d.total_sectors(),
        }
    }

    fn is_readonly(&self) -> bool {
        match self {
            Self::Memory(d) => d.is_readonly(),
            Self::File(d) => d.is_readonly(),
        }
    }

    fn serial(&self) -> &str {
        match self {
            Self::Memory(d) => d.serial(),
            Self::File(d) => d.serial(),
        }
    }

    fn model(&self) -> &str {
        match self {
            Self::Memory(d) => d.model(),
            Self::File(d) => d.model(),
        }
    }

    fn firmware(&self) -> &str {
        match self {
            Self::Memory(d) => d.firmware(),
            Self::File(d) => d.firmware(),
        }
    }

    fn read_sectors(&mut self, lba: u64, count: u32, out: &mut [u8]) -> Result<(), BackendError> {
        match self {
            Self::Memory(d) => d.read_sectors(lba, count, out),
            Self::File(d) => d.read_sectors(lba, count, out),
        }
    }

    fn write_sectors(&mut self, lba: u64, count: u32, data: &[u8]) -> Result<(), BackendError> {
        match self {
            Self::Memory(d) => d.write_sectors(lba, count, data),
            Self::File(d) => d.write_sectors(lba, count, data),
        }
    }

    fn flush(&mut self) -> Result<(), BackendError> {
        match self {
            Self::Memory(d) => d.flush(),
            Self::File(d) => d.flush(),
        }
    }
}
