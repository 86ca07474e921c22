//! ATA task-file block-storage engine: the register-level state machine a
//! real PIO/DMA controller exposes, driving a pluggable sector-addressed
//! disk-image backend.
//!
//! See spec §4.3. The public contract ([`controller::AtaController::read_sectors`]
//! and friends) is the surface the application-facing façade and test suite
//! use; [`controller::AtaController::issue_command`]/`read_data`/`write_data`
//! model the register-level PIO cycle for the CPU emulator's IDE aperture.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]

pub mod backend;
pub mod controller;
pub mod taskfile;

pub use backend::{BackendError, DiskBackend, MemDisk, MAX_TRANSFER_SECTORS, SECTOR_SIZE};
pub use controller::{AtaController, IdentityBlock, StorageError, TransferMode};
pub use taskfile::{Command, TaskFile};
