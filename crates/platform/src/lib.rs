//! Sim-side peripheral fabric for the ARM7TDMI target.
//!
//! This crate is the L0/L1 layer of the core runtime: the memory bus that
//! maps guest addresses to backing regions, the interrupt controller model,
//! the programmable timer subsystem, and the DMA engine the audio pipeline
//! and ATA engine arm transfers through.
//!
//! # Architecture
//!
//! ```text
//! crates/cpu (fetch/decode/execute)
//!         ↓ reads/writes via
//! MemoryBus (this crate) ──┬── BootRom (read-only)
//!                          ├── Sdram
//!                          ├── Flash (read-protected until unlocked)
//!                          ├── Sram
//!                          ├── PeripheralAperture  (dyn trait: interrupt ctrl, timers)
//!                          └── IdeAperture         (dyn trait: crates/storage)
//! ```
//!
//! On real hardware the interrupt controller and timers are physical
//! registers; this crate models them as plain structs so the same firmware
//! logic exercises identical semantics on the host simulator. See spec
//! §4.5/§4.6 in the design notes for the re-architecture rationale.
//!
//! # Features
//!
//! - `std`: enables a couple of host-only test helpers.
//! - `defmt`: derives `defmt::Format` on public types for target logging.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]

pub mod dma;
pub mod dma_region;
pub mod interrupt;
pub mod memory_bus;
pub mod timer;

pub use dma::{CircularBuffer, DmaBuffer as DmaBufferSlice, DmaChannel, DmaTransfer};
pub use dma_region::{AUDIO_DMA_BUFFER_BYTES, AUDIO_DMA_BUFFER_SAMPLES, CpuOnlyRegion, DmaAccessible, SramRegion};
pub use interrupt::{InterruptController, InterruptSource};
pub use memory_bus::{BusFault, MemoryBus, Width};
pub use timer::{Timer, TimerSystem};
