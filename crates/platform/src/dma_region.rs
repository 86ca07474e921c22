//! DMA-accessibility marker traits and audio buffer sizing constants.
//!
//! ## Memory regions
//!
//! | Type | Trait | Description |
//! |------|-------|-------------|
//! | [`SramRegion`] | `DmaAccessible` | Internal SRAM reachable by the DMA engine — audio ping-pong buffers live here |
//! | [`CpuOnlyRegion`] | *(none)* | CPU-local scratch; the DMA engine cannot read or write it |
//!
//! The type parameter on [`DmaBuffer`] makes the CPU-only/DMA-accessible
//! distinction a compile error rather than a silent hardware bug: handing a
//! `CpuOnlyRegion` buffer to [`crate::dma::DmaChannel::start`] simply does not
//! type-check.
//!
//! ## Audio buffer sizing
//!
//! 2048 interleaved stereo frames at 16 bits/sample ≈ 46 ms of audio at
//! 44.1 kHz, matching the double-buffer pair described in the data model.

/// Number of stereo frames per audio DMA half-buffer.
pub const AUDIO_DMA_BUFFER_SAMPLES: usize = 2048;

const BYTES_PER_FRAME: usize = 2 /* channels */ * 2 /* bytes per i16 sample */;

/// Audio DMA half-buffer size in bytes (2048 frames × 2ch × 2 bytes/sample).
pub const AUDIO_DMA_BUFFER_BYTES: usize = AUDIO_DMA_BUFFER_SAMPLES * BYTES_PER_FRAME;

const _: () = assert!(
    AUDIO_DMA_BUFFER_BYTES == 8192,
    "AUDIO_DMA_BUFFER_BYTES must be 8192 (2048 frames x 2ch x 2 bytes/16-bit sample)"
);

/// Marker trait: memory region the DMA engine can read from or write to.
///
/// # Safety
///
/// Only implement for zero-sized types that represent a region the DMA
/// controller can physically address. Implementing this for CPU-local
/// scratch memory causes the DMA engine to silently transfer garbage.
pub unsafe trait DmaAccessible: Sized {}

/// Internal SRAM — the region audio ping-pong buffers and ATA sector buffers
/// must live in.
#[derive(Debug, Clone, Copy)]
pub struct SramRegion;

// SAFETY: SRAM is on the bus segment the DMA engine arbitrates for; the sim
// memory map (crates/platform::memory_bus) places it at a fixed, DMA-visible
// offset for the lifetime of the process.
unsafe impl DmaAccessible for SramRegion {}

/// CPU-only scratch memory; never hand a buffer of this region to the DMA engine.
#[derive(Debug, Clone, Copy)]
pub struct CpuOnlyRegion;
// CpuOnlyRegion intentionally does not implement DmaAccessible.

/// A DMA-accessible buffer with compile-time region enforcement.
pub struct DmaBuffer<Region: DmaAccessible, T> {
    /// The wrapped storage.
    pub data: T,
    _region: core::marker::PhantomData<Region>,
}

impl<Region: DmaAccessible, T> DmaBuffer<Region, T> {
    /// Wrap `data` as belonging to `Region`.
    pub const fn new(data: T) -> Self {
        Self {
            data,
            _region: core::marker::PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_buffer_bytes_matches_documented_size() {
        assert_eq!(AUDIO_DMA_BUFFER_BYTES, 8192);
    }

    #[test]
    fn sram_region_is_dma_accessible() {
        fn assert_dma<T: DmaAccessible>() {}
        assert_dma::<SramRegion>();
    }

    #[test]
    fn cpu_only_region_is_not_dma_accessible() {
        let src = include_str!("dma_region.rs");
        let violating = src.lines().any(|line| {
            let trimmed = line.trim();
            trimmed.starts_with("unsafe impl DmaAccessible for") && trimmed.contains("CpuOnlyRegion")
        });
        assert!(!violating, "CpuOnlyRegion must not implement DmaAccessible");
    }
}
