//! Architecture tests: DMA buffer placement and audio buffer sizing.

#![allow(clippy::arithmetic_side_effects)]

#[test]
fn dma_accessible_trait_is_exported() {
    use platform::dma_region::{DmaAccessible, SramRegion};
    fn assert_dma_accessible<T: DmaAccessible>() {}
    assert_dma_accessible::<SramRegion>();
    assert_eq!(core::mem::size_of::<SramRegion>(), 0);
}

#[test]
fn cpu_only_region_is_zero_sized_and_unmarked() {
    use platform::dma_region::CpuOnlyRegion;
    assert_eq!(core::mem::size_of::<CpuOnlyRegion>(), 0);
}

#[test]
fn audio_dma_buffer_constants_match_data_model() {
    use platform::dma_region::{AUDIO_DMA_BUFFER_BYTES, AUDIO_DMA_BUFFER_SAMPLES};
    // 2048 frames x 2 channels x 2 bytes (16-bit) = 8192 bytes, ~46ms @ 44.1kHz.
    assert_eq!(AUDIO_DMA_BUFFER_SAMPLES, 2048);
    assert_eq!(AUDIO_DMA_BUFFER_BYTES, AUDIO_DMA_BUFFER_SAMPLES * 2 * 2);
}
