//! Double-buffered audio pipeline and volume mapping, per spec §4.1.
//!
//! This crate owns the DMA buffer pair exclusively: the decoder and player
//! façade hand it a fill callback, never the buffers themselves.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod pipeline;
pub mod volume;

pub use pipeline::{AudioPipeline, PipelineError, PipelineStats, RunState, BUFFER_LEN};
pub use volume::{apply_gain, gain_linear, VolumePercent};
