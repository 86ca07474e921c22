//! Double-buffered audio pipeline, per spec §4.1.
//!
//! Two equally sized DMA-accessible buffers ping-pong between "active"
//! (being drained by the audio DMA channel) and "shadow" (refillable by the
//! main loop). `fill_fn` is a typed, owning closure rather than a raw
//! function pointer with opaque context, per the re-architecture note in
//! spec §9.

use platform::dma_region::{DmaBuffer, SramRegion, AUDIO_DMA_BUFFER_SAMPLES};
use platform::{InterruptController, InterruptSource};

/// Interleaved stereo samples per half-buffer (frames × 2 channels).
pub const BUFFER_LEN: usize = AUDIO_DMA_BUFFER_SAMPLES * 2;

struct BufferSlot {
    samples: DmaBuffer<SramRegion, [i16; BUFFER_LEN]>,
    dirty: bool,
}

impl BufferSlot {
    const fn new() -> Self {
        Self { samples: DmaBuffer::new([0i16; BUFFER_LEN]), dirty: false }
    }
}

/// Underrun diagnostics, split per spec §9's suggestion that a zero-fill
/// underrun and a DMA-arm failure are distinct conditions worth separate
/// counters rather than one shared one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Number of times `process` zero-filled the remainder of a buffer
    /// because `fill_fn` returned fewer samples than requested.
    pub fill_underruns: u32,
    /// Number of times `on_dma_complete` failed to arm the next transfer
    /// and had to stop the pipeline.
    pub arm_failures: u32,
}

/// Pipeline run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// `init` has not yet been called.
    Uninitialized,
    /// Initialized but not started.
    Stopped,
    /// Draining buffers via DMA and refilling via `fill_fn`.
    Running,
    /// Draining buffers via DMA, but refills produce silence.
    Paused,
}

/// The double-buffer audio pipeline.
///
/// The fill callback is passed to `start`/`process` on each call rather
/// than stored: the main loop always has its decoder/volume state in hand
/// when it pumps the pipeline, and taking the closure per-call (instead of
/// capturing it once, which would tie the pipeline's lifetime to whatever
/// borrowed the decoder) lets the façade hold the pipeline and the decoder
/// as plain sibling fields with no self-borrow.
pub struct AudioPipeline {
    buffers: [BufferSlot; 2],
    active_index: usize,
    state: RunState,
    stats: PipelineStats,
    /// Test/fault-injection hook: when `true`, the next `on_dma_complete`
    /// fails to arm its transfer instead of succeeding.
    force_arm_failure: bool,
}

impl AudioPipeline {
    /// Construct a pipeline in the uninitialized state.
    pub const fn new() -> Self {
        Self {
            buffers: [BufferSlot::new(), BufferSlot::new()],
            active_index: 0,
            state: RunState::Uninitialized,
            stats: PipelineStats { fill_underruns: 0, arm_failures: 0 },
            force_arm_failure: false,
        }
    }

    /// Allocate/zero both buffers and move to the stopped state. Routing
    /// the DMA/I2S sources to the fast-interrupt path is the caller's
    /// responsibility (the interrupt controller is owned by the platform
    /// crate, not this one); this call only resets buffer state.
    pub fn init(&mut self) {
        for buf in &mut self.buffers {
            buf.samples.data = [0i16; BUFFER_LEN];
            buf.dirty = false;
        }
        self.active_index = 0;
        self.stats = PipelineStats::default();
        self.state = RunState::Stopped;
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Underrun/arm-failure counters.
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    #[cfg(any(test, feature = "std"))]
    /// Force the next `on_dma_complete` call to fail arming its transfer.
    /// Test-only fault injection; there is no hardware path that lets the
    /// caller observe or control this directly.
    pub fn inject_arm_failure(&mut self) {
        self.force_arm_failure = true;
    }

    /// Pre-fill both buffers and arm the first transfer. A no-op (not an
    /// error) if already running.
    pub fn start(&mut self, mut fill_fn: impl FnMut(&mut [i16]) -> usize) -> Result<(), PipelineError> {
        if self.state == RunState::Running {
            return Ok(());
        }
        if self.state == RunState::Uninitialized {
            return Err(PipelineError::NotInitialized);
        }
        for buf in &mut self.buffers {
            let written = fill_fn(&mut buf.samples.data);
            if written < BUFFER_LEN {
                buf.samples.data[written..].fill(0);
            }
            buf.dirty = false;
        }
        self.active_index = 0;
        self.state = RunState::Running;
        Ok(())
    }

    /// Abort the DMA channel (conceptually — this crate has no real DMA
    /// register to disarm, the caller's platform glue does that), clear
    /// both buffers to silence, and stop.
    pub fn stop(&mut self) {
        for buf in &mut self.buffers {
            buf.samples.data = [0i16; BUFFER_LEN];
            buf.dirty = false;
        }
        self.state = RunState::Stopped;
    }

    /// Pause: the DMA keeps draining buffers, but subsequent refills
    /// produce silence regardless of the callback, guaranteeing a
    /// click-free resume.
    pub fn pause(&mut self) {
        if self.state == RunState::Running {
            self.state = RunState::Paused;
        }
    }

    /// Resume normal refilling.
    pub fn unpause(&mut self) {
        if self.state == RunState::Paused {
            self.state = RunState::Running;
        }
    }

    /// Main-loop tick: refill every dirty buffer via `fill_fn`.
    pub fn process(&mut self, mut fill_fn: impl FnMut(&mut [i16]) -> usize) {
        if self.state != RunState::Running && self.state != RunState::Paused {
            return;
        }
        let paused = self.state == RunState::Paused;
        for buf in &mut self.buffers {
            if !buf.dirty {
                continue;
            }
            buf.dirty = false;
            if paused {
                buf.samples.data.fill(0);
                continue;
            }
            let written = fill_fn(&mut buf.samples.data);
            if written < BUFFER_LEN {
                buf.samples.data[written..].fill(0);
                self.stats.fill_underruns = self.stats.fill_underruns.saturating_add(1);
            }
        }
    }

    /// Fast-interrupt entry point: acknowledge the source, mark the
    /// completed buffer dirty, advance the active index, and arm the next
    /// transfer. Returns `false` (and stops the pipeline) if arming fails.
    pub fn on_dma_complete(&mut self, irq: &mut InterruptController, source: InterruptSource) -> bool {
        irq.clear(source);
        let completed = self.active_index;
        self.buffers[completed].dirty = true;
        self.active_index = (self.active_index + 1) % self.buffers.len();

        if self.force_arm_failure {
            self.force_arm_failure = false;
            self.stats.arm_failures = self.stats.arm_failures.saturating_add(1);
            self.stop();
            return false;
        }
        true
    }

    /// The buffer currently (conceptually) being drained by DMA — exposed
    /// for tests asserting the double-buffer safety invariant.
    pub fn active_buffer_index(&self) -> usize {
        self.active_index
    }

    /// `true` if the buffer at `index` is marked dirty (owed a refill).
    pub fn is_dirty(&self, index: usize) -> bool {
        self.buffers[index].dirty
    }
}

impl Default for AudioPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors `start` can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
pub enum PipelineError {
    /// `start` was called before `init`.
    #[error("audio pipeline not initialized")]
    NotInitialized,
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::InterruptSource;

    fn silence_source(out: &mut [i16]) -> usize {
        out.fill(0);
        out.len()
    }

    #[test]
    fn start_requires_init() {
        let mut pipeline = AudioPipeline::new();
        assert_eq!(pipeline.start(silence_source), Err(PipelineError::NotInitialized));
    }

    #[test]
    fn start_is_idempotent_while_running() {
        let mut pipeline = AudioPipeline::new();
        pipeline.init();
        pipeline.start(silence_source).unwrap();
        assert_eq!(pipeline.start(silence_source), Ok(()));
    }

    #[test]
    fn double_buffer_safety_active_never_equals_refill_target() {
        let mut pipeline = AudioPipeline::new();
        pipeline.init();
        pipeline.start(silence_source).unwrap();
        let mut irq = InterruptController::new();

        for _ in 0..8 {
            let before_active = pipeline.active_buffer_index();
            pipeline.on_dma_complete(&mut irq, InterruptSource::primary(5));
            let completed = before_active;
            // The just-completed buffer is dirty and must not be the new active one.
            assert_ne!(pipeline.active_buffer_index(), completed);
            pipeline.process(silence_source);
            assert!(!pipeline.is_dirty(completed));
        }
    }

    #[test]
    fn pause_zero_fills_without_invoking_callback() {
        let mut pipeline = AudioPipeline::new();
        pipeline.init();
        let mut calls = 0u32;
        pipeline
            .start(|out: &mut [i16]| {
                out.fill(42);
                out.len()
            })
            .unwrap();
        pipeline.pause();
        let mut irq = InterruptController::new();
        pipeline.on_dma_complete(&mut irq, InterruptSource::primary(5));
        pipeline.process(|out: &mut [i16]| {
            calls += 1;
            out.fill(42);
            out.len()
        });
        assert_eq!(calls, 0);
    }

    #[test]
    fn short_fill_zero_pads_and_counts_underrun() {
        let mut pipeline = AudioPipeline::new();
        pipeline.init();
        pipeline
            .start(|out: &mut [i16]| {
                out[0] = 7;
                1
            })
            .unwrap();
        let mut irq = InterruptController::new();
        pipeline.on_dma_complete(&mut irq, InterruptSource::primary(5));
        pipeline.process(|out: &mut [i16]| {
            out[0] = 7;
            1
        });
        assert_eq!(pipeline.stats().fill_underruns, 1);
    }

    #[test]
    fn arm_failure_stops_pipeline_and_counts_separately_from_underruns() {
        let mut pipeline = AudioPipeline::new();
        pipeline.init();
        pipeline.start(silence_source).unwrap();
        pipeline.inject_arm_failure();
        let mut irq = InterruptController::new();
        let armed = pipeline.on_dma_complete(&mut irq, InterruptSource::primary(5));
        assert!(!armed);
        assert_eq!(pipeline.stats().arm_failures, 1);
        assert_eq!(pipeline.stats().fill_underruns, 0);
        assert_eq!(pipeline.state(), RunState::Stopped);
    }
}
