//! Application-facing audio façade, per spec §4.7.

use std::fs;
use std::path::{Path, PathBuf};

use audio::{apply_gain, AudioPipeline, RunState, VolumePercent};
use codecs::{DecodeError, Tags, TrackDecoder, TrackDescriptor};

use crate::error::{ErrorState, PlayerError, Severity};

/// Above this size `load_file` fails with [`PlayerError::FileTooLarge`]
/// rather than buffering the whole track. Chosen well above any track this
/// player's codecs target (multi-minute 44.1 kHz FLAC) while still bounding
/// worst-case memory use.
pub const MAX_TRACK_BYTES: usize = 64 * 1024 * 1024;

/// Number of interleaved `i16` samples pulled from the decoder per fill call.
const FILL_CHUNK: usize = audio::BUFFER_LEN;

/// A track whose bytes are loaded and decoder constructed, per spec §4.7
/// `load_file`'s "selects a decoder by content detection, extracts
/// metadata, constructs the track descriptor" contract.
struct LoadedTrack {
    /// Backing bytes the decoder borrows from. Heap-allocated so the
    /// buffer's address is stable even if `LoadedTrack` itself is moved —
    /// only the `(ptr, len, cap)` triple moves, not the allocation.
    data: std::vec::Vec<u8>,
    decoder: TrackDecoder<'static>,
    tags: Tags,
    descriptor: TrackDescriptor,
    samples_played: u64,
}

impl LoadedTrack {
    fn open(data: std::vec::Vec<u8>) -> Result<Self, PlayerError> {
        let tags = TrackDecoder::tags(&data);
        // SAFETY: `decoder` borrows `data`'s bytes for as long as this
        // struct lives; `data` is stored alongside it and never mutated or
        // reallocated after this point, so the erased `'static` lifetime is
        // valid for the lifetime of `LoadedTrack`. The slice is never handed
        // out past `LoadedTrack`'s own lifetime.
        let borrowed: &'static [u8] = unsafe { core::mem::transmute::<&[u8], &'static [u8]>(data.as_slice()) };
        let decoder = TrackDecoder::open(borrowed)?;
        let descriptor = decoder.track_info();
        Ok(Self { data, decoder, tags, descriptor, samples_played: 0 })
    }
}

/// The application-facing façade: owns the loaded track, the double-buffer
/// pipeline, the current volume, and the process-wide error state.
pub struct PlayerFacade {
    pipeline: AudioPipeline,
    loaded: Option<LoadedTrack>,
    volume: VolumePercent,
    errors: ErrorState,
    playlist: std::vec::Vec<PathBuf>,
    playlist_index: usize,
}

impl PlayerFacade {
    /// A façade with no track loaded and the pipeline uninitialized.
    pub fn new() -> Self {
        let mut pipeline = AudioPipeline::new();
        pipeline.init();
        Self {
            pipeline,
            loaded: None,
            volume: VolumePercent::new(80),
            errors: ErrorState::new(),
            playlist: std::vec::Vec::new(),
            playlist_index: 0,
        }
    }

    /// Read `path`, detect its container, and construct a decoder for it.
    /// Stops any currently playing track first.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), PlayerError> {
        let path = path.as_ref();
        self.pipeline.stop();

        let metadata = fs::metadata(path).map_err(|_| PlayerError::FileNotFound)?;
        if metadata.len() as usize > MAX_TRACK_BYTES {
            return Err(PlayerError::FileTooLarge);
        }
        let bytes = fs::read(path).map_err(|_| PlayerError::FileNotFound)?;
        if codecs::detect_format(&bytes).is_none() {
            return Err(PlayerError::UnsupportedFormat);
        }

        match LoadedTrack::open(bytes) {
            Ok(track) => {
                self.loaded = Some(track);
                Ok(())
            }
            Err(err) => {
                self.errors.record(Severity::Significant);
                Err(err)
            }
        }
    }

    /// Replace the playlist and load its first entry, if any.
    pub fn load_playlist(&mut self, paths: std::vec::Vec<PathBuf>) -> Result<(), PlayerError> {
        self.playlist = paths;
        self.playlist_index = 0;
        match self.playlist.first().cloned() {
            Some(first) => self.load_file(first),
            None => Ok(()),
        }
    }

    /// Start (or resume) playback of the loaded track's fill callback.
    pub fn play(&mut self) -> Result<(), PlayerError> {
        if self.loaded.is_none() {
            return Err(PlayerError::NotInitialized);
        }
        let volume = self.volume;
        let loaded = self.loaded.as_mut().expect("checked above");
        let decoder = &mut loaded.decoder;
        let samples_played = &mut loaded.samples_played;
        self.pipeline
            .start(|out: &mut [i16]| fill_from_decoder(decoder, volume, samples_played, out))
            .map_err(|_| PlayerError::NotInitialized)
    }

    /// Pause playback; the next two drains produce silence, per spec §5's
    /// "no later than the completion of the currently draining buffer".
    pub fn pause(&mut self) {
        self.pipeline.pause();
    }

    /// Resume a paused pipeline; no-op if not paused.
    pub fn unpause(&mut self) {
        self.pipeline.unpause();
    }

    /// Pause if running, resume if paused; no-op otherwise.
    pub fn toggle_pause(&mut self) {
        match self.pipeline.state() {
            RunState::Running => self.pause(),
            RunState::Paused => self.unpause(),
            RunState::Stopped | RunState::Uninitialized => {}
        }
    }

    /// Abort playback and return the pipeline to `Stopped`.
    pub fn stop(&mut self) {
        self.pipeline.stop();
    }

    /// Seek the loaded track to `ms` milliseconds from the start.
    /// Best-effort per spec §5: decoders without a seek table re-decode
    /// from the stream start.
    pub fn seek(&mut self, ms: u64) -> Result<(), PlayerError> {
        let loaded = self.loaded.as_mut().ok_or(PlayerError::NotInitialized)?;
        let frame_index = ms.saturating_mul(u64::from(loaded.descriptor.sample_rate)) / 1000;
        loaded.decoder.seek(frame_index);
        Ok(())
    }

    /// Load and play the next playlist entry, if any.
    pub fn next_track(&mut self) -> Result<(), PlayerError> {
        if self.playlist.is_empty() || self.playlist_index.saturating_add(1) >= self.playlist.len() {
            return Err(PlayerError::LoadFailed);
        }
        self.playlist_index = self.playlist_index.saturating_add(1);
        let path = self.playlist[self.playlist_index].clone();
        self.load_file(path)?;
        self.play()
    }

    /// Load and play the previous playlist entry, if any.
    pub fn prev_track(&mut self) -> Result<(), PlayerError> {
        if self.playlist.is_empty() || self.playlist_index == 0 {
            return Err(PlayerError::LoadFailed);
        }
        self.playlist_index = self.playlist_index.saturating_sub(1);
        let path = self.playlist[self.playlist_index].clone();
        self.load_file(path)?;
        self.play()
    }

    /// Set the 0-100 user-facing volume (spec §3 "Playback state"'s linear
    /// volume control; spec §4.7 names the parameter `db`, but the mapping
    /// to a decibel taper happens inside `audio::volume`, not at this call
    /// site — see DESIGN.md's Open Questions).
    pub fn set_volume(&mut self, percent: u8) {
        self.volume = VolumePercent::new(percent);
    }

    /// `true` if a track is currently loaded.
    pub fn has_loaded_track(&self) -> bool {
        self.loaded.is_some()
    }

    /// The loaded track's descriptor and tags, if any.
    pub fn get_loaded_track_info(&self) -> Option<(TrackDescriptor, &Tags)> {
        self.loaded.as_ref().map(|t| (t.descriptor, &t.tags))
    }

    /// Total samples delivered to the pipeline for the loaded track.
    pub fn samples_played(&self) -> u64 {
        self.loaded.as_ref().map_or(0, |t| t.samples_played)
    }

    /// Underrun/arm-failure diagnostics from the pipeline.
    pub fn stats(&self) -> audio::PipelineStats {
        self.pipeline.stats()
    }

    /// The façade's process-wide error severity.
    pub fn error_severity(&self) -> Severity {
        self.errors.highest()
    }

    /// Clear the recorded error severity back to `None`.
    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// Main-loop pump: refill dirty buffers from the loaded decoder.
    pub fn process(&mut self) {
        let Some(loaded) = self.loaded.as_mut() else { return };
        let volume = self.volume;
        let decoder = &mut loaded.decoder;
        let samples_played = &mut loaded.samples_played;
        self.pipeline.process(|out: &mut [i16]| fill_from_decoder(decoder, volume, samples_played, out));
    }
}

impl Default for PlayerFacade {
    fn default() -> Self {
        Self::new()
    }
}

fn fill_from_decoder(
    decoder: &mut TrackDecoder<'_>,
    volume: VolumePercent,
    samples_played: &mut u64,
    out: &mut [i16],
) -> usize {
    let mut total = 0usize;
    while total < out.len() {
        let chunk_len = (out.len() - total).min(FILL_CHUNK);
        let Some(slice) = out.get_mut(total..total + chunk_len) else { break };
        let written = match decoder.decode(slice) {
            Ok(written) => written,
            Err(DecodeError::UnsupportedEncoding) => 0,
            Err(_) => 0,
        };
        if written == 0 {
            break;
        }
        total = total.saturating_add(written);
        if decoder.is_eof() {
            break;
        }
    }
    if let Some(filled) = out.get_mut(..total) {
        apply_gain(filled, volume);
    }
    *samples_played = samples_played.saturating_add(total as u64);
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_wav(dir: &tempfile::TempDir, samples: &[i16]) -> PathBuf {
        let path = dir.path().join("clip.wav");
        let mut file = fs::File::create(&path).unwrap();
        let data_bytes = samples.len() * 2;
        let riff_size = 36 + data_bytes;
        file.write_all(b"RIFF").unwrap();
        file.write_all(&(riff_size as u32).to_le_bytes()).unwrap();
        file.write_all(b"WAVEfmt ").unwrap();
        file.write_all(&16u32.to_le_bytes()).unwrap();
        file.write_all(&1u16.to_le_bytes()).unwrap(); // PCM
        file.write_all(&1u16.to_le_bytes()).unwrap(); // mono
        file.write_all(&44100u32.to_le_bytes()).unwrap();
        file.write_all(&(44100u32 * 2).to_le_bytes()).unwrap();
        file.write_all(&2u16.to_le_bytes()).unwrap();
        file.write_all(&16u16.to_le_bytes()).unwrap();
        file.write_all(b"data").unwrap();
        file.write_all(&(data_bytes as u32).to_le_bytes()).unwrap();
        for sample in samples {
            file.write_all(&sample.to_le_bytes()).unwrap();
        }
        path
    }

    #[test]
    fn load_file_rejects_missing_path() {
        let mut player = PlayerFacade::new();
        assert_eq!(player.load_file("/nonexistent/path.wav"), Err(PlayerError::FileNotFound));
    }

    #[test]
    fn play_without_load_reports_not_initialized() {
        let mut player = PlayerFacade::new();
        assert_eq!(player.play(), Err(PlayerError::NotInitialized));
    }

    #[test]
    fn load_then_play_populates_track_info_and_runs() {
        let dir = tempfile::tempdir().unwrap();
        let samples = [0i16; 4096];
        let path = write_wav(&dir, &samples);

        let mut player = PlayerFacade::new();
        player.load_file(&path).unwrap();
        assert!(player.has_loaded_track());
        let (descriptor, _) = player.get_loaded_track_info().unwrap();
        assert_eq!(descriptor.sample_rate, 44100);

        player.play().unwrap();
        for _ in 0..4 {
            player.process();
        }
        assert_eq!(player.stats().fill_underruns, 0);
    }

    #[test]
    fn load_file_extracts_trailing_id3v1_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(&dir, &[0i16; 128]);

        let mut tag = vec![0u8; 128];
        tag[0..3].copy_from_slice(b"TAG");
        tag[3..3 + "Test Title".len()].copy_from_slice(b"Test Title");
        tag[33..33 + "Test Artist".len()].copy_from_slice(b"Test Artist");
        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&tag).unwrap();

        let mut player = PlayerFacade::new();
        player.load_file(&path).unwrap();
        let (_, tags) = player.get_loaded_track_info().unwrap();
        assert_eq!(tags.title.as_deref(), Some("Test Title"));
        assert_eq!(tags.artist.as_deref(), Some("Test Artist"));
    }

    #[test]
    fn toggle_pause_flips_running_and_paused() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(&dir, &[0i16; 128]);
        let mut player = PlayerFacade::new();
        player.load_file(&path).unwrap();
        player.play().unwrap();
        player.toggle_pause();
        player.toggle_pause();
    }
}
