//! Content-detection format dispatch, per spec §4.2 "Format dispatch".

/// A decoder's immutable per-track descriptor (spec §3 "Track descriptor").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackDescriptor {
    /// Samples per second.
    pub sample_rate: u32,
    /// 1-8 for lossless, 1-2 elsewhere.
    pub channels: u8,
    /// Bit depth of the source encoding.
    pub bits_per_sample: u8,
    /// Total sample frames, or 0 if unknown.
    pub total_frames: u64,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    /// Which container/codec produced this descriptor.
    pub format: AudioFormat,
}

/// The container/codec a decoder was constructed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// Lossless subband ("fLaC").
    Flac,
    /// Lossy layered transform (MPEG Layer III).
    Mp3,
    /// Uncompressed little-endian chunked ("RIFF...WAVE").
    Wav,
    /// Uncompressed big-endian chunked ("FORM...AIFF").
    Aiff,
}

/// Inspect the leading bytes of a stream and identify its container, per
/// the magic-byte table in spec §4.2. Returns `None` on no match.
pub fn detect_format(header: &[u8]) -> Option<AudioFormat> {
    if header.len() >= 4 && &header[0..4] == b"fLaC" {
        return Some(AudioFormat::Flac);
    }
    if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WAVE" {
        return Some(AudioFormat::Wav);
    }
    if header.len() >= 12 && &header[0..4] == b"FORM" && &header[8..12] == b"AIFF" {
        return Some(AudioFormat::Aiff);
    }
    if header.len() >= 3 && &header[0..3] == b"ID3" {
        return Some(AudioFormat::Mp3);
    }
    if header.len() >= 2 && header[0] == 0xFF && (header[1] & 0xE0) == 0xE0 {
        return Some(AudioFormat::Mp3);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_flac() {
        assert_eq!(detect_format(b"fLaC\x00\x00"), Some(AudioFormat::Flac));
    }

    #[test]
    fn detects_wav() {
        let mut header = vec![0u8; 12];
        header[0..4].copy_from_slice(b"RIFF");
        header[8..12].copy_from_slice(b"WAVE");
        assert_eq!(detect_format(&header), Some(AudioFormat::Wav));
    }

    #[test]
    fn detects_aiff() {
        let mut header = vec![0u8; 12];
        header[0..4].copy_from_slice(b"FORM");
        header[8..12].copy_from_slice(b"AIFF");
        assert_eq!(detect_format(&header), Some(AudioFormat::Aiff));
    }

    #[test]
    fn detects_mp3_via_id3_tag() {
        assert_eq!(detect_format(b"ID3\x04\x00"), Some(AudioFormat::Mp3));
    }

    #[test]
    fn detects_mp3_via_raw_sync() {
        assert_eq!(detect_format(&[0xFF, 0xFB, 0x90, 0x00]), Some(AudioFormat::Mp3));
    }

    #[test]
    fn unknown_header_returns_none() {
        assert_eq!(detect_format(b"\x00\x00\x00\x00"), None);
    }
}
