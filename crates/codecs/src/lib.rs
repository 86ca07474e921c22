//! Format detection, stream decoding, and tag extraction for the four
//! container/codec combinations spec §4.2 names: FLAC, MP3, WAV, and AIFF.

#![cfg_attr(not(test), no_std)]

pub mod aiff;
pub mod bitreader;
pub mod error;
pub mod flac;
pub mod format;
pub mod metadata;
pub mod mp3;
pub mod wav;

pub use error::DecodeError;
pub use format::{detect_format, AudioFormat, TrackDescriptor};
pub use metadata::Tags;

/// A decoder for one of the supported containers, dispatched once at
/// `open` time and driven uniformly afterward. Mirrors spec §4.2's
/// `open`/`track_info`/`decode`/`seek`/`is_eof` operational contract.
pub enum TrackDecoder<'a> {
    Flac(flac::FlacDecoder<'a>),
    Mp3(mp3::Mp3Decoder<'a>),
    Wav(wav::WavDecoder<'a>),
    Aiff(aiff::AiffDecoder<'a>),
}

impl<'a> TrackDecoder<'a> {
    /// Detect the container from the leading bytes and construct the
    /// matching decoder.
    pub fn open(data: &'a [u8]) -> Result<Self, DecodeError> {
        match detect_format(data).ok_or(DecodeError::UnrecognizedContainer)? {
            AudioFormat::Flac => Ok(Self::Flac(flac::FlacDecoder::open(data)?)),
            AudioFormat::Mp3 => Ok(Self::Mp3(mp3::Mp3Decoder::open(data)?)),
            AudioFormat::Wav => Ok(Self::Wav(wav::WavDecoder::open(data)?)),
            AudioFormat::Aiff => Ok(Self::Aiff(aiff::AiffDecoder::open(data)?)),
        }
    }

    /// The track's sample rate, channel count, bit depth, and duration.
    pub fn track_info(&self) -> TrackDescriptor {
        match self {
            Self::Flac(d) => d.track_info(),
            Self::Mp3(d) => d.track_info(),
            Self::Wav(d) => d.track_info(),
            Self::Aiff(d) => d.track_info(),
        }
    }

    /// Decode the next block of interleaved `i16` samples into `out`,
    /// returning the number of samples written (0 at end-of-stream).
    pub fn decode(&mut self, out: &mut [i16]) -> Result<usize, DecodeError> {
        match self {
            Self::Flac(d) => d.decode(out),
            Self::Mp3(d) => d.decode(out),
            Self::Wav(d) => d.decode(out),
            Self::Aiff(d) => d.decode(out),
        }
    }

    /// `true` once the stream is exhausted.
    pub fn is_eof(&self) -> bool {
        match self {
            Self::Flac(d) => d.is_eof(),
            Self::Mp3(d) => d.is_eof(),
            Self::Wav(d) => d.is_eof(),
            Self::Aiff(d) => d.is_eof(),
        }
    }

    /// Seek to the given sample frame. FLAC and MP3 have no seek table
    /// parsed here, so they restart decode from the stream start (FLAC) or
    /// leave the bit reservoir where it is (MP3, which cannot seek
    /// precisely without re-synchronizing the reservoir); WAV/AIFF seek
    /// exactly since their sample data is uncompressed and flat-addressed.
    pub fn seek(&mut self, frame_index: u64) {
        match self {
            Self::Flac(d) => {
                if frame_index == 0 {
                    d.seek_to_start();
                }
            }
            Self::Mp3(_) => {}
            Self::Wav(d) => d.seek(frame_index),
            Self::Aiff(d) => d.seek(frame_index),
        }
    }

    /// Extract whatever tag metadata this container carries. WAV/AIFF
    /// carry none in this decoder's scope and return an empty `Tags`.
    pub fn tags(data: &'a [u8]) -> Tags {
        if let Some(tags) = metadata::id3v2::parse(data) {
            return tags;
        }
        if let Some(tags) = metadata::id3v1::parse(data) {
            return tags;
        }
        Tags::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_header_fails_open() {
        assert_eq!(TrackDecoder::open(b"\x00\x00\x00\x00").unwrap_err(), DecodeError::UnrecognizedContainer);
    }
}
