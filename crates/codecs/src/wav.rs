//! Uncompressed chunked little-endian ("RIFF...WAVE") decoder, per spec §4.2.
//!
//! Supports PCM 8/16/24/32-bit integer and IEEE-754 float sample formats,
//! converting every source width to saturating signed 16-bit output.

use crate::error::DecodeError;
use crate::format::{AudioFormat, TrackDescriptor};

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

#[derive(Debug, Clone, Copy)]
struct FmtChunk {
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Stateful WAV decoder over a borrowed byte slice.
pub struct WavDecoder<'a> {
    data: &'a [u8],
    fmt: FmtChunk,
    data_start: usize,
    data_len: usize,
    read_offset: usize,
}

fn read_u16(data: &[u8], at: usize) -> Result<u16, DecodeError> {
    let bytes = data.get(at..at + 2).ok_or(DecodeError::UnexpectedEof)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, DecodeError> {
    let bytes = data.get(at..at + 4).ok_or(DecodeError::UnexpectedEof)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

impl<'a> WavDecoder<'a> {
    /// Parse the RIFF/WAVE header and walk chunks until `fmt ` and `data`
    /// are both located.
    pub fn open(data: &'a [u8]) -> Result<Self, DecodeError> {
        if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
            return Err(DecodeError::UnrecognizedContainer);
        }

        let mut cursor = 12usize;
        let mut fmt: Option<FmtChunk> = None;
        let mut data_region: Option<(usize, usize)> = None;

        while cursor + 8 <= data.len() {
            let chunk_id = &data[cursor..cursor + 4];
            let chunk_len = read_u32(data, cursor + 4)? as usize;
            let body_start = cursor + 8;

            if chunk_id == b"fmt " {
                let format_tag = read_u16(data, body_start)?;
                let channels = read_u16(data, body_start + 2)?;
                let sample_rate = read_u32(data, body_start + 4)?;
                let bits_per_sample = read_u16(data, body_start + 14)?;
                let resolved_tag = if format_tag == WAVE_FORMAT_EXTENSIBLE && chunk_len >= 40 {
                    read_u16(data, body_start + 24)?
                } else {
                    format_tag
                };
                fmt = Some(FmtChunk { format_tag: resolved_tag, channels, sample_rate, bits_per_sample });
            } else if chunk_id == b"data" {
                let available = data.len().saturating_sub(body_start);
                data_region = Some((body_start, chunk_len.min(available)));
            }

            // Chunks are padded to even length.
            cursor = body_start + chunk_len + (chunk_len & 1);
        }

        let fmt = fmt.ok_or(DecodeError::MalformedStream)?;
        let (data_start, data_len) = data_region.ok_or(DecodeError::MalformedStream)?;
        if fmt.format_tag != WAVE_FORMAT_PCM && fmt.format_tag != WAVE_FORMAT_IEEE_FLOAT {
            return Err(DecodeError::UnsupportedEncoding);
        }

        Ok(Self { data, fmt, data_start, data_len, read_offset: 0 })
    }

    /// Track descriptor derived from the `fmt ` chunk and `data` length.
    pub fn track_info(&self) -> TrackDescriptor {
        let bytes_per_frame = self.fmt.channels as u64 * (self.fmt.bits_per_sample as u64 / 8);
        let total_frames = if bytes_per_frame > 0 { self.data_len as u64 / bytes_per_frame } else { 0 };
        let duration_ms = if self.fmt.sample_rate > 0 { total_frames * 1000 / self.fmt.sample_rate as u64 } else { 0 };
        TrackDescriptor {
            sample_rate: self.fmt.sample_rate,
            channels: self.fmt.channels as u8,
            bits_per_sample: self.fmt.bits_per_sample as u8,
            total_frames,
            duration_ms,
            format: AudioFormat::Wav,
        }
    }

    /// `true` once the `data` chunk has been fully consumed.
    pub fn is_eof(&self) -> bool {
        self.read_offset >= self.data_len
    }

    /// Seek to the frame at `frame_index`, clamped to the track length.
    pub fn seek(&mut self, frame_index: u64) {
        let bytes_per_frame = self.fmt.channels as usize * (self.fmt.bits_per_sample as usize / 8);
        let byte_offset = (frame_index as usize).saturating_mul(bytes_per_frame);
        self.read_offset = byte_offset.min(self.data_len);
    }

    /// Decode the next samples into `out` (interleaved by channel),
    /// returning the number of `i16` samples written.
    pub fn decode(&mut self, out: &mut [i16]) -> Result<usize, DecodeError> {
        let bytes_per_sample = self.fmt.bits_per_sample as usize / 8;
        if bytes_per_sample == 0 {
            return Err(DecodeError::UnsupportedEncoding);
        }
        let mut written = 0usize;
        while written < out.len() && self.read_offset + bytes_per_sample <= self.data_len {
            let at = self.data_start + self.read_offset;
            let sample_bytes = self.data.get(at..at + bytes_per_sample).ok_or(DecodeError::UnexpectedEof)?;
            out[written] = decode_sample(sample_bytes, self.fmt.format_tag, self.fmt.bits_per_sample)?;
            self.read_offset += bytes_per_sample;
            written += 1;
        }
        Ok(written)
    }
}

fn decode_sample(bytes: &[u8], format_tag: u16, bits_per_sample: u16) -> Result<i16, DecodeError> {
    if format_tag == WAVE_FORMAT_IEEE_FLOAT {
        return match bits_per_sample {
            32 => {
                let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                Ok((value.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            }
            _ => Err(DecodeError::UnsupportedEncoding),
        };
    }

    match bits_per_sample {
        8 => {
            // WAV stores 8-bit PCM as unsigned, centered on 128.
            Ok(((bytes[0] as i16) - 128) << 8)
        }
        16 => Ok(i16::from_le_bytes([bytes[0], bytes[1]])),
        24 => {
            let value = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], if bytes[2] & 0x80 != 0 { 0xFF } else { 0 }]);
            Ok((value >> 8).clamp(i16::MIN as i32, i16::MAX as i32) as i16)
        }
        32 => {
            let value = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            Ok((value >> 16) as i16)
        }
        _ => Err(DecodeError::UnsupportedEncoding),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_pcm16_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        let data_bytes = samples.len() * 2;
        out.extend_from_slice(&((36 + data_bytes) as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");

        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        let byte_rate = sample_rate * channels as u32 * 2;
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());

        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data_bytes as u32).to_le_bytes());
        for &s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    #[test]
    fn rejects_non_riff_header() {
        assert_eq!(WavDecoder::open(b"fLaC....").unwrap_err(), DecodeError::UnrecognizedContainer);
    }

    #[test]
    fn decodes_pcm16_round_trip() {
        let samples = [100i16, -200, 300, -400];
        let wav = build_pcm16_wav(&samples, 44100, 2);
        let mut decoder = WavDecoder::open(&wav).unwrap();
        let info = decoder.track_info();
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.channels, 2);
        assert_eq!(info.total_frames, 2);

        let mut out = [0i16; 4];
        let written = decoder.decode(&mut out).unwrap();
        assert_eq!(written, 4);
        assert_eq!(out, samples);
        assert!(decoder.is_eof());
    }

    #[test]
    fn eight_bit_pcm_centers_on_zero() {
        // 128 is silence in unsigned 8-bit PCM, must map to 0.
        assert_eq!(decode_sample(&[128], WAVE_FORMAT_PCM, 8).unwrap(), 0);
        assert_eq!(decode_sample(&[255], WAVE_FORMAT_PCM, 8).unwrap(), 127 << 8);
        assert_eq!(decode_sample(&[0], WAVE_FORMAT_PCM, 8).unwrap(), -128 << 8);
    }

    #[test]
    fn seek_clamps_to_track_length() {
        let samples = [1i16, 2, 3, 4];
        let wav = build_pcm16_wav(&samples, 8000, 1);
        let mut decoder = WavDecoder::open(&wav).unwrap();
        decoder.seek(100);
        assert!(decoder.is_eof());
    }

    #[test]
    fn unsupported_bit_depth_is_rejected() {
        assert_eq!(decode_sample(&[0, 0, 0], WAVE_FORMAT_PCM, 12).unwrap_err(), DecodeError::UnsupportedEncoding);
    }
}
