//! Uncompressed chunked big-endian ("FORM...AIFF") decoder, per spec §4.2.
//!
//! AIFF encodes its sample rate as an 80-bit IEEE-754 extended-precision
//! float (`COMM` chunk) rather than a plain 32-bit integer; everything else
//! mirrors the WAV decoder's structure with byte order reversed.

use crate::error::DecodeError;
use crate::format::{AudioFormat, TrackDescriptor};

#[derive(Debug, Clone, Copy)]
struct CommChunk {
    channels: u16,
    bits_per_sample: u16,
    sample_rate: u32,
}

/// Stateful AIFF decoder over a borrowed byte slice.
pub struct AiffDecoder<'a> {
    data: &'a [u8],
    comm: CommChunk,
    data_start: usize,
    data_len: usize,
    read_offset: usize,
}

fn read_u16(data: &[u8], at: usize) -> Result<u16, DecodeError> {
    let bytes = data.get(at..at + 2).ok_or(DecodeError::UnexpectedEof)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, DecodeError> {
    let bytes = data.get(at..at + 4).ok_or(DecodeError::UnexpectedEof)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Decode an 80-bit IEEE-754 extended-precision float (sign:1, exponent:15,
/// mantissa:64) into an unsigned sample rate. AIFF only ever stores
/// positive, integral-valued rates in this field.
fn read_extended_sample_rate(bytes: &[u8]) -> Result<u32, DecodeError> {
    if bytes.len() < 10 {
        return Err(DecodeError::UnexpectedEof);
    }
    let exponent = (((bytes[0] as u16) << 8 | bytes[1] as u16) & 0x7FFF) as i32 - 16383;
    let mantissa = u64::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7], bytes[8], bytes[9]]);
    if exponent < 0 || exponent > 63 {
        return Err(DecodeError::UnsupportedEncoding);
    }
    let value = if exponent >= 63 { mantissa } else { mantissa >> (63 - exponent) };
    Ok(value as u32)
}

impl<'a> AiffDecoder<'a> {
    /// Parse the FORM/AIFF header and walk chunks until `COMM` and `SSND`
    /// are both located.
    pub fn open(data: &'a [u8]) -> Result<Self, DecodeError> {
        if data.len() < 12 || &data[0..4] != b"FORM" || &data[8..12] != b"AIFF" {
            return Err(DecodeError::UnrecognizedContainer);
        }

        let mut cursor = 12usize;
        let mut comm: Option<CommChunk> = None;
        let mut ssnd_region: Option<(usize, usize)> = None;

        while cursor + 8 <= data.len() {
            let chunk_id = &data[cursor..cursor + 4];
            let chunk_len = read_u32(data, cursor + 4)? as usize;
            let body_start = cursor + 8;

            if chunk_id == b"COMM" {
                let channels = read_u16(data, body_start)?;
                let _num_sample_frames = read_u32(data, body_start + 2)?;
                let bits_per_sample = read_u16(data, body_start + 6)?;
                let rate_bytes = data.get(body_start + 8..body_start + 18).ok_or(DecodeError::UnexpectedEof)?;
                let sample_rate = read_extended_sample_rate(rate_bytes)?;
                comm = Some(CommChunk { channels, bits_per_sample, sample_rate });
            } else if chunk_id == b"SSND" {
                // SSND body is [offset:u32][block_size:u32][sample data...].
                let offset = read_u32(data, body_start)? as usize;
                let sound_start = body_start + 8 + offset;
                let available = data.len().saturating_sub(sound_start);
                ssnd_region = Some((sound_start, (chunk_len.saturating_sub(8 + offset)).min(available)));
            }

            cursor = body_start + chunk_len + (chunk_len & 1);
        }

        let comm = comm.ok_or(DecodeError::MalformedStream)?;
        let (data_start, data_len) = ssnd_region.ok_or(DecodeError::MalformedStream)?;
        Ok(Self { data, comm, data_start, data_len, read_offset: 0 })
    }

    /// Track descriptor derived from the `COMM` chunk and `SSND` length.
    pub fn track_info(&self) -> TrackDescriptor {
        let bytes_per_frame = self.comm.channels as u64 * (self.comm.bits_per_sample as u64 / 8);
        let total_frames = if bytes_per_frame > 0 { self.data_len as u64 / bytes_per_frame } else { 0 };
        let duration_ms = if self.comm.sample_rate > 0 { total_frames * 1000 / self.comm.sample_rate as u64 } else { 0 };
        TrackDescriptor {
            sample_rate: self.comm.sample_rate,
            channels: self.comm.channels as u8,
            bits_per_sample: self.comm.bits_per_sample as u8,
            total_frames,
            duration_ms,
            format: AudioFormat::Aiff,
        }
    }

    /// `true` once the `SSND` region has been fully consumed.
    pub fn is_eof(&self) -> bool {
        self.read_offset >= self.data_len
    }

    /// Seek to the frame at `frame_index`, clamped to the track length.
    pub fn seek(&mut self, frame_index: u64) {
        let bytes_per_frame = self.comm.channels as usize * (self.comm.bits_per_sample as usize / 8);
        let byte_offset = (frame_index as usize).saturating_mul(bytes_per_frame);
        self.read_offset = byte_offset.min(self.data_len);
    }

    /// Decode the next samples into `out` (interleaved by channel),
    /// returning the number of `i16` samples written.
    pub fn decode(&mut self, out: &mut [i16]) -> Result<usize, DecodeError> {
        let bytes_per_sample = self.comm.bits_per_sample as usize / 8;
        if bytes_per_sample == 0 {
            return Err(DecodeError::UnsupportedEncoding);
        }
        let mut written = 0usize;
        while written < out.len() && self.read_offset + bytes_per_sample <= self.data_len {
            let at = self.data_start + self.read_offset;
            let sample_bytes = self.data.get(at..at + bytes_per_sample).ok_or(DecodeError::UnexpectedEof)?;
            out[written] = decode_sample(sample_bytes, self.comm.bits_per_sample)?;
            self.read_offset += bytes_per_sample;
            written += 1;
        }
        Ok(written)
    }
}

fn decode_sample(bytes: &[u8], bits_per_sample: u16) -> Result<i16, DecodeError> {
    match bits_per_sample {
        8 => Ok((bytes[0] as i8 as i16) << 8),
        16 => Ok(i16::from_be_bytes([bytes[0], bytes[1]])),
        24 => {
            let value = i32::from_be_bytes([if bytes[0] & 0x80 != 0 { 0xFF } else { 0 }, bytes[0], bytes[1], bytes[2]]);
            Ok((value >> 8).clamp(i16::MIN as i32, i16::MAX as i32) as i16)
        }
        32 => {
            let value = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            Ok((value >> 16) as i16)
        }
        _ => Err(DecodeError::UnsupportedEncoding),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extended_from_rate(rate: u32) -> [u8; 10] {
        let mut bytes = [0u8; 10];
        let exponent: u16 = 16383 + 31; // matches mantissa shift below for 32-bit-range rates
        bytes[0..2].copy_from_slice(&exponent.to_be_bytes());
        let mantissa = (rate as u64) << 32;
        bytes[2..10].copy_from_slice(&mantissa.to_be_bytes());
        bytes
    }

    fn build_pcm16_aiff(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let mut out = Vec::new();
        let data_bytes = samples.len() * 2;
        let comm_len = 18u32;
        let ssnd_len = (8 + data_bytes) as u32;
        let form_len = 4 + (8 + comm_len) + (8 + ssnd_len);

        out.extend_from_slice(b"FORM");
        out.extend_from_slice(&form_len.to_be_bytes());
        out.extend_from_slice(b"AIFF");

        out.extend_from_slice(b"COMM");
        out.extend_from_slice(&comm_len.to_be_bytes());
        out.extend_from_slice(&channels.to_be_bytes());
        out.extend_from_slice(&(samples.len() as u32 / channels as u32).to_be_bytes());
        out.extend_from_slice(&16u16.to_be_bytes());
        out.extend_from_slice(&extended_from_rate(sample_rate));

        out.extend_from_slice(b"SSND");
        out.extend_from_slice(&ssnd_len.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes()); // offset
        out.extend_from_slice(&0u32.to_be_bytes()); // block_size
        for &s in samples {
            out.extend_from_slice(&s.to_be_bytes());
        }
        out
    }

    #[test]
    fn rejects_non_form_header() {
        assert_eq!(AiffDecoder::open(b"RIFF....").unwrap_err(), DecodeError::UnrecognizedContainer);
    }

    #[test]
    fn decodes_pcm16_round_trip() {
        let samples = [1000i16, -2000, 3000, -4000];
        let aiff = build_pcm16_aiff(&samples, 44100, 2);
        let mut decoder = AiffDecoder::open(&aiff).unwrap();
        let info = decoder.track_info();
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.channels, 2);

        let mut out = [0i16; 4];
        let written = decoder.decode(&mut out).unwrap();
        assert_eq!(written, 4);
        assert_eq!(out, samples);
        assert!(decoder.is_eof());
    }

    #[test]
    fn extended_precision_rate_decodes_exactly() {
        let bytes = extended_from_rate(48000);
        assert_eq!(read_extended_sample_rate(&bytes).unwrap(), 48000);
    }
}
