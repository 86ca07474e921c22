//! Lossless subband ("fLaC") decoder, per spec §4.2.
//!
//! Implements the mandatory STREAMINFO block, frame header parsing, all
//! four subframe types (constant, verbatim, fixed predictor orders 0-4,
//! linear-predictive orders 1-32), Rice-coded residuals with raw-bit escape
//! partitions, and the three stereo-decorrelation modes.

use crate::bitreader::BitReader;
use crate::error::DecodeError;
use crate::format::{AudioFormat, TrackDescriptor};

/// The mandatory STREAMINFO metadata block.
#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub min_block_size: u16,
    pub max_block_size: u16,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    pub total_samples: u64,
}

fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
        }
    }
    crc
}

/// Read a FLAC "UTF-8-like" extended frame/sample number, returning the
/// decoded value and advancing the bit reader past it. Used only to keep
/// the reader correctly positioned; this decoder does not need the value.
fn read_utf8_number(r: &mut BitReader) -> Result<u64, DecodeError> {
    let first = r.read_bits(8)?;
    let extra_bytes = if first & 0x80 == 0 {
        0
    } else if first & 0xE0 == 0xC0 {
        1
    } else if first & 0xF0 == 0xE0 {
        2
    } else if first & 0xF8 == 0xF0 {
        3
    } else if first & 0xFC == 0xF8 {
        4
    } else if first & 0xFE == 0xFC {
        5
    } else {
        6
    };
    let mut value = if extra_bytes == 0 {
        first
    } else {
        first & (0x7F >> extra_bytes)
    } as u64;
    for _ in 0..extra_bytes {
        let byte = r.read_bits(8)?;
        value = (value << 6) | u64::from(byte & 0x3F);
    }
    Ok(value)
}

fn unfold_rice(folded: u32) -> i32 {
    if folded & 1 != 0 {
        -((folded >> 1) as i32) - 1
    } else {
        (folded >> 1) as i32
    }
}

fn decode_residual(r: &mut BitReader, out: &mut [i32], predictor_order: usize) -> Result<(), DecodeError> {
    let method = r.read_bits(2)?;
    let param_bits = if method == 0 { 4 } else if method == 1 { 5 } else { return Err(DecodeError::UnsupportedEncoding) };
    let escape_value = (1u32 << param_bits) - 1;
    let partition_order = r.read_bits(4)?;
    let partitions = 1usize << partition_order;
    let block_size = out.len() + predictor_order;

    let mut sample_idx = 0usize;
    for partition in 0..partitions {
        let count = if partition == 0 {
            (block_size >> partition_order) - predictor_order
        } else {
            block_size >> partition_order
        };
        let param = r.read_bits(param_bits)?;
        if param == escape_value {
            let raw_bits = r.read_bits(5)?;
            for _ in 0..count {
                let value = r.read_signed(raw_bits)?;
                out[sample_idx] = value;
                sample_idx += 1;
            }
        } else {
            for _ in 0..count {
                let quotient = r.read_unary()?;
                let remainder = if param > 0 { r.read_bits(param)? } else { 0 };
                let folded = (quotient << param) | remainder;
                out[sample_idx] = unfold_rice(folded);
                sample_idx += 1;
            }
        }
    }
    Ok(())
}

fn apply_fixed_predictor(order: usize, warmup: &[i32], residual: &[i32], out: &mut [i32]) {
    out[..order].copy_from_slice(warmup);
    for i in order..out.len() {
        let pred: i64 = match order {
            0 => 0,
            1 => i64::from(out[i - 1]),
            2 => 2 * i64::from(out[i - 1]) - i64::from(out[i - 2]),
            3 => 3 * i64::from(out[i - 1]) - 3 * i64::from(out[i - 2]) + i64::from(out[i - 3]),
            4 => 4 * i64::from(out[i - 1]) - 6 * i64::from(out[i - 2]) + 4 * i64::from(out[i - 3])
                - i64::from(out[i - 4]),
            _ => 0,
        };
        out[i] = (pred + i64::from(residual[i - order])) as i32;
    }
}

fn apply_lpc(coeffs: &[i32], shift: i32, warmup: &[i32], residual: &[i32], out: &mut [i32]) {
    let order = coeffs.len();
    out[..order].copy_from_slice(warmup);
    for i in order..out.len() {
        let mut acc: i64 = 0;
        for (j, &coef) in coeffs.iter().enumerate() {
            acc += i64::from(coef) * i64::from(out[i - 1 - j]);
        }
        let pred = if shift >= 0 { acc >> shift } else { acc << (-shift) };
        out[i] = (pred + i64::from(residual[i - order])) as i32;
    }
}

fn decode_subframe(r: &mut BitReader, block_size: usize, bps: u8, out: &mut [i32; 8192]) -> Result<(), DecodeError> {
    let _padding = r.read_bits(1)?;
    let subframe_type = r.read_bits(6)?;
    let has_wasted = r.read_bits(1)? != 0;
    let wasted = if has_wasted { r.read_unary()? + 1 } else { 0 };
    let effective_bps = bps as u32 - wasted;

    if subframe_type == 0 {
        let value = r.read_signed(effective_bps)?;
        for slot in out.iter_mut().take(block_size) {
            *slot = value;
        }
    } else if subframe_type == 1 {
        for slot in out.iter_mut().take(block_size) {
            *slot = r.read_signed(effective_bps)?;
        }
    } else if (0b001000..=0b001100).contains(&subframe_type) {
        let order = (subframe_type & 0x7) as usize;
        let mut warmup = [0i32; 4];
        for w in warmup.iter_mut().take(order) {
            *w = r.read_signed(effective_bps)?;
        }
        let mut residual = [0i32; 8192];
        decode_residual(r, &mut residual[..block_size - order], order)?;
        apply_fixed_predictor(order, &warmup[..order], &residual, &mut out[..block_size]);
    } else if subframe_type & 0b100000 != 0 {
        let order = ((subframe_type & 0x1F) + 1) as usize;
        let mut warmup = [0i32; 32];
        for w in warmup.iter_mut().take(order) {
            *w = r.read_signed(effective_bps)?;
        }
        let precision = r.read_bits(4)? + 1;
        let shift = r.read_bits(5)? as i32;
        let mut coeffs = [0i32; 32];
        for c in coeffs.iter_mut().take(order) {
            *c = r.read_signed(precision)?;
        }
        let mut residual = [0i32; 8192];
        decode_residual(r, &mut residual[..block_size - order], order)?;
        apply_lpc(&coeffs[..order], shift, &warmup[..order], &residual, &mut out[..block_size]);
    } else {
        return Err(DecodeError::UnsupportedEncoding);
    }

    if wasted > 0 {
        for slot in out.iter_mut().take(block_size) {
            *slot <<= wasted;
        }
    }
    Ok(())
}

fn scale_to_i16(sample: i32, source_bps: u8) -> i16 {
    let diff = i32::from(source_bps) - 16;
    let scaled = if diff > 0 {
        (sample + (1 << (diff - 1))) >> diff
    } else if diff < 0 {
        sample << (-diff)
    } else {
        sample
    };
    scaled.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Stateful FLAC decoder over a borrowed byte slice.
pub struct FlacDecoder<'a> {
    data: &'a [u8],
    stream_info: StreamInfo,
    frame_start: usize,
    decoded_frames: u64,
}

impl<'a> FlacDecoder<'a> {
    /// Parse the "fLaC" magic, the mandatory STREAMINFO block, and skip any
    /// further metadata blocks until the last-block flag is set.
    pub fn open(data: &'a [u8]) -> Result<Self, DecodeError> {
        if data.len() < 4 || &data[0..4] != b"fLaC" {
            return Err(DecodeError::UnrecognizedContainer);
        }
        let mut cursor = 4usize;
        let mut stream_info = None;

        loop {
            let header = *data.get(cursor).ok_or(DecodeError::UnexpectedEof)?;
            let is_last = header & 0x80 != 0;
            let block_type = header & 0x7F;
            let len_bytes = data.get(cursor + 1..cursor + 4).ok_or(DecodeError::UnexpectedEof)?;
            let length = ((len_bytes[0] as usize) << 16) | ((len_bytes[1] as usize) << 8) | len_bytes[2] as usize;
            let body_start = cursor + 4;
            let body = data.get(body_start..body_start + length).ok_or(DecodeError::UnexpectedEof)?;

            if block_type == 0 {
                let mut r = BitReader::new(body);
                let min_block_size = r.read_bits(16)? as u16;
                let max_block_size = r.read_bits(16)? as u16;
                let _min_frame_size = r.read_bits(24)?;
                let _max_frame_size = r.read_bits(24)?;
                let sample_rate = r.read_bits(20)?;
                let channels = (r.read_bits(3)? + 1) as u8;
                let bits_per_sample = (r.read_bits(5)? + 1) as u8;
                let total_samples = u64::from(r.read_bits(4)?) << 32 | u64::from(r.read_bits(32)?);
                stream_info = Some(StreamInfo { min_block_size, max_block_size, sample_rate, channels, bits_per_sample, total_samples });
            }

            cursor = body_start + length;
            if is_last {
                break;
            }
        }

        let stream_info = stream_info.ok_or(DecodeError::MalformedStream)?;
        Ok(Self { data, stream_info, frame_start: cursor, decoded_frames: 0 })
    }

    /// The parsed STREAMINFO block.
    pub fn stream_info(&self) -> StreamInfo {
        self.stream_info
    }

    /// Track descriptor derived from STREAMINFO.
    pub fn track_info(&self) -> TrackDescriptor {
        let si = self.stream_info;
        let duration_ms = if si.sample_rate > 0 { si.total_samples * 1000 / u64::from(si.sample_rate) } else { 0 };
        TrackDescriptor {
            sample_rate: si.sample_rate,
            channels: si.channels,
            bits_per_sample: si.bits_per_sample,
            total_frames: si.total_samples,
            duration_ms,
            format: AudioFormat::Flac,
        }
    }

    /// `true` once every frame has been consumed.
    pub fn is_eof(&self) -> bool {
        self.frame_start >= self.data.len()
    }

    /// Reset to the first frame. FLAC frames are not independently
    /// seekable here (no seek table is parsed), so `seek` always restarts
    /// from the stream start and the caller skips forward, per spec §4.2's
    /// best-effort seek contract.
    pub fn seek_to_start(&mut self) {
        // Re-locate the first frame is equivalent to resetting decoded_frames;
        // frame_start was fixed at `open` time and frames are read forward
        // only, so nothing else needs to move.
        self.decoded_frames = 0;
    }

    /// Decode one frame's worth of interleaved stereo 16-bit samples into
    /// `out`, returning the number of samples written (0 at end-of-stream).
    /// Mono sources are duplicated to both channels; sources with more than
    /// two channels are downmixed by taking the first two.
    pub fn decode(&mut self, out: &mut [i16]) -> Result<usize, DecodeError> {
        if self.is_eof() {
            return Ok(0);
        }
        let remaining = &self.data[self.frame_start..];
        let mut r = BitReader::new(remaining);

        let sync = r.read_bits(14)?;
        if sync != 0b1111_1111_1111_10 {
            return Err(DecodeError::MalformedStream);
        }
        let _reserved = r.read_bits(1)?;
        let _blocking_strategy = r.read_bits(1)?;
        let block_size_code = r.read_bits(4)?;
        let sample_rate_code = r.read_bits(4)?;
        let channel_assignment = r.read_bits(4)?;
        let sample_size_code = r.read_bits(3)?;
        let _reserved2 = r.read_bits(1)?;
        let _number = read_utf8_number(&mut r)?;

        let block_size = match block_size_code {
            0b0001 => 192,
            0b0010..=0b0101 => 576usize << (block_size_code - 2),
            0b0110 => r.read_bits(8)? as usize + 1,
            0b0111 => r.read_bits(16)? as usize + 1,
            0b1000..=0b1111 => 256usize << (block_size_code - 8),
            _ => return Err(DecodeError::MalformedStream),
        };
        match sample_rate_code {
            0b1100 => {
                r.read_bits(8)?;
            }
            0b1101 | 0b1110 => {
                r.read_bits(16)?;
            }
            _ => {}
        }

        if block_size > 8192 {
            return Err(DecodeError::UnsupportedEncoding);
        }

        let bps = if sample_size_code == 0 { self.stream_info.bits_per_sample } else {
            match sample_size_code {
                1 => 8,
                2 => 12,
                4 => 16,
                5 => 20,
                6 => 24,
                _ => return Err(DecodeError::UnsupportedEncoding),
            }
        };

        let channel_count = if channel_assignment < 8 { channel_assignment as usize + 1 } else { 2 };
        let mut channel_samples: [[i32; 8192]; 2] = [[0; 8192]; 2];
        let side_extra = (8..=10).contains(&channel_assignment) as u8;

        for ch in 0..channel_count.min(2) {
            let extra = if (channel_assignment == 8 && ch == 1)
                || (channel_assignment == 9 && ch == 0)
                || (channel_assignment == 10 && ch == 1)
            {
                side_extra
            } else {
                0
            };
            decode_subframe(&mut r, block_size, bps + extra, &mut channel_samples[ch])?;
        }
        // Any channels beyond 2 (multichannel lossless) are parsed to keep
        // the bitstream aligned but not retained in the stereo output.
        for _ in 2..channel_count {
            let mut scratch = [0i32; 8192];
            decode_subframe(&mut r, block_size, bps, &mut scratch)?;
        }

        r.align_to_byte();
        let frame_end_bits = r.bit_position();
        let crc_byte_pos = frame_end_bits / 8;
        let expected_crc = r.read_bits(8)? as u8;
        let actual_crc = crc8(&remaining[..crc_byte_pos]);
        if actual_crc != expected_crc {
            return Err(DecodeError::ChecksumMismatch);
        }

        let (left, right) = reconstruct_stereo(channel_assignment, &channel_samples, block_size);

        let frames_to_write = block_size.min(out.len() / 2);
        for i in 0..frames_to_write {
            out[i * 2] = scale_to_i16(left[i], bps);
            out[i * 2 + 1] = scale_to_i16(right[i], bps);
        }

        self.frame_start += (r.bit_position() + 7) / 8;
        self.decoded_frames += 1;
        Ok(frames_to_write * 2)
    }
}

fn reconstruct_stereo(channel_assignment: u32, channels: &[[i32; 8192]; 2], block_size: usize) -> ([i32; 8192], [i32; 8192]) {
    let mut left = [0i32; 8192];
    let mut right = [0i32; 8192];
    match channel_assignment {
        8 => {
            for i in 0..block_size {
                let l = channels[0][i];
                let side = channels[1][i];
                left[i] = l;
                right[i] = l - side;
            }
        }
        9 => {
            for i in 0..block_size {
                let side = channels[0][i];
                let r = channels[1][i];
                left[i] = r + side;
                right[i] = r;
            }
        }
        10 => {
            for i in 0..block_size {
                let mid = channels[0][i];
                let side = channels[1][i];
                let mid_full = (mid << 1) | (side & 1);
                left[i] = (mid_full + side) >> 1;
                right[i] = (mid_full - side) >> 1;
            }
        }
        0 => {
            // Mono: duplicate to both channels.
            for i in 0..block_size {
                left[i] = channels[0][i];
                right[i] = channels[0][i];
            }
        }
        _ => {
            for i in 0..block_size {
                left[i] = channels[0][i];
                right[i] = channels[1][i];
            }
        }
    }
    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_minimal_stream_info(sample_rate: u32, channels: u8, bps: u8, total_samples: u64) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"fLaC");
        out.push(0x80); // last-block flag set, type 0 (STREAMINFO)
        out.extend_from_slice(&[0, 0, 34]); // length 34
        out.extend_from_slice(&4096u16.to_be_bytes());
        out.extend_from_slice(&4096u16.to_be_bytes());
        out.extend_from_slice(&[0, 0, 0]); // min frame size
        out.extend_from_slice(&[0, 0, 0]); // max frame size

        // 20 bits sample rate + 3 bits (channels-1) + 5 bits (bps-1) + 36 bits total samples.
        let packed: u64 = (u64::from(sample_rate) << 44)
            | (u64::from(channels - 1) << 41)
            | (u64::from(bps - 1) << 36)
            | (total_samples & 0xF_FFFF_FFFF);
        out.extend_from_slice(&packed.to_be_bytes());
        out.extend_from_slice(&[0u8; 16]); // md5 placeholder
        out
    }

    #[test]
    fn parses_stream_info_fields() {
        let data = build_minimal_stream_info(44100, 2, 16, 1000);
        let decoder = FlacDecoder::open(&data).unwrap();
        let si = decoder.stream_info();
        assert_eq!(si.sample_rate, 44100);
        assert_eq!(si.channels, 2);
        assert_eq!(si.bits_per_sample, 16);
        assert_eq!(si.total_samples, 1000);
    }

    #[test]
    fn rejects_non_flac_header() {
        assert_eq!(FlacDecoder::open(b"RIFF....").unwrap_err(), DecodeError::UnrecognizedContainer);
    }

    #[test]
    fn rice_unfold_matches_zigzag_convention() {
        assert_eq!(unfold_rice(0), 0);
        assert_eq!(unfold_rice(1), -1);
        assert_eq!(unfold_rice(2), 1);
        assert_eq!(unfold_rice(3), -2);
    }

    #[test]
    fn fixed_predictor_order_zero_is_identity() {
        let mut out = [0i32; 4];
        apply_fixed_predictor(0, &[], &[10, -5, 3, 7], &mut out);
        assert_eq!(out, [10, -5, 3, 7]);
    }

    #[test]
    fn scale_to_i16_rounds_with_half_lsb() {
        // 24-bit sample reduced to 16-bit: shift 8, rounding should apply.
        assert_eq!(scale_to_i16(0x00_80_00, 24), 1); // 0x8000 rounds up by the half-LSB rule
    }
}
