//! Firmware image header, per spec §6 "Firmware image": a 128-byte
//! little-endian header (magic, versions, size/address fields, CRC-32,
//! build metadata, device id, name, SHA-256) followed by the payload.

use crate::error::TelemetryError;

const MAGIC: [u8; 4] = *b"ZPFW";

/// Size in bytes of the fixed header preceding the payload.
pub const HEADER_SIZE: usize = 128;

/// The parsed firmware image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub header_version: u16,
    pub semantic_version: (u8, u8, u8),
    pub flags: u32,
    pub image_size: u32,
    pub uncompressed_size: u32,
    pub load_address: u32,
    pub entry_address: u32,
    pub crc32: u32,
    pub build_timestamp: u32,
    pub device_id: u16,
    pub compression_tag: u8,
    pub name: [u8; 32],
    pub sha256: [u8; 32],
}

impl ImageHeader {
    /// Human-readable "major.minor.patch" rendering of the semantic version.
    pub fn version_string(&self) -> heapless::String<16> {
        let (major, minor, patch) = self.semantic_version;
        let mut s = heapless::String::new();
        let _ = core::fmt::write(&mut s, format_args!("{major}.{minor}.{patch}"));
        s
    }

    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&MAGIC);
        out[4..6].copy_from_slice(&self.header_version.to_le_bytes());
        out[6..8].copy_from_slice(&(HEADER_SIZE as u16).to_le_bytes());
        out[8] = self.semantic_version.0;
        out[9] = self.semantic_version.1;
        out[10] = self.semantic_version.2;
        out[11..15].copy_from_slice(&self.flags.to_le_bytes());
        out[15..19].copy_from_slice(&self.image_size.to_le_bytes());
        out[19..23].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        out[23..27].copy_from_slice(&self.load_address.to_le_bytes());
        out[27..31].copy_from_slice(&self.entry_address.to_le_bytes());
        out[31..35].copy_from_slice(&self.crc32.to_le_bytes());
        out[35..39].copy_from_slice(&self.build_timestamp.to_le_bytes());
        out[39..41].copy_from_slice(&self.device_id.to_le_bytes());
        out[41] = self.compression_tag;
        out[43..75].copy_from_slice(&self.name);
        out[75..107].copy_from_slice(&self.sha256);
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, TelemetryError> {
        if bytes.len() < HEADER_SIZE {
            return Err(TelemetryError::Truncated);
        }
        if bytes[0..4] != MAGIC {
            return Err(TelemetryError::BadMagic);
        }
        let mut name = [0u8; 32];
        name.copy_from_slice(&bytes[43..75]);
        let mut sha256 = [0u8; 32];
        sha256.copy_from_slice(&bytes[75..107]);
        Ok(Self {
            header_version: u16::from_le_bytes([bytes[4], bytes[5]]),
            semantic_version: (bytes[8], bytes[9], bytes[10]),
            flags: u32::from_le_bytes([bytes[11], bytes[12], bytes[13], bytes[14]]),
            image_size: u32::from_le_bytes([bytes[15], bytes[16], bytes[17], bytes[18]]),
            uncompressed_size: u32::from_le_bytes([bytes[19], bytes[20], bytes[21], bytes[22]]),
            load_address: u32::from_le_bytes([bytes[23], bytes[24], bytes[25], bytes[26]]),
            entry_address: u32::from_le_bytes([bytes[27], bytes[28], bytes[29], bytes[30]]),
            crc32: u32::from_le_bytes([bytes[31], bytes[32], bytes[33], bytes[34]]),
            build_timestamp: u32::from_le_bytes([bytes[35], bytes[36], bytes[37], bytes[38]]),
            device_id: u16::from_le_bytes([bytes[39], bytes[40]]),
            compression_tag: bytes[41],
            name,
            sha256,
        })
    }
}

/// A parsed image: header plus a borrowed view of the payload.
pub struct FirmwareImage<'a> {
    pub header: ImageHeader,
    pub payload: &'a [u8],
}

impl<'a> FirmwareImage<'a> {
    /// Parse `bytes` as `header || payload`. Does not itself verify the
    /// CRC/SHA; call [`FirmwareImage::verify`] for that.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, TelemetryError> {
        let header = ImageHeader::decode(bytes)?;
        let payload_end = HEADER_SIZE.saturating_add(header.image_size as usize);
        let payload = bytes.get(HEADER_SIZE..payload_end).ok_or(TelemetryError::Truncated)?;
        Ok(Self { header, payload })
    }

    /// Verify the payload's CRC-32 against the header, and its SHA-256 if
    /// the header's SHA-256 field is non-zero.
    pub fn verify(&self) -> bool {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(self.payload);
        if hasher.finalize() != self.header.crc32 {
            return false;
        }
        if self.header.sha256 != [0u8; 32] {
            use sha2::{Digest, Sha256};
            let digest = Sha256::digest(self.payload);
            if digest.as_slice() != self.header.sha256 {
                return false;
            }
        }
        true
    }
}

/// Build a complete image (header + payload) for a given semantic version
/// and payload, computing CRC-32 (and SHA-256 when `with_sha` is set).
pub fn build_image(
    semantic_version: (u8, u8, u8),
    device_id: u16,
    name: &str,
    payload: &[u8],
    with_sha: bool,
) -> heapless::Vec<u8, 4096> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    let crc32 = hasher.finalize();

    let sha256 = if with_sha {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(payload);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    } else {
        [0u8; 32]
    };

    let mut name_bytes = [0u8; 32];
    let copy_len = name.len().min(32);
    name_bytes[..copy_len].copy_from_slice(&name.as_bytes()[..copy_len]);

    let header = ImageHeader {
        header_version: 1,
        semantic_version,
        flags: 0,
        image_size: payload.len() as u32,
        uncompressed_size: payload.len() as u32,
        load_address: 0,
        entry_address: 0,
        crc32,
        build_timestamp: 0,
        device_id,
        compression_tag: 0,
        name: name_bytes,
        sha256,
    };

    let mut out: heapless::Vec<u8, 4096> = heapless::Vec::new();
    let _ = out.extend_from_slice(&header.encode());
    let _ = out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_image_round_trips_and_verifies() {
        let payload = [0xDEu8, 0xAD, 0xBE, 0xEF];
        let image_bytes = build_image((1, 2, 3), 42, "test-fw", &payload, false);
        let parsed = FirmwareImage::parse(&image_bytes).unwrap();
        assert_eq!(parsed.header.version_string().as_str(), "1.2.3");
        assert_eq!(parsed.payload, &payload);
        assert!(parsed.verify());
    }

    #[test]
    fn corrupted_payload_fails_crc_verification() {
        let payload = [1u8, 2, 3, 4];
        let mut image_bytes = build_image((1, 0, 0), 1, "fw", &payload, false);
        let last = image_bytes.len() - 1;
        image_bytes[last] ^= 0xFF;
        let parsed = FirmwareImage::parse(&image_bytes).unwrap();
        assert!(!parsed.verify());
    }

    #[test]
    fn missing_magic_is_rejected() {
        let bytes = [0u8; HEADER_SIZE];
        assert_eq!(FirmwareImage::parse(&bytes).unwrap_err(), TelemetryError::BadMagic);
    }

    #[test]
    fn sha256_mismatch_fails_verification_when_present() {
        let payload = [9u8, 9, 9];
        let mut image_bytes = build_image((0, 1, 0), 7, "fw", &payload, true);
        // Flip a bit inside the header's SHA-256 field (bytes 75..107),
        // leaving the CRC-32 (and payload) untouched.
        image_bytes[75] ^= 0xFF;
        let parsed = FirmwareImage::parse(&image_bytes).unwrap();
        assert!(!parsed.verify());
    }
}
