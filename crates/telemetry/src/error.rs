//! Error taxonomy for telemetry/image/persisted-state parsing.

/// Errors surfaced by the firmware-image, telemetry-ring, and
/// persisted-state parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
pub enum TelemetryError {
    /// The buffer was shorter than the structure's fixed header.
    #[error("buffer truncated")]
    Truncated,
    /// The leading magic bytes did not match.
    #[error("bad magic")]
    BadMagic,
    /// The structure's checksum did not match its payload.
    #[error("checksum mismatch")]
    ChecksumMismatch,
}
