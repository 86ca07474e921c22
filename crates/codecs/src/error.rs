//! Decoder error taxonomy, shared across all container/codec implementations.

/// Errors a decoder's `open`/`decode`/`seek` can surface, per spec §4.2 and
/// §7's format-error disposition (surfaced to caller; constructor fails
/// cleanly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
pub enum DecodeError {
    /// The leading bytes did not match any supported container.
    #[error("unrecognized container")]
    UnrecognizedContainer,
    /// A mandatory block/chunk/header was missing or malformed.
    #[error("malformed stream")]
    MalformedStream,
    /// The bit/byte reader ran out of input mid-structure.
    #[error("unexpected end of stream")]
    UnexpectedEof,
    /// A field encodes a value this decoder does not support (e.g. an
    /// unsupported bit depth or channel layout).
    #[error("unsupported encoding")]
    UnsupportedEncoding,
    /// A CRC or checksum embedded in the stream did not match.
    #[error("checksum mismatch")]
    ChecksumMismatch,
}
