//! Error types for the kernel core.

/// Failure to interpret an address payload during derivation or recognition.
///
/// Recognition of a well-formed address that simply belongs to someone else is
/// not an error; these variants only cover malformed payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DerivationError {
    /// Payload shorter than the fixed encoding.
    #[error("address payload too short: {0} bytes")]
    TooShort(usize),

    /// Leading magic bytes do not identify a wallet address.
    #[error("address payload carries unknown magic bytes")]
    BadMagic,

    /// Encoding version this kernel does not understand.
    #[error("unsupported address payload version {0}")]
    UnsupportedVersion(u8),

    /// Trailing checksum does not match the payload body.
    #[error("address payload checksum mismatch")]
    ChecksumMismatch,
}
