//! Error types for UnityFS bundle parsing

use thiserror::Error;

/// Result type for bundle operations
pub type Result<T> = std::result::Result<T, BinaryError>;

/// Errors that can occur while reading or parsing a bundle
#[derive(Error, Debug)]
pub enum BinaryError {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The container does not start with the expected signature
    #[error("Signature mismatch: expected {expected}, got {actual}")]
    SignatureMismatch { expected: String, actual: String },

    /// Container format version other than the supported one
    #[error("Unsupported bundle format version: {0}")]
    UnsupportedVersion(i32),

    /// Header flag requesting a layout this reader does not handle
    #[error("Unsupported bundle flag: {0:#x}")]
    UnsupportedFlag(u32),

    /// The block codec reported a corrupt stream or a size mismatch
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    /// Unknown or unavailable compression method
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// Cursor or read window outside the reader's length
    #[error("Out of range: {requested} bytes at position {position}, length {length}")]
    OutOfRange {
        position: u64,
        requested: u64,
        length: u64,
    },

    /// Null-terminated string without a terminator
    #[error("Malformed string at position {position}: missing terminator")]
    MalformedString { position: u64 },

    /// No entry with the requested name
    #[error("No entry named '{0}' in bundle")]
    EntryNotFound(String),

    /// One or more entries were rejected by the visitor
    #[error("{} entries failed: {}", failed.len(), failed.join(", "))]
    EntryFillFailure { failed: Vec<String> },

    /// Capability not provided by this reader
    #[error("Unsupported feature: {0}")]
    Unsupported(String),
}

impl BinaryError {
    /// Create a new signature mismatch error
    pub fn signature_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        Self::SignatureMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a new decompression failed error
    pub fn decompression_failed<S: Into<String>>(msg: S) -> Self {
        Self::DecompressionFailed(msg.into())
    }

    /// Create a new unsupported compression error
    pub fn unsupported_compression<S: Into<String>>(compression: S) -> Self {
        Self::UnsupportedCompression(compression.into())
    }

    /// Create a new out of range error
    pub fn out_of_range(position: u64, requested: u64, length: u64) -> Self {
        Self::OutOfRange {
            position,
            requested,
            length,
        }
    }

    /// Create a new unsupported feature error
    pub fn unsupported<S: Into<String>>(feature: S) -> Self {
        Self::Unsupported(feature.into())
    }

    /// Whether this error aborts a bundle parse as a whole.
    ///
    /// Only [`BinaryError::EntryFillFailure`] is reported after every entry
    /// has been attempted; everything else stops the parse where it occurs.
    pub fn is_structural(&self) -> bool {
        !matches!(self, BinaryError::EntryFillFailure { .. })
    }
}

#[cfg(feature = "lz4")]
impl From<lz4_flex::block::DecompressError> for BinaryError {
    fn from(err: lz4_flex::block::DecompressError) -> Self {
        Self::decompression_failed(format!("LZ4 decompression failed: {}", err))
    }
}

#[cfg(feature = "lzma")]
impl From<lzma_rs::error::Error> for BinaryError {
    fn from(err: lzma_rs::error::Error) -> Self {
        Self::decompression_failed(format!("LZMA decompression failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_mismatch_error() {
        let err = BinaryError::signature_mismatch("UnityFS", "UnityWeb");
        assert!(matches!(err, BinaryError::SignatureMismatch { .. }));
        assert_eq!(
            err.to_string(),
            "Signature mismatch: expected UnityFS, got UnityWeb"
        );
    }

    #[test]
    fn test_out_of_range_error() {
        let err = BinaryError::out_of_range(10, 8, 12);
        assert_eq!(
            err.to_string(),
            "Out of range: 8 bytes at position 10, length 12"
        );
    }

    #[test]
    fn test_entry_failure_is_not_structural() {
        let err = BinaryError::EntryFillFailure {
            failed: vec!["CAB-a".to_string(), "CAB-b".to_string()],
        };
        assert!(!err.is_structural());
        assert_eq!(err.to_string(), "2 entries failed: CAB-a, CAB-b");
        assert!(BinaryError::UnsupportedVersion(7).is_structural());
        assert!(BinaryError::UnsupportedFlag(0x80).is_structural());
    }
}
