//! UnityFS header parsing and the quick-check routine
//!
//! The header is stored big-endian directly at the start of the file:
//! signature, format version, player and engine version strings, declared
//! bundle size, table sizes and the archive flags.

use crate::compression::CompressionType;
use crate::error::{BinaryError, Result};
use crate::reader::{EndianReader, open_file_reader};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Known bundle signatures
pub mod signatures {
    /// Signature of UnityFS containers
    pub const UNITY_FS: &str = "UnityFS";
    /// Signature as stored on disk, terminator included
    pub const UNITY_FS_RAW: &[u8; 8] = b"UnityFS\0";
}

/// The only UnityFS format version this crate reads
pub const SUPPORTED_FORMAT_VERSION: i32 = 6;

/// Bits of the archive flag word
pub struct ArchiveFlags;

impl ArchiveFlags {
    /// Table compression method
    pub const COMPRESSION_TYPE_MASK: u32 = CompressionType::MASK;
    /// Table stored after the blocks; not supported
    pub const BLOCK_INFO_AT_END: u32 = 0x80;
}

/// UnityFS header
#[derive(Debug, Clone, Default, Serialize)]
pub struct BundleHeader {
    /// Bundle signature, without terminator
    pub signature: String,
    /// Container format version
    pub format_version: i32,
    /// Player version that built the bundle
    pub version_player: String,
    /// Engine version that built the bundle
    pub version_engine: String,
    /// Declared size of the whole bundle
    pub bundle_size: i64,
    /// Size of the table as stored
    pub table_compressed_size: u32,
    /// Size of the decoded table
    pub table_uncompressed_size: u32,
    /// Archive flags (table compression method and layout bits)
    pub flags: u32,
    /// Offset of the first byte after the header
    pub header_size: u64,
}

impl BundleHeader {
    /// Read the signature, version, version strings and declared size.
    ///
    /// Stops at the first mismatch: a wrong signature is reported before the
    /// version is read, an unsupported version before the strings are read.
    pub fn read_preamble(reader: &mut dyn EndianReader) -> Result<Self> {
        let take = reader.remaining().min(signatures::UNITY_FS_RAW.len() as u64) as usize;
        let raw = reader.read_bytes(take)?;
        if raw.as_slice() != signatures::UNITY_FS_RAW {
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            return Err(BinaryError::signature_mismatch(
                signatures::UNITY_FS.to_string(),
                String::from_utf8_lossy(&raw[..end]).into_owned(),
            ));
        }

        let format_version = reader.read_i32()?;
        if format_version != SUPPORTED_FORMAT_VERSION {
            return Err(BinaryError::UnsupportedVersion(format_version));
        }

        let version_player = reader.read_string_to_null()?;
        let version_engine = reader.read_string_to_null()?;
        let bundle_size = reader.read_i64()?;

        Ok(Self {
            signature: signatures::UNITY_FS.to_string(),
            format_version,
            version_player,
            version_engine,
            bundle_size,
            header_size: reader.position(),
            ..Default::default()
        })
    }

    /// Read the complete header
    pub fn from_reader(reader: &mut dyn EndianReader) -> Result<Self> {
        let mut header = Self::read_preamble(reader)?;
        header.table_compressed_size = reader.read_u32()?;
        header.table_uncompressed_size = reader.read_u32()?;
        header.flags = reader.read_u32()?;
        header.header_size = reader.position();
        Ok(header)
    }

    /// Compression method of the table
    pub fn compression_type(&self) -> Result<CompressionType> {
        CompressionType::from_flags(self.flags & ArchiveFlags::COMPRESSION_TYPE_MASK)
    }

    /// Check if the table is stored after the blocks
    pub fn block_info_at_end(&self) -> bool {
        (self.flags & ArchiveFlags::BLOCK_INFO_AT_END) != 0
    }
}

/// Declared size of the bundle at `path`.
///
/// Only the header preamble is read. Returns 0 when the file cannot be
/// opened, the signature or version does not match, the header is truncated,
/// or the declared size is negative or larger than the file.
pub fn bundle_size<P: AsRef<Path>>(path: P) -> i64 {
    let path = path.as_ref();
    match quick_check(path) {
        Ok(size) => size,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "bundle quick-check failed");
            0
        }
    }
}

/// Whether `path` looks like a complete UnityFS bundle
pub fn bundle_valid<P: AsRef<Path>>(path: P) -> bool {
    bundle_size(path) > 0
}

fn quick_check(path: &Path) -> Result<i64> {
    let mut reader = open_file_reader(path)?;
    let header = BundleHeader::read_preamble(reader.as_mut())?;
    if header.bundle_size < 0 || header.bundle_size as u64 > reader.len() {
        debug!(
            path = %path.display(),
            declared = header.bundle_size,
            actual = reader.len(),
            "declared bundle size does not fit the file"
        );
        return Ok(0);
    }
    Ok(header.bundle_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::memory_reader;

    fn preamble(signature: &[u8], version: i32) -> Vec<u8> {
        let mut data = signature.to_vec();
        data.extend_from_slice(&version.to_be_bytes());
        data.extend_from_slice(b"5.x.x\0");
        data.extend_from_slice(b"2019.4.40f1\0");
        data.extend_from_slice(&1234i64.to_be_bytes());
        data
    }

    #[test]
    fn test_header_fields() {
        let mut data = preamble(b"UnityFS\0", 6);
        data.extend_from_slice(&40u32.to_be_bytes());
        data.extend_from_slice(&60u32.to_be_bytes());
        data.extend_from_slice(&0x42u32.to_be_bytes());
        let mut reader = memory_reader(data);

        let header = BundleHeader::from_reader(reader.as_mut()).unwrap();
        assert_eq!(header.signature, "UnityFS");
        assert_eq!(header.format_version, 6);
        assert_eq!(header.version_player, "5.x.x");
        assert_eq!(header.version_engine, "2019.4.40f1");
        assert_eq!(header.bundle_size, 1234);
        assert_eq!(header.table_compressed_size, 40);
        assert_eq!(header.table_uncompressed_size, 60);
        assert_eq!(header.compression_type().unwrap(), CompressionType::Lz4Hc);
        assert!(!header.block_info_at_end());
        assert_eq!(header.header_size, reader.position());
    }

    #[test]
    fn test_signature_mismatch_stops_early() {
        let mut reader = memory_reader(preamble(b"UnityWeb", 6));
        let err = BundleHeader::from_reader(reader.as_mut()).unwrap_err();
        match err {
            BinaryError::SignatureMismatch { expected, actual } => {
                assert_eq!(expected, "UnityFS");
                assert_eq!(actual, "UnityWeb");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(reader.position(), 8);
    }

    #[test]
    fn test_short_input_is_signature_mismatch() {
        let mut reader = memory_reader(b"Unity".to_vec());
        assert!(matches!(
            BundleHeader::read_preamble(reader.as_mut()),
            Err(BinaryError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn test_version_gate() {
        for version in [0, -1, 5, 7] {
            let mut reader = memory_reader(preamble(b"UnityFS\0", version));
            let err = BundleHeader::read_preamble(reader.as_mut()).unwrap_err();
            assert!(matches!(err, BinaryError::UnsupportedVersion(v) if v == version));
            assert_eq!(reader.position(), 12);
        }
    }
}
