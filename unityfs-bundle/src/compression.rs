//! Block compression methods and the decompression capability
//!
//! The readers and the bundle parser never call a codec directly; they go
//! through a [`Decompressor`] supplied by the caller. [`StandardDecompressor`]
//! is the built-in implementation backed by `lz4_flex` and `lzma-rs`.

use crate::error::{BinaryError, Result};

/// Compression methods selected by the low bits of a block or table flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// Stored verbatim
    None = 0,
    /// LZMA compression
    Lzma = 1,
    /// LZ4 compression
    Lz4 = 2,
    /// LZ4HC (High Compression) compression
    Lz4Hc = 3,
    /// LZHAM compression
    Lzham = 4,
}

impl CompressionType {
    /// Mask selecting the compression method from a flag
    pub const MASK: u32 = 0x3F;

    /// Create compression type from block/table flags
    pub fn from_flags(flags: u32) -> Result<Self> {
        match flags & Self::MASK {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lzma),
            2 => Ok(CompressionType::Lz4),
            3 => Ok(CompressionType::Lz4Hc),
            4 => Ok(CompressionType::Lzham),
            other => Err(BinaryError::unsupported_compression(format!(
                "Unknown compression type: {}",
                other
            ))),
        }
    }

    /// Get the name of the compression type
    pub fn name(self) -> &'static str {
        match self {
            CompressionType::None => "None",
            CompressionType::Lzma => "LZMA",
            CompressionType::Lz4 => "LZ4",
            CompressionType::Lz4Hc => "LZ4HC",
            CompressionType::Lzham => "LZHAM",
        }
    }
}

/// Block decompression capability.
///
/// Implementations must fill `output` completely; producing fewer or more
/// bytes than `output.len()` is a [`BinaryError::DecompressionFailed`].
pub trait Decompressor {
    fn decompress(&self, method: CompressionType, input: &[u8], output: &mut [u8]) -> Result<()>;
}

impl<F> Decompressor for F
where
    F: Fn(CompressionType, &[u8], &mut [u8]) -> Result<()>,
{
    fn decompress(&self, method: CompressionType, input: &[u8], output: &mut [u8]) -> Result<()> {
        self(method, input, output)
    }
}

/// Decompressor for the methods Unity writes in practice
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDecompressor;

impl Decompressor for StandardDecompressor {
    fn decompress(&self, method: CompressionType, input: &[u8], output: &mut [u8]) -> Result<()> {
        match method {
            CompressionType::None => {
                if input.len() != output.len() {
                    return Err(BinaryError::decompression_failed(format!(
                        "Stored block size mismatch: expected {}, got {}",
                        output.len(),
                        input.len()
                    )));
                }
                output.copy_from_slice(input);
                Ok(())
            }
            CompressionType::Lz4 | CompressionType::Lz4Hc => decompress_lz4(input, output),
            CompressionType::Lzma => decompress_lzma(input, output),
            CompressionType::Lzham => Err(BinaryError::unsupported_compression(
                "LZHAM compression not yet supported",
            )),
        }
    }
}

/// Decompress an LZ4 block (Unity uses the block format, not frames)
#[cfg(feature = "lz4")]
fn decompress_lz4(input: &[u8], output: &mut [u8]) -> Result<()> {
    let written = lz4_flex::block::decompress_into(input, output)?;
    if written != output.len() {
        return Err(BinaryError::decompression_failed(format!(
            "LZ4 size mismatch: expected {}, got {}",
            output.len(),
            written
        )));
    }
    Ok(())
}

#[cfg(not(feature = "lz4"))]
fn decompress_lz4(_input: &[u8], _output: &mut [u8]) -> Result<()> {
    Err(BinaryError::unsupported_compression(
        "LZ4 compression requires the lz4 feature",
    ))
}

/// Decompress an LZMA block.
///
/// Unity stores the 5 property bytes followed by the raw stream, without the
/// 8-byte size field of the `.lzma` container; the size comes from the table.
#[cfg(feature = "lzma")]
fn decompress_lzma(input: &[u8], output: &mut [u8]) -> Result<()> {
    use lzma_rs::decompress::{Options, UnpackedSize};

    let expected = output.len();
    let options = Options {
        unpacked_size: UnpackedSize::UseProvided(Some(expected as u64)),
        ..Default::default()
    };
    let mut sink: &mut [u8] = output;
    lzma_rs::lzma_decompress_with_options(&mut std::io::Cursor::new(input), &mut sink, &options)?;
    if !sink.is_empty() {
        return Err(BinaryError::decompression_failed(format!(
            "LZMA size mismatch: expected {}, got {}",
            expected,
            expected - sink.len()
        )));
    }
    Ok(())
}

#[cfg(not(feature = "lzma"))]
fn decompress_lzma(_input: &[u8], _output: &mut [u8]) -> Result<()> {
    Err(BinaryError::unsupported_compression(
        "LZMA compression requires the lzma feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_type_from_flags() {
        assert_eq!(
            CompressionType::from_flags(0).unwrap(),
            CompressionType::None
        );
        assert_eq!(
            CompressionType::from_flags(1).unwrap(),
            CompressionType::Lzma
        );
        assert_eq!(
            CompressionType::from_flags(3).unwrap(),
            CompressionType::Lz4Hc
        );

        // Bits above the method mask are ignored
        assert_eq!(
            CompressionType::from_flags(0x42).unwrap(),
            CompressionType::Lz4
        );
        assert!(matches!(
            CompressionType::from_flags(9),
            Err(BinaryError::UnsupportedCompression(_))
        ));
    }

    #[test]
    fn test_compression_type_names() {
        assert_eq!(CompressionType::None.name(), "None");
        assert_eq!(CompressionType::Lz4.name(), "LZ4");
        assert_eq!(CompressionType::Lzma.name(), "LZMA");
    }

    #[test]
    fn test_stored_size_mismatch() {
        let mut output = [0u8; 4];
        let err = StandardDecompressor
            .decompress(CompressionType::None, b"abc", &mut output)
            .unwrap_err();
        assert!(matches!(err, BinaryError::DecompressionFailed(_)));
    }

    #[test]
    fn test_lzham_is_unsupported() {
        let mut output = [0u8; 4];
        let err = StandardDecompressor
            .decompress(CompressionType::Lzham, b"abcd", &mut output)
            .unwrap_err();
        assert!(matches!(err, BinaryError::UnsupportedCompression(_)));
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn test_lz4_round_trip() {
        let plain: Vec<u8> = b"UnityFS block payload ".repeat(40);
        let packed = lz4_flex::block::compress(&plain);
        let mut output = vec![0u8; plain.len()];
        StandardDecompressor
            .decompress(CompressionType::Lz4Hc, &packed, &mut output)
            .unwrap();
        assert_eq!(output, plain);

        let mut short = vec![0u8; plain.len() + 10];
        assert!(
            StandardDecompressor
                .decompress(CompressionType::Lz4, &packed, &mut short)
                .is_err()
        );
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn test_lz4_corrupt_stream() {
        let mut output = vec![0u8; 64];
        let err = StandardDecompressor
            .decompress(CompressionType::Lz4, &[0xF0, 0xFF, 0xFF], &mut output)
            .unwrap_err();
        assert!(matches!(err, BinaryError::DecompressionFailed(_)));
    }

    #[cfg(feature = "lzma")]
    #[test]
    fn test_lzma_round_trip() {
        let plain: Vec<u8> = b"UnityFS lzma block ".repeat(50);
        let mut packed = Vec::new();
        lzma_rs::lzma_compress(&mut &plain[..], &mut packed).unwrap();
        // Unity drops the 8-byte size field after the 5 property bytes
        packed.drain(5..13);

        let mut output = vec![0u8; plain.len()];
        StandardDecompressor
            .decompress(CompressionType::Lzma, &packed, &mut output)
            .unwrap();
        assert_eq!(output, plain);

        let mut short = vec![0u8; plain.len() - 7];
        let err = StandardDecompressor
            .decompress(CompressionType::Lzma, &packed, &mut short)
            .unwrap_err();
        assert!(matches!(err, BinaryError::DecompressionFailed(_)));

        let mut long = vec![0u8; plain.len() + 7];
        let err = StandardDecompressor
            .decompress(CompressionType::Lzma, &packed, &mut long)
            .unwrap_err();
        assert!(matches!(err, BinaryError::DecompressionFailed(_)));
    }

    #[test]
    fn test_closure_decompressor() {
        let invert = |_method: CompressionType, input: &[u8], output: &mut [u8]| -> Result<()> {
            for (dst, src) in output.iter_mut().zip(input) {
                *dst = !src;
            }
            Ok(())
        };
        let mut output = [0u8; 2];
        invert
            .decompress(CompressionType::Lz4, &[0x00, 0x0F], &mut output)
            .unwrap();
        assert_eq!(output, [0xFF, 0xF0]);
    }
}
