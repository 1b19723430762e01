//! Compressed chunks and chunk-range selection
//!
//! A [`CompressedChunk`] describes one independently compressed block: where
//! its bytes live in a source reader, how large it is before and after
//! decompression, and which method packed it. The plaintext is produced on
//! first use and cached inside the chunk until [`CompressedChunk::trim`].

use crate::compression::{CompressionType, Decompressor};
use crate::error::{BinaryError, Result};
use crate::reader::{EndianReader, check_range};
use std::cell::{Ref, RefCell};
use std::rc::Rc;
use tracing::trace;

/// One compressed block and its lazily decoded plaintext
pub struct CompressedChunk {
    source: RefCell<Box<dyn EndianReader>>,
    source_offset: u64,
    compressed_size: u32,
    uncompressed_size: u32,
    flags: u16,
    decompressor: Rc<dyn Decompressor>,
    decoded: RefCell<Option<Vec<u8>>>,
}

impl CompressedChunk {
    /// Describe a chunk stored at `source_offset` in `source`.
    ///
    /// The chunk keeps its own cursor over `source` (a clone), so reading it
    /// never disturbs the caller's position.
    pub fn new(
        source: &dyn EndianReader,
        source_offset: u64,
        compressed_size: u32,
        uncompressed_size: u32,
        flags: u16,
        decompressor: Rc<dyn Decompressor>,
    ) -> Self {
        Self {
            source: RefCell::new(source.box_clone()),
            source_offset,
            compressed_size,
            uncompressed_size,
            flags,
            decompressor,
            decoded: RefCell::new(None),
        }
    }

    /// Offset of the compressed bytes in the source reader
    pub fn source_offset(&self) -> u64 {
        self.source_offset
    }

    /// Size of the compressed bytes
    pub fn compressed_size(&self) -> u32 {
        self.compressed_size
    }

    /// Size of the plaintext
    pub fn uncompressed_size(&self) -> u32 {
        self.uncompressed_size
    }

    /// Raw block flags
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Compression method selected by the flags
    pub fn compression_type(&self) -> Result<CompressionType> {
        CompressionType::from_flags(self.flags as u32)
    }

    /// Whether the plaintext is currently cached
    pub fn is_materialized(&self) -> bool {
        self.decoded.borrow().is_some()
    }

    /// Fail unless the compressed bytes lie inside the source reader
    fn check_source(&self) -> Result<()> {
        let source_len = self.source.borrow().len();
        check_range(self.source_offset, self.compressed_size as u64, source_len)
    }

    /// Decode the plaintext into `output`, which must be exactly
    /// `uncompressed_size` bytes. `scratch` holds the compressed bytes and
    /// may be reused across calls.
    pub fn decode_into(&self, output: &mut [u8], scratch: &mut Vec<u8>) -> Result<()> {
        if output.len() != self.uncompressed_size as usize {
            return Err(BinaryError::decompression_failed(format!(
                "Output buffer is {} bytes, chunk decodes to {}",
                output.len(),
                self.uncompressed_size
            )));
        }

        if let Some(cached) = self.decoded.borrow().as_deref() {
            output.copy_from_slice(cached);
            return Ok(());
        }

        let method = self.compression_type()?;
        let mut source = self.source.borrow_mut();
        check_range(self.source_offset, self.compressed_size as u64, source.len())?;
        source.set_position(self.source_offset)?;

        if method == CompressionType::None {
            if self.compressed_size != self.uncompressed_size {
                return Err(BinaryError::decompression_failed(format!(
                    "Stored chunk size mismatch: compressed {}, uncompressed {}",
                    self.compressed_size, self.uncompressed_size
                )));
            }
            return source.read_into(output);
        }

        scratch.clear();
        scratch.resize(self.compressed_size as usize, 0);
        source.read_into(scratch)?;
        self.decompressor.decompress(method, scratch, output)
    }

    /// Decode and cache the plaintext. Returns `true` if this call did the
    /// decoding, `false` if it was already cached.
    pub fn materialize(&self, scratch: &mut Vec<u8>) -> Result<bool> {
        if self.is_materialized() {
            return Ok(false);
        }
        self.check_source()?;
        let mut plaintext = vec![0u8; self.uncompressed_size as usize];
        self.decode_into(&mut plaintext, scratch)?;
        trace!(
            offset = self.source_offset,
            size = self.uncompressed_size,
            "materialized chunk"
        );
        *self.decoded.borrow_mut() = Some(plaintext);
        Ok(true)
    }

    /// The cached plaintext, decoding it first if necessary
    pub fn plaintext(&self, scratch: &mut Vec<u8>) -> Result<Ref<'_, [u8]>> {
        self.materialize(scratch)?;
        Ref::filter_map(self.decoded.borrow(), |decoded| decoded.as_deref()).map_err(|_| {
            BinaryError::decompression_failed(format!(
                "Chunk at {} has no decoded buffer",
                self.source_offset
            ))
        })
    }

    /// Drop the cached plaintext. Returns `false` if nothing was cached or
    /// the buffer is currently borrowed.
    pub fn trim(&self) -> bool {
        match self.decoded.try_borrow_mut() {
            Ok(mut slot) => slot.take().is_some(),
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for CompressedChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedChunk")
            .field("source_offset", &self.source_offset)
            .field("compressed_size", &self.compressed_size)
            .field("uncompressed_size", &self.uncompressed_size)
            .field("flags", &self.flags)
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

/// Contiguous run of chunks covering a requested window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPartition {
    /// Index of the first selected chunk
    pub first: usize,
    /// Number of selected chunks
    pub count: usize,
    /// Bytes of the first selected chunk that precede the window
    pub bytes_trimmed: u64,
    /// Sum of compressed sizes over the selection
    pub bytes_compressed: u64,
    /// Sum of uncompressed sizes over the selection
    pub bytes_uncompressed: u64,
}

impl ChunkPartition {
    /// Index range of the selected chunks
    pub fn range(&self) -> std::ops::Range<usize> {
        self.first..self.first + self.count
    }
}

/// Select the minimal run of chunks whose plaintext intersects
/// `[offset, offset + length)` of the concatenated plaintext.
///
/// A chunk ending exactly at `offset` is not selected, and the scan stops at
/// the first chunk starting at or after the window end. Returns `None` when
/// nothing intersects, which includes every zero-length window.
pub fn partition_chunks(
    chunks: &[Rc<CompressedChunk>],
    offset: u64,
    length: u64,
) -> Option<ChunkPartition> {
    if length == 0 {
        return None;
    }
    let window_end = offset.saturating_add(length);

    let mut selection: Option<ChunkPartition> = None;
    let mut chunk_start = 0u64;
    for (index, chunk) in chunks.iter().enumerate() {
        if chunk_start >= window_end {
            break;
        }
        let chunk_end = chunk_start + chunk.uncompressed_size() as u64;
        if chunk_end > offset {
            let part = selection.get_or_insert(ChunkPartition {
                first: index,
                count: 0,
                bytes_trimmed: offset - chunk_start,
                bytes_compressed: 0,
                bytes_uncompressed: 0,
            });
            part.count += 1;
            part.bytes_compressed += chunk.compressed_size() as u64;
            part.bytes_uncompressed += chunk.uncompressed_size() as u64;
        }
        chunk_start = chunk_end;
    }
    selection
}
