//! Bundle data structures
//!
//! This module defines the table records and the parse options.

use crate::compression::{CompressionType, Decompressor, StandardDecompressor};
use crate::error::Result;
use crate::reader::{ByteOrder, DEFAULT_CHUNK_BUDGET};
use serde::Serialize;
use std::rc::Rc;

/// One block record of the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    /// Plaintext size of the block
    pub uncompressed_size: u32,
    /// Stored size of the block
    pub compressed_size: u32,
    /// Block flags; the low 6 bits select the compression method
    pub flags: u16,
}

impl BlockInfo {
    /// Compression method of this block
    pub fn compression_type(&self) -> Result<CompressionType> {
        CompressionType::from_flags(self.flags as u32)
    }

    /// Check if the block is stored without compression
    pub fn is_stored(&self) -> bool {
        (self.flags as u32 & CompressionType::MASK) == 0
    }
}

/// One entry of the bundle directory.
///
/// `offset` and `size` address the concatenated plaintext of all blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    /// Entry name
    pub name: String,
    /// Offset in the block plaintext
    pub offset: u64,
    /// Size of the entry
    pub size: u64,
    /// Entry flags
    pub flags: u32,
}

impl EntryInfo {
    /// Unity marks serialized files with bit 2 (0x4)
    pub fn is_serialized_file(&self) -> bool {
        (self.flags & 0x4) != 0
    }

    /// Get the end offset of this entry
    pub fn end_offset(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

/// Progress of a bundle parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseStage {
    Unparsed,
    HeaderRead,
    TableDecoded,
    BlocksBuilt,
    EntriesBuilt,
    Done,
    Failed,
}

/// Bundle parsing options
#[derive(Clone)]
pub struct BundleOptions {
    /// Codec used for the table and every block
    pub decompressor: Rc<dyn Decompressor>,
    /// Byte order of the header and table fields
    pub byte_order: ByteOrder,
    /// Decoded bytes the shared chunk reader keeps resident
    pub chunk_budget: usize,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            decompressor: Rc::new(StandardDecompressor),
            byte_order: ByteOrder::Big,
            chunk_budget: DEFAULT_CHUNK_BUDGET,
        }
    }
}

impl BundleOptions {
    /// Keep as little decoded data resident as possible (one chunk at a time)
    pub fn low_memory() -> Self {
        Self {
            chunk_budget: 0,
            ..Self::default()
        }
    }

    /// Default options with a caller-supplied codec
    pub fn with_decompressor<D: Decompressor + 'static>(decompressor: D) -> Self {
        Self {
            decompressor: Rc::new(decompressor),
            ..Self::default()
        }
    }

    /// Set the resident chunk budget
    pub fn chunk_budget(mut self, bytes: usize) -> Self {
        self.chunk_budget = bytes;
        self
    }
}

impl std::fmt::Debug for BundleOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleOptions")
            .field("byte_order", &self.byte_order)
            .field("chunk_budget", &self.chunk_budget)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_flags() {
        let entry = EntryInfo {
            name: "CAB-0123".to_string(),
            offset: 100,
            size: 20,
            flags: 4,
        };
        assert!(entry.is_serialized_file());
        assert_eq!(entry.end_offset(), 120);

        let resource = EntryInfo {
            flags: 0,
            ..entry
        };
        assert!(!resource.is_serialized_file());
    }

    #[test]
    fn test_block_method() {
        let block = BlockInfo {
            uncompressed_size: 10,
            compressed_size: 8,
            flags: 0x43,
        };
        assert_eq!(block.compression_type().unwrap(), CompressionType::Lz4Hc);
        assert!(!block.is_stored());
    }

    #[test]
    fn test_options() {
        let options = BundleOptions::default();
        assert_eq!(options.byte_order, ByteOrder::Big);
        assert_eq!(options.chunk_budget, DEFAULT_CHUNK_BUDGET);

        assert_eq!(BundleOptions::low_memory().chunk_budget, 0);
        assert_eq!(BundleOptions::default().chunk_budget(42).chunk_budget, 42);
    }
}
