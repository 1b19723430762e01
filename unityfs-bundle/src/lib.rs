//! UnityFS Bundle Reader
//!
//! This crate reads Unity "UnityFS" asset bundle containers:
//! - a header with signature, format version and table sizes
//! - a compressed table listing the data blocks and the entry directory
//! - data blocks, each compressed on its own
//!
//! # Features
//!
//! - **Random-access readers**: one [`EndianReader`] interface over files,
//!   memory buffers and sequences of compressed chunks
//! - **Lazy decompression**: blocks are decoded on first touch and dropped
//!   again under a memory budget
//! - **Visitor-driven parsing**: entry contents are left to a [`BundleVisitor`]
//!
//! ## Feature Flags
//!
//! - `lz4`: LZ4 / LZ4HC blocks in [`StandardDecompressor`] (default)
//! - `lzma`: LZMA blocks in [`StandardDecompressor`] (default)
//!
//! # Example
//!
//! ```rust,no_run
//! use unityfs_bundle::{BundleFile, ExtractingVisitor};
//!
//! let mut visitor = ExtractingVisitor::in_memory();
//! let bundle = BundleFile::open("example.bundle", &mut visitor)?;
//! println!("Unity {}", bundle.header().version_engine);
//! for (name, bytes) in visitor.into_entries() {
//!     println!("  {}: {} bytes", name, bytes.len());
//! }
//! # Ok::<(), unityfs_bundle::BinaryError>(())
//! ```

pub mod bundle;
pub mod chunk;
pub mod compression;
pub mod error;
pub mod reader;

pub use bundle::{
    BlockInfo, BundleFile, BundleHeader, BundleOptions, BundleParser, BundleVisitor,
    CollectingVisitor, EntryInfo, ExtractingVisitor, ParseStage, bundle_size, bundle_valid,
};
pub use chunk::{ChunkPartition, CompressedChunk, partition_chunks};
pub use compression::{CompressionType, Decompressor, StandardDecompressor};
pub use error::{BinaryError, Result};
pub use reader::{ByteOrder, EndianReader, PointerView, TrimGuard};
