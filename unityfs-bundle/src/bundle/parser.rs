//! Bundle parser implementation
//!
//! Parsing runs through fixed stages: header, table, blocks, entries. The
//! table is decoded into its own buffer, the blocks become
//! [`CompressedChunk`]s over the original reader, and one shared chunk reader
//! spans the plaintext of all blocks. Entries are handed to the visitor with
//! that reader; a failing entry does not stop the others.
//!
//! [`BundleParser`] drives one parse and remembers the stage it reached, so a
//! caller can tell a structural failure from a bundle whose entries failed.

use super::header::{ArchiveFlags, BundleHeader};
use super::types::{BlockInfo, BundleOptions, EntryInfo, ParseStage};
use super::visitor::BundleVisitor;
use crate::chunk::CompressedChunk;
use crate::error::{BinaryError, Result};
use crate::reader::{
    EndianReader, check_range, chunk_reader_with_budget, memory_reader, open_file_reader,
};
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, warn};

/// Size of the uninterpreted prefix of the decoded table
pub const TABLE_HASH_SIZE: usize = 16;

/// A parsed UnityFS bundle.
///
/// Owns the reader it was parsed from, the block chunks and the shared chunk
/// reader. Dropping it releases every decoded buffer.
pub struct BundleFile {
    header: BundleHeader,
    table_hash: [u8; TABLE_HASH_SIZE],
    blocks: Vec<BlockInfo>,
    chunks: Vec<Rc<CompressedChunk>>,
    entries: Vec<EntryInfo>,
    header_reader: Box<dyn EndianReader>,
    chunk_reader: Box<dyn EndianReader>,
}

impl BundleFile {
    /// Parse the bundle at `path`
    pub fn open<P: AsRef<Path>, V: BundleVisitor + ?Sized>(
        path: P,
        visitor: &mut V,
    ) -> Result<Self> {
        Self::open_with_options(path, visitor, &BundleOptions::default())
    }

    /// Parse the bundle at `path` with custom options
    pub fn open_with_options<P: AsRef<Path>, V: BundleVisitor + ?Sized>(
        path: P,
        visitor: &mut V,
        options: &BundleOptions,
    ) -> Result<Self> {
        Self::parse_with_options(open_file_reader(path)?, visitor, options)
    }

    /// Parse a bundle held in memory
    pub fn from_bytes<V: BundleVisitor + ?Sized>(data: Vec<u8>, visitor: &mut V) -> Result<Self> {
        Self::parse(memory_reader(data), visitor)
    }

    /// Parse a bundle from `reader`, starting at its current position
    pub fn parse<V: BundleVisitor + ?Sized>(
        reader: Box<dyn EndianReader>,
        visitor: &mut V,
    ) -> Result<Self> {
        Self::parse_with_options(reader, visitor, &BundleOptions::default())
    }

    /// Parse a bundle from `reader` with custom options.
    ///
    /// When some entries fail, every entry is still visited and
    /// [`BundleVisitor::end_bundle`] still runs; the call then returns
    /// [`BinaryError::EntryFillFailure`] naming the failed entries.
    pub fn parse_with_options<V: BundleVisitor + ?Sized>(
        reader: Box<dyn EndianReader>,
        visitor: &mut V,
        options: &BundleOptions,
    ) -> Result<Self> {
        BundleParser::new(options.clone()).parse(reader, visitor)
    }

    /// Bundle header
    pub fn header(&self) -> &BundleHeader {
        &self.header
    }

    /// The 16-byte prefix of the decoded table, uninterpreted
    pub fn table_hash(&self) -> &[u8; TABLE_HASH_SIZE] {
        &self.table_hash
    }

    /// Block records in file order
    pub fn blocks(&self) -> &[BlockInfo] {
        &self.blocks
    }

    /// Block chunks in file order
    pub fn chunks(&self) -> &[Rc<CompressedChunk>] {
        &self.chunks
    }

    /// Directory entries in table order
    pub fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    /// Total plaintext size of all blocks
    pub fn data_size(&self) -> u64 {
        self.chunk_reader.len()
    }

    /// Find an entry by name
    pub fn find_entry(&self, name: &str) -> Option<&EntryInfo> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Reader scoped to one entry, touching only the blocks it overlaps
    pub fn entry_reader(&self, entry: &EntryInfo) -> Result<Box<dyn EndianReader>> {
        self.chunk_reader.sub_reader(entry.offset, entry.size)
    }

    /// Copy out the bytes of the entry called `name`
    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .find_entry(name)
            .ok_or_else(|| BinaryError::EntryNotFound(name.to_string()))?;
        let size = usize::try_from(entry.size)
            .map_err(|_| BinaryError::unsupported(format!("Entry '{}' is too large", name)))?;
        let mut reader = self.entry_reader(entry)?;
        reader.read_bytes(size)
    }

    /// Shared reader over the plaintext of all blocks
    pub fn chunk_reader(&mut self) -> &mut dyn EndianReader {
        self.chunk_reader.as_mut()
    }

    /// Reader the bundle was parsed from
    pub fn header_reader(&mut self) -> &mut dyn EndianReader {
        self.header_reader.as_mut()
    }
}

impl std::fmt::Debug for BundleFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleFile")
            .field("header", &self.header)
            .field("blocks", &self.blocks.len())
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

/// Drives a bundle parse through its stages.
///
/// After [`BundleParser::parse`] returns, [`BundleParser::stage`] is `Done`
/// when the bundle was built (even if some entries failed) and `Failed` when
/// a structural error stopped the parse; [`BundleParser::failed_at`] then
/// names the last stage that completed.
#[derive(Debug)]
pub struct BundleParser {
    options: BundleOptions,
    stage: ParseStage,
    failed_at: Option<ParseStage>,
}

impl BundleParser {
    pub fn new(options: BundleOptions) -> Self {
        Self {
            options,
            stage: ParseStage::Unparsed,
            failed_at: None,
        }
    }

    /// Stage the most recent parse reached
    pub fn stage(&self) -> ParseStage {
        self.stage
    }

    /// Last completed stage of a parse that failed structurally
    pub fn failed_at(&self) -> Option<ParseStage> {
        self.failed_at
    }

    /// Parse a bundle from `reader`, starting at its current position
    pub fn parse<V: BundleVisitor + ?Sized>(
        &mut self,
        reader: Box<dyn EndianReader>,
        visitor: &mut V,
    ) -> Result<BundleFile> {
        self.stage = ParseStage::Unparsed;
        self.failed_at = None;
        self.execute(reader, visitor).inspect_err(|err| self.fail(err))
    }

    fn advance(&mut self, next: ParseStage) {
        debug!(from = ?self.stage, to = ?next, "bundle parse stage");
        self.stage = next;
    }

    fn fail(&mut self, err: &BinaryError) {
        if err.is_structural() {
            debug!(at = ?self.stage, error = %err, "bundle parse failed");
            self.failed_at = Some(self.stage);
            self.stage = ParseStage::Failed;
        }
    }

    fn execute<V: BundleVisitor + ?Sized>(
        &mut self,
        mut reader: Box<dyn EndianReader>,
        visitor: &mut V,
    ) -> Result<BundleFile> {
        let options = self.options.clone();
        reader.set_byte_order(options.byte_order);

        let header = BundleHeader::from_reader(reader.as_mut())?;
        self.advance(ParseStage::HeaderRead);

        if header.block_info_at_end() {
            return Err(BinaryError::UnsupportedFlag(header.flags));
        }
        let table = Self::decode_table(&header, reader.as_mut(), visitor, &options)?;
        self.advance(ParseStage::TableDecoded);

        let mut table_reader = memory_reader(table);
        table_reader.set_byte_order(options.byte_order);
        let mut table_hash = [0u8; TABLE_HASH_SIZE];
        table_reader.read_into(&mut table_hash)?;

        let block_count = table_reader.read_i32()?.max(0) as usize;
        visitor.begin_blocks(block_count);
        let mut blocks = Vec::new();
        let mut chunks = Vec::new();
        let mut file_cursor = reader.position();
        let mut data_size = 0u64;
        for index in 0..block_count {
            let block = BlockInfo {
                uncompressed_size: table_reader.read_u32()?,
                compressed_size: table_reader.read_u32()?,
                flags: table_reader.read_u16()?,
            };
            chunks.push(Rc::new(CompressedChunk::new(
                reader.as_ref(),
                file_cursor,
                block.compressed_size,
                block.uncompressed_size,
                block.flags,
                Rc::clone(&options.decompressor),
            )));
            file_cursor += block.compressed_size as u64;
            data_size += block.uncompressed_size as u64;
            visitor.on_block(index, &block);
            blocks.push(block);
        }
        visitor.end_blocks();

        let mut chunk_reader =
            chunk_reader_with_budget(chunks.clone(), 0, data_size, options.chunk_budget)?;
        chunk_reader.set_byte_order(options.byte_order);
        self.advance(ParseStage::BlocksBuilt);

        let entry_count = table_reader.read_i32()?.max(0) as usize;
        visitor.begin_entries(entry_count);
        let mut entries = Vec::new();
        let mut failed = Vec::new();
        for index in 0..entry_count {
            let entry = EntryInfo {
                offset: table_reader.read_i64()? as u64,
                size: table_reader.read_i64()? as u64,
                flags: table_reader.read_u32()?,
                name: table_reader.read_string_to_null()?,
            };
            if entry.offset <= chunk_reader.len() {
                chunk_reader.set_position(entry.offset)?;
            }
            if let Err(err) = visitor.on_entry(index, &entry, chunk_reader.as_mut()) {
                warn!(entry = %entry.name, index, error = %err, "failed to fill bundle entry");
                failed.push(entry.name.clone());
            }
            entries.push(entry);
        }
        self.advance(ParseStage::EntriesBuilt);
        visitor.end_entries();

        let bundle = BundleFile {
            header,
            table_hash,
            blocks,
            chunks,
            entries,
            header_reader: reader,
            chunk_reader,
        };
        self.advance(ParseStage::Done);
        visitor.end_bundle(&bundle);

        if !failed.is_empty() {
            return Err(BinaryError::EntryFillFailure { failed });
        }
        Ok(bundle)
    }

    /// Decode the table that follows the header, leaving `reader` positioned
    /// just past the stored table
    fn decode_table<V: BundleVisitor + ?Sized>(
        header: &BundleHeader,
        reader: &mut dyn EndianReader,
        visitor: &mut V,
        options: &BundleOptions,
    ) -> Result<Vec<u8>> {
        let table_start = reader.position();
        visitor.begin_table(reader, table_start);
        reader.set_position(table_start)?;
        check_range(table_start, header.table_compressed_size as u64, reader.len())?;

        let table_chunk = CompressedChunk::new(
            reader,
            table_start,
            header.table_compressed_size,
            header.table_uncompressed_size,
            (header.flags & ArchiveFlags::COMPRESSION_TYPE_MASK) as u16,
            Rc::clone(&options.decompressor),
        );
        let mut table = vec![0u8; header.table_uncompressed_size as usize];
        table_chunk.decode_into(&mut table, &mut Vec::new())?;

        let table_end = table_start + header.table_compressed_size as u64;
        reader.set_position(table_end)?;
        visitor.end_table(reader, table_end);
        reader.set_position(table_end)?;
        Ok(table)
    }
}
