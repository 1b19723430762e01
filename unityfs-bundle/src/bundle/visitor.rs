//! Structural events emitted while a bundle is parsed
//!
//! The parser decides nothing about entry contents. Every structural step is
//! reported to a [`BundleVisitor`], and each entry is handed over together
//! with the shared chunk reader so the visitor can pull out what it needs.

use super::parser::BundleFile;
use super::types::{BlockInfo, EntryInfo};
use crate::error::{BinaryError, Result};
use crate::reader::EndianReader;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Receiver of bundle parse events. Every method defaults to doing nothing.
pub trait BundleVisitor {
    /// The table is about to be read; `reader` is the header reader
    /// positioned at `table_start`.
    fn begin_table(&mut self, _reader: &mut dyn EndianReader, _table_start: u64) {}

    /// The table has been decoded; `reader` is positioned at `table_end`.
    fn end_table(&mut self, _reader: &mut dyn EndianReader, _table_end: u64) {}

    fn begin_blocks(&mut self, _count: usize) {}

    fn on_block(&mut self, _index: usize, _block: &BlockInfo) {}

    fn end_blocks(&mut self) {}

    fn begin_entries(&mut self, _count: usize) {}

    /// Fill one entry. `reader` is the shared chunk reader, positioned at
    /// `entry.offset` when that offset lies inside the block data.
    ///
    /// An error marks this entry as failed; the remaining entries are still
    /// visited.
    fn on_entry(
        &mut self,
        _index: usize,
        _entry: &EntryInfo,
        _reader: &mut dyn EndianReader,
    ) -> Result<()> {
        Ok(())
    }

    fn end_entries(&mut self) {}

    /// The bundle is fully built
    fn end_bundle(&mut self, _bundle: &BundleFile) {}
}

impl<V: BundleVisitor + ?Sized> BundleVisitor for &mut V {
    fn begin_table(&mut self, reader: &mut dyn EndianReader, table_start: u64) {
        (**self).begin_table(reader, table_start)
    }

    fn end_table(&mut self, reader: &mut dyn EndianReader, table_end: u64) {
        (**self).end_table(reader, table_end)
    }

    fn begin_blocks(&mut self, count: usize) {
        (**self).begin_blocks(count)
    }

    fn on_block(&mut self, index: usize, block: &BlockInfo) {
        (**self).on_block(index, block)
    }

    fn end_blocks(&mut self) {
        (**self).end_blocks()
    }

    fn begin_entries(&mut self, count: usize) {
        (**self).begin_entries(count)
    }

    fn on_entry(
        &mut self,
        index: usize,
        entry: &EntryInfo,
        reader: &mut dyn EndianReader,
    ) -> Result<()> {
        (**self).on_entry(index, entry, reader)
    }

    fn end_entries(&mut self) {
        (**self).end_entries()
    }

    fn end_bundle(&mut self, bundle: &BundleFile) {
        (**self).end_bundle(bundle)
    }
}

/// Visitor that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullVisitor;

impl BundleVisitor for NullVisitor {}

/// One recorded parse event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum VisitEvent {
    BeginTable { start: u64 },
    EndTable { end: u64 },
    BeginBlocks { count: usize },
    Block { index: usize },
    EndBlocks,
    BeginEntries { count: usize },
    Entry { index: usize },
    EndEntries,
    EndBundle,
}

/// Visitor that records every event it receives
#[derive(Debug, Default, Clone, Serialize)]
pub struct CollectingVisitor {
    pub events: Vec<VisitEvent>,
    pub blocks: Vec<BlockInfo>,
    pub entries: Vec<EntryInfo>,
    /// Reader position reported with each entry
    pub entry_positions: Vec<u64>,
}

impl CollectingVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the event sequence ran to completion
    pub fn finished(&self) -> bool {
        self.events.last() == Some(&VisitEvent::EndBundle)
    }
}

impl BundleVisitor for CollectingVisitor {
    fn begin_table(&mut self, _reader: &mut dyn EndianReader, table_start: u64) {
        self.events.push(VisitEvent::BeginTable { start: table_start });
    }

    fn end_table(&mut self, _reader: &mut dyn EndianReader, table_end: u64) {
        self.events.push(VisitEvent::EndTable { end: table_end });
    }

    fn begin_blocks(&mut self, count: usize) {
        self.events.push(VisitEvent::BeginBlocks { count });
    }

    fn on_block(&mut self, index: usize, block: &BlockInfo) {
        self.events.push(VisitEvent::Block { index });
        self.blocks.push(*block);
    }

    fn end_blocks(&mut self) {
        self.events.push(VisitEvent::EndBlocks);
    }

    fn begin_entries(&mut self, count: usize) {
        self.events.push(VisitEvent::BeginEntries { count });
    }

    fn on_entry(
        &mut self,
        index: usize,
        entry: &EntryInfo,
        reader: &mut dyn EndianReader,
    ) -> Result<()> {
        self.events.push(VisitEvent::Entry { index });
        self.entries.push(entry.clone());
        self.entry_positions.push(reader.position());
        Ok(())
    }

    fn end_entries(&mut self) {
        self.events.push(VisitEvent::EndEntries);
    }

    fn end_bundle(&mut self, _bundle: &BundleFile) {
        self.events.push(VisitEvent::EndBundle);
    }
}

/// Bytes copied per read while streaming an entry to disk
const EXTRACT_PIECE: u64 = 1024 * 1024;

enum ExtractTarget {
    Memory(BTreeMap<String, Vec<u8>>),
    Directory { root: PathBuf, written: Vec<PathBuf> },
}

/// Visitor that copies every entry out of the bundle
pub struct ExtractingVisitor {
    target: ExtractTarget,
}

impl ExtractingVisitor {
    /// Keep extracted entries in memory, keyed by name
    pub fn in_memory() -> Self {
        Self {
            target: ExtractTarget::Memory(BTreeMap::new()),
        }
    }

    /// Write each entry to a file under `root`
    pub fn to_directory<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            target: ExtractTarget::Directory {
                root: root.into(),
                written: Vec::new(),
            },
        }
    }

    /// Entries extracted in memory
    pub fn entries(&self) -> Option<&BTreeMap<String, Vec<u8>>> {
        match &self.target {
            ExtractTarget::Memory(entries) => Some(entries),
            ExtractTarget::Directory { .. } => None,
        }
    }

    /// Take the entries extracted in memory
    pub fn into_entries(self) -> BTreeMap<String, Vec<u8>> {
        match self.target {
            ExtractTarget::Memory(entries) => entries,
            ExtractTarget::Directory { .. } => BTreeMap::new(),
        }
    }

    /// Files written so far
    pub fn written(&self) -> &[PathBuf] {
        match &self.target {
            ExtractTarget::Memory(_) => &[],
            ExtractTarget::Directory { written, .. } => written,
        }
    }
}

impl BundleVisitor for ExtractingVisitor {
    fn on_entry(
        &mut self,
        index: usize,
        entry: &EntryInfo,
        reader: &mut dyn EndianReader,
    ) -> Result<()> {
        let mut view = reader.sub_reader(entry.offset, entry.size)?;
        match &mut self.target {
            ExtractTarget::Memory(entries) => {
                let size = usize::try_from(entry.size).map_err(|_| {
                    BinaryError::unsupported(format!(
                        "Entry {} is too large to hold in memory",
                        entry.name
                    ))
                })?;
                entries.insert(entry.name.clone(), view.read_bytes(size)?);
            }
            ExtractTarget::Directory { root, written } => {
                let name = file_name_for(index, &entry.name);
                let mut path = root.join(&name);
                if written.contains(&path) {
                    path = root.join(format!("{index}_{name}"));
                }
                stream_to_file(view.as_mut(), &path)?;
                debug!(entry = %entry.name, path = %path.display(), "extracted entry");
                written.push(path);
            }
        }
        Ok(())
    }
}

fn stream_to_file(view: &mut dyn EndianReader, path: &Path) -> Result<()> {
    let mut file = fs::File::create(path)?;
    let mut piece = Vec::new();
    while view.remaining() > 0 {
        piece.resize(view.remaining().min(EXTRACT_PIECE) as usize, 0);
        view.read_into(&mut piece)?;
        file.write_all(&piece)?;
        view.trim();
    }
    file.flush()?;
    Ok(())
}

/// Last path component of an entry name, or a placeholder when the name has
/// no usable component
fn file_name_for(index: usize, name: &str) -> String {
    match name.rsplit(['/', '\\', ':']).next() {
        Some(last) if !last.is_empty() && last != "." && last != ".." => last.to_string(),
        _ => format!("entry_{index}"),
    }
}
