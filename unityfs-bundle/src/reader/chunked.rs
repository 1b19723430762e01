//! Reader over a sequence of compressed chunks
//!
//! The chunks' plaintexts are laid end to end into one virtual address
//! space. The reader exposes the window `[discard, discard + length)` of that
//! space. Chunks are decoded on first touch and kept in a small LRU list
//! shared by the reader and all its clones and sub-readers; once the decoded
//! bytes in that list exceed the budget, least recently used chunks are
//! dropped again, except the one being read and except while a [`TrimGuard`]
//! is alive anywhere in the reader family.

use super::{ByteOrder, EndianReader, PointerView, TrimGuard, check_range};
use crate::chunk::{CompressedChunk, partition_chunks};
use crate::error::{BinaryError, Result};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::trace;

/// Decoded bytes a chunk reader keeps resident by default
pub const DEFAULT_CHUNK_BUDGET: usize = 16 * 1024 * 1024;

/// Chunks decoded through one reader family, least recently used first
#[derive(Default)]
struct Residency {
    lru: VecDeque<Rc<CompressedChunk>>,
}

impl Residency {
    fn touch(&mut self, chunk: &Rc<CompressedChunk>) {
        self.lru.retain(|other| !Rc::ptr_eq(other, chunk));
        self.lru.push_back(Rc::clone(chunk));
    }

    fn resident_bytes(&self) -> usize {
        self.lru
            .iter()
            .filter(|chunk| chunk.is_materialized())
            .map(|chunk| chunk.uncompressed_size() as usize)
            .sum()
    }

    /// Trim least recently used chunks other than `keep` until the decoded
    /// bytes fit `budget`. Chunks whose buffer is borrowed stay listed.
    fn evict_over(&mut self, budget: usize, keep: &Rc<CompressedChunk>) {
        let mut resident_bytes = self.resident_bytes();
        let mut slot = 0;
        while resident_bytes > budget && slot < self.lru.len() {
            let chunk = &self.lru[slot];
            if Rc::ptr_eq(chunk, keep) {
                slot += 1;
            } else if !chunk.is_materialized() {
                self.lru.remove(slot);
            } else if chunk.trim() {
                resident_bytes -= chunk.uncompressed_size() as usize;
                trace!(offset = chunk.source_offset(), "evicted chunk over budget");
                self.lru.remove(slot);
            } else {
                slot += 1;
            }
        }
    }

    /// Trim every listed chunk except `keep`
    fn release(&mut self, keep: Option<&Rc<CompressedChunk>>) {
        self.lru.retain(|chunk| {
            if keep.is_some_and(|keep| Rc::ptr_eq(chunk, keep)) {
                return true;
            }
            !chunk.trim() && chunk.is_materialized()
        });
    }
}

pub(crate) struct ChunkReader {
    chunks: Rc<[Rc<CompressedChunk>]>,
    /// Cumulative plaintext end of each chunk
    ends: Rc<[u64]>,
    discard: u64,
    length: u64,
    position: u64,
    byte_order: ByteOrder,
    budget: usize,
    residency: Rc<RefCell<Residency>>,
    scratch: Vec<u8>,
    trim_lock: Rc<Cell<usize>>,
}

impl ChunkReader {
    pub(crate) fn new(
        chunks: Vec<Rc<CompressedChunk>>,
        discard: u64,
        length: u64,
        budget: usize,
    ) -> Result<Self> {
        let mut reader = Self::with_lock(chunks.into(), discard, length, Rc::new(Cell::new(0)))?;
        reader.budget = budget;
        Ok(reader)
    }

    /// Reader in a fresh family around `trim_lock`; [`ChunkReader::sub_reader`]
    /// then joins it to its parent's residency list
    fn with_lock(
        chunks: Rc<[Rc<CompressedChunk>]>,
        discard: u64,
        length: u64,
        trim_lock: Rc<Cell<usize>>,
    ) -> Result<Self> {
        let mut total = 0u64;
        let ends: Rc<[u64]> = chunks
            .iter()
            .map(|chunk| {
                total += chunk.uncompressed_size() as u64;
                total
            })
            .collect();
        check_range(discard, length, total)?;

        Ok(Self {
            chunks,
            ends,
            discard,
            length,
            position: 0,
            byte_order: ByteOrder::default(),
            budget: DEFAULT_CHUNK_BUDGET,
            residency: Rc::default(),
            scratch: Vec::new(),
            trim_lock,
        })
    }

    fn chunk_start(&self, index: usize) -> u64 {
        if index == 0 { 0 } else { self.ends[index - 1] }
    }

    /// Chunk holding absolute plaintext offset `absolute`
    fn chunk_index(&self, absolute: u64) -> Option<usize> {
        let index = self.ends.partition_point(|&end| end <= absolute);
        (index < self.chunks.len()).then_some(index)
    }

    fn locked(&self) -> bool {
        self.trim_lock.get() > 0
    }

    /// Decode chunk `index` if needed, mark it most recently used and evict
    /// other chunks of the family while over budget.
    fn ensure(&mut self, index: usize) -> Result<()> {
        let chunk = &self.chunks[index];
        chunk.materialize(&mut self.scratch)?;

        let mut residency = self.residency.borrow_mut();
        residency.touch(chunk);
        if !self.locked() {
            residency.evict_over(self.budget, chunk);
        }
        Ok(())
    }

    /// Copy `buf.len()` bytes starting at reader position `position`
    fn copy_out(&mut self, position: u64, buf: &mut [u8]) -> Result<()> {
        let mut copied = 0usize;
        while copied < buf.len() {
            let absolute = self.discard + position + copied as u64;
            let index = self
                .chunk_index(absolute)
                .ok_or_else(|| BinaryError::out_of_range(position, buf.len() as u64, self.length))?;
            self.ensure(index)?;

            let offset = (absolute - self.chunk_start(index)) as usize;
            let chunk = Rc::clone(&self.chunks[index]);
            let plaintext = chunk.plaintext(&mut self.scratch)?;
            let take = (plaintext.len() - offset).min(buf.len() - copied);
            buf[copied..copied + take].copy_from_slice(&plaintext[offset..offset + take]);
            copied += take;
        }
        Ok(())
    }
}

impl EndianReader for ChunkReader {
    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    fn len(&self) -> u64 {
        self.length
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        check_range(position, 0, self.length)?;
        self.position = position;
        Ok(())
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        check_range(self.position, buf.len() as u64, self.length)?;
        self.copy_out(self.position, buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn EndianReader> {
        Box::new(Self {
            chunks: Rc::clone(&self.chunks),
            ends: Rc::clone(&self.ends),
            discard: self.discard,
            length: self.length,
            position: self.position,
            byte_order: self.byte_order,
            budget: self.budget,
            residency: Rc::clone(&self.residency),
            scratch: Vec::new(),
            trim_lock: Rc::clone(&self.trim_lock),
        })
    }

    fn sub_reader(&self, offset: u64, length: u64) -> Result<Box<dyn EndianReader>> {
        check_range(offset, length, self.length)?;
        let absolute = self.discard + offset;

        let mut sub = match partition_chunks(&self.chunks, absolute, length) {
            Some(part) => Self::with_lock(
                self.chunks[part.range()].into(),
                part.bytes_trimmed,
                length,
                Rc::clone(&self.trim_lock),
            )?,
            None => Self::with_lock(Rc::from(Vec::new()), 0, 0, Rc::clone(&self.trim_lock))?,
        };
        sub.budget = self.budget;
        sub.residency = Rc::clone(&self.residency);
        sub.byte_order = self.byte_order;
        Ok(Box::new(sub))
    }

    fn pointer_at(&mut self, position: u64, len: usize) -> Result<PointerView<'_>> {
        check_range(position, len as u64, self.length)?;
        let absolute = self.discard + position;
        let index = match self.chunk_index(absolute) {
            Some(index) if len > 0 && absolute + len as u64 <= self.ends[index] => index,
            _ => {
                let mut bytes = vec![0u8; len];
                self.copy_out(position, &mut bytes)?;
                return Ok(PointerView::owned(bytes));
            }
        };

        self.ensure(index)?;
        let guard = TrimGuard::acquire(&self.trim_lock);
        let offset = (absolute - self.chunk_start(index)) as usize;
        let chunk: &CompressedChunk = &self.chunks[index];
        let plaintext = chunk.plaintext(&mut self.scratch)?;
        let view = std::cell::Ref::map(plaintext, |bytes| &bytes[offset..offset + len]);
        Ok(PointerView::decoded(view, guard))
    }

    fn trim(&mut self) {
        if self.locked() {
            return;
        }
        let current = if self.position < self.length {
            self.chunk_index(self.discard + self.position)
        } else {
            None
        };
        let keep = current.map(|index| &self.chunks[index]);
        self.residency.borrow_mut().release(keep);
    }

    fn lock_trim(&self) -> TrimGuard {
        TrimGuard::acquire(&self.trim_lock)
    }

    fn is_trim_locked(&self) -> bool {
        self.locked()
    }

    fn read_string_to_null(&mut self) -> Result<String> {
        let start = self.position;
        let mut bytes = Vec::new();
        let mut cursor = start;
        while cursor < self.length {
            let absolute = self.discard + cursor;
            let Some(index) = self.chunk_index(absolute) else {
                break;
            };
            self.ensure(index)?;

            let offset = (absolute - self.chunk_start(index)) as usize;
            let visible = (self.length - cursor).min(self.ends[index] - absolute) as usize;
            let chunk = Rc::clone(&self.chunks[index]);
            let plaintext = chunk.plaintext(&mut self.scratch)?;
            let window = &plaintext[offset..offset + visible];
            if let Some(end) = window.iter().position(|&b| b == 0) {
                bytes.extend_from_slice(&window[..end]);
                self.position = cursor + end as u64 + 1;
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }
            bytes.extend_from_slice(window);
            cursor += visible as u64;
        }
        Err(BinaryError::MalformedString { position: start })
    }
}
