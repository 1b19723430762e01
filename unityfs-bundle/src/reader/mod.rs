//! Endian-aware random-access readers
//!
//! Every backing store (a file, a resident memory buffer, or a sequence of
//! compressed chunks) is exposed through the [`EndianReader`] trait. The
//! concrete readers are private to this module; use the constructor
//! functions to obtain one:
//!
//! - [`file_reader`] / [`open_file_reader`] - seek + read on every access
//! - [`memory_reader`] - bounds-checked slicing of a shared buffer
//! - [`chunk_reader`] / [`chunk_reader_with_budget`] - one virtual address
//!   space over lazily decompressed chunks
//!
//! # Examples
//!
//! ```rust
//! use unityfs_bundle::reader::{memory_reader, ByteOrder};
//!
//! let mut reader = memory_reader(vec![0x00, 0x00, 0x00, 0x06, b'h', b'i', 0x00]);
//! assert_eq!(reader.byte_order(), ByteOrder::Big);
//! assert_eq!(reader.read_i32()?, 6);
//! assert_eq!(reader.read_string_to_null()?, "hi");
//! # Ok::<(), unityfs_bundle::BinaryError>(())
//! ```

mod chunked;
mod file;
mod memory;

use crate::chunk::CompressedChunk;
use crate::error::{BinaryError, Result};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::cell::{Cell, Ref};
use std::fs::File;
use std::ops::Deref;
use std::path::Path;
use std::rc::Rc;

pub use chunked::DEFAULT_CHUNK_BUDGET;

/// Byte order for reading multi-byte values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Big endian (UnityFS headers and tables)
    #[default]
    Big,
    /// Little endian
    Little,
}

/// Positioned, endian-aware reads over some backing store.
///
/// The cursor always satisfies `0 <= position <= len`. Moving it outside that
/// range, or reading past `len`, fails with [`BinaryError::OutOfRange`] and
/// leaves the cursor where it was.
pub trait EndianReader {
    /// Byte order applied to multi-byte reads
    fn byte_order(&self) -> ByteOrder;

    /// Change the byte order applied to multi-byte reads
    fn set_byte_order(&mut self, byte_order: ByteOrder);

    /// Total number of addressable bytes
    fn len(&self) -> u64;

    /// Current cursor position
    fn position(&self) -> u64;

    /// Move the cursor; positions past `len` are rejected
    fn set_position(&mut self, position: u64) -> Result<()>;

    /// Fill `buf` from the cursor and advance past it
    fn read_into(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Independent cursor over the same backing data
    fn box_clone(&self) -> Box<dyn EndianReader>;

    /// Reader scoped to `[offset, offset + length)` of this one, positioned at 0
    fn sub_reader(&self, offset: u64, length: u64) -> Result<Box<dyn EndianReader>>;

    /// View of `len` bytes at `position` without moving the cursor.
    ///
    /// Readers that cannot lend their storage return an owned copy; see
    /// [`PointerView::is_borrowed`].
    fn pointer_at(&mut self, position: u64, len: usize) -> Result<PointerView<'_>> {
        let saved = self.position();
        self.set_position(position)?;
        let bytes = self.read_bytes(len);
        self.set_position(saved)?;
        Ok(PointerView::owned(bytes?))
    }

    /// Release decoded memory that is not needed for the current cursor
    fn trim(&mut self) {}

    /// Pin decoded memory until the returned guard is dropped
    fn lock_trim(&self) -> TrimGuard {
        TrimGuard::inert()
    }

    /// Whether a [`TrimGuard`] is currently held for this reader's storage
    fn is_trim_locked(&self) -> bool {
        false
    }

    /// Check if the reader has no addressable bytes
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes between the cursor and the end
    fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.position())
    }

    /// Advance the cursor to the next multiple of `alignment`
    fn align(&mut self, alignment: u64) -> Result<()> {
        if alignment <= 1 {
            return Ok(());
        }
        let pos = self.position();
        let aligned = pos.div_ceil(alignment) * alignment;
        if aligned != pos {
            self.set_position(aligned)?;
        }
        Ok(())
    }

    /// Read a single byte
    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_into(&mut buf)?;
        Ok(buf[0])
    }

    /// Read a boolean (as u8, 0 = false, non-zero = true)
    fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a signed 16-bit integer
    fn read_i16(&mut self) -> Result<i16> {
        let mut buf = [0u8; 2];
        self.read_into(&mut buf)?;
        let mut bytes = &buf[..];
        match self.byte_order() {
            ByteOrder::Big => Ok(bytes.read_i16::<BigEndian>()?),
            ByteOrder::Little => Ok(bytes.read_i16::<LittleEndian>()?),
        }
    }

    /// Read an unsigned 16-bit integer
    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_into(&mut buf)?;
        let mut bytes = &buf[..];
        match self.byte_order() {
            ByteOrder::Big => Ok(bytes.read_u16::<BigEndian>()?),
            ByteOrder::Little => Ok(bytes.read_u16::<LittleEndian>()?),
        }
    }

    /// Read a signed 32-bit integer
    fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_into(&mut buf)?;
        let mut bytes = &buf[..];
        match self.byte_order() {
            ByteOrder::Big => Ok(bytes.read_i32::<BigEndian>()?),
            ByteOrder::Little => Ok(bytes.read_i32::<LittleEndian>()?),
        }
    }

    /// Read an unsigned 32-bit integer
    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_into(&mut buf)?;
        let mut bytes = &buf[..];
        match self.byte_order() {
            ByteOrder::Big => Ok(bytes.read_u32::<BigEndian>()?),
            ByteOrder::Little => Ok(bytes.read_u32::<LittleEndian>()?),
        }
    }

    /// Read a signed 64-bit integer
    fn read_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_into(&mut buf)?;
        let mut bytes = &buf[..];
        match self.byte_order() {
            ByteOrder::Big => Ok(bytes.read_i64::<BigEndian>()?),
            ByteOrder::Little => Ok(bytes.read_i64::<LittleEndian>()?),
        }
    }

    /// Read an unsigned 64-bit integer
    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_into(&mut buf)?;
        let mut bytes = &buf[..];
        match self.byte_order() {
            ByteOrder::Big => Ok(bytes.read_u64::<BigEndian>()?),
            ByteOrder::Little => Ok(bytes.read_u64::<LittleEndian>()?),
        }
    }

    /// Read a fixed number of bytes
    fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; count];
        self.read_into(&mut buffer)?;
        Ok(buffer)
    }

    /// Read a null-terminated string.
    ///
    /// The cursor ends up just past the terminator. Without a terminator
    /// before the end of data the cursor is left untouched.
    fn read_string_to_null(&mut self) -> Result<String> {
        let start = self.position();
        let mut bytes = Vec::new();
        while self.position() < self.len() {
            let byte = self.read_u8()?;
            if byte == 0 {
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }
            bytes.push(byte);
        }
        self.set_position(start)?;
        Err(BinaryError::MalformedString { position: start })
    }
}

impl Clone for Box<dyn EndianReader> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Scoped pin on decoded chunk memory.
///
/// While any guard created from a reader (or one of its clones and
/// sub-readers) is alive, that reader family evicts nothing.
#[derive(Debug)]
pub struct TrimGuard {
    counter: Option<Rc<Cell<usize>>>,
}

impl TrimGuard {
    pub(crate) fn acquire(counter: &Rc<Cell<usize>>) -> Self {
        counter.set(counter.get() + 1);
        Self {
            counter: Some(Rc::clone(counter)),
        }
    }

    /// Guard for readers without evictable memory
    pub(crate) fn inert() -> Self {
        Self { counter: None }
    }
}

impl Drop for TrimGuard {
    fn drop(&mut self) {
        if let Some(counter) = &self.counter {
            counter.set(counter.get().saturating_sub(1));
        }
    }
}

/// Bytes returned by [`EndianReader::pointer_at`]
pub struct PointerView<'a> {
    bytes: ViewBytes<'a>,
    _guard: TrimGuard,
}

enum ViewBytes<'a> {
    Borrowed(&'a [u8]),
    Decoded(Ref<'a, [u8]>),
    Owned(Vec<u8>),
}

impl<'a> PointerView<'a> {
    pub(crate) fn borrowed(bytes: &'a [u8]) -> Self {
        Self {
            bytes: ViewBytes::Borrowed(bytes),
            _guard: TrimGuard::inert(),
        }
    }

    pub(crate) fn decoded(bytes: Ref<'a, [u8]>, guard: TrimGuard) -> Self {
        Self {
            bytes: ViewBytes::Decoded(bytes),
            _guard: guard,
        }
    }

    pub(crate) fn owned(bytes: Vec<u8>) -> Self {
        Self {
            bytes: ViewBytes::Owned(bytes),
            _guard: TrimGuard::inert(),
        }
    }

    /// Whether the view points into the reader's storage rather than a copy
    pub fn is_borrowed(&self) -> bool {
        !matches!(self.bytes, ViewBytes::Owned(_))
    }
}

impl Deref for PointerView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.bytes {
            ViewBytes::Borrowed(bytes) => bytes,
            ViewBytes::Decoded(bytes) => bytes,
            ViewBytes::Owned(bytes) => bytes,
        }
    }
}

impl std::fmt::Debug for PointerView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointerView")
            .field("len", &self.len())
            .field("borrowed", &self.is_borrowed())
            .finish()
    }
}

/// Reader over an open file
pub fn file_reader(file: File) -> Result<Box<dyn EndianReader>> {
    Ok(Box::new(file::FileReader::new(file)?))
}

/// Open `path` and wrap it in a file reader
pub fn open_file_reader<P: AsRef<Path>>(path: P) -> Result<Box<dyn EndianReader>> {
    file_reader(File::open(path)?)
}

/// Reader over a resident buffer; the reader keeps a share of `data` alive
pub fn memory_reader(data: impl Into<Rc<[u8]>>) -> Box<dyn EndianReader> {
    Box::new(memory::MemoryReader::new(data.into()))
}

/// Reader over the concatenated plaintext of `chunks`, skipping the first
/// `discard` bytes and exposing `length` bytes
pub fn chunk_reader(
    chunks: Vec<Rc<CompressedChunk>>,
    discard: u64,
    length: u64,
) -> Result<Box<dyn EndianReader>> {
    chunk_reader_with_budget(chunks, discard, length, DEFAULT_CHUNK_BUDGET)
}

/// Like [`chunk_reader`], keeping at most `budget` decoded bytes resident
/// (the chunk under the cursor is always kept)
pub fn chunk_reader_with_budget(
    chunks: Vec<Rc<CompressedChunk>>,
    discard: u64,
    length: u64,
    budget: usize,
) -> Result<Box<dyn EndianReader>> {
    Ok(Box::new(chunked::ChunkReader::new(
        chunks, discard, length, budget,
    )?))
}

/// Bounds check shared by the reader variants
pub(crate) fn check_range(position: u64, requested: u64, length: u64) -> Result<()> {
    match position.checked_add(requested) {
        Some(end) if end <= length => Ok(()),
        _ => Err(BinaryError::out_of_range(position, requested, length)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endianness() {
        let data = [0x01, 0x02, 0x03, 0x04];

        let mut reader_le = memory_reader(data.to_vec());
        reader_le.set_byte_order(ByteOrder::Little);
        assert_eq!(reader_le.read_u32().unwrap(), 0x04030201);

        let mut reader_be = memory_reader(data.to_vec());
        assert_eq!(reader_be.read_u32().unwrap(), 0x01020304);
    }

    #[test]
    fn test_signed_reads() {
        let data = [0xFF, 0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut reader = memory_reader(data.to_vec());
        assert_eq!(reader.read_i16().unwrap(), -2);
        assert_eq!(reader.read_i64().unwrap(), -1);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_alignment() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let mut reader = memory_reader(data.to_vec());

        reader.read_u8().unwrap(); // pos = 1
        reader.align(4).unwrap(); // pos = 4
        assert_eq!(reader.position(), 4);
        reader.align(4).unwrap();
        assert_eq!(reader.position(), 4);
        reader.read_u8().unwrap();
        assert!(reader.align(16).is_err());
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn test_trim_guard_counts() {
        let counter = Rc::new(Cell::new(0));
        let first = TrimGuard::acquire(&counter);
        let second = TrimGuard::acquire(&counter);
        assert_eq!(counter.get(), 2);
        drop(first);
        assert_eq!(counter.get(), 1);
        drop(second);
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_check_range_overflow() {
        assert!(check_range(u64::MAX, 1, u64::MAX).is_err());
        assert!(check_range(2, 2, 4).is_ok());
        assert!(check_range(3, 2, 4).is_err());
    }
}
