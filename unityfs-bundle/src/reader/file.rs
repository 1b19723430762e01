//! Reader over a file handle
//!
//! Each read seeks to the cursor and reads exactly what was asked for;
//! nothing is cached beyond what the OS provides. Clones and sub-readers
//! share the handle and always seek before reading, so interleaving them is
//! safe.

use super::{ByteOrder, EndianReader, check_range};
use crate::error::{BinaryError, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::rc::Rc;

/// Bytes scanned per read while looking for a string terminator
const STRING_SCAN_WINDOW: usize = 64;

pub(crate) struct FileReader {
    file: Rc<File>,
    base: u64,
    len: u64,
    position: u64,
    byte_order: ByteOrder,
}

impl FileReader {
    pub(crate) fn new(file: File) -> Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            file: Rc::new(file),
            base: 0,
            len,
            position: 0,
            byte_order: ByteOrder::default(),
        })
    }

    fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<()> {
        let mut handle: &File = &self.file;
        handle.seek(SeekFrom::Start(self.base + position))?;
        handle.read_exact(buf)?;
        Ok(())
    }
}

impl EndianReader for FileReader {
    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        check_range(position, 0, self.len)?;
        self.position = position;
        Ok(())
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        check_range(self.position, buf.len() as u64, self.len)?;
        self.read_at(self.position, buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn EndianReader> {
        Box::new(Self {
            file: Rc::clone(&self.file),
            base: self.base,
            len: self.len,
            position: self.position,
            byte_order: self.byte_order,
        })
    }

    fn sub_reader(&self, offset: u64, length: u64) -> Result<Box<dyn EndianReader>> {
        check_range(offset, length, self.len)?;
        Ok(Box::new(Self {
            file: Rc::clone(&self.file),
            base: self.base + offset,
            len: length,
            position: 0,
            byte_order: self.byte_order,
        }))
    }

    fn read_string_to_null(&mut self) -> Result<String> {
        let start = self.position;
        let mut bytes = Vec::new();
        let mut window = [0u8; STRING_SCAN_WINDOW];
        let mut cursor = start;
        while cursor < self.len {
            let take = (self.len - cursor).min(STRING_SCAN_WINDOW as u64) as usize;
            self.read_at(cursor, &mut window[..take])?;
            if let Some(end) = window[..take].iter().position(|&b| b == 0) {
                bytes.extend_from_slice(&window[..end]);
                self.position = cursor + end as u64 + 1;
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }
            bytes.extend_from_slice(&window[..take]);
            cursor += take as u64;
        }
        Err(BinaryError::MalformedString { position: start })
    }
}
