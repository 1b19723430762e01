//! Reader over a resident buffer

use super::{ByteOrder, EndianReader, PointerView, check_range};
use crate::error::{BinaryError, Result};
use std::rc::Rc;

/// Window `[base, base + len)` of a shared immutable buffer
pub(crate) struct MemoryReader {
    data: Rc<[u8]>,
    base: usize,
    len: usize,
    position: usize,
    byte_order: ByteOrder,
}

impl MemoryReader {
    pub(crate) fn new(data: Rc<[u8]>) -> Self {
        let len = data.len();
        Self {
            data,
            base: 0,
            len,
            position: 0,
            byte_order: ByteOrder::default(),
        }
    }

    fn window(&self) -> &[u8] {
        &self.data[self.base..self.base + self.len]
    }
}

impl EndianReader for MemoryReader {
    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    fn len(&self) -> u64 {
        self.len as u64
    }

    fn position(&self) -> u64 {
        self.position as u64
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        check_range(position, 0, self.len())?;
        self.position = position as usize;
        Ok(())
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        check_range(self.position(), buf.len() as u64, self.len())?;
        let start = self.position;
        buf.copy_from_slice(&self.window()[start..start + buf.len()]);
        self.position += buf.len();
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn EndianReader> {
        Box::new(Self {
            data: Rc::clone(&self.data),
            base: self.base,
            len: self.len,
            position: self.position,
            byte_order: self.byte_order,
        })
    }

    fn sub_reader(&self, offset: u64, length: u64) -> Result<Box<dyn EndianReader>> {
        check_range(offset, length, self.len())?;
        Ok(Box::new(Self {
            data: Rc::clone(&self.data),
            base: self.base + offset as usize,
            len: length as usize,
            position: 0,
            byte_order: self.byte_order,
        }))
    }

    fn pointer_at(&mut self, position: u64, len: usize) -> Result<PointerView<'_>> {
        check_range(position, len as u64, self.len())?;
        let start = position as usize;
        Ok(PointerView::borrowed(&self.window()[start..start + len]))
    }

    fn read_string_to_null(&mut self) -> Result<String> {
        let rest = &self.window()[self.position..];
        match rest.iter().position(|&b| b == 0) {
            Some(end) => {
                let value = String::from_utf8_lossy(&rest[..end]).into_owned();
                self.position += end + 1;
                Ok(value)
            }
            None => Err(BinaryError::MalformedString {
                position: self.position(),
            }),
        }
    }
}
