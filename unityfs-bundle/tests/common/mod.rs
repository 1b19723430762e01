//! Synthetic UnityFS bundles for the integration tests

#![allow(dead_code)]

use byteorder::{BigEndian, WriteBytesExt};

/// Offset of the declared bundle size in headers written by [`BundleBuilder`]
const BUNDLE_SIZE_OFFSET: usize = 8 + 4 + 6 + 12;

/// Deterministic plaintext of `len` bytes
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Store or LZ4-compress `plain` for method `method`
pub fn pack(plain: &[u8], method: u16) -> Vec<u8> {
    match method & 0x3F {
        0 => plain.to_vec(),
        2 | 3 => lz4_flex::block::compress(plain),
        other => panic!("fixture cannot encode method {other}"),
    }
}

struct BlockFixture {
    stored: Vec<u8>,
    uncompressed_size: u32,
    flags: u16,
}

struct EntryFixture {
    name: String,
    offset: i64,
    size: i64,
    flags: u32,
}

/// Writes UnityFS format 6 bundles
pub struct BundleBuilder {
    signature: Vec<u8>,
    version: i32,
    table_flags: u32,
    declared_size: Option<i64>,
    blocks: Vec<BlockFixture>,
    entries: Vec<EntryFixture>,
}

impl BundleBuilder {
    pub fn new() -> Self {
        Self {
            signature: b"UnityFS\0".to_vec(),
            version: 6,
            table_flags: 0,
            declared_size: None,
            blocks: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn signature(mut self, signature: &[u8]) -> Self {
        self.signature = signature.to_vec();
        self
    }

    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn table_flags(mut self, flags: u32) -> Self {
        self.table_flags = flags;
        self
    }

    pub fn declared_size(mut self, size: i64) -> Self {
        self.declared_size = Some(size);
        self
    }

    /// Add a block holding `plain`, packed with `flags`' method
    pub fn block(self, plain: &[u8], flags: u16) -> Self {
        let stored = pack(plain, flags);
        self.raw_block(stored, plain.len() as u32, flags)
    }

    /// Add a block whose stored bytes are given as is
    pub fn raw_block(mut self, stored: Vec<u8>, uncompressed_size: u32, flags: u16) -> Self {
        self.blocks.push(BlockFixture {
            stored,
            uncompressed_size,
            flags,
        });
        self
    }

    pub fn entry(mut self, name: &str, offset: i64, size: i64, flags: u32) -> Self {
        self.entries.push(EntryFixture {
            name: name.to_string(),
            offset,
            size,
            flags,
        });
        self
    }

    /// Decoded table
    pub fn table(&self) -> Vec<u8> {
        let mut table: Vec<u8> = (0u8..16).collect();
        table.write_i32::<BigEndian>(self.blocks.len() as i32).unwrap();
        for block in &self.blocks {
            table.write_u32::<BigEndian>(block.uncompressed_size).unwrap();
            table.write_u32::<BigEndian>(block.stored.len() as u32).unwrap();
            table.write_u16::<BigEndian>(block.flags).unwrap();
        }
        table.write_i32::<BigEndian>(self.entries.len() as i32).unwrap();
        for entry in &self.entries {
            table.write_i64::<BigEndian>(entry.offset).unwrap();
            table.write_i64::<BigEndian>(entry.size).unwrap();
            table.write_u32::<BigEndian>(entry.flags).unwrap();
            table.extend_from_slice(entry.name.as_bytes());
            table.push(0);
        }
        table
    }

    pub fn build(&self) -> Vec<u8> {
        let table = self.table();
        let stored_table = pack(&table, (self.table_flags & 0x3F) as u16);

        let mut data = self.signature.clone();
        data.write_i32::<BigEndian>(self.version).unwrap();
        data.extend_from_slice(b"5.x.x\0");
        data.extend_from_slice(b"2019.4.40f1\0");
        data.write_i64::<BigEndian>(0).unwrap();
        data.write_u32::<BigEndian>(stored_table.len() as u32).unwrap();
        data.write_u32::<BigEndian>(table.len() as u32).unwrap();
        data.write_u32::<BigEndian>(self.table_flags).unwrap();
        data.extend_from_slice(&stored_table);
        for block in &self.blocks {
            data.extend_from_slice(&block.stored);
        }

        let size = self.declared_size.unwrap_or(data.len() as i64);
        if data.len() >= BUNDLE_SIZE_OFFSET + 8 {
            data[BUNDLE_SIZE_OFFSET..BUNDLE_SIZE_OFFSET + 8].copy_from_slice(&size.to_be_bytes());
        }
        data
    }
}

/// Header length of bundles written by [`BundleBuilder`] with the default
/// signature
pub const HEADER_LEN: u64 = (BUNDLE_SIZE_OFFSET + 8 + 12) as u64;

/// Two stored blocks of 100 and 50 bytes and three entries: one inside the
/// first block, one inside the second and one spanning both
pub fn two_block_bundle() -> (BundleBuilder, Vec<u8>) {
    let plain = pattern(150);
    let builder = BundleBuilder::new()
        .block(&plain[..100], 0)
        .block(&plain[100..], 0)
        .entry("CAB-first", 10, 30, 4)
        .entry("CAB-second.resS", 110, 20, 0)
        .entry("CAB-spanning", 90, 30, 4);
    (builder, plain)
}
