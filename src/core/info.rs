//! Database info buffers
//!
//! The driver's database-info call fills a caller supplied buffer with a tag-length-value
//! stream: `tag (1 byte)`, `length (2 bytes, little-endian)`, `value (length bytes)`,
//! repeated until [`INFO_END`]. [`ResultBuffer`] decodes that stream and [`InfoBuilder`]
//! produces it.

use serde::{Deserialize, Serialize};

pub const INFO_END: u8 = 1;
pub const INFO_TRUNCATED: u8 = 2;
pub const INFO_READS: u8 = 5;
pub const INFO_WRITES: u8 = 6;
pub const INFO_FETCHES: u8 = 7;
pub const INFO_MARKS: u8 = 8;
pub const INFO_PAGE_SIZE: u8 = 14;
pub const INFO_NUM_BUFFERS: u8 = 15;
pub const INFO_ALLOCATION: u8 = 21;
pub const INFO_READ_SEQ_COUNT: u8 = 23;
pub const INFO_READ_IDX_COUNT: u8 = 24;
pub const INFO_INSERT_COUNT: u8 = 25;
pub const INFO_UPDATE_COUNT: u8 = 26;
pub const INFO_DELETE_COUNT: u8 = 27;
pub const INFO_SWEEP_INTERVAL: u8 = 31;
pub const INFO_ODS_VERSION: u8 = 32;
pub const INFO_ODS_MINOR_VERSION: u8 = 33;
pub const INFO_NO_RESERVE: u8 = 34;
pub const INFO_FORCED_WRITES: u8 = 52;
pub const INFO_USER_NAMES: u8 = 53;
pub const INFO_DB_SQL_DIALECT: u8 = 62;
pub const INFO_DB_READ_ONLY: u8 = 63;

/// Size in bytes of one per-table group inside a count item
const COUNT_GROUP_SIZE: usize = 6;

/// Fixed-capacity buffer receiving the result of an info call
#[derive(Debug, Clone)]
pub struct ResultBuffer {
    bytes: Vec<u8>,
}

impl ResultBuffer {
    /// Create a zeroed buffer of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
        }
    }

    /// Create a buffer from bytes already received
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Writable view handed to the driver
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Whether the driver flagged the buffer as too small before the end marker
    pub fn is_truncated(&self) -> bool {
        let mut pos = 0;
        while let Some(&tag) = self.bytes.get(pos) {
            match tag {
                INFO_END => return false,
                INFO_TRUNCATED => return true,
                _ => match self.item_len(pos) {
                    Some(len) => pos += 3 + len,
                    None => return false,
                },
            }
        }
        false
    }

    /// Decode the scalar fact stored under `tag`, or 0 when it is absent
    pub fn get_value(&self, tag: u8) -> i32 {
        let Some(pos) = self.find(tag) else {
            return 0;
        };
        let len = self.item_len(pos).unwrap_or(0);
        self.integer_at(pos + 3, len)
    }

    /// Sum the per-table counts stored under `tag`, or 0 when it is absent
    ///
    /// Count items hold repeated 6-byte groups: a 2-byte table id followed by a 4-byte
    /// count.
    pub fn get_count_value(&self, tag: u8) -> i32 {
        let Some(pos) = self.find(tag) else {
            return 0;
        };
        let mut remaining = self.item_len(pos).unwrap_or(0);
        let mut p = pos + 3;
        let mut total: i32 = 0;
        while remaining >= COUNT_GROUP_SIZE {
            total = total.wrapping_add(self.integer_at(p + 2, 4));
            p += COUNT_GROUP_SIZE;
            remaining -= COUNT_GROUP_SIZE;
        }
        total
    }

    /// Parse the repeated user-name clusters at the start of the buffer
    ///
    /// Each cluster is the user-name tag, two reserved bytes, a one-byte length and the
    /// name itself. Parsing stops at the first byte that is not the user-name tag or at a
    /// name running past the buffer; zero-length names are skipped.
    pub fn user_names(&self) -> Vec<String> {
        let mut users = Vec::new();
        let mut pos = 0;
        while self.bytes.get(pos) == Some(&INFO_USER_NAMES) {
            pos += 3;
            let Some(&len) = self.bytes.get(pos) else {
                break;
            };
            pos += 1;
            let end = pos + len as usize;
            let Some(name) = self.bytes.get(pos..end) else {
                break;
            };
            if !name.is_empty() {
                users.push(String::from_utf8_lossy(name).into_owned());
            }
            pos = end;
        }
        users
    }

    fn find(&self, tag: u8) -> Option<usize> {
        let mut pos = 0;
        while let Some(&current) = self.bytes.get(pos) {
            if current == INFO_END || current == INFO_TRUNCATED {
                return None;
            }
            if current == tag {
                return Some(pos);
            }
            pos += 3 + self.item_len(pos)?;
        }
        None
    }

    fn item_len(&self, pos: usize) -> Option<usize> {
        let lo = *self.bytes.get(pos + 1)?;
        let hi = *self.bytes.get(pos + 2)?;
        Some(u16::from_le_bytes([lo, hi]) as usize)
    }

    // Little-endian integer of up to 4 bytes, clipped to the buffer.
    fn integer_at(&self, pos: usize, len: usize) -> i32 {
        let end = (pos + len.min(4)).min(self.bytes.len());
        if pos >= end {
            return 0;
        }
        let mut value: u32 = 0;
        for (shift, byte) in self.bytes[pos..end].iter().enumerate() {
            value |= (*byte as u32) << (8 * shift);
        }
        value as i32
    }
}

/// Encoder for info responses
///
/// Used by drivers that answer info calls in-process.
#[derive(Debug, Clone, Default)]
pub struct InfoBuilder {
    bytes: Vec<u8>,
}

impl InfoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a 4-byte integer fact
    pub fn int(mut self, tag: u8, value: i32) -> Self {
        self.item(tag, &value.to_le_bytes());
        self
    }

    /// Append a per-table count fact
    pub fn counts(mut self, tag: u8, tables: &[(u16, u32)]) -> Self {
        let mut value = Vec::with_capacity(tables.len() * COUNT_GROUP_SIZE);
        for (table, count) in tables {
            value.extend_from_slice(&table.to_le_bytes());
            value.extend_from_slice(&count.to_le_bytes());
        }
        self.item(tag, &value);
        self
    }

    /// Append one user-name cluster
    pub fn user(mut self, name: &str) -> Self {
        let name = &name.as_bytes()[..name.len().min(u8::MAX as usize)];
        let cluster_len = (name.len() + 1) as u16;
        self.bytes.push(INFO_USER_NAMES);
        self.bytes.extend_from_slice(&cluster_len.to_le_bytes());
        self.bytes.push(name.len() as u8);
        self.bytes.extend_from_slice(name);
        self
    }

    /// Terminate the stream
    pub fn end(mut self) -> Self {
        self.bytes.push(INFO_END);
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Copy the stream into `buffer`, writing a truncation marker if it does not fit
    pub fn write_into(&self, buffer: &mut [u8]) {
        if self.bytes.len() <= buffer.len() {
            buffer[..self.bytes.len()].copy_from_slice(&self.bytes);
        } else if let Some(first) = buffer.first_mut() {
            *first = INFO_TRUNCATED;
        }
    }

    fn item(&mut self, tag: u8, value: &[u8]) {
        self.bytes.push(tag);
        self.bytes
            .extend_from_slice(&(value.len() as u16).to_le_bytes());
        self.bytes.extend_from_slice(value);
    }
}

/// Physical facts about the attached database
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub ods_major: i32,
    pub ods_minor: i32,
    pub page_size: i32,
    /// Number of allocated pages
    pub pages: i32,
    /// Number of page buffers in the cache
    pub buffers: i32,
    pub sweep_interval: i32,
    /// Forced (synchronous) writes enabled
    pub sync_writes: bool,
    /// Space reservation enabled on data pages
    pub reserve: bool,
    pub read_only: bool,
}

impl DatabaseInfo {
    pub(crate) const ITEMS: [u8; 10] = [
        INFO_ODS_VERSION,
        INFO_ODS_MINOR_VERSION,
        INFO_PAGE_SIZE,
        INFO_ALLOCATION,
        INFO_NUM_BUFFERS,
        INFO_SWEEP_INTERVAL,
        INFO_FORCED_WRITES,
        INFO_NO_RESERVE,
        INFO_DB_READ_ONLY,
        INFO_END,
    ];
    pub(crate) const BUFFER_SIZE: usize = 256;

    pub(crate) fn parse(result: &ResultBuffer) -> Self {
        Self {
            ods_major: result.get_value(INFO_ODS_VERSION),
            ods_minor: result.get_value(INFO_ODS_MINOR_VERSION),
            page_size: result.get_value(INFO_PAGE_SIZE),
            pages: result.get_value(INFO_ALLOCATION),
            buffers: result.get_value(INFO_NUM_BUFFERS),
            sweep_interval: result.get_value(INFO_SWEEP_INTERVAL),
            sync_writes: result.get_value(INFO_FORCED_WRITES) == 1,
            reserve: result.get_value(INFO_NO_RESERVE) != 1,
            read_only: result.get_value(INFO_DB_READ_ONLY) == 1,
        }
    }
}

/// Page-level I/O statistics of the current attachment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseStatistics {
    pub fetches: i32,
    pub marks: i32,
    pub reads: i32,
    pub writes: i32,
}

impl DatabaseStatistics {
    pub(crate) const ITEMS: [u8; 5] = [
        INFO_FETCHES,
        INFO_MARKS,
        INFO_READS,
        INFO_WRITES,
        INFO_END,
    ];
    pub(crate) const BUFFER_SIZE: usize = 128;

    pub(crate) fn parse(result: &ResultBuffer) -> Self {
        Self {
            fetches: result.get_value(INFO_FETCHES),
            marks: result.get_value(INFO_MARKS),
            reads: result.get_value(INFO_READS),
            writes: result.get_value(INFO_WRITES),
        }
    }
}

/// Row operation counts summed over all tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseCounts {
    pub inserts: i32,
    pub updates: i32,
    pub deletes: i32,
    pub indexed_reads: i32,
    pub sequential_reads: i32,
}

impl DatabaseCounts {
    pub(crate) const ITEMS: [u8; 6] = [
        INFO_INSERT_COUNT,
        INFO_UPDATE_COUNT,
        INFO_DELETE_COUNT,
        INFO_READ_IDX_COUNT,
        INFO_READ_SEQ_COUNT,
        INFO_END,
    ];
    pub(crate) const BUFFER_SIZE: usize = 1024;

    pub(crate) fn parse(result: &ResultBuffer) -> Self {
        Self {
            inserts: result.get_count_value(INFO_INSERT_COUNT),
            updates: result.get_count_value(INFO_UPDATE_COUNT),
            deletes: result.get_count_value(INFO_DELETE_COUNT),
            indexed_reads: result.get_count_value(INFO_READ_IDX_COUNT),
            sequential_reads: result.get_count_value(INFO_READ_SEQ_COUNT),
        }
    }
}
