//! The page store backing [`BinaryFormatVersion::V0_2_0`](crate::BinaryFormatVersion) files.
//!
//! Each column stream (repetition levels, definition levels, values) is split into pages that
//! are located through an index page persisted in the file. Pages are read on demand and
//! optionally cached; nothing is mapped wholesale.

mod cache;
mod reader;
mod store;

use std::fmt::{Display, Formatter};

pub use cache::*;
use cstable_buffer::ByteSliceExt;
use cstable_error::{CSTableResult, cstable_bail, cstable_err};
use itertools::Itertools;
use num_enum::{IntoPrimitive, TryFromPrimitive};
pub use reader::*;
use rustc_hash::FxHashMap;
pub use store::*;

/// The location of a single page, relative to the page store's base offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRef {
    pub offset: u64,
    pub size: u32,
}

impl PageRef {
    /// Encoded width of a page reference in bytes.
    pub const SIZE: usize = 12;

    /// The offset one past the last byte of the page, or `None` on overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(u64::from(self.size))
    }

    pub(crate) fn read_at(bytes: &[u8], offset: usize) -> CSTableResult<Self> {
        Ok(Self {
            offset: bytes.struct_at(offset)?,
            size: bytes.struct_at(offset + 8)?,
        })
    }
}

impl Display for PageRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "page@{}+{}", self.offset, self.size)
    }
}

/// The role a page stream plays for its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PageIndexEntryType {
    RLevel = 1,
    DLevel = 2,
    Data = 3,
}

impl Display for PageIndexEntryType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RLevel => f.write_str("RLEVEL"),
            Self::DLevel => f.write_str("DLEVEL"),
            Self::Data => f.write_str("DATA"),
        }
    }
}

/// Logical identity of a page-backed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageIndexKey {
    pub column_id: u32,
    pub entry_type: PageIndexEntryType,
}

impl PageIndexKey {
    pub fn new(column_id: u32, entry_type: PageIndexEntryType) -> Self {
        Self {
            column_id,
            entry_type,
        }
    }
}

impl Display for PageIndexKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.column_id, self.entry_type)
    }
}

/// The decoded page index: an ordered page list per stream.
#[derive(Debug, Default)]
pub(crate) struct PageIndex {
    entries: FxHashMap<PageIndexKey, Vec<PageRef>>,
}

impl PageIndex {
    /// Parse an index page: `u32` entry count, then per entry `u32` column id, `u8` entry type,
    /// `u32` page count and that many page references.
    pub(crate) fn parse(bytes: &[u8]) -> CSTableResult<Self> {
        let count: u32 = bytes.struct_at(0)?;
        let mut pos = 4;
        let mut entries = FxHashMap::default();
        for _ in 0..count {
            let column_id: u32 = bytes.struct_at(pos)?;
            let tag: u8 = bytes.struct_at(pos + 4)?;
            let page_count: u32 = bytes.struct_at(pos + 5)?;
            pos += 9;

            let entry_type = PageIndexEntryType::try_from(tag)
                .map_err(|_| cstable_err!("invalid page index entry type {tag} for column {column_id}"))?;
            let key = PageIndexKey::new(column_id, entry_type);

            let page_count = usize::try_from(page_count)?;
            let needed = page_count
                .checked_mul(PageRef::SIZE)
                .and_then(|n| n.checked_add(pos))
                .filter(|&end| end <= bytes.len());
            if needed.is_none() {
                cstable_bail!(
                    "page index entry {key} declares {page_count} pages but the index page holds {} bytes",
                    bytes.len()
                );
            }
            let pages: Vec<PageRef> = (0..page_count)
                .map(|i| PageRef::read_at(bytes, pos + i * PageRef::SIZE))
                .try_collect()?;
            pos += page_count * PageRef::SIZE;

            if entries.insert(key, pages).is_some() {
                cstable_bail!("duplicate page index entry {key}");
            }
        }
        Ok(Self { entries })
    }

    pub(crate) fn get(&self, key: &PageIndexKey) -> Option<&[PageRef]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub(crate) fn pages(&self) -> impl Iterator<Item = &PageRef> {
        self.entries.values().flatten()
    }
}

/// Parse a free index page: `u32` count followed by page references.
pub(crate) fn parse_free_index(bytes: &[u8]) -> CSTableResult<Vec<PageRef>> {
    let count = usize::try_from(bytes.struct_at::<u32>(0)?)?;
    if count.saturating_mul(PageRef::SIZE).saturating_add(4) > bytes.len() {
        cstable_bail!(
            "free index declares {count} pages but holds {} bytes",
            bytes.len()
        );
    }
    (0..count)
        .map(|i| PageRef::read_at(bytes, 4 + i * PageRef::SIZE))
        .collect()
}
