#![allow(clippy::panic, clippy::unwrap_used)]
//! A minimal writer of CSTable files, for tests.
//!
//! [`FileBuilder`] lays out v0.1.0 and v0.2.0 files from a list of [`ColumnSpec`]s. It has knobs
//! to corrupt specific parts of the file; it is not a general purpose encoder.

use cstable_buffer::LeValue;
use cstable_encodings::{bitpack_encode, boolean_encode, leb128_encode, plain_encode, string_encode};

use crate::pages::{PageIndexEntryType, PageRef};
use crate::{BinaryFormatVersion, LogicalType, MAGIC_BYTES, PROLOGUE_SIZE, StorageEncoding};

/// An owned value to be written into a column.
#[derive(Debug, Clone, PartialEq)]
pub enum TestValue {
    Boolean(bool),
    UInt32(u32),
    UInt64(u64),
    Float64(f64),
    String(Vec<u8>),
}

impl TestValue {
    fn as_bool(&self) -> bool {
        match self {
            Self::Boolean(b) => *b,
            other => panic!("expected a boolean, got {other:?}"),
        }
    }

    fn as_u32(&self) -> u32 {
        match self {
            Self::UInt32(v) => *v,
            Self::UInt64(v) => u32::try_from(*v).unwrap(),
            other => panic!("expected a u32, got {other:?}"),
        }
    }

    fn as_u64(&self) -> u64 {
        match self {
            Self::Boolean(b) => u64::from(*b),
            Self::UInt32(v) => u64::from(*v),
            Self::UInt64(v) => *v,
            Self::Float64(v) => v.to_bits(),
            other => panic!("expected a u64, got {other:?}"),
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            Self::Float64(v) => *v,
            other => panic!("expected a f64, got {other:?}"),
        }
    }

    fn as_bytes(&self) -> &[u8] {
        match self {
            Self::String(v) => v,
            other => panic!("expected a string, got {other:?}"),
        }
    }
}

impl From<bool> for TestValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<u32> for TestValue {
    fn from(value: u32) -> Self {
        Self::UInt32(value)
    }
}

impl From<u64> for TestValue {
    fn from(value: u64) -> Self {
        Self::UInt64(value)
    }
}

impl From<f64> for TestValue {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<&str> for TestValue {
    fn from(value: &str) -> Self {
        Self::String(value.as_bytes().to_vec())
    }
}

/// One column to be written: its header entry and its occurrences.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    column_id: u32,
    name: String,
    storage: StorageEncoding,
    logical: LogicalType,
    storage_tag: Option<u8>,
    logical_tag: Option<u8>,
    rlevel_max: u16,
    dlevel_max: u16,
    occurrences: Vec<(u16, u16, Option<TestValue>)>,
    extra_values: Vec<(PageIndexEntryType, usize)>,
    trailing_bytes: usize,
}

impl ColumnSpec {
    pub fn new(name: &str, column_id: u32, storage: StorageEncoding, logical: LogicalType) -> Self {
        Self {
            column_id,
            name: name.to_string(),
            storage,
            logical,
            storage_tag: None,
            logical_tag: None,
            rlevel_max: 0,
            dlevel_max: 0,
            occurrences: Vec::new(),
            extra_values: Vec::new(),
            trailing_bytes: 0,
        }
    }

    pub fn boolean(name: &str, column_id: u32) -> Self {
        Self::new(name, column_id, StorageEncoding::BooleanBitpacked, LogicalType::Boolean)
    }

    pub fn uint32_bitpacked(name: &str, column_id: u32) -> Self {
        Self::new(name, column_id, StorageEncoding::UInt32Bitpacked, LogicalType::UnsignedInt)
    }

    pub fn uint32(name: &str, column_id: u32) -> Self {
        Self::new(name, column_id, StorageEncoding::UInt32Plain, LogicalType::UnsignedInt)
    }

    pub fn uint64(name: &str, column_id: u32) -> Self {
        Self::new(name, column_id, StorageEncoding::UInt64Plain, LogicalType::UnsignedInt)
    }

    pub fn leb128(name: &str, column_id: u32) -> Self {
        Self::new(name, column_id, StorageEncoding::UInt64Leb128, LogicalType::UnsignedInt)
    }

    pub fn float(name: &str, column_id: u32) -> Self {
        Self::new(name, column_id, StorageEncoding::FloatIeee754, LogicalType::Float)
    }

    pub fn string(name: &str, column_id: u32) -> Self {
        Self::new(name, column_id, StorageEncoding::StringPlain, LogicalType::String)
    }

    /// Set the level maxima. Call before adding occurrences with [`Self::values`].
    pub fn levels(mut self, rlevel_max: u16, dlevel_max: u16) -> Self {
        self.rlevel_max = rlevel_max;
        self.dlevel_max = dlevel_max;
        self
    }

    /// Append one fully defined, non-repeated occurrence per value.
    pub fn values<V: Into<TestValue>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        let dlevel = self.dlevel_max;
        self.occurrences
            .extend(values.into_iter().map(|v| (0, dlevel, Some(v.into()))));
        self
    }

    /// Append an occurrence carrying a value; `dlevel` must equal the column maximum.
    pub fn occurrence(mut self, rlevel: u16, dlevel: u16, value: impl Into<TestValue>) -> Self {
        self.occurrences.push((rlevel, dlevel, Some(value.into())));
        self
    }

    /// Append a level-only occurrence marking an absent value.
    pub fn absent(mut self, rlevel: u16, dlevel: u16) -> Self {
        self.occurrences.push((rlevel, dlevel, None));
        self
    }

    /// Write `tag` as the storage encoding instead of the real one.
    pub fn storage_tag(mut self, tag: u8) -> Self {
        self.storage_tag = Some(tag);
        self
    }

    /// Write `tag` as the logical type instead of the real one.
    pub fn logical_tag(mut self, tag: u8) -> Self {
        self.logical_tag = Some(tag);
        self
    }

    /// Append `count` zero values to one paged stream, past what the occurrences describe.
    pub fn extra_stream_values(mut self, entry_type: PageIndexEntryType, count: usize) -> Self {
        self.extra_values.push((entry_type, count));
        self
    }

    /// Append `count` zero bytes to a flat column body, past the encoded values.
    pub fn trailing_bytes(mut self, count: usize) -> Self {
        self.trailing_bytes = count;
        self
    }

    fn present(&self) -> impl Iterator<Item = &TestValue> {
        self.occurrences.iter().filter_map(|(_, _, v)| v.as_ref())
    }

    fn rlevels(&self) -> Vec<u32> {
        self.occurrences.iter().map(|(r, ..)| u32::from(*r)).collect()
    }

    fn dlevels(&self) -> Vec<u32> {
        self.occurrences.iter().map(|(_, d, _)| u32::from(*d)).collect()
    }

    fn write_entry(&self, out: &mut Vec<u8>) {
        self.column_id.write_le(out);
        self.storage_tag.unwrap_or(u8::from(self.storage)).write_le(out);
        self.logical_tag.unwrap_or(u8::from(self.logical)).write_le(out);
        self.rlevel_max.write_le(out);
        self.dlevel_max.write_le(out);
        u16::try_from(self.name.len()).unwrap().write_le(out);
        out.extend_from_slice(self.name.as_bytes());
    }

    fn entry_len(&self, version: BinaryFormatVersion) -> usize {
        let flat = 12 + self.name.len();
        match version {
            BinaryFormatVersion::V0_1_0 => flat + 16,
            BinaryFormatVersion::V0_2_0 => flat,
        }
    }

    fn encode_values(&self) -> Vec<u8> {
        match self.storage {
            StorageEncoding::BooleanBitpacked => {
                boolean_encode(&self.present().map(TestValue::as_bool).collect::<Vec<_>>())
            }
            StorageEncoding::UInt32Bitpacked => {
                bitpack_encode(&self.present().map(TestValue::as_u32).collect::<Vec<_>>())
            }
            StorageEncoding::UInt32Plain => {
                plain_encode(&self.present().map(TestValue::as_u32).collect::<Vec<_>>())
            }
            StorageEncoding::UInt64Plain => {
                plain_encode(&self.present().map(TestValue::as_u64).collect::<Vec<_>>())
            }
            StorageEncoding::UInt64Leb128 => {
                leb128_encode(&self.present().map(TestValue::as_u64).collect::<Vec<_>>())
            }
            StorageEncoding::FloatIeee754 => {
                plain_encode(&self.present().map(TestValue::as_f64).collect::<Vec<_>>())
            }
            StorageEncoding::StringPlain => {
                string_encode(&self.present().map(TestValue::as_bytes).collect::<Vec<_>>())
            }
        }
    }

    fn flat_body(&self) -> Vec<u8> {
        let rlevels = if self.rlevel_max > 0 {
            bitpack_encode(&self.rlevels())
        } else {
            Vec::new()
        };
        let dlevels = if self.dlevel_max > 0 {
            bitpack_encode(&self.dlevels())
        } else {
            Vec::new()
        };
        let mut out = Vec::new();
        (self.occurrences.len() as u64).write_le(&mut out);
        (rlevels.len() as u64).write_le(&mut out);
        (dlevels.len() as u64).write_le(&mut out);
        out.extend_from_slice(&rlevels);
        out.extend_from_slice(&dlevels);
        out.extend_from_slice(&self.encode_values());
        out.resize(out.len() + self.trailing_bytes, 0);
        out
    }

    fn paged_streams(&self) -> Vec<(PageIndexEntryType, Vec<u64>)> {
        let mut streams: Vec<(PageIndexEntryType, Vec<u64>)> = Vec::new();
        if self.rlevel_max > 0 {
            streams.push((
                PageIndexEntryType::RLevel,
                self.rlevels().into_iter().map(u64::from).collect(),
            ));
        }
        if self.dlevel_max > 0 {
            streams.push((
                PageIndexEntryType::DLevel,
                self.dlevels().into_iter().map(u64::from).collect(),
            ));
        }
        streams.push((
            PageIndexEntryType::Data,
            self.present().map(TestValue::as_u64).collect(),
        ));
        for &(entry_type, count) in &self.extra_values {
            if let Some((_, values)) = streams.iter_mut().find(|(t, _)| *t == entry_type) {
                values.resize(values.len() + count, 0);
            }
        }
        streams
    }
}

/// Lays out a whole file in memory.
#[derive(Debug, Clone)]
pub struct FileBuilder {
    version: BinaryFormatVersion,
    version_tag: Option<u16>,
    magic: [u8; 4],
    num_rows: u64,
    metablock_rows: Option<u64>,
    values_per_page: usize,
    omitted: Vec<PageIndexEntryType>,
    free_page: bool,
    columns: Vec<ColumnSpec>,
}

impl FileBuilder {
    fn new(version: BinaryFormatVersion, num_rows: u64) -> Self {
        Self {
            version,
            version_tag: None,
            magic: MAGIC_BYTES,
            num_rows,
            metablock_rows: None,
            values_per_page: 1024,
            omitted: Vec::new(),
            free_page: false,
            columns: Vec::new(),
        }
    }

    /// A memory-mapped layout file.
    pub fn v1(num_rows: u64) -> Self {
        Self::new(BinaryFormatVersion::V0_1_0, num_rows)
    }

    /// A page-indexed layout file.
    pub fn v2(num_rows: u64) -> Self {
        Self::new(BinaryFormatVersion::V0_2_0, num_rows)
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Write `tag` as the version instead of the real one. The layout still follows the
    /// builder's version.
    pub fn version_tag(mut self, tag: u16) -> Self {
        self.version_tag = Some(tag);
        self
    }

    pub fn magic(mut self, magic: [u8; 4]) -> Self {
        self.magic = magic;
        self
    }

    /// Record a different row count in the metadata block than in the header.
    pub fn metablock_rows(mut self, num_rows: u64) -> Self {
        self.metablock_rows = Some(num_rows);
        self
    }

    /// Split every paged stream into pages of at most `values` values.
    pub fn values_per_page(mut self, values: usize) -> Self {
        self.values_per_page = values.max(1);
        self
    }

    /// Leave every stream of the given role out of the page index.
    pub fn omit_stream(mut self, entry_type: PageIndexEntryType) -> Self {
        self.omitted.push(entry_type);
        self
    }

    /// Record one reclaimable page slot in a free index.
    pub fn free_page(mut self) -> Self {
        self.free_page = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.magic);
        self.version_tag
            .unwrap_or(u16::from(self.version))
            .write_le(&mut out);
        0u16.write_le(&mut out);
        debug_assert_eq!(out.len(), PROLOGUE_SIZE);

        self.num_rows.write_le(&mut out);
        u32::try_from(self.columns.len()).unwrap().write_le(&mut out);
        match self.version {
            BinaryFormatVersion::V0_1_0 => self.build_flat(out),
            BinaryFormatVersion::V0_2_0 => self.build_paged(out),
        }
    }

    fn build_flat(&self, mut out: Vec<u8>) -> Vec<u8> {
        let header_len = out.len()
            + self
                .columns
                .iter()
                .map(|c| c.entry_len(self.version))
                .sum::<usize>();
        let bodies: Vec<_> = self.columns.iter().map(ColumnSpec::flat_body).collect();

        let mut body_offset = header_len as u64;
        for (column, body) in self.columns.iter().zip(&bodies) {
            column.write_entry(&mut out);
            body_offset.write_le(&mut out);
            (body.len() as u64).write_le(&mut out);
            body_offset += body.len() as u64;
        }
        for body in bodies {
            out.extend_from_slice(&body);
        }
        out
    }

    fn build_paged(&self, mut out: Vec<u8>) -> Vec<u8> {
        for column in &self.columns {
            column.write_entry(&mut out);
        }
        let metablock_len = 8 + PageRef::SIZE + 1 + if self.free_page { PageRef::SIZE } else { 0 };
        let pages_start = out.len() + metablock_len;

        let mut pages = Vec::new();
        let mut index = Vec::new();
        let mut entries = 0u32;
        for column in &self.columns {
            for (entry_type, values) in column.paged_streams() {
                if self.omitted.contains(&entry_type) {
                    continue;
                }
                let mut refs = Vec::new();
                for chunk in values.chunks(self.values_per_page) {
                    let offset = (pages_start + pages.len()) as u64;
                    pages.extend_from_slice(&plain_encode(chunk));
                    refs.push(PageRef {
                        offset,
                        size: (chunk.len() * 8) as u32,
                    });
                }
                column.column_id.write_le(&mut index);
                u8::from(entry_type).write_le(&mut index);
                (refs.len() as u32).write_le(&mut index);
                for page in refs {
                    write_page_ref(&page, &mut index);
                }
                entries += 1;
            }
        }

        let free_slot = self.free_page.then(|| {
            let offset = (pages_start + pages.len()) as u64;
            pages.extend_from_slice(&[0u8; 16]);
            PageRef { offset, size: 16 }
        });

        let mut index_page = Vec::new();
        entries.write_le(&mut index_page);
        index_page.extend_from_slice(&index);
        let index_ref = PageRef {
            offset: (pages_start + pages.len()) as u64,
            size: index_page.len() as u32,
        };
        let free_index_ref = free_slot.map(|slot| {
            let mut free_index = Vec::new();
            1u32.write_le(&mut free_index);
            write_page_ref(&slot, &mut free_index);
            let free_ref = PageRef {
                offset: index_ref.offset + u64::from(index_ref.size),
                size: free_index.len() as u32,
            };
            index_page.extend_from_slice(&free_index);
            free_ref
        });

        self.metablock_rows
            .unwrap_or(self.num_rows)
            .write_le(&mut out);
        write_page_ref(&index_ref, &mut out);
        match free_index_ref {
            None => 0u8.write_le(&mut out),
            Some(free_ref) => {
                1u8.write_le(&mut out);
                write_page_ref(&free_ref, &mut out);
            }
        }
        debug_assert_eq!(out.len(), pages_start);

        out.extend_from_slice(&pages);
        // The free index, if any, directly follows the page index.
        out.extend_from_slice(&index_page);
        out
    }
}

fn write_page_ref(page: &PageRef, out: &mut Vec<u8>) {
    page.offset.write_le(out);
    page.size.write_le(out);
}
