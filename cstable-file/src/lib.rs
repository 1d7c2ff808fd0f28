#![allow(clippy::cast_possible_truncation)]
//! Read CSTable files, a columnar table format for nested and repeated records.
//!
//! Every column stores its values together with Dremel-style repetition and definition levels,
//! so that nested records can be reassembled from independent per-column scans. A reader opens a
//! file, exposes its column table, and hands out a lazy decoder per column.
//!
//! # Reading
//!
//! ```no_run
//! use cstable_file::{CSTableReader, ColumnDecoder};
//!
//! let reader = CSTableReader::open_file("events.cst")?;
//! for occurrence in reader.column_reader("tags")?.occurrences()? {
//!     let occurrence = occurrence?;
//!     if occurrence.rlevel == 0 {
//!         // a new record starts here
//!     }
//! }
//! # Ok::<(), cstable_error::CSTableError>(())
//! ```
//!
//! # File Format
//!
//! A file starts with an 8 byte prologue: the magic bytes `CSTB`, a `u16` format version and
//! a reserved `u16`. Two incompatible layouts follow, selected by the version.
//!
//! [`BinaryFormatVersion::V0_1_0`] files are memory-mapped. The header lists every column with
//! the absolute offset and size of its body; a body holds the bitpacked level streams followed by
//! the encoded values.
//!
//! [`BinaryFormatVersion::V0_2_0`] files are read through a page store. The header is followed by
//! a metadata block with the canonical row count and the location of a page index, which maps
//! each `(column id, stream)` pair to the pages holding that stream.
//!
//! ## Illustrated File Format
//! ```text
//! ┌────────────────────────────┐          ┌────────────────────────────┐
//! │  Prologue (magic, version) │          │  Prologue (magic, version) │
//! ├────────────────────────────┤          ├────────────────────────────┤
//! │   Header: rows, columns    │          │   Header: rows, columns    │
//! │   (body offset and size)   │          ├────────────────────────────┤
//! ├────────────────────────────┤          │  Metadata Block: rows,     │
//! │        Column Body         │          │  page index, free index    │
//! │  (r-levels, d-levels,      │          ├────────────────────────────┤
//! │         values)            │          │           Pages            │
//! ├────────────────────────────┤          ├────────────────────────────┤
//! │            ...             │          │   Page Index, Free Index   │
//! └────────────────────────────┘          └────────────────────────────┘
//!            v0.1.0                                  v0.2.0
//! ```

mod columns;
mod header;
mod open;
mod pages;
mod reader;
#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;
#[cfg(test)]
mod tests;
mod types;

pub use columns::*;
pub use header::*;
pub use open::*;
pub use pages::{
    MokaPageCache, PageCache, PageCacheKey, PageIndexEntryType, PageIndexKey, PageRef, PageSource,
    PageStore, PageStoreOptions, UInt64PageReader,
};
pub use reader::*;
pub use types::*;

/// The magic bytes at the start of every CSTable file.
pub const MAGIC_BYTES: [u8; 4] = *b"CSTB";

/// Size of the magic bytes, version and reserved field that open every file.
pub const PROLOGUE_SIZE: usize = 8;

/// Capacity of the page cache used when none is configured.
pub const DEFAULT_PAGE_CACHE_BYTES: u64 = 64 << 20;
