//! Per-column decoders.
//!
//! A decoder yields one [`Occurrence`] per logical value occurrence of its column: the
//! repetition level, the definition level, and the value if it is defined at the leaf. Every call
//! to [`ColumnDecoder::occurrences`] starts an independent cursor at the beginning of the column,
//! so any number of scans may run concurrently over the same reader.

mod v1;
mod v2;

use cstable_error::{CSTableResult, cstable_err};
pub use v1::*;
pub use v2::*;

use crate::{ColumnConfig, LogicalType, StorageEncoding};

/// A decoded value, borrowing from the reader's storage where possible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Boolean(bool),
    UInt32(u32),
    UInt64(u64),
    Float64(f64),
    String(&'a [u8]),
}

impl<'a> Value<'a> {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The value as an unsigned integer, widening 32-bit values.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt32(v) => Some(u64::from(*v)),
            Self::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            Self::String(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The value as UTF-8 text, if it is a string holding valid UTF-8.
    pub fn as_str(&self) -> Option<&'a str> {
        self.as_bytes()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

/// One produced unit of a column decoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occurrence<'a> {
    /// `0` starts a new top-level record.
    pub rlevel: u16,
    /// Below the column's `dlevel_max`, the value or one of its ancestors is absent.
    pub dlevel: u16,
    pub value: Option<Value<'a>>,
}

impl<'a> Occurrence<'a> {
    pub fn new(rlevel: u16, dlevel: u16, value: Option<Value<'a>>) -> Self {
        Self {
            rlevel,
            dlevel,
            value,
        }
    }

    /// Whether this occurrence carries a value rather than only marking an absence.
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

/// A lazy, single-consumer cursor over the occurrences of one column.
///
/// The cursor yields at most one error, after which it is exhausted.
pub type Occurrences<'a> = Box<dyn Iterator<Item = CSTableResult<Occurrence<'a>>> + Send + 'a>;

/// The capability set shared by every column decoder, whatever the file layout.
pub trait ColumnDecoder<'a> {
    /// The header entry this decoder was built from.
    fn config(&self) -> &'a ColumnConfig;

    /// Start a fresh cursor at the first occurrence of the column.
    fn occurrences(&self) -> CSTableResult<Occurrences<'a>>;

    fn encoding(&self) -> StorageEncoding {
        self.config().storage_type
    }

    fn logical_type(&self) -> LogicalType {
        self.config().logical_type
    }

    fn rlevel_max(&self) -> u16 {
        self.config().rlevel_max
    }

    fn dlevel_max(&self) -> u16 {
        self.config().dlevel_max
    }
}

/// A decoder for one column of an open [`CSTableReader`](crate::CSTableReader).
///
/// The decoder borrows the reader's storage and cannot outlive it.
pub enum ColumnReader<'a> {
    Flat(FlatColumnReader<'a>),
    Paged(PagedColumnReader<'a>),
}

impl<'a> ColumnDecoder<'a> for ColumnReader<'a> {
    fn config(&self) -> &'a ColumnConfig {
        match self {
            Self::Flat(reader) => reader.config(),
            Self::Paged(reader) => reader.config(),
        }
    }

    fn occurrences(&self) -> CSTableResult<Occurrences<'a>> {
        match self {
            Self::Flat(reader) => reader.occurrences(),
            Self::Paged(reader) => reader.occurrences(),
        }
    }
}

/// Narrow a decoded level to `u16`, rejecting levels above the column maximum.
pub(crate) fn check_level(level: u64, max: u16, kind: &str) -> CSTableResult<u16> {
    u16::try_from(level)
        .ok()
        .filter(|&level| level <= max)
        .ok_or_else(|| cstable_err!("{kind} level {level} exceeds maximum {max}"))
}
