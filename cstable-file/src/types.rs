use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The physical on-disk bit layout of a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum StorageEncoding {
    /// One bit per boolean, LSB-first.
    BooleanBitpacked = 1,
    /// `u32` values packed at a fixed bit width.
    UInt32Bitpacked = 10,
    /// Little-endian `u32`.
    UInt32Plain = 11,
    /// Little-endian `u64`.
    UInt64Plain = 12,
    /// Unsigned LEB128 varints.
    UInt64Leb128 = 13,
    /// Little-endian IEEE-754 binary64.
    FloatIeee754 = 14,
    /// LEB128 length-prefixed byte strings.
    StringPlain = 100,
}

impl StorageEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BooleanBitpacked => "BOOLEAN_BITPACKED",
            Self::UInt32Bitpacked => "UINT32_BITPACKED",
            Self::UInt32Plain => "UINT32_PLAIN",
            Self::UInt64Plain => "UINT64_PLAIN",
            Self::UInt64Leb128 => "UINT64_LEB128",
            Self::FloatIeee754 => "FLOAT_IEEE754",
            Self::StringPlain => "STRING_PLAIN",
        }
    }
}

impl Display for StorageEncoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The semantic value type of a column, independent of its physical storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum LogicalType {
    Boolean = 1,
    UnsignedInt = 2,
    SignedInt = 3,
    Float = 4,
    String = 5,
    DateTime = 6,
}

impl LogicalType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::UnsignedInt => "UNSIGNED_INT",
            Self::SignedInt => "SIGNED_INT",
            Self::Float => "FLOAT",
            Self::String => "STRING",
            Self::DateTime => "DATETIME",
        }
    }
}

impl Display for LogicalType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The on-disk format version, read from the file prologue.
///
/// Each version has its own header parsing branch and its own column construction branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum BinaryFormatVersion {
    /// Flat layout: one contiguous, memory-mapped body region per column.
    V0_1_0 = 1,
    /// Paged layout: level and value streams resolved through a page index.
    V0_2_0 = 2,
}

impl Display for BinaryFormatVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V0_1_0 => f.write_str("v0.1.0"),
            Self::V0_2_0 => f.write_str("v0.2.0"),
        }
    }
}

/// Metadata for one column, immutable once parsed from the file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnConfig {
    /// `0` marks an anonymous column, reachable by name only.
    pub column_id: u32,
    pub column_name: String,
    pub storage_type: StorageEncoding,
    pub logical_type: LogicalType,
    /// Upper bound for the repetition levels a decoder of this column emits.
    pub rlevel_max: u16,
    /// Upper bound for the definition levels a decoder of this column emits. `0` means the
    /// column has no optional or repeated ancestors and every occurrence carries a value.
    pub dlevel_max: u16,
    /// Absolute file offset of the column body. Only meaningful in [`BinaryFormatVersion::V0_1_0`].
    pub body_offset: u64,
    /// Size of the column body in bytes. Only meaningful in [`BinaryFormatVersion::V0_1_0`].
    pub body_size: u64,
}

impl ColumnConfig {
    /// Whether the column is reachable through the id index.
    pub fn has_id(&self) -> bool {
        self.column_id > 0
    }
}
