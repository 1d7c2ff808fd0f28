//! Parsing of the file prologue and the version-specific metadata block.

mod stream;

use std::io::Read;

use cstable_error::{CSTableResult, cstable_bail, cstable_err};
use stream::HeaderStream;

use crate::pages::PageRef;
use crate::{BinaryFormatVersion, ColumnConfig, LogicalType, MAGIC_BYTES, StorageEncoding};

/// The column table and row count, authoritative for [`BinaryFormatVersion::V0_1_0`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub columns: Vec<ColumnConfig>,
    pub num_rows: u64,
}

/// Metadata that only [`BinaryFormatVersion::V0_2_0`] files carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaBlock {
    /// The canonical row count; takes precedence over [`FileHeader::num_rows`].
    pub num_rows: u64,
    /// Location of the page index page.
    pub index: PageRef,
}

/// Everything read from the front of a file before any column data is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader {
    pub version: BinaryFormatVersion,
    pub header: FileHeader,
    pub metablock: Option<MetaBlock>,
    pub free_index: Option<PageRef>,
}

/// Parse the header from `read`, positioned at the start of a file of `file_size` bytes.
///
/// Column body ranges of flat files are validated against `file_size`; page references are
/// validated when the page store opens.
#[cfg_attr(feature = "tracing", tracing::instrument(skip(read)))]
pub fn read_header(read: impl Read, file_size: u64) -> CSTableResult<ParsedHeader> {
    let mut stream = HeaderStream::new(read);

    let magic: [u8; 4] = stream.read_array()?;
    if magic != MAGIC_BYTES {
        cstable_bail!("Malformed file, invalid magic bytes, got {magic:?}")
    }
    let version = stream.read_u16()?;
    let version = BinaryFormatVersion::try_from(version)
        .map_err(|_| cstable_err!("Malformed file, unsupported version {version}"))?;
    let reserved = stream.read_u16()?;
    if reserved != 0 {
        cstable_bail!("Malformed file, reserved prologue field is {reserved}");
    }

    let num_rows = stream.read_u64()?;
    let num_columns = stream.read_u32()?;
    // Bound the up-front allocation by what the file could possibly hold.
    let mut columns = Vec::with_capacity(
        usize::try_from(num_columns)?.min(usize::try_from(file_size / 12).unwrap_or(usize::MAX)),
    );
    for _ in 0..num_columns {
        columns.push(read_column(&mut stream, version, file_size)?);
    }

    let (metablock, free_index) = match version {
        BinaryFormatVersion::V0_1_0 => (None, None),
        BinaryFormatVersion::V0_2_0 => {
            let num_rows = stream.read_u64()?;
            let index = read_page_ref(&mut stream)?;
            let free_index = match stream.read_u8()? {
                0 => None,
                1 => Some(read_page_ref(&mut stream)?),
                flag => cstable_bail!("Malformed file, invalid free index flag {flag}"),
            };
            (Some(MetaBlock { num_rows, index }), free_index)
        }
    };

    log::debug!(
        "Parsed {version} header: {} columns, {} header bytes",
        columns.len(),
        stream.consumed()
    );

    Ok(ParsedHeader {
        version,
        header: FileHeader { columns, num_rows },
        metablock,
        free_index,
    })
}

fn read_column<R: Read>(
    stream: &mut HeaderStream<R>,
    version: BinaryFormatVersion,
    file_size: u64,
) -> CSTableResult<ColumnConfig> {
    let column_id = stream.read_u32()?;
    let storage_tag = stream.read_u8()?;
    let logical_tag = stream.read_u8()?;
    let rlevel_max = stream.read_u16()?;
    let dlevel_max = stream.read_u16()?;
    let name_len = stream.read_u16()?;
    let column_name = String::from_utf8(stream.read_bytes(usize::from(name_len))?)
        .map_err(|e| cstable_err!("Malformed file, column name is not UTF-8: {e}"))?;

    let (body_offset, body_size) = match version {
        BinaryFormatVersion::V0_1_0 => {
            let body_offset = stream.read_u64()?;
            let body_size = stream.read_u64()?;
            if body_offset
                .checked_add(body_size)
                .is_none_or(|end| end > file_size)
            {
                cstable_bail!(
                    "column {column_name} body at {body_offset}+{body_size} exceeds file size {file_size}"
                );
            }
            (body_offset, body_size)
        }
        BinaryFormatVersion::V0_2_0 => (0, 0),
    };

    let storage_type = StorageEncoding::try_from(storage_tag).map_err(
        |_| cstable_err!(UnsupportedEncoding: "storage encoding", storage_tag, column_name),
    )?;
    let logical_type = LogicalType::try_from(logical_tag)
        .map_err(|_| cstable_err!(UnsupportedEncoding: "logical type", logical_tag, column_name))?;

    Ok(ColumnConfig {
        column_id,
        column_name,
        storage_type,
        logical_type,
        rlevel_max,
        dlevel_max,
        body_offset,
        body_size,
    })
}

fn read_page_ref<R: Read>(stream: &mut HeaderStream<R>) -> CSTableResult<PageRef> {
    Ok(PageRef {
        offset: stream.read_u64()?,
        size: stream.read_u32()?,
    })
}
