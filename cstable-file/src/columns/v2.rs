use cstable_error::{CSTableResult, cstable_bail, cstable_err};

use crate::columns::{ColumnDecoder, Occurrence, Occurrences, Value, check_level};
use crate::pages::{PageIndexEntryType, PageIndexKey, PageSource, UInt64PageReader};
use crate::{ColumnConfig, LogicalType};

/// The decoder family chosen for a paged column from its logical type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PagedKind {
    UnsignedInt,
}

/// The resolved streams of one column of a [`BinaryFormatVersion::V0_2_0`](crate::BinaryFormatVersion) file.
#[derive(Debug, Clone)]
pub(crate) struct PagedColumn {
    kind: PagedKind,
    rlevels: Option<PageIndexKey>,
    dlevels: Option<PageIndexKey>,
    data: PageIndexKey,
}

/// Resolve the streams of `config` through `pages` and pick its decoder by logical type.
///
/// Level streams are required exactly when the matching level maximum is non-zero. A column
/// without a value stream holds no values. A column without repetition holds exactly one
/// occurrence per row, which is checked from the page sizes alone.
pub(crate) fn open_column_v2(
    config: &ColumnConfig,
    pages: &dyn PageSource,
    num_rows: u64,
) -> CSTableResult<PagedColumn> {
    let rlevels = resolve_levels(config, pages, config.rlevel_max, PageIndexEntryType::RLevel)?;
    let dlevels = resolve_levels(config, pages, config.dlevel_max, PageIndexEntryType::DLevel)?;
    let data = PageIndexKey::new(config.column_id, PageIndexEntryType::Data);

    let kind = match config.logical_type {
        LogicalType::UnsignedInt => PagedKind::UnsignedInt,
        LogicalType::Boolean
        | LogicalType::SignedInt
        | LogicalType::Float
        | LogicalType::String
        | LogicalType::DateTime => {
            return Err(cstable_err!(
                UnsupportedEncoding: "logical type",
                u8::from(config.logical_type),
                config.column_name
            ));
        }
    };

    if config.rlevel_max == 0 {
        let driver = dlevels.as_ref().unwrap_or(&data);
        let occurrences = stream_len(pages, driver);
        if occurrences != num_rows {
            cstable_bail!(
                "non-repeated column {} holds {occurrences} occurrences for {num_rows} rows",
                config.column_name
            );
        }
    }

    Ok(PagedColumn {
        kind,
        rlevels,
        dlevels,
        data,
    })
}

/// The number of `u64` values in a stream, without loading any page.
fn stream_len(pages: &dyn PageSource, key: &PageIndexKey) -> u64 {
    pages
        .resolve(key)
        .unwrap_or_default()
        .iter()
        .map(|page| u64::from(page.size) / 8)
        .sum()
}

fn resolve_levels(
    config: &ColumnConfig,
    pages: &dyn PageSource,
    max: u16,
    entry_type: PageIndexEntryType,
) -> CSTableResult<Option<PageIndexKey>> {
    if max == 0 {
        return Ok(None);
    }
    let key = PageIndexKey::new(config.column_id, entry_type);
    if pages.resolve(&key).is_none() {
        cstable_bail!(
            "column {} has a level maximum of {max} but no {entry_type} stream",
            config.column_name
        );
    }
    Ok(Some(key))
}

/// Decoder over a column of a page-indexed [`BinaryFormatVersion::V0_2_0`](crate::BinaryFormatVersion) file.
pub struct PagedColumnReader<'a> {
    config: &'a ColumnConfig,
    column: &'a PagedColumn,
    pages: &'a dyn PageSource,
}

impl<'a> PagedColumnReader<'a> {
    pub(crate) fn new(config: &'a ColumnConfig, column: &'a PagedColumn, pages: &'a dyn PageSource) -> Self {
        Self {
            config,
            column,
            pages,
        }
    }

    fn stream(&self, key: &PageIndexKey) -> UInt64PageReader<'a> {
        UInt64PageReader::new(self.pages, self.pages.resolve(key).unwrap_or_default())
    }

    fn level_stream(&self, key: Option<&PageIndexKey>) -> CSTableResult<Option<UInt64PageReader<'a>>> {
        key.map(|key| {
            self.pages
                .resolve(key)
                .map(|refs| UInt64PageReader::new(self.pages, refs))
                .ok_or_else(|| cstable_err!("{key} stream of column {} disappeared", self.config.column_name))
        })
        .transpose()
    }
}

impl<'a> ColumnDecoder<'a> for PagedColumnReader<'a> {
    fn config(&self) -> &'a ColumnConfig {
        self.config
    }

    fn occurrences(&self) -> CSTableResult<Occurrences<'a>> {
        match self.column.kind {
            PagedKind::UnsignedInt => Ok(Box::new(UnsignedIntCursor {
                column: &self.config.column_name,
                rlevel_max: self.config.rlevel_max,
                dlevel_max: self.config.dlevel_max,
                rlevels: self.level_stream(self.column.rlevels.as_ref())?,
                dlevels: self.level_stream(self.column.dlevels.as_ref())?,
                data: self.stream(&self.column.data),
                done: false,
            })),
        }
    }
}

/// Zips the repetition level, definition level and value streams of an unsigned integer column.
///
/// The definition levels drive the cursor when present, then the repetition levels; a column
/// with neither yields one occurrence per value.
struct UnsignedIntCursor<'a> {
    column: &'a str,
    rlevel_max: u16,
    dlevel_max: u16,
    rlevels: Option<UInt64PageReader<'a>>,
    dlevels: Option<UInt64PageReader<'a>>,
    data: UInt64PageReader<'a>,
    done: bool,
}

impl<'a> UnsignedIntCursor<'a> {
    fn advance(&mut self) -> CSTableResult<Option<Occurrence<'a>>> {
        if self.rlevels.is_none() && self.dlevels.is_none() {
            return Ok(self
                .data
                .next_value()?
                .map(|value| Occurrence::new(0, 0, Some(Value::UInt64(value)))));
        }

        let dlevel = match self.dlevels.as_mut() {
            Some(dlevels) => match dlevels.next_value()? {
                Some(dlevel) => Some(dlevel),
                None => return self.finish(),
            },
            None => None,
        };
        let rlevel = match self.rlevels.as_mut() {
            Some(rlevels) => match rlevels.next_value()? {
                Some(rlevel) => rlevel,
                None if dlevel.is_none() => return self.finish(),
                None => cstable_bail!("repetition level stream ended before the definition levels"),
            },
            None => 0,
        };

        let rlevel = check_level(rlevel, self.rlevel_max, "repetition")?;
        let dlevel = check_level(dlevel.unwrap_or(0), self.dlevel_max, "definition")?;
        let value = if dlevel == self.dlevel_max {
            let value = self
                .data
                .next_value()?
                .ok_or_else(|| cstable_err!("value stream ended before the level streams"))?;
            Some(Value::UInt64(value))
        } else {
            None
        };
        Ok(Some(Occurrence::new(rlevel, dlevel, value)))
    }

    /// The driving stream is exhausted; every other stream must be too.
    fn finish(&mut self) -> CSTableResult<Option<Occurrence<'a>>> {
        if let Some(rlevels) = self.rlevels.as_mut() {
            if rlevels.next_value()?.is_some() {
                cstable_bail!("repetition level stream outlasts the definition levels");
            }
        }
        if self.data.next_value()?.is_some() {
            cstable_bail!("value stream holds more values than the levels define");
        }
        Ok(None)
    }
}

impl<'a> Iterator for UnsignedIntCursor<'a> {
    type Item = CSTableResult<Occurrence<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(occurrence)) => Some(Ok(occurrence)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e.with_context(format!("failed to decode column {}", self.column))))
            }
        }
    }
}
