use std::ops::Range;

use cstable_buffer::ByteSliceExt;
use cstable_encodings::{
    BitPackedDecoder, BooleanDecoder, Ieee754Decoder, Leb128Decoder, PlainStringDecoder,
    UInt32PlainDecoder, UInt64PlainDecoder, ValueDecoder,
};
use cstable_error::{CSTableResult, cstable_bail, cstable_err};

use crate::columns::{ColumnDecoder, Occurrence, Occurrences, Value, check_level};
use crate::{ColumnConfig, StorageEncoding};

/// `occurrence_count`, `rlevel_size` and `dlevel_size`, each a `u64`.
const BODY_HEADER_SIZE: usize = 24;

/// The validated layout of one column body inside the mapped file.
///
/// All ranges are absolute offsets into the mapped region.
#[derive(Debug, Clone)]
pub(crate) struct FlatColumn {
    occurrence_count: u64,
    rlevels: Range<usize>,
    dlevels: Range<usize>,
    values: Range<usize>,
}

impl FlatColumn {
    /// Validate the body header of `config` within `region`.
    ///
    /// Columns without repetition hold exactly one occurrence per row.
    pub(crate) fn try_new(config: &ColumnConfig, region: &[u8], num_rows: u64) -> CSTableResult<Self> {
        let start = usize::try_from(config.body_offset)?;
        let end = start
            .checked_add(usize::try_from(config.body_size)?)
            .filter(|&end| end <= region.len())
            .ok_or_else(|| cstable_err!(OutOfBounds: start, 0, region.len()))?;
        if end - start < BODY_HEADER_SIZE {
            cstable_bail!(
                "body of {} bytes is smaller than its {BODY_HEADER_SIZE} byte header",
                end - start
            );
        }

        let occurrence_count: u64 = region.struct_at(start)?;
        let rlevel_size = usize::try_from(region.struct_at::<u64>(start + 8)?)?;
        let dlevel_size = usize::try_from(region.struct_at::<u64>(start + 16)?)?;

        let rlevels_start = start + BODY_HEADER_SIZE;
        let Some(values_start) = rlevels_start
            .checked_add(rlevel_size)
            .and_then(|pos| pos.checked_add(dlevel_size))
            .filter(|&pos| pos <= end)
        else {
            cstable_bail!(
                "level streams of {rlevel_size} + {dlevel_size} bytes overrun a body of {} bytes",
                end - start
            );
        };
        let rlevels = rlevels_start..rlevels_start + rlevel_size;
        let dlevels = rlevels.end..values_start;

        check_level_stream(&region[rlevels.clone()], config.rlevel_max, occurrence_count, "repetition")?;
        check_level_stream(&region[dlevels.clone()], config.dlevel_max, occurrence_count, "definition")?;

        if config.rlevel_max == 0 && occurrence_count != num_rows {
            cstable_bail!(
                "non-repeated column holds {occurrence_count} occurrences for {num_rows} rows"
            );
        }

        Ok(Self {
            occurrence_count,
            rlevels,
            dlevels,
            values: values_start..end,
        })
    }
}

/// A level stream is present exactly when its maximum is non-zero, and must hold enough bits for
/// every occurrence.
fn check_level_stream(stream: &[u8], max: u16, occurrences: u64, kind: &str) -> CSTableResult<()> {
    if max == 0 {
        if !stream.is_empty() {
            cstable_bail!("{kind} level stream of {} bytes for a level maximum of 0", stream.len());
        }
        return Ok(());
    }

    let decoder = BitPackedDecoder::try_new(stream)?;
    let available = (stream.len() as u64 - 1) * 8;
    let needed = occurrences.saturating_mul(u64::from(decoder.bit_width()));
    if needed > available {
        cstable_bail!(
            "{kind} level stream holds {available} bits but {occurrences} occurrences need {needed}"
        );
    }
    Ok(())
}

/// Decoder over a column of a memory-mapped [`BinaryFormatVersion::V0_1_0`](crate::BinaryFormatVersion) file.
pub struct FlatColumnReader<'a> {
    config: &'a ColumnConfig,
    column: &'a FlatColumn,
    region: &'a [u8],
}

impl<'a> FlatColumnReader<'a> {
    pub(crate) fn new(config: &'a ColumnConfig, column: &'a FlatColumn, region: &'a [u8]) -> Self {
        Self {
            config,
            column,
            region,
        }
    }

    /// Number of occurrences stored in the column body.
    pub fn occurrence_count(&self) -> u64 {
        self.column.occurrence_count
    }

    fn stream(&self, range: &Range<usize>) -> CSTableResult<&'a [u8]> {
        self.region
            .get(range.clone())
            .ok_or_else(|| cstable_err!(OutOfBounds: range.end, 0, self.region.len()))
    }

    fn level_decoder(&self, range: &Range<usize>, max: u16) -> CSTableResult<Option<BitPackedDecoder<'a>>> {
        if max == 0 {
            return Ok(None);
        }
        BitPackedDecoder::try_new(self.stream(range)?).map(Some)
    }

    fn cursor<D>(&self, values: D, wrap: fn(D::Value) -> Value<'a>) -> CSTableResult<Occurrences<'a>>
    where
        D: ValueDecoder<'a> + Send + 'a,
    {
        Ok(Box::new(FlatCursor {
            column: &self.config.column_name,
            rlevel_max: self.config.rlevel_max,
            dlevel_max: self.config.dlevel_max,
            rlevels: self.level_decoder(&self.column.rlevels, self.config.rlevel_max)?,
            dlevels: self.level_decoder(&self.column.dlevels, self.config.dlevel_max)?,
            values,
            wrap,
            remaining: self.column.occurrence_count,
            done: false,
        }))
    }
}

impl<'a> ColumnDecoder<'a> for FlatColumnReader<'a> {
    fn config(&self) -> &'a ColumnConfig {
        self.config
    }

    fn occurrences(&self) -> CSTableResult<Occurrences<'a>> {
        let values = self.stream(&self.column.values)?;
        match self.config.storage_type {
            StorageEncoding::BooleanBitpacked => self.cursor(BooleanDecoder::new(values), Value::Boolean),
            StorageEncoding::UInt32Bitpacked => {
                self.cursor(BitPackedDecoder::try_new(values)?, Value::UInt32)
            }
            StorageEncoding::UInt32Plain => self.cursor(UInt32PlainDecoder::new(values), Value::UInt32),
            StorageEncoding::UInt64Plain => self.cursor(UInt64PlainDecoder::new(values), Value::UInt64),
            StorageEncoding::UInt64Leb128 => self.cursor(Leb128Decoder::new(values), Value::UInt64),
            StorageEncoding::FloatIeee754 => self.cursor(Ieee754Decoder::new(values), Value::Float64),
            StorageEncoding::StringPlain => self.cursor(PlainStringDecoder::new(values), Value::String),
        }
    }
}

/// Zips the level streams with the value stream of a flat column.
struct FlatCursor<'a, D: ValueDecoder<'a>> {
    column: &'a str,
    rlevel_max: u16,
    dlevel_max: u16,
    rlevels: Option<BitPackedDecoder<'a>>,
    dlevels: Option<BitPackedDecoder<'a>>,
    values: D,
    wrap: fn(D::Value) -> Value<'a>,
    remaining: u64,
    done: bool,
}

impl<'a, D: ValueDecoder<'a>> FlatCursor<'a, D> {
    fn advance(&mut self) -> CSTableResult<Occurrence<'a>> {
        let rlevel = match self.rlevels.as_mut() {
            Some(rlevels) => check_level(u64::from(rlevels.next_value()?), self.rlevel_max, "repetition")?,
            None => 0,
        };
        let dlevel = match self.dlevels.as_mut() {
            Some(dlevels) => check_level(u64::from(dlevels.next_value()?), self.dlevel_max, "definition")?,
            None => 0,
        };
        let value = if dlevel == self.dlevel_max {
            Some((self.wrap)(self.values.next_value()?))
        } else {
            None
        };
        Ok(Occurrence::new(rlevel, dlevel, value))
    }

    /// Every occurrence has been produced; no stream may hold more than padding.
    fn finish(&self) -> CSTableResult<()> {
        for (levels, kind) in [(&self.rlevels, "repetition"), (&self.dlevels, "definition")] {
            let remaining = levels.as_ref().map_or(0, |levels| levels.remaining_bytes());
            if remaining > 0 {
                cstable_bail!("{kind} level stream holds {remaining} bytes past the last occurrence");
            }
        }
        let remaining = self.values.remaining_bytes();
        if remaining > 0 {
            cstable_bail!("value stream holds {remaining} bytes past the last occurrence");
        }
        Ok(())
    }
}

impl<'a, D: ValueDecoder<'a>> Iterator for FlatCursor<'a, D> {
    type Item = CSTableResult<Occurrence<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = if self.remaining == 0 {
            self.done = true;
            self.finish().map(|()| None)
        } else {
            self.remaining -= 1;
            self.advance().map(Some)
        };
        match result {
            Ok(occurrence) => occurrence.map(Ok),
            Err(e) => {
                self.done = true;
                Some(Err(e.with_context(format!("failed to decode column {}", self.column))))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        // The end-of-stream check may still yield one error.
        (0, usize::try_from(self.remaining).ok().and_then(|n| n.checked_add(1)))
    }
}

#[cfg(test)]
mod tests {
    use cstable_buffer::LeValue;
    use cstable_encodings::{bitpack_encode, plain_encode};

    use super::*;
    use crate::LogicalType;

    fn config(rlevel_max: u16, dlevel_max: u16, body_size: u64) -> ColumnConfig {
        ColumnConfig {
            column_id: 1,
            column_name: "c".to_string(),
            storage_type: StorageEncoding::UInt64Plain,
            logical_type: LogicalType::UnsignedInt,
            rlevel_max,
            dlevel_max,
            body_offset: 0,
            body_size,
        }
    }

    fn body(occurrences: u64, rlevels: &[u8], dlevels: &[u8], values: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        occurrences.write_le(&mut out);
        (rlevels.len() as u64).write_le(&mut out);
        (dlevels.len() as u64).write_le(&mut out);
        out.extend_from_slice(rlevels);
        out.extend_from_slice(dlevels);
        out.extend_from_slice(values);
        out
    }

    fn collect(reader: &FlatColumnReader<'_>) -> CSTableResult<Vec<(u16, u16, Option<u64>)>> {
        reader
            .occurrences()?
            .map(|o| o.map(|o| (o.rlevel, o.dlevel, o.value.and_then(|v| v.as_u64()))))
            .collect()
    }

    #[test]
    fn zips_levels_and_values() {
        let bytes = body(
            4,
            &bitpack_encode(&[0, 1, 0, 0]),
            &bitpack_encode(&[1, 1, 0, 1]),
            &plain_encode(&[5u64, 6, 7]),
        );
        let config = config(1, 1, bytes.len() as u64);
        let column = FlatColumn::try_new(&config, &bytes, 3).unwrap();
        let reader = FlatColumnReader::new(&config, &column, &bytes);
        assert_eq!(reader.occurrence_count(), 4);
        assert_eq!(
            collect(&reader).unwrap(),
            vec![(0, 1, Some(5)), (1, 1, Some(6)), (0, 0, None), (0, 1, Some(7))]
        );
    }

    #[test]
    fn level_stream_without_maximum_is_rejected() {
        let bytes = body(1, &bitpack_encode(&[0]), &[], &plain_encode(&[5u64]));
        let config = config(0, 0, bytes.len() as u64);
        assert!(FlatColumn::try_new(&config, &bytes, 1).unwrap_err().is_format());
    }

    #[test]
    fn short_level_stream_is_rejected() {
        let bytes = body(9, &[], &bitpack_encode(&[1, 1]), &plain_encode(&[5u64, 6]));
        let config = config(0, 1, bytes.len() as u64);
        let err = FlatColumn::try_new(&config, &bytes, 9).unwrap_err();
        assert!(err.to_string().contains("definition level stream"));
    }

    #[test]
    fn level_above_maximum_fails_the_cursor_once() {
        let bytes = body(2, &[], &bitpack_encode(&[1, 3]), &plain_encode(&[5u64]));
        let config = config(0, 1, bytes.len() as u64);
        let column = FlatColumn::try_new(&config, &bytes, 2).unwrap();
        let reader = FlatColumnReader::new(&config, &column, &bytes);
        let mut cursor = reader.occurrences().unwrap();
        assert!(cursor.next().unwrap().is_ok());
        let err = cursor.next().unwrap().unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("failed to decode column c"));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn truncated_value_stream_is_a_decode_error() {
        let bytes = body(2, &[], &[], &plain_encode(&[5u64]));
        let config = config(0, 0, bytes.len() as u64);
        let column = FlatColumn::try_new(&config, &bytes, 2).unwrap();
        let reader = FlatColumnReader::new(&config, &column, &bytes);
        assert!(collect(&reader).is_err());
    }

    #[test]
    fn leftover_value_fails_after_the_last_occurrence() {
        let bytes = body(2, &[], &[], &plain_encode(&[5u64, 6, 7]));
        let config = config(0, 0, bytes.len() as u64);
        let column = FlatColumn::try_new(&config, &bytes, 2).unwrap();
        let reader = FlatColumnReader::new(&config, &column, &bytes);
        let mut cursor = reader.occurrences().unwrap();
        assert_eq!(cursor.next().unwrap().unwrap().value, Some(Value::UInt64(5)));
        assert_eq!(cursor.next().unwrap().unwrap().value, Some(Value::UInt64(6)));
        let err = cursor.next().unwrap().unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("failed to decode column c"));
        assert!(err.to_string().contains("value stream holds 8 bytes"));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn leftover_level_bytes_fail_after_the_last_occurrence() {
        let mut dlevels = bitpack_encode(&[1, 1]);
        dlevels.push(0xFF);
        let bytes = body(2, &[], &dlevels, &plain_encode(&[5u64, 6]));
        let config = config(0, 1, bytes.len() as u64);
        let column = FlatColumn::try_new(&config, &bytes, 2).unwrap();
        let reader = FlatColumnReader::new(&config, &column, &bytes);
        let err = collect(&reader).unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("definition level stream holds 1 bytes"));
    }

    #[test]
    fn exhausted_cursor_stays_exhausted() {
        let bytes = body(1, &[], &[], &plain_encode(&[5u64]));
        let config = config(0, 0, bytes.len() as u64);
        let column = FlatColumn::try_new(&config, &bytes, 1).unwrap();
        let reader = FlatColumnReader::new(&config, &column, &bytes);
        let mut cursor = reader.occurrences().unwrap();
        assert!(cursor.next().unwrap().is_ok());
        assert!(cursor.next().is_none());
        assert!(cursor.next().is_none());
        assert_eq!(cursor.size_hint(), (0, Some(0)));
    }

    #[test]
    fn undersized_body_is_rejected() {
        let bytes = vec![0u8; 16];
        let config = config(0, 0, 16);
        assert!(FlatColumn::try_new(&config, &bytes, 0).is_err());
    }
}
