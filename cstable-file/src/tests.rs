#![allow(clippy::panic)]

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use cstable_buffer::ByteBuffer;
use cstable_error::{CSTableError, CSTableResult};
use rstest::rstest;
use tempfile::NamedTempFile;

use crate::pages::{MokaPageCache, PageCache, PageCacheKey, PageIndexEntryType};
use crate::test_harness::{ColumnSpec, FileBuilder, TestValue};
use crate::*;

type Decoded = Vec<(u16, u16, Option<TestValue>)>;

fn write(builder: &FileBuilder) -> NamedTempFile {
    write_bytes(&builder.build())
}

fn write_bytes(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

fn open(builder: &FileBuilder) -> (NamedTempFile, CSTableReader) {
    let file = write(builder);
    let reader = CSTableReader::open_file(file.path()).unwrap();
    (file, reader)
}

fn owned(value: Value<'_>) -> TestValue {
    match value {
        Value::Boolean(b) => TestValue::Boolean(b),
        Value::UInt32(v) => TestValue::UInt32(v),
        Value::UInt64(v) => TestValue::UInt64(v),
        Value::Float64(v) => TestValue::Float64(v),
        Value::String(bytes) => TestValue::String(bytes.to_vec()),
    }
}

fn decode_reader(reader: &ColumnReader<'_>) -> CSTableResult<Decoded> {
    reader
        .occurrences()?
        .map(|o| o.map(|o| (o.rlevel, o.dlevel, o.value.map(owned))))
        .collect()
}

fn decode(reader: &CSTableReader, name: &str) -> Decoded {
    decode_reader(&reader.column_reader(name).unwrap()).unwrap()
}

fn present<V: Into<TestValue>>(values: impl IntoIterator<Item = V>) -> Decoded {
    values.into_iter().map(|v| (0, 0, Some(v.into()))).collect()
}

/// `id` is a required `u64`; `tags` is a repeated string. Of the three records, the first holds
/// one tag, the second none and the third two. A record without tags writes no occurrence, so
/// `tags` holds one record start per non-empty record.
fn two_column_file() -> FileBuilder {
    FileBuilder::v1(3)
        .column(ColumnSpec::uint64("id", 1).values([100u64, 200, 300]))
        .column(
            ColumnSpec::string("tags", 2)
                .levels(1, 1)
                .occurrence(0, 1, "red")
                .occurrence(0, 1, "green")
                .occurrence(1, 1, "blue"),
        )
}

#[test]
#[cfg_attr(miri, ignore)]
fn two_column_scenario() {
    let (_file, reader) = open(&two_column_file());
    assert_eq!(reader.num_records(), 3);
    assert_eq!(reader.version(), BinaryFormatVersion::V0_1_0);
    assert_eq!(reader.columns().len(), 2);

    let id = decode(&reader, "id");
    assert_eq!(id, present([100u64, 200, 300]));

    let tags = decode(&reader, "tags");
    // 1 + 0 + 2 tags; the empty record leaves no marker.
    assert_eq!(tags.len(), 3);
    assert_eq!(tags.iter().filter(|(r, ..)| *r == 0).count(), 2);
    assert_eq!(
        tags,
        vec![
            (0, 1, Some(TestValue::from("red"))),
            (0, 1, Some(TestValue::from("green"))),
            (1, 1, Some(TestValue::from("blue"))),
        ]
    );
}

#[test]
#[cfg_attr(miri, ignore)]
fn empty_record_as_level_only_marker() {
    let (_file, reader) = open(
        &FileBuilder::v1(3).column(
            ColumnSpec::string("tags", 2)
                .levels(1, 1)
                .occurrence(0, 1, "red")
                .absent(0, 0)
                .occurrence(0, 1, "green")
                .occurrence(1, 1, "blue"),
        ),
    );
    let tags = decode(&reader, "tags");
    assert_eq!(tags.len(), 4);
    assert_eq!(tags[1], (0, 0, None));
    assert_eq!(tags.iter().filter(|(r, ..)| *r == 0).count(), 3);
}

#[rstest]
#[cfg_attr(miri, ignore)]
#[case::boolean(
    ColumnSpec::boolean("c", 1).values([true, false, true, true, false, false, false, false, true]),
    present([true, false, true, true, false, false, false, false, true])
)]
#[case::uint32_bitpacked(ColumnSpec::uint32_bitpacked("c", 1).values([3u32, 0, 17, 1000]), present([3u32, 0, 17, 1000]))]
#[case::uint32_plain(ColumnSpec::uint32("c", 1).values([u32::MAX, 0, 7]), present([u32::MAX, 0, 7]))]
#[case::uint64_plain(ColumnSpec::uint64("c", 1).values([u64::MAX, 1]), present([u64::MAX, 1]))]
#[case::uint64_leb128(ColumnSpec::leb128("c", 1).values([0u64, 127, 128, u64::MAX]), present([0u64, 127, 128, u64::MAX]))]
#[case::float(ColumnSpec::float("c", 1).values([1.5f64, -2.25, 1e300]), present([1.5f64, -2.25, 1e300]))]
#[case::string(ColumnSpec::string("c", 1).values(["", "hello", "wörld"]), present(["", "hello", "wörld"]))]
fn flat_encodings_round_trip(#[case] column: ColumnSpec, #[case] expected: Decoded) {
    let (_file, reader) = open(&FileBuilder::v1(expected.len() as u64).column(column));
    assert_eq!(decode(&reader, "c"), expected);
}

#[test]
#[cfg_attr(miri, ignore)]
fn nested_levels_round_trip() {
    let (_file, reader) = open(
        &FileBuilder::v1(3).column(
            ColumnSpec::leb128("c", 1)
                .levels(2, 2)
                .occurrence(0, 2, 1u64)
                .occurrence(2, 2, 2u64)
                .absent(1, 1)
                .absent(0, 0)
                .occurrence(0, 2, 3u64),
        ),
    );
    assert_eq!(
        decode(&reader, "c"),
        vec![
            (0, 2, Some(TestValue::UInt64(1))),
            (2, 2, Some(TestValue::UInt64(2))),
            (1, 1, None),
            (0, 0, None),
            (0, 2, Some(TestValue::UInt64(3))),
        ]
    );
}

#[test]
#[cfg_attr(miri, ignore)]
fn lookups_by_name() {
    let (file, reader) = open(&two_column_file());
    assert!(reader.has_column("id"));
    assert!(reader.has_column("tags"));
    assert!(!reader.has_column("missing"));
    assert!(!reader.has_column(""));

    let err = reader.column_reader("missing").err().unwrap();
    assert!(err.is_not_found());
    assert!(err.to_string().contains(&file.path().display().to_string()));
    assert!(reader.column_encoding("missing").unwrap_err().is_not_found());
    assert!(reader.column_type("missing").unwrap_err().is_not_found());
    assert!(reader.column_config("missing").unwrap_err().is_not_found());
    assert_eq!(reader.path(), file.path());
}

#[test]
#[cfg_attr(miri, ignore)]
fn encoding_and_type_match_the_header() {
    let (_file, reader) = open(&two_column_file());
    for config in reader.columns() {
        let name = config.column_name.as_str();
        assert_eq!(reader.column_encoding(name).unwrap(), config.storage_type);
        assert_eq!(reader.column_type(name).unwrap(), config.logical_type);
        assert_eq!(reader.column_config(name).unwrap(), config);

        let column = reader.column_reader(name).unwrap();
        assert_eq!(column.rlevel_max(), config.rlevel_max);
        assert_eq!(column.dlevel_max(), config.dlevel_max);
    }
    assert_eq!(reader.column_encoding("tags").unwrap(), StorageEncoding::StringPlain);
    assert_eq!(reader.column_type("id").unwrap(), LogicalType::UnsignedInt);
}

#[test]
#[cfg_attr(miri, ignore)]
fn unknown_version_is_a_format_error() {
    let file = write(&two_column_file().version_tag(7));
    let err = CSTableReader::open_file(file.path()).err().unwrap();
    assert!(err.is_format());
    assert!(err.to_string().contains("unsupported version 7"));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

#[test]
#[cfg_attr(miri, ignore)]
fn bad_magic_is_a_format_error() {
    let file = write(&two_column_file().magic(*b"PAR1"));
    let err = CSTableReader::open_file(file.path()).err().unwrap();
    assert!(err.is_format());
    assert!(err.to_string().contains("invalid magic"));
}

#[rstest]
#[cfg_attr(miri, ignore)]
#[case(0)]
#[case(PROLOGUE_SIZE - 1)]
#[case(PROLOGUE_SIZE + 10)]
#[case(40)]
fn truncated_header_is_a_format_error(#[case] len: usize) {
    let bytes = two_column_file().build();
    let file = write_bytes(&bytes[..len]);
    let err = CSTableReader::open_file(file.path()).err().unwrap();
    assert!(err.is_format(), "{err}");
}

#[test]
#[cfg_attr(miri, ignore)]
fn body_past_end_of_file_is_rejected() {
    let mut bytes = two_column_file().build();
    bytes.pop();
    let file = write_bytes(&bytes);
    let err = CSTableReader::open_file(file.path()).err().unwrap();
    assert!(err.is_format());
    assert!(err.to_string().contains("column tags body"));
}

#[test]
#[cfg_attr(miri, ignore)]
fn unknown_storage_tag_is_unsupported() {
    let file = write(
        &FileBuilder::v1(1).column(ColumnSpec::uint64("id", 1).values([1u64]).storage_tag(255)),
    );
    let err = CSTableReader::open_file(file.path()).err().unwrap();
    assert!(err.is_unsupported_encoding());
    assert!(err.to_string().contains("storage encoding tag 255"));
    assert!(err.to_string().contains("\"id\""));
}

#[test]
#[cfg_attr(miri, ignore)]
fn unknown_logical_tag_is_unsupported() {
    let file = write(&FileBuilder::v1(1).column(ColumnSpec::uint64("id", 1).values([1u64]).logical_tag(77)));
    let err = CSTableReader::open_file(file.path()).err().unwrap();
    assert!(err.is_unsupported_encoding());
    assert!(err.to_string().contains("logical type tag 77"));
}

#[test]
#[cfg_attr(miri, ignore)]
fn non_repeated_column_must_match_row_count() {
    let file = write(&FileBuilder::v1(5).column(ColumnSpec::uint64("id", 1).values([1u64, 2, 3])));
    let err = CSTableReader::open_file(file.path()).err().unwrap();
    assert!(err.is_format());
    assert!(err.to_string().contains("invalid column id"));
}

#[test]
#[cfg_attr(miri, ignore)]
fn paged_row_count_comes_from_metablock() {
    let (_file, reader) = open(
        &FileBuilder::v2(3)
            .metablock_rows(42)
            .values_per_page(10)
            .column(ColumnSpec::uint64("id", 1).values(0..42u64)),
    );
    assert_eq!(reader.version(), BinaryFormatVersion::V0_2_0);
    assert_eq!(reader.num_records(), 42);
    assert_eq!(decode(&reader, "id"), present(0..42u64));
}

#[test]
#[cfg_attr(miri, ignore)]
fn paged_non_repeated_column_must_match_row_count() {
    let file = write(
        &FileBuilder::v2(3)
            .metablock_rows(42)
            .column(ColumnSpec::uint64("id", 1).values([1u64, 2, 3])),
    );
    let err = CSTableReader::open_file(file.path()).err().unwrap();
    assert!(err.is_format());
    assert!(err.to_string().contains("non-repeated column id holds 3 occurrences for 42 rows"));
}

#[test]
#[cfg_attr(miri, ignore)]
fn leftover_bytes_in_a_flat_column_fail_the_scan() {
    let (_file, reader) = open(
        &FileBuilder::v1(2).column(ColumnSpec::uint64("id", 1).values([1u64, 2]).trailing_bytes(8)),
    );
    let mut occurrences = reader.column_reader("id").unwrap().occurrences().unwrap();
    assert!(occurrences.next().unwrap().is_ok());
    assert!(occurrences.next().unwrap().is_ok());
    let err = occurrences.next().unwrap().unwrap_err();
    assert!(err.is_format());
    assert!(err.to_string().contains("failed to decode column id"));
    assert!(err.to_string().contains("value stream holds 8 bytes past the last occurrence"));
    assert!(occurrences.next().is_none());
}

#[test]
#[cfg_attr(miri, ignore)]
fn paged_levels_span_many_pages() {
    let (_file, reader) = open(
        &FileBuilder::v2(3).values_per_page(1).column(
            ColumnSpec::uint64("ids", 9)
                .levels(1, 2)
                .occurrence(0, 2, 5u64)
                .occurrence(1, 2, 6u64)
                .absent(1, 1)
                .absent(0, 0)
                .occurrence(0, 2, 7u64),
        ),
    );
    assert_eq!(
        decode(&reader, "ids"),
        vec![
            (0, 2, Some(TestValue::UInt64(5))),
            (1, 2, Some(TestValue::UInt64(6))),
            (1, 1, None),
            (0, 0, None),
            (0, 2, Some(TestValue::UInt64(7))),
        ]
    );
    assert_eq!(reader.column_encoding("ids").unwrap(), StorageEncoding::UInt64Plain);
}

#[test]
#[cfg_attr(miri, ignore)]
fn paged_unsupported_logical_type_fails_open() {
    let file = write(&FileBuilder::v2(1).column(ColumnSpec::uint64("n", 3).values([1u64]).logical_tag(3)));
    let err = CSTableReader::open_file(file.path()).err().unwrap();
    assert!(err.is_unsupported_encoding());
    assert!(err.to_string().contains("logical type tag 3"));
    assert!(err.to_string().contains("\"n\""));
}

#[rstest]
#[cfg_attr(miri, ignore)]
#[case(PageIndexEntryType::RLevel, "no RLEVEL stream")]
#[case(PageIndexEntryType::DLevel, "no DLEVEL stream")]
fn paged_missing_level_stream_fails_open(#[case] omitted: PageIndexEntryType, #[case] message: &str) {
    let file = write(
        &FileBuilder::v2(2).omit_stream(omitted).column(
            ColumnSpec::uint64("n", 3)
                .levels(1, 1)
                .occurrence(0, 1, 1u64)
                .occurrence(1, 1, 2u64),
        ),
    );
    let err = CSTableReader::open_file(file.path()).err().unwrap();
    assert!(err.is_format());
    assert!(err.to_string().contains(message));
}

#[test]
#[cfg_attr(miri, ignore)]
fn paged_free_index_is_held_by_the_store() {
    let (_file, reader) = open(
        &FileBuilder::v2(1)
            .free_page()
            .column(ColumnSpec::uint64("n", 1).values([1u64])),
    );
    assert_eq!(reader.page_store().unwrap().free_pages().len(), 1);

    let (_file, reader) = open(&two_column_file());
    assert!(reader.page_store().is_none());
}

#[test]
#[cfg_attr(miri, ignore)]
fn duplicate_names_last_wins() {
    let (_file, reader) = open(
        &FileBuilder::v1(2)
            .column(ColumnSpec::uint64("x", 1).values([1u64, 2]))
            .column(ColumnSpec::uint32("x", 2).values([3u32, 4])),
    );
    assert_eq!(reader.columns().len(), 2);
    assert_eq!(reader.column_encoding("x").unwrap(), StorageEncoding::UInt32Plain);
    assert_eq!(decode(&reader, "x"), present([3u32, 4]));
    // The shadowed column is not reachable by id either.
    assert!(reader.column_reader_by_id(1).err().unwrap().is_not_found());
    assert!(reader.column_reader_by_id(2).is_ok());
}

#[test]
#[cfg_attr(miri, ignore)]
fn duplicate_names_can_be_rejected() {
    let file = write(
        &FileBuilder::v1(2)
            .column(ColumnSpec::uint64("x", 1).values([1u64, 2]))
            .column(ColumnSpec::uint64("x", 2).values([3u64, 4])),
    );
    let err = CSTableOpenOptions::default()
        .with_duplicate_columns(DuplicateColumnPolicy::Reject)
        .open(file.path())
        .err()
        .unwrap();
    assert!(err.is_format());
    assert!(err.to_string().contains("duplicate column name x"));
}

#[test]
#[cfg_attr(miri, ignore)]
fn id_index_skips_anonymous_columns() {
    let (_file, reader) = open(
        &FileBuilder::v1(1)
            .column(ColumnSpec::uint64("anon", 0).values([1u64]))
            .column(ColumnSpec::uint64("named", 5).values([2u64])),
    );
    assert!(reader.column_reader_by_id(0).err().unwrap().is_not_found());
    assert!(reader.column_reader_by_id(6).err().unwrap().is_not_found());
    let by_id = reader.column_reader_by_id(5).unwrap();
    assert_eq!(by_id.config().column_name, "named");
    assert_eq!(decode_reader(&by_id).unwrap(), present([2u64]));
    assert!(reader.has_column("anon"));
}

#[test]
#[cfg_attr(miri, ignore)]
fn cursors_are_independent() {
    let (_file, reader) = open(&two_column_file());
    let column = reader.column_reader("id").unwrap();
    let mut first = column.occurrences().unwrap();
    let mut second = column.occurrences().unwrap();

    let a = first.next().unwrap().unwrap();
    let b = first.next().unwrap().unwrap();
    let c = second.next().unwrap().unwrap();
    assert_eq!(a.value.and_then(|v| v.as_u64()), Some(100));
    assert_eq!(b.value.and_then(|v| v.as_u64()), Some(200));
    assert_eq!(c.value.and_then(|v| v.as_u64()), Some(100));
    assert_eq!(first.count() + 2, second.count() + 1);
}

#[rstest]
#[cfg_attr(miri, ignore)]
#[case(two_column_file())]
#[case(FileBuilder::v2(2).values_per_page(1).column(
    ColumnSpec::uint64("id", 1).levels(1, 1).occurrence(0, 1, 1u64).occurrence(1, 1, 2u64).absent(0, 0)
))]
fn concurrent_scans_agree(#[case] builder: FileBuilder) {
    let (_file, reader) = open(&builder);
    let expected: Vec<_> = reader
        .columns()
        .iter()
        .map(|c| decode(&reader, &c.column_name))
        .collect();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for (config, expected) in reader.columns().iter().zip(&expected) {
                    assert_eq!(&decode(&reader, &config.column_name), expected);
                }
            });
        }
    });
}

#[rstest]
#[cfg_attr(miri, ignore)]
#[case(two_column_file())]
#[case(FileBuilder::v2(3)
    .column(ColumnSpec::uint64("a", 1).values([1u64, 2, 3]))
    .column(ColumnSpec::uint64("b", 2).levels(0, 1).occurrence(0, 1, 4u64).absent(0, 0).occurrence(0, 1, 5u64)))]
fn level_properties_hold(#[case] builder: FileBuilder) {
    let (_file, reader) = open(&builder);
    for config in reader.columns() {
        let decoded = decode(&reader, &config.column_name);
        if config.dlevel_max == 0 {
            assert!(decoded.iter().all(|(_, _, v)| v.is_some()));
        }
        if config.rlevel_max == 0 {
            assert_eq!(decoded.len() as u64, reader.num_records());
        }
        assert!(decoded.iter().all(|(r, d, _)| *r <= config.rlevel_max && *d <= config.dlevel_max));
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn mapping_outlives_the_file_on_disk() {
    let (file, reader) = open(&two_column_file());
    drop(file);
    assert_eq!(decode(&reader, "id"), present([100u64, 200, 300]));
}

#[derive(Default)]
struct Counts {
    hits: AtomicUsize,
    misses: AtomicUsize,
    stores: AtomicUsize,
}

struct CountingCache {
    inner: MokaPageCache,
    counts: Arc<Counts>,
}

impl PageCache for CountingCache {
    fn get(&self, key: PageCacheKey) -> CSTableResult<Option<ByteBuffer>> {
        let result = self.inner.get(key)?;
        if result.is_some() {
            self.counts.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counts.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(result)
    }

    fn put(&self, key: PageCacheKey, buffer: ByteBuffer) -> CSTableResult<()> {
        self.counts.stores.fetch_add(1, Ordering::Relaxed);
        self.inner.put(key, buffer)
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn rescans_hit_the_page_cache() {
    let file = write(
        &FileBuilder::v2(4)
            .values_per_page(2)
            .column(ColumnSpec::uint64("n", 1).values([1u64, 2, 3, 4])),
    );
    let counts = Arc::new(Counts::default());
    let cache: Arc<dyn PageCache> = Arc::new(CountingCache {
        inner: MokaPageCache::new(1 << 20),
        counts: counts.clone(),
    });

    let reader = CSTableOpenOptions::default()
        .with_page_cache(cache.clone())
        .open(file.path())
        .unwrap();
    assert_eq!(decode(&reader, "n"), present([1u64, 2, 3, 4]));
    assert_eq!(counts.misses.load(Ordering::Relaxed), 2);
    assert_eq!(counts.stores.load(Ordering::Relaxed), 2);

    assert_eq!(decode(&reader, "n"), present([1u64, 2, 3, 4]));
    assert_eq!(counts.hits.load(Ordering::Relaxed), 2);

    // A second reader over the same cache never sees the first reader's pages.
    let other = CSTableOpenOptions::default()
        .with_page_cache(cache)
        .open(file.path())
        .unwrap();
    assert_eq!(decode(&other, "n"), present([1u64, 2, 3, 4]));
    assert_eq!(counts.misses.load(Ordering::Relaxed), 4);
}

#[test]
#[cfg_attr(miri, ignore)]
fn uncached_reader_decodes() {
    let file = write(&FileBuilder::v2(2).column(ColumnSpec::uint64("n", 1).values([8u64, 9])));
    let reader = CSTableOpenOptions::default()
        .without_page_cache()
        .open(file.path())
        .unwrap();
    assert_eq!(decode(&reader, "n"), present([8u64, 9]));
}

#[test]
fn zero_page_cache_capacity_is_rejected() {
    let Err(err) = CSTableOpenOptions::default().with_page_cache_capacity(0) else {
        panic!("zero capacity must be rejected");
    };
    assert!(matches!(err, CSTableError::InvalidArgument(..)));
    assert!(CSTableOpenOptions::default().with_page_cache_capacity(1 << 10).is_ok());
}

#[test]
#[cfg_attr(miri, ignore)]
fn missing_file_names_the_path() {
    let err = CSTableReader::open_file("/no/such/table.cst").err().unwrap();
    assert!(err.to_string().contains("/no/such/table.cst"));
    assert!(matches!(err, CSTableError::Context(..)));
}
