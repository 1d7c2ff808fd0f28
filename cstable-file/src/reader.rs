use std::path::{Path, PathBuf};

use cstable_buffer::ByteBuffer;
use cstable_error::{CSTableResult, cstable_bail, cstable_err};
use cstable_io::CSTableFile;
use rustc_hash::FxHashMap;

use crate::columns::{ColumnDecoder, ColumnReader, FlatColumn, FlatColumnReader, PagedColumn, PagedColumnReader};
use crate::pages::PageStore;
use crate::{BinaryFormatVersion, CSTableOpenOptions, ColumnConfig, DuplicateColumnPolicy, LogicalType, StorageEncoding};

/// The storage a reader owns for its whole lifetime, chosen once by format version.
pub(crate) enum Backend {
    /// The whole file, memory-mapped. The mapping keeps itself alive; no descriptor is held.
    Mapped {
        region: ByteBuffer,
        columns: Vec<FlatColumn>,
    },
    /// A page store that owns the file descriptor.
    Paged {
        pages: PageStore<CSTableFile>,
        columns: Vec<PagedColumn>,
    },
}

impl Backend {
    fn column_count(&self) -> usize {
        match self {
            Self::Mapped { columns, .. } => columns.len(),
            Self::Paged { columns, .. } => columns.len(),
        }
    }
}

/// An open CSTable file.
///
/// The reader is immutable once opened. Column decoders borrow from it, and any number of them
/// may be used from different threads at the same time.
pub struct CSTableReader {
    version: BinaryFormatVersion,
    path: PathBuf,
    columns: Vec<ColumnConfig>,
    num_rows: u64,
    backend: Backend,
    by_name: FxHashMap<String, usize>,
    by_id: FxHashMap<u32, usize>,
}

impl CSTableReader {
    /// Open a file with the default [`CSTableOpenOptions`].
    pub fn open_file(path: impl AsRef<Path>) -> CSTableResult<Self> {
        CSTableOpenOptions::default().open(path)
    }

    pub(crate) fn try_new(
        version: BinaryFormatVersion,
        path: PathBuf,
        columns: Vec<ColumnConfig>,
        num_rows: u64,
        backend: Backend,
        duplicates: DuplicateColumnPolicy,
    ) -> CSTableResult<Self> {
        if backend.column_count() != columns.len() {
            cstable_bail!(
                "illegal column list: {} decoders for {} columns",
                backend.column_count(),
                columns.len()
            );
        }

        let mut by_name = FxHashMap::default();
        let mut by_id = FxHashMap::default();
        for (idx, column) in columns.iter().enumerate() {
            if let Some(prev) = by_name.insert(column.column_name.clone(), idx) {
                match duplicates {
                    DuplicateColumnPolicy::Reject => cstable_bail!(
                        "duplicate column name {} at positions {prev} and {idx}",
                        column.column_name
                    ),
                    DuplicateColumnPolicy::LastWins => log::warn!(
                        "Column name {} is declared at positions {prev} and {idx} of {}, using the last",
                        column.column_name,
                        path.display()
                    ),
                }
            }
            if column.has_id() {
                if let Some(prev) = by_id.insert(column.column_id, idx) {
                    match duplicates {
                        DuplicateColumnPolicy::Reject => cstable_bail!(
                            "duplicate column id {} at positions {prev} and {idx}",
                            column.column_id
                        ),
                        DuplicateColumnPolicy::LastWins => log::warn!(
                            "Column id {} is declared at positions {prev} and {idx} of {}, using the last",
                            column.column_id,
                            path.display()
                        ),
                    }
                }
            }
        }
        // A column shadowed by name is not reachable by id either.
        by_id.retain(|_, idx| by_name.get(&columns[*idx].column_name) == Some(&*idx));

        Ok(Self {
            version,
            path,
            columns,
            num_rows,
            backend,
            by_name,
            by_id,
        })
    }

    pub fn version(&self) -> BinaryFormatVersion {
        self.version
    }

    /// The path the reader was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every column in on-disk order, including shadowed duplicates.
    pub fn columns(&self) -> &[ColumnConfig] {
        &self.columns
    }

    /// The number of rows, as recorded when the file was opened.
    pub fn num_records(&self) -> u64 {
        self.num_rows
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn column_config(&self, name: &str) -> CSTableResult<&ColumnConfig> {
        self.index_of(name).map(|idx| &self.columns[idx])
    }

    /// A decoder for the column called `name`.
    pub fn column_reader(&self, name: &str) -> CSTableResult<ColumnReader<'_>> {
        self.index_of(name).map(|idx| self.reader_at(idx))
    }

    /// A decoder for the column with the given non-zero id.
    pub fn column_reader_by_id(&self, column_id: u32) -> CSTableResult<ColumnReader<'_>> {
        self.by_id
            .get(&column_id)
            .map(|&idx| self.reader_at(idx))
            .ok_or_else(|| cstable_err!(NotFound: "column id not found: {column_id} in {}", self.path.display()))
    }

    pub fn column_encoding(&self, name: &str) -> CSTableResult<StorageEncoding> {
        self.column_reader(name).map(|reader| reader.encoding())
    }

    pub fn column_type(&self, name: &str) -> CSTableResult<LogicalType> {
        self.column_reader(name).map(|reader| reader.logical_type())
    }

    fn index_of(&self, name: &str) -> CSTableResult<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| cstable_err!(NotFound: "column not found: {name} in {}", self.path.display()))
    }

    fn reader_at(&self, idx: usize) -> ColumnReader<'_> {
        let config = &self.columns[idx];
        match &self.backend {
            Backend::Mapped { region, columns } => {
                ColumnReader::Flat(FlatColumnReader::new(config, &columns[idx], region.as_slice()))
            }
            Backend::Paged { pages, columns } => {
                ColumnReader::Paged(PagedColumnReader::new(config, &columns[idx], pages))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn page_store(&self) -> Option<&PageStore<CSTableFile>> {
        match &self.backend {
            Backend::Mapped { .. } => None,
            Backend::Paged { pages, .. } => Some(pages),
        }
    }
}
