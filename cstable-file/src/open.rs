use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use cstable_error::{CSTableResult, ResultExt, cstable_bail, cstable_err};
use cstable_io::{CSTableFile, ReadAt};
use itertools::Itertools;

use crate::columns::{FlatColumn, PagedColumn, open_column_v2};
use crate::header::{ParsedHeader, read_header};
use crate::pages::{MokaPageCache, NoOpPageCache, PageCache, PageStore, PageStoreOptions};
use crate::reader::{Backend, CSTableReader};
use crate::{BinaryFormatVersion, DEFAULT_PAGE_CACHE_BYTES};

/// How to index a column name or id that the header declares more than once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicateColumnPolicy {
    /// The column declared last is the one returned by lookups.
    #[default]
    LastWins,
    /// Opening the file fails.
    Reject,
}

/// Open options for a CSTable file reader.
#[derive(Clone)]
pub struct CSTableOpenOptions {
    page_cache: Arc<dyn PageCache>,
    duplicate_columns: DuplicateColumnPolicy,
}

impl Default for CSTableOpenOptions {
    fn default() -> Self {
        Self {
            page_cache: Arc::new(MokaPageCache::new(DEFAULT_PAGE_CACHE_BYTES)),
            duplicate_columns: DuplicateColumnPolicy::default(),
        }
    }
}

impl CSTableOpenOptions {
    /// Configure a custom [`PageCache`].
    ///
    /// A cache may be shared by any number of readers. Only page-indexed files use it.
    pub fn with_page_cache(mut self, page_cache: Arc<dyn PageCache>) -> Self {
        self.page_cache = page_cache;
        self
    }

    /// Disable page caching entirely.
    pub fn without_page_cache(self) -> Self {
        self.with_page_cache(Arc::new(NoOpPageCache))
    }

    /// Replace the page cache with a fresh in-memory cache holding up to `capacity_bytes`.
    pub fn with_page_cache_capacity(self, capacity_bytes: u64) -> CSTableResult<Self> {
        if capacity_bytes == 0 {
            cstable_bail!(InvalidArgument: "page cache capacity must be non-zero, use without_page_cache to disable caching");
        }
        Ok(self.with_page_cache(Arc::new(MokaPageCache::new(capacity_bytes))))
    }

    /// Configure how duplicate column names and ids are handled.
    pub fn with_duplicate_columns(mut self, policy: DuplicateColumnPolicy) -> Self {
        self.duplicate_columns = policy;
        self
    }

    /// Open the file at `path`, parse its header and prepare a decoder for every column.
    ///
    /// Either every column is ready to decode or the open fails; no partially usable reader is
    /// ever returned.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(path = %path.as_ref().display())))]
    pub fn open(self, path: impl AsRef<Path>) -> CSTableResult<CSTableReader> {
        let path = path.as_ref();
        self.open_path(path)
            .with_context(|| format!("failed to open cstable {}", path.display()))
    }

    fn open_path(self, path: &Path) -> CSTableResult<CSTableReader> {
        let file = CSTableFile::open(path)?;
        let file_size = file.size()?;
        let ParsedHeader {
            version,
            header,
            metablock,
            free_index,
        } = read_header(BufReader::new(file.stream_from(0)), file_size)?;

        let (num_rows, backend) = match version {
            BinaryFormatVersion::V0_1_0 => {
                let region = file.map()?;
                // The mapping does not need the descriptor.
                drop(file);
                let columns: Vec<FlatColumn> = header
                    .columns
                    .iter()
                    .map(|config| {
                        FlatColumn::try_new(config, &region, header.num_rows)
                            .with_context(|| format!("invalid column {}", config.column_name))
                    })
                    .try_collect()?;
                (header.num_rows, Backend::Mapped { region, columns })
            }
            BinaryFormatVersion::V0_2_0 => {
                let metablock =
                    metablock.ok_or_else(|| cstable_err!("{version} file without a metadata block"))?;
                let pages = PageStore::open(
                    file,
                    0,
                    PageStoreOptions {
                        index: metablock.index,
                        free_index,
                        cache: self.page_cache,
                    },
                )?;
                let columns: Vec<PagedColumn> = header
                    .columns
                    .iter()
                    .map(|config| open_column_v2(config, &pages, metablock.num_rows))
                    .try_collect()?;
                (metablock.num_rows, Backend::Paged { pages, columns })
            }
        };

        log::debug!(
            "Opened {version} cstable {} with {} columns and {num_rows} rows",
            path.display(),
            header.columns.len()
        );

        CSTableReader::try_new(
            version,
            path.to_path_buf(),
            header.columns,
            num_rows,
            backend,
            self.duplicate_columns,
        )
    }
}
