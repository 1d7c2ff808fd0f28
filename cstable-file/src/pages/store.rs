use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cstable_buffer::ByteBuffer;
use cstable_error::{CSTableResult, ResultExt, cstable_bail};
use cstable_io::ReadAt;

use crate::pages::{PageCache, PageCacheKey, PageIndex, PageIndexKey, PageRef, parse_free_index};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(0);

/// Where the page store finds its index, and how it caches pages.
#[derive(Clone)]
pub struct PageStoreOptions {
    pub index: PageRef,
    pub free_index: Option<PageRef>,
    pub cache: Arc<dyn PageCache>,
}

/// Resolves page-backed streams to their pages and loads page bytes on demand.
pub trait PageSource: Send + Sync {
    /// The ordered pages of a stream, or `None` if the file holds no such stream.
    fn resolve(&self, key: &PageIndexKey) -> Option<&[PageRef]>;

    /// Load the bytes of one page.
    fn load_page(&self, page: &PageRef) -> CSTableResult<ByteBuffer>;
}

/// Page-indexed storage over a positional reader.
///
/// The store owns its reader for its whole lifetime; dropping the store releases it.
pub struct PageStore<R> {
    read: R,
    id: u64,
    base_offset: u64,
    index: PageIndex,
    free_pages: Vec<PageRef>,
    cache: Arc<dyn PageCache>,
}

impl<R: ReadAt> PageStore<R> {
    /// Read the page index (and free index, if any) and validate every page reference against
    /// the size of `read`.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(read, options)))]
    pub fn open(read: R, base_offset: u64, options: PageStoreOptions) -> CSTableResult<Self> {
        let size = read.size()?;
        let PageStoreOptions {
            index,
            free_index,
            cache,
        } = options;

        let index_bytes = read_page(&read, size, base_offset, &index)
            .with_context(|| format!("failed to read page index {index}"))?;
        let index = PageIndex::parse(&index_bytes)?;
        for page in index.pages() {
            check_bounds(size, base_offset, page)?;
        }

        let free_pages = match free_index {
            None => Vec::new(),
            Some(free_index) => {
                let bytes = read_page(&read, size, base_offset, &free_index)
                    .with_context(|| format!("failed to read free index {free_index}"))?;
                let free_pages = parse_free_index(&bytes)?;
                for page in &free_pages {
                    check_bounds(size, base_offset, page)?;
                }
                free_pages
            }
        };

        let id = NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "Opened page store {id} at base offset {base_offset} with {} free pages",
            free_pages.len()
        );

        Ok(Self {
            read,
            id,
            base_offset,
            index,
            free_pages,
            cache,
        })
    }

    /// Reclaimable page slots recorded by the writer.
    pub(crate) fn free_pages(&self) -> &[PageRef] {
        &self.free_pages
    }

    fn cache_key(&self, page: &PageRef) -> PageCacheKey {
        PageCacheKey {
            store: self.id,
            offset: page.offset,
        }
    }
}

impl<R: ReadAt> PageSource for PageStore<R> {
    fn resolve(&self, key: &PageIndexKey) -> Option<&[PageRef]> {
        self.index.get(key)
    }

    fn load_page(&self, page: &PageRef) -> CSTableResult<ByteBuffer> {
        let key = self.cache_key(page);
        if let Ok(Some(buffer)) = self.cache.get(key) {
            log::trace!("Resolved {page} of store {} from cache", self.id);
            return Ok(buffer);
        }

        log::trace!("Reading {page} of store {}", self.id);
        let buffer = self
            .read
            .read_byte_range(self.base_offset + page.offset, u64::from(page.size))?;
        if let Err(e) = self.cache.put(key, buffer.clone()) {
            log::warn!("Failed to store {page} of store {} in cache: {e}", self.id);
        }
        Ok(buffer)
    }
}

fn check_bounds(size: u64, base_offset: u64, page: &PageRef) -> CSTableResult<()> {
    match page.end().and_then(|end| end.checked_add(base_offset)) {
        Some(end) if end <= size => Ok(()),
        _ => cstable_bail!("{page} lies outside the file of {size} bytes"),
    }
}

fn read_page<R: ReadAt>(
    read: &R,
    size: u64,
    base_offset: u64,
    page: &PageRef,
) -> CSTableResult<ByteBuffer> {
    check_bounds(size, base_offset, page)?;
    Ok(read.read_byte_range(base_offset + page.offset, u64::from(page.size))?)
}
