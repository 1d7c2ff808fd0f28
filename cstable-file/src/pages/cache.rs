use cstable_buffer::ByteBuffer;
use cstable_error::{CSTableExpect, CSTableResult};
use moka::policy::EvictionPolicy;
use moka::sync::{Cache, CacheBuilder};
use rustc_hash::FxBuildHasher;

/// Identity of a cached page.
///
/// `store` is unique per opened page store, so one cache can be shared by many readers without
/// pages of different files colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageCacheKey {
    pub store: u64,
    pub offset: u64,
}

/// A cache for storing and retrieving page bytes.
///
/// Cached buffers are immutable; a `put` for a key that is already present replaces the entry
/// but never alters a buffer previously handed out by `get`.
pub trait PageCache: Send + Sync {
    fn get(&self, key: PageCacheKey) -> CSTableResult<Option<ByteBuffer>>;
    fn put(&self, key: PageCacheKey, buffer: ByteBuffer) -> CSTableResult<()>;
}

pub(crate) struct NoOpPageCache;

impl PageCache for NoOpPageCache {
    fn get(&self, _key: PageCacheKey) -> CSTableResult<Option<ByteBuffer>> {
        Ok(None)
    }

    fn put(&self, _key: PageCacheKey, _buffer: ByteBuffer) -> CSTableResult<()> {
        Ok(())
    }
}

/// A [`PageCache`] based around an in-memory Moka cache.
pub struct MokaPageCache(Cache<PageCacheKey, ByteBuffer, FxBuildHasher>);

impl MokaPageCache {
    pub fn new(max_capacity_bytes: u64) -> Self {
        Self(
            CacheBuilder::new(max_capacity_bytes)
                .name("cstable-page-cache")
                // Weight each page by the number of bytes in the buffer.
                .weigher(|_, buffer: &ByteBuffer| {
                    u32::try_from(buffer.len().min(u32::MAX as usize)).cstable_expect("must fit")
                })
                // Pages are re-read when a column is scanned again, not within a single scan.
                .eviction_policy(EvictionPolicy::tiny_lfu())
                .build_with_hasher(FxBuildHasher),
        )
    }
}

impl PageCache for MokaPageCache {
    fn get(&self, key: PageCacheKey) -> CSTableResult<Option<ByteBuffer>> {
        Ok(self.0.get(&key))
    }

    fn put(&self, key: PageCacheKey, buffer: ByteBuffer) -> CSTableResult<()> {
        self.0.insert(key, buffer);
        Ok(())
    }
}
