use cstable_buffer::{ByteBuffer, ByteSliceExt};
use cstable_error::{CSTableResult, cstable_bail};

use crate::pages::{PageRef, PageSource};

/// Streams plain little-endian `u64` values across the pages of one stream.
///
/// Pages are loaded lazily, one at a time, as the previous page is exhausted.
pub struct UInt64PageReader<'a> {
    source: &'a dyn PageSource,
    pages: std::slice::Iter<'a, PageRef>,
    current: ByteBuffer,
    pos: usize,
}

impl<'a> UInt64PageReader<'a> {
    pub fn new(source: &'a dyn PageSource, pages: &'a [PageRef]) -> Self {
        Self {
            source,
            pages: pages.iter(),
            current: ByteBuffer::empty(),
            pos: 0,
        }
    }

    /// The next value, or `None` once every page has been consumed.
    pub fn next_value(&mut self) -> CSTableResult<Option<u64>> {
        while self.pos == self.current.len() {
            let Some(page) = self.pages.next() else {
                return Ok(None);
            };
            let buffer = self.source.load_page(page)?;
            if buffer.len() % size_of::<u64>() != 0 {
                cstable_bail!(
                    "{page} holds {} bytes, not a whole number of u64 values",
                    buffer.len()
                );
            }
            self.current = buffer;
            self.pos = 0;
        }

        let value = self.current.struct_at::<u64>(self.pos)?;
        self.pos += size_of::<u64>();
        Ok(Some(value))
    }
}
