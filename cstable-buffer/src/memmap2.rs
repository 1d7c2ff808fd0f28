use bytes::Bytes;
use memmap2::Mmap;

use crate::ByteBuffer;

impl From<Mmap> for ByteBuffer {
    /// Take ownership of a mapped region. The region is unmapped when the last view over it is
    /// dropped.
    fn from(value: Mmap) -> Self {
        ByteBuffer::from(Bytes::from_owner(value))
    }
}
