use std::fmt::{Debug, Formatter};
use std::ops::{Deref, Range};

use bytes::Bytes;
use cstable_error::{CSTableResult, cstable_err};

/// An immutable, cheaply cloneable view over a contiguous region of file bytes.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer(Bytes);

impl ByteBuffer {
    /// Create a new empty buffer. Does not allocate.
    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    /// Length of the buffer in bytes.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the buffer holds no bytes.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the buffer as a byte slice.
    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Return a zero-copy view of the given byte range.
    ///
    /// ## Panics
    ///
    /// Panics if the range is out of bounds. Use [`ByteBuffer::try_slice`] for untrusted ranges.
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self(self.0.slice(range))
    }

    /// Return a zero-copy view of the given byte range, or an error if it does not fit.
    pub fn try_slice(&self, range: Range<usize>) -> CSTableResult<Self> {
        if range.start > range.end || range.end > self.len() {
            return Err(cstable_err!(OutOfBounds: range.end, 0, self.len()));
        }
        Ok(self.slice(range))
    }
}

impl Debug for ByteBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        const TRUNC: usize = 16;
        let mut binding = f.debug_struct("ByteBuffer");
        binding.field("length", &self.len());
        if self.len() <= TRUNC {
            binding.field("bytes", &self.as_slice());
        } else {
            binding.field("bytes", &&self.as_slice()[..TRUNC]);
        }
        binding.finish()
    }
}

impl Deref for ByteBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Bytes> for ByteBuffer {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&'static [u8]> for ByteBuffer {
    fn from(value: &'static [u8]) -> Self {
        Self(Bytes::from_static(value))
    }
}
