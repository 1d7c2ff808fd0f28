use std::io;
use std::sync::Arc;

use cstable_buffer::ByteBuffer;

/// A trait for types that support positional reads.
///
/// References to the type must be safe to [share across threads][Send]. Reads do not move a
/// shared cursor, so concurrent readers never observe each other's progress.
pub trait ReadAt: Send + Sync + 'static {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// If the reader does not have the requested number of bytes, the read fails with
    /// [`UnexpectedEof`][io::ErrorKind::UnexpectedEof].
    fn read_byte_range(&self, offset: u64, len: u64) -> io::Result<ByteBuffer>;

    /// The number of readable bytes.
    fn size(&self) -> io::Result<u64>;
}

impl<T: ReadAt> ReadAt for Arc<T> {
    fn read_byte_range(&self, offset: u64, len: u64) -> io::Result<ByteBuffer> {
        T::read_byte_range(self, offset, len)
    }

    fn size(&self) -> io::Result<u64> {
        T::size(self)
    }
}

impl ReadAt for ByteBuffer {
    fn read_byte_range(&self, offset: u64, len: u64) -> io::Result<ByteBuffer> {
        let out_of_range = || {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "read of {len} bytes at {offset} exceeds buffer of {} bytes",
                    self.len()
                ),
            )
        };
        let start = usize::try_from(offset).map_err(|_| out_of_range())?;
        let end = usize::try_from(len)
            .ok()
            .and_then(|len| start.checked_add(len))
            .ok_or_else(out_of_range)?;
        if end > self.len() {
            return Err(out_of_range());
        }
        Ok(self.slice(start..end))
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}
