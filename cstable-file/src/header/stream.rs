use std::io::{self, Read};

use cstable_error::{CSTableError, CSTableResult, cstable_err};

/// Sequential little-endian reads over the header bytes.
///
/// Running out of bytes is a format error: the header declared more than the file holds.
pub(super) struct HeaderStream<R> {
    inner: R,
    consumed: u64,
}

impl<R: Read> HeaderStream<R> {
    pub(super) fn new(inner: R) -> Self {
        Self { inner, consumed: 0 }
    }

    /// Number of bytes read from the start of the stream.
    pub(super) fn consumed(&self) -> u64 {
        self.consumed
    }

    pub(super) fn read_array<const N: usize>(&mut self) -> CSTableResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    pub(super) fn read_bytes(&mut self, len: usize) -> CSTableResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    pub(super) fn read_u8(&mut self) -> CSTableResult<u8> {
        self.read_array::<1>().map(|[b]| b)
    }

    pub(super) fn read_u16(&mut self) -> CSTableResult<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub(super) fn read_u32(&mut self) -> CSTableResult<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub(super) fn read_u64(&mut self) -> CSTableResult<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    fn fill(&mut self, buf: &mut [u8]) -> CSTableResult<()> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.consumed += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(cstable_err!(
                "truncated header: needed {} bytes at offset {}",
                buf.len(),
                self.consumed
            )),
            Err(e) => Err(CSTableError::from(e)),
        }
    }
}
