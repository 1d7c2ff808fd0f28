use cstable_error::{CSTableResult, cstable_err};

use crate::{ValueDecoder, read_leb128, write_leb128};

/// Decodes byte strings stored as a LEB128 length followed by the bytes.
///
/// Returned values borrow from the input; nothing is copied.
pub struct PlainStringDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PlainStringDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> ValueDecoder<'a> for PlainStringDecoder<'a> {
    type Value = &'a [u8];

    fn next_value(&mut self) -> CSTableResult<&'a [u8]> {
        let len = usize::try_from(read_leb128(self.data, &mut self.pos)?)?;
        let start = self.pos;
        let value = start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| {
                cstable_err!(
                    "string of {len} bytes at offset {start} overruns stream of {} bytes",
                    self.data.len()
                )
            })?;
        self.pos += len;
        Ok(value)
    }

    fn remaining_bytes(&self) -> usize {
        self.data.len() - self.pos
    }
}

pub fn string_encode<S: AsRef<[u8]>>(values: &[S]) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        let value = value.as_ref();
        write_leb128(value.len() as u64, &mut out);
        out.extend_from_slice(value);
    }
    out
}
