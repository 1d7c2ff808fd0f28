use cstable_error::{CSTableResult, cstable_bail};

use crate::ValueDecoder;

/// The longest valid encoding of a `u64`.
pub const MAX_LEB128_LEN: usize = 10;

/// Read one unsigned LEB128 varint at `*pos`, advancing `pos` past it.
pub fn read_leb128(data: &[u8], pos: &mut usize) -> CSTableResult<u64> {
    let mut value = 0u64;
    for i in 0..MAX_LEB128_LEN {
        let Some(&byte) = data.get(*pos + i) else {
            cstable_bail!("truncated varint at offset {}", *pos);
        };
        let payload = u64::from(byte & 0x7F);
        if i == MAX_LEB128_LEN - 1 && payload > 1 {
            cstable_bail!("varint at offset {} overflows u64", *pos);
        }
        value |= payload << (7 * i);
        if byte & 0x80 == 0 {
            *pos += i + 1;
            return Ok(value);
        }
    }
    cstable_bail!("varint at offset {} is longer than {MAX_LEB128_LEN} bytes", *pos)
}

pub fn write_leb128(mut value: u64, out: &mut Vec<u8>) {
    loop {
        // Masked to 7 bits.
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Decodes `u64` values stored as consecutive unsigned LEB128 varints.
pub struct Leb128Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Leb128Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> ValueDecoder<'a> for Leb128Decoder<'a> {
    type Value = u64;

    fn next_value(&mut self) -> CSTableResult<u64> {
        read_leb128(self.data, &mut self.pos)
    }

    fn remaining_bytes(&self) -> usize {
        self.data.len() - self.pos
    }
}

pub fn leb128_encode(values: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len());
    for &value in values {
        write_leb128(value, &mut out);
    }
    out
}
