use cstable_error::{CSTableResult, cstable_err};

use crate::ValueDecoder;

/// Decodes booleans stored as one bit per value, LSB-first.
pub struct BooleanDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BooleanDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> ValueDecoder<'a> for BooleanDecoder<'a> {
    type Value = bool;

    fn next_value(&mut self) -> CSTableResult<bool> {
        let byte = self
            .data
            .get(self.pos / 8)
            .ok_or_else(|| cstable_err!("boolean stream exhausted after {} values", self.pos))?;
        let value = (byte >> (self.pos % 8)) & 1 == 1;
        self.pos += 1;
        Ok(value)
    }

    fn remaining_bytes(&self) -> usize {
        self.data.len() - self.pos.div_ceil(8)
    }
}

pub fn boolean_encode(values: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; values.len().div_ceil(8)];
    for (i, _) in values.iter().enumerate().filter(|(_, v)| **v) {
        out[i / 8] |= 1 << (i % 8);
    }
    out
}
