use std::marker::PhantomData;

use cstable_buffer::{ByteSliceExt, LeValue};
use cstable_error::{CSTableResult, cstable_err};

use crate::ValueDecoder;

/// Decodes fixed-width little-endian values laid out back to back.
pub struct PlainDecoder<'a, T> {
    data: &'a [u8],
    pos: usize,
    _marker: PhantomData<T>,
}

/// `UINT32_PLAIN`.
pub type UInt32PlainDecoder<'a> = PlainDecoder<'a, u32>;
/// `UINT64_PLAIN`.
pub type UInt64PlainDecoder<'a> = PlainDecoder<'a, u64>;
/// `FLOAT_IEEE754`, doubles in their IEEE-754 binary64 representation.
pub type Ieee754Decoder<'a> = PlainDecoder<'a, f64>;

impl<'a, T: LeValue> PlainDecoder<'a, T> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            _marker: PhantomData,
        }
    }

    /// The number of complete values in the stream.
    pub fn len(&self) -> usize {
        self.data.len() / T::WIDTH
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a, T: LeValue> ValueDecoder<'a> for PlainDecoder<'a, T> {
    type Value = T;

    fn next_value(&mut self) -> CSTableResult<T> {
        let value = self.data.struct_at::<T>(self.pos).map_err(|_| {
            cstable_err!(
                "plain stream exhausted after {} values",
                self.pos / T::WIDTH
            )
        })?;
        self.pos += T::WIDTH;
        Ok(value)
    }

    fn remaining_bytes(&self) -> usize {
        self.data.len() - self.pos
    }
}

pub fn plain_encode<T: LeValue>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::WIDTH);
    for &value in values {
        value.write_le(&mut out);
    }
    out
}
