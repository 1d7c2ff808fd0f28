use cstable_error::{CSTableResult, cstable_bail, cstable_err};

use crate::ValueDecoder;

/// Decodes `u32` values packed LSB-first at a fixed bit width.
///
/// The first byte of the stream holds the bit width (0..=32). A width of zero encodes a stream
/// of zeros without any payload bytes.
pub struct BitPackedDecoder<'a> {
    data: &'a [u8],
    bit_width: usize,
    bit_pos: usize,
}

impl<'a> BitPackedDecoder<'a> {
    pub fn try_new(data: &'a [u8]) -> CSTableResult<Self> {
        let Some((&bit_width, data)) = data.split_first() else {
            cstable_bail!("bitpacked stream is missing its bit width");
        };
        if bit_width > 32 {
            cstable_bail!("bitpacked stream has invalid bit width {bit_width}");
        }
        Ok(Self {
            data,
            bit_width: usize::from(bit_width),
            bit_pos: 0,
        })
    }

    pub fn bit_width(&self) -> u8 {
        // Checked to be at most 32 at construction.
        self.bit_width as u8
    }
}

impl<'a> ValueDecoder<'a> for BitPackedDecoder<'a> {
    type Value = u32;

    fn next_value(&mut self) -> CSTableResult<u32> {
        let end = self.bit_pos + self.bit_width;
        if end > self.data.len() * 8 {
            return Err(cstable_err!(
                "bitpacked stream exhausted at bit {} of {}",
                self.bit_pos,
                self.data.len() * 8
            ));
        }

        let mut value = 0u64;
        let mut read = 0;
        while read < self.bit_width {
            let pos = self.bit_pos + read;
            let shift = pos % 8;
            let take = (8 - shift).min(self.bit_width - read);
            let bits = u64::from(self.data[pos / 8] >> shift) & ((1u64 << take) - 1);
            value |= bits << read;
            read += take;
        }
        self.bit_pos = end;

        u32::try_from(value).map_err(|_| cstable_err!("bitpacked value {value} overflows u32"))
    }

    fn remaining_bytes(&self) -> usize {
        self.data.len() - self.bit_pos.div_ceil(8)
    }
}

/// The number of bits needed to represent `value`.
pub fn bit_width_of(value: u32) -> u8 {
    // At most 32, always fits.
    (u32::BITS - value.leading_zeros()) as u8
}

/// Pack `values` at the smallest bit width that fits the largest value.
pub fn bitpack_encode(values: &[u32]) -> Vec<u8> {
    let bit_width = values.iter().copied().max().map(bit_width_of).unwrap_or(0);
    bitpack_encode_with_width(values, bit_width)
}

/// Pack `values` at an explicit bit width. Bits above the width are dropped.
pub fn bitpack_encode_with_width(values: &[u32], bit_width: u8) -> Vec<u8> {
    let width = usize::from(bit_width.min(32));
    let mut out = vec![0u8; 1 + (values.len() * width).div_ceil(8)];
    out[0] = bit_width.min(32);
    for (i, &value) in values.iter().enumerate() {
        for bit in 0..width {
            if (value >> bit) & 1 == 1 {
                let pos = i * width + bit;
                out[1 + pos / 8] |= 1 << (pos % 8);
            }
        }
    }
    out
}
