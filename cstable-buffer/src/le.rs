use cstable_error::{CSTableResult, cstable_err};

/// A fixed-width value stored little-endian on disk.
pub trait LeValue: Copy + Sized {
    /// The encoded width in bytes.
    const WIDTH: usize;

    /// Decode from the first [`Self::WIDTH`] bytes of `bytes`, or `None` if it is too short.
    fn from_le_slice(bytes: &[u8]) -> Option<Self>;

    /// Append the little-endian encoding of `self` to `out`.
    fn write_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_le_value {
    ($($T:ty),* $(,)?) => {
        $(
            impl LeValue for $T {
                const WIDTH: usize = size_of::<$T>();

                #[inline]
                fn from_le_slice(bytes: &[u8]) -> Option<Self> {
                    bytes
                        .first_chunk::<{ size_of::<$T>() }>()
                        .map(|chunk| <$T>::from_le_bytes(*chunk))
                }

                #[inline]
                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_le_value!(u8, u16, u32, u64, f64);

/// Typed access to little-endian structures at a byte offset.
pub trait ByteSliceExt {
    /// Read a `T` at `offset`, failing with [`OutOfBounds`](cstable_error::CSTableError::OutOfBounds)
    /// when `offset + T::WIDTH` exceeds the slice.
    fn struct_at<T: LeValue>(&self, offset: usize) -> CSTableResult<T>;
}

impl ByteSliceExt for [u8] {
    #[inline]
    fn struct_at<T: LeValue>(&self, offset: usize) -> CSTableResult<T> {
        self.get(offset..)
            .and_then(T::from_le_slice)
            .ok_or_else(|| cstable_err!(OutOfBounds: offset + T::WIDTH, 0, self.len()))
    }
}
