#![allow(clippy::cast_possible_truncation)]
//! Value codecs for CSTable column streams.
//!
//! Each codec exposes a streaming decoder over a borrowed byte slice. Decoders never copy the
//! underlying bytes; string values are returned as sub-slices of the input. The matching encode
//! functions exist so that files can be produced for tests and tooling.

pub use bitpacking::*;
pub use boolean::*;
pub use leb128::*;
pub use plain::*;
pub use string::*;

mod bitpacking;
mod boolean;
mod leb128;
mod plain;
mod string;

use cstable_error::CSTableResult;

/// A cursor over a stream of encoded values.
///
/// A decoder has no notion of how many values remain; the caller knows the count from the column
/// metadata and asks for exactly that many. Reading past the end of the encoded bytes is an error.
pub trait ValueDecoder<'a> {
    /// The decoded value type.
    type Value;

    /// Decode the next value.
    fn next_value(&mut self) -> CSTableResult<Self::Value>;

    /// Whole bytes not yet consumed.
    ///
    /// Zero once the stream has been read to its end. Padding bits that complete the last byte of
    /// a packed stream do not count.
    fn remaining_bytes(&self) -> usize;
}
