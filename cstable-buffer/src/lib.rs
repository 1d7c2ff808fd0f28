#![deny(missing_docs)]

//! A byte buffer implementation for CSTable.
//!
//! Column data is handed out as zero-copy views over a single backing allocation: either a
//! memory-mapped file region or a page read from disk. Views are cheaply cloneable and keep the
//! backing allocation alive, so a slice never dangles even if its parent buffer is dropped.

pub use buffer::*;
pub use le::*;

mod buffer;
mod le;
#[cfg(feature = "memmap2")]
mod memmap2;
