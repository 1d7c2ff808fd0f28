//! Core blocking IO primitives for CSTable.
//!
//! The table reader never talks to the operating system directly. It opens a [`CSTableFile`],
//! which owns the descriptor, and either memory-maps the whole file or issues positional reads
//! through [`ReadAt`].

pub use file::*;
pub use read::*;

mod file;
mod read;
