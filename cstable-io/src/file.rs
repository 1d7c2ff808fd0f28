use std::fs::File;
use std::io::{self, Read};
use std::ops::Deref;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cstable_buffer::ByteBuffer;
use cstable_error::{CSTableResult, ResultExt};
use memmap2::Mmap;

use crate::ReadAt;

/// A cheaply cloneable, read-only file.
///
/// The `CSTableFile` takes ownership of the file descriptor, and can be cloned many times without
/// opening a new file descriptor. When the last instance is dropped, the file descriptor is
/// closed, exactly once.
#[derive(Debug, Clone)]
pub struct CSTableFile {
    file: Arc<File>,
    path: Arc<PathBuf>,
}

impl CSTableFile {
    /// Open a file on the current file system for reading.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(path = %path.as_ref().display())))]
    pub fn open(path: impl AsRef<Path>) -> CSTableResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        log::trace!("Opened {} for reading", path.display());

        Ok(Self {
            file: Arc::new(file),
            path: Arc::new(path.to_path_buf()),
        })
    }

    /// A sequential reader starting at `offset`.
    ///
    /// The stream tracks its own position, so it never disturbs concurrent positional reads.
    pub fn stream_from(&self, offset: u64) -> FileStream<'_> {
        FileStream { file: self, pos: offset }
    }

    /// Memory-map the whole file.
    ///
    /// The mapping outlives the descriptor: once every clone of this handle is dropped the
    /// descriptor is closed, while the returned buffer keeps the region mapped until its last
    /// view is dropped.
    pub fn map(&self) -> CSTableResult<ByteBuffer> {
        // SAFETY: the mapping is read-only. CSTable files are immutable once written, so the
        // bytes cannot change underneath the map while it is alive.
        let mmap = unsafe { Mmap::map(&*self.file) }
            .with_context(|| format!("failed to mmap {}", self.path.display()))?;
        log::debug!("Mapped {} bytes of {}", mmap.len(), self.path.display());
        Ok(ByteBuffer::from(mmap))
    }
}

// Implement deref coercion for non-mut `File` methods on `CSTableFile`.
impl Deref for CSTableFile {
    type Target = File;

    fn deref(&self) -> &Self::Target {
        &self.file
    }
}

impl ReadAt for CSTableFile {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    fn read_byte_range(&self, offset: u64, len: u64) -> io::Result<ByteBuffer> {
        let len = usize::try_from(len).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut buffer = vec![0u8; len];
        self.read_exact_at(&mut buffer, offset)?;
        Ok(ByteBuffer::from(buffer))
    }

    fn size(&self) -> io::Result<u64> {
        self.metadata().map(|metadata| metadata.len())
    }
}

/// A [`Read`] adapter over positional reads of a [`CSTableFile`].
pub struct FileStream<'a> {
    file: &'a CSTableFile,
    pos: u64,
}

impl FileStream<'_> {
    /// The absolute file offset of the next byte to be read.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl Read for FileStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read_at(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}
