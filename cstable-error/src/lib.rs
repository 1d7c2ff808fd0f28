#![deny(missing_docs)]

//! Error handling for the CSTable crates.
//!
//! Every fallible operation in the workspace returns a [`CSTableResult`]. Errors are constructed
//! through the [`cstable_err!`] and [`cstable_bail!`] macros so that each variant captures a
//! backtrace at the point of failure.

mod ext;

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::{env, fmt, io};

pub use ext::*;

/// A string that can be cheaply constructed from static or owned data.
#[derive(Debug)]
pub struct ErrString(Cow<'static, str>);

impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    #[allow(clippy::panic)]
    fn from(msg: T) -> Self {
        if env::var("CSTABLE_PANIC_ON_ERR").as_deref().unwrap_or("") == "1" {
            panic!("{}\nBacktrace:\n{}", msg.into(), Backtrace::capture());
        } else {
            Self(msg.into())
        }
    }
}

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The top-level error type for CSTable.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum CSTableError {
    /// The file is malformed: bad magic, truncated header, unknown version or inconsistent
    /// metadata.
    #[error("Format error: {0}\nBacktrace:\n{1}")]
    Format(ErrString, Box<Backtrace>),
    /// A storage encoding or logical type tag outside the supported set.
    #[error("unsupported {kind} tag {tag} for column {column:?}")]
    UnsupportedEncoding {
        /// Which tag space the tag belongs to, e.g. `"storage encoding"`.
        kind: &'static str,
        /// The raw numeric tag read from the file.
        tag: u32,
        /// The name of the column declaring the tag.
        column: String,
    },
    /// A lookup did not match any entry.
    #[error("{0}\nBacktrace:\n{1}")]
    NotFound(ErrString, Box<Backtrace>),
    /// An index is out of bounds.
    #[error("index {0} out of bounds from {1} to {2}\nBacktrace:\n{3}")]
    OutOfBounds(usize, usize, usize, Box<Backtrace>),
    /// An invalid argument was provided.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidArgument(ErrString, Box<Backtrace>),
    /// Wraps an error with additional context.
    #[error("{0}: {1}")]
    Context(ErrString, #[source] Box<CSTableError>),
    /// An error from the operating system or an I/O primitive.
    #[error(transparent)]
    IOError(#[from] io::Error),
    /// An integer conversion overflowed.
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),
}

impl CSTableError {
    /// Adds additional context to an error.
    pub fn with_context<T: Into<ErrString>>(self, msg: T) -> Self {
        CSTableError::Context(msg.into(), Box::new(self))
    }

    /// Whether this error, or the error it wraps, is a recoverable lookup miss.
    pub fn is_not_found(&self) -> bool {
        match self {
            CSTableError::NotFound(..) => true,
            CSTableError::Context(_, inner) => inner.is_not_found(),
            _ => false,
        }
    }

    /// Whether this error, or the error it wraps, reports an unsupported encoding tag.
    pub fn is_unsupported_encoding(&self) -> bool {
        match self {
            CSTableError::UnsupportedEncoding { .. } => true,
            CSTableError::Context(_, inner) => inner.is_unsupported_encoding(),
            _ => false,
        }
    }

    /// Whether this error, or the error it wraps, reports a malformed file.
    pub fn is_format(&self) -> bool {
        match self {
            CSTableError::Format(..) => true,
            CSTableError::Context(_, inner) => inner.is_format(),
            _ => false,
        }
    }

    /// Panic with this error as the payload.
    #[cold]
    #[inline(never)]
    #[allow(clippy::panic)]
    pub fn panic(self) -> ! {
        panic!("{}", self)
    }
}

impl Debug for CSTableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A type alias for Results that return [`CSTableError`]s as their error type.
pub type CSTableResult<T> = Result<T, CSTableError>;

/// A trait for unwrapping a value while attaching the reason the value must be present.
pub trait CSTableExpect {
    /// The type of the value being expected.
    type Output;

    /// Returns the value or panics with the given message and the underlying error.
    fn cstable_expect(self, msg: &str) -> Self::Output;
}

impl<T, E> CSTableExpect for Result<T, E>
where
    E: Into<CSTableError>,
{
    type Output = T;

    #[inline(always)]
    fn cstable_expect(self, msg: &str) -> Self::Output {
        self.map_err(|err| err.into())
            .unwrap_or_else(|e| e.with_context(msg.to_string()).panic())
    }
}

impl<T> CSTableExpect for Option<T> {
    type Output = T;

    #[inline(always)]
    fn cstable_expect(self, msg: &str) -> Self::Output {
        self.unwrap_or_else(|| {
            let err = CSTableError::InvalidArgument(
                msg.to_string().into(),
                Box::new(Backtrace::capture()),
            );
            err.panic()
        })
    }
}

/// Construct a [`CSTableError`]. Untagged messages produce [`CSTableError::Format`].
#[macro_export]
macro_rules! cstable_err {
    (Format: $($tt:tt)+) => {{
        use std::backtrace::Backtrace;
        $crate::CSTableError::Format(format!($($tt)+).into(), Box::new(Backtrace::capture()))
    }};
    (NotFound: $($tt:tt)+) => {{
        use std::backtrace::Backtrace;
        $crate::CSTableError::NotFound(format!($($tt)+).into(), Box::new(Backtrace::capture()))
    }};
    (InvalidArgument: $($tt:tt)+) => {{
        use std::backtrace::Backtrace;
        $crate::CSTableError::InvalidArgument(
            format!($($tt)+).into(),
            Box::new(Backtrace::capture()),
        )
    }};
    (OutOfBounds: $idx:expr, $start:expr, $stop:expr $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::CSTableError::OutOfBounds($idx, $start, $stop, Box::new(Backtrace::capture()))
    }};
    (UnsupportedEncoding: $kind:expr, $tag:expr, $column:expr $(,)?) => {
        $crate::CSTableError::UnsupportedEncoding {
            kind: $kind,
            tag: u32::from($tag),
            column: $column.to_string(),
        }
    };
    (Context: $msg:literal, $err:expr $(,)?) => {
        $crate::CSTableError::Context($msg.into(), Box::new($err))
    };
    ($($tt:tt)+) => {
        $crate::cstable_err!(Format: $($tt)+)
    };
}

/// Return early with a [`CSTableError`].
#[macro_export]
macro_rules! cstable_bail {
    ($($tt:tt)+) => {
        return Err($crate::cstable_err!($($tt)+))
    };
}
