use crate::{CSTableError, CSTableResult, ErrString};

/// Extension trait for results whose error converts into a [`CSTableError`].
pub trait ResultExt<T>: private::Sealed {
    /// Wrap the error, if any, with lazily built context such as a file path or column name.
    fn with_context<M, F>(self, f: F) -> CSTableResult<T>
    where
        M: Into<ErrString>,
        F: FnOnce() -> M;
}

mod private {
    use crate::CSTableError;

    pub trait Sealed {}

    impl<T, E: Into<CSTableError>> Sealed for Result<T, E> {}
}

impl<T, E: Into<CSTableError>> ResultExt<T> for Result<T, E> {
    fn with_context<M, F>(self, f: F) -> CSTableResult<T>
    where
        M: Into<ErrString>,
        F: FnOnce() -> M,
    {
        self.map_err(|e| CSTableError::with_context(e.into(), f()))
    }
}
