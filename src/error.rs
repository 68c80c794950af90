//! Typed failures raised by the engine and its clients.
//! These are carried inside [`crate::Error`] and may be
//! recovered with `err.downcast_ref::<CalcError>()`.
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalcError {
    /// Invalid parameters: band counts, window sizes,
    /// rotated or non-overlapping inputs.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown output format: {0}")]
    UnknownFormat(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// An existing output raster does not fit the
    /// computation.
    #[error("output mismatch: {what} is {found}, expected {expected}")]
    Mismatch {
        what: &'static str,
        found: usize,
        expected: usize,
    },

    #[error("attribute table has no column {0:?}")]
    MissingColumn(String),
}

impl CalcError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        CalcError::Config(msg.into())
    }

    pub fn io<S: Into<String>>(msg: S) -> Self {
        CalcError::Io(msg.into())
    }
}
