use std::io;
use thiserror::Error;

/// Errors returned by the read interface and its queue collaborator
///
/// A zero-length read is not an error: it means "no data right now" or a restart boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// The open request was not issued from the caller's own context
    #[error("access denied")]
    AccessDenied,
    /// The open request addressed a sub-resource
    #[error("no such file: {0}")]
    NotFound(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("insufficient resources: {0}")]
    ResourceExhausted(&'static str),
    /// Unknown control code
    #[error("invalid device request (code {0:#010x})")]
    InvalidRequest(u32),
    #[error("buffer too small: {required} bytes required, {actual} provided")]
    BufferTooSmall { required: usize, actual: usize },
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl Error {
    pub fn buffer_too_small(required: usize, actual: usize) -> Self {
        Error::BufferTooSmall { required, actual }
    }
}
