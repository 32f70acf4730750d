//! Custom error types and result handling for Inkpress operations.
//!
//! This module defines the error handling system used throughout Inkpress.
//! All operations return a [`Result<T>`] which is a type alias for `std::result::Result<T, Error>`.
//!
//! Errors fall into four families:
//! - decode errors ([`Error::Decode`]), fatal to a single page only
//! - pipeline errors ([`Error::Pipeline`]), fatal to a single page (or page half) only
//! - writer I/O errors ([`Error::Io`], [`Error::Zip`], [`Error::Epub`], [`Error::Writer`])
//! - configuration errors ([`Error::Config`], [`Error::ConfigBuilder`]), raised before any work starts
//!
use std::path::PathBuf;

/// Type alias for Results with Inkpress errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all Inkpress operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O errors from the standard library
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Regular expression parsing errors
    #[error(transparent)]
    Regex(#[from] regex::Error),
    /// Image decoding, encoding and buffer errors
    #[error(transparent)]
    Image(#[from] image::ImageError),
    /// EPUB generation errors
    #[error(transparent)]
    Epub(#[from] epub_builder::Error),
    /// ZIP archive errors, both when reading sources and writing CBZ output
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    /// Async task join errors
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Semaphore(#[from] tokio::sync::AcquireError),
    #[error(transparent)]
    ConfigBuilder(#[from] crate::inkpress::InkpressConfigBuilderError),
    /// A source entry could not be decoded into an image
    #[error("Failed to decode '{name}': {reason}")]
    Decode { name: String, reason: String },
    /// A pipeline step could not complete
    #[error("Pipeline error: {0}")]
    Pipeline(String),
    /// Invalid configuration (unknown device, bad option values)
    #[error("Configuration error: {0}")]
    Config(String),
    /// Output writer failure that is not a plain I/O error
    #[error("Writer error: {0}")]
    Writer(String),
    /// Work was submitted after the processor stopped accepting items
    #[error("The processor is closed and no longer accepts work")]
    ProcessorClosed,
    /// Error for invalid file or directory paths
    #[error("The given path '{0:?}' is invalid: {1}")]
    InvalidPath(PathBuf, String),
    /// Error for failed asynchronous tasks
    #[error("Asynchronous task failed: {0}")]
    AsyncTaskError(String),
    /// An operation exceeded its time limit
    #[error("Timed out: {0}")]
    Timeout(String),
    /// Error for unsupported operations or formats (e.g., unknown image extension)
    #[error("Unsupported: {0}")]
    Unsupported(String),
    /// Error for resources that couldn't be found (e.g., source directory)
    #[error("Not found: {0}")]
    NotFound(String),
    /// Other errors that don't fit into specific categories
    #[error("Other error: {0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(error: String) -> Self {
        Error::Other(error)
    }
}

impl From<&str> for Error {
    fn from(error: &str) -> Self {
        Error::Other(error.to_string())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}
