//! Output writers receiving encoded pages from the processor.
//!
//! This module contains the common interface for page sinks and the implementations for
//! the supported output formats: a plain folder, an EPUB book and a CBZ archive.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::types::{OutputFormat, ReadDirection};

pub mod cbz;
pub mod dir;
pub mod epub;

pub use cbz::CbzWriter;
pub use dir::DirWriter;
pub use epub::EpubWriter;

/// Common interface for all page sinks.
///
/// Implementations must accept concurrent `process` calls from several workers.
#[async_trait]
pub trait PageWriter: Send + Sync {
    /// Accepts one encoded page.
    ///
    /// # Parameters
    /// * `filename` - Relative name of the page, possibly with directories
    /// * `data` - Encoded image bytes
    ///
    /// # Returns
    /// * `Result<()>` - An error if the page could not be stored or the writer is closed
    async fn process(&self, filename: &str, data: Vec<u8>) -> Result<()>;

    /// Stops accepting pages. Calling it more than once is harmless.
    fn close(&self) -> Result<()>;

    /// Finalizes the output once every page has been received.
    async fn shutdown(&self) -> Result<()>;
}

/// Book-level information shared by the writers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BookInfo {
    pub title: String,
    pub read_direction: ReadDirection,
    pub language: String,
    /// Pages keep their colors
    pub colored: bool,
}

impl BookInfo {
    pub fn new(title: impl Into<String>, read_direction: ReadDirection) -> Self {
        Self {
            title: title.into(),
            read_direction,
            language: "en".to_string(),
            colored: false,
        }
    }

    pub fn with_colored(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }
}

/// Creates the writer for `format` and returns it with the path it will produce.
///
/// # Arguments
///
/// * `format` - Output format of the book
/// * `target_dir` - Directory receiving the book
/// * `base_name` - File or folder name of the book, without extension
/// * `info` - Title and reading direction
pub fn create_writer(
    format: OutputFormat,
    target_dir: &Path,
    base_name: &str,
    info: BookInfo,
) -> Result<(Arc<dyn PageWriter>, PathBuf)> {
    Ok(match format {
        OutputFormat::Folder => {
            let writer = DirWriter::new(target_dir.join(base_name))?;
            let path = writer.root().to_path_buf();
            (Arc::new(writer), path)
        }
        OutputFormat::Epub => {
            let writer = EpubWriter::new(target_dir.join(format!("{}.epub", base_name)), info)?;
            let path = writer.output_path().to_path_buf();
            (Arc::new(writer), path)
        }
        OutputFormat::Cbz => {
            let writer = CbzWriter::new(target_dir.join(format!("{}.cbz", base_name)), info)?;
            let path = writer.output_path().to_path_buf();
            (Arc::new(writer), path)
        }
    })
}
