//! Folder output: every page becomes a file below the book directory.
//!
//! Pages whose name marks them as a cover (`.cover` anywhere in the name) are routed to the
//! [`COVER_DIR`] folder, which sorts first in every file browser. If no page was marked, the
//! first page in natural order is moved there when the writer shuts down.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::path_utils::{compare_names_naturally, path_to_string_lossy, sanitize_relative_path};
use crate::writer::PageWriter;

/// Folder receiving cover pages.
pub const COVER_DIR: &str = "0000_Cover";

/// Whether an entry name designates a cover page.
pub fn is_cover_name(name: &str) -> bool {
    name.to_lowercase().contains(".cover")
}

pub struct DirWriter {
    root: PathBuf,
    accepting: AtomicBool,
    written: Mutex<Vec<PathBuf>>,
}

impl DirWriter {
    /// Creates the writer and its output directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            accepting: AtomicBool::new(true),
            written: Mutex::new(Vec::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative location of `filename` inside the book directory.
    fn relative_target(filename: &str) -> Result<PathBuf> {
        let relative = sanitize_relative_path(filename);
        if relative.as_os_str().is_empty() {
            return Err(Error::InvalidPath(
                PathBuf::from(filename),
                "Entry name has no usable components".to_string(),
            ));
        }
        if is_cover_name(filename) {
            let file_name = relative.file_name().map(PathBuf::from).unwrap_or(relative);
            return Ok(Path::new(COVER_DIR).join(file_name));
        }
        Ok(relative)
    }

    async fn promote_first_page(&self, written: &[PathBuf]) -> Result<()> {
        let cover_dir = self.root.join(COVER_DIR);
        if written.iter().any(|path| path.starts_with(COVER_DIR)) {
            return Ok(());
        }
        let Some(first) = written
            .iter()
            .min_by(|a, b| compare_names_naturally(&path_to_string_lossy(a), &path_to_string_lossy(b)))
        else {
            return Ok(());
        };
        let Some(file_name) = first.file_name() else {
            return Ok(());
        };

        fs::create_dir_all(&cover_dir).await?;
        let destination = cover_dir.join(file_name);
        fs::rename(self.root.join(first), &destination).await?;
        log::debug!(
            "Moved '{}' into the cover folder",
            path_to_string_lossy(first)
        );
        Ok(())
    }
}

#[async_trait]
impl PageWriter for DirWriter {
    async fn process(&self, filename: &str, data: Vec<u8>) -> Result<()> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(Error::Writer(format!(
                "Folder writer for '{}' is closed",
                path_to_string_lossy(&self.root)
            )));
        }

        let relative = Self::relative_target(filename)?;
        let target = self.root.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, data).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to write page '{}': {}",
                    path_to_string_lossy(&target),
                    e
                ),
            ))
        })?;

        self.written.lock().await.push(relative);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.accepting.store(false, Ordering::Release);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.close()?;
        let written = self.written.lock().await;
        self.promote_first_page(&written).await
    }
}
