//! Source extraction: turns a folder of images or a ZIP/CBZ archive into a stream of entries.
//!
//! Extractors list their entries first, order them (chapter folder first, then page number) and
//! then send them one by one through a bounded tokio channel, so reading never runs far ahead of
//! the processor. A failure to read one entry is sent as an `Err` for that entry only.

use std::cmp::Ordering;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use memmap2::MmapOptions;
use regex::Regex;
use tokio::fs::{self, ReadDir, read_dir};
use tokio::sync::mpsc;
use tokio::task::spawn_blocking;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::path_utils::{
    DEFAULT_NUMBER_REGEX, compare_names_naturally, compare_paths_by_number, is_hidden_file,
    is_image_file, path_to_string_lossy,
};

/// One source page: its name relative to the source root and its raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
}

/// Common interface for page sources.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Location the entries are read from.
    fn source(&self) -> &Path;

    /// Sends every entry through `sender` in page order.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of entries sent, failed ones included
    /// * `Err(Error)` - If the source itself could not be opened or listed
    async fn extract(&self, sender: mpsc::Sender<Result<ArchiveEntry>>) -> Result<usize>;
}

/// Orders entry names by their folder, then by the page number of the file name.
pub fn compare_entry_names(a: &str, b: &str, regex: &Regex) -> Ordering {
    let (a_path, b_path) = (Path::new(a), Path::new(b));
    let a_parent = a_path.parent().map(path_to_string_lossy).unwrap_or_default();
    let b_parent = b_path.parent().map(path_to_string_lossy).unwrap_or_default();
    compare_names_naturally(&a_parent, &b_parent)
        .then_with(|| compare_paths_by_number(a_path, b_path, regex))
}

/// Whether `path` is an archive the [`ZipExtractor`] can read.
pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| ext == "zip" || ext == "cbz")
}

/// Picks the extractor matching `path`.
pub fn open_extractor(path: &Path, page_regex: Option<Regex>) -> Result<Box<dyn Extractor>> {
    if path.is_dir() {
        Ok(Box::new(FolderExtractor::new(path, page_regex)))
    } else if is_archive(path) {
        Ok(Box::new(ZipExtractor::new(path, page_regex)))
    } else if path.exists() {
        Err(Error::Unsupported(format!(
            "Source '{}' is neither a folder nor a ZIP/CBZ archive",
            path_to_string_lossy(path)
        )))
    } else {
        Err(Error::NotFound(path_to_string_lossy(path)))
    }
}

/// Reads image files below a directory, recursively.
#[derive(Debug, Clone)]
pub struct FolderExtractor {
    root: PathBuf,
    page_regex: Option<Regex>,
}

impl FolderExtractor {
    pub fn new(root: impl Into<PathBuf>, page_regex: Option<Regex>) -> Self {
        Self {
            root: root.into(),
            page_regex,
        }
    }

    /// Collects every visible image file below the root, skipping hidden files and folders.
    pub async fn collect_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(directory) = pending.pop() {
            let mut entries: ReadDir = read_dir(&directory).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if is_hidden_file(&path) {
                    continue;
                }
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if is_image_file(&path) {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }

    fn entry_name(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[async_trait]
impl Extractor for FolderExtractor {
    fn source(&self) -> &Path {
        &self.root
    }

    async fn extract(&self, sender: mpsc::Sender<Result<ArchiveEntry>>) -> Result<usize> {
        let regex = self.page_regex.as_ref().unwrap_or(&DEFAULT_NUMBER_REGEX);
        let mut named: Vec<(String, PathBuf)> = self
            .collect_files()
            .await?
            .into_iter()
            .map(|path| (self.entry_name(&path), path))
            .collect();
        named.sort_by(|a, b| compare_entry_names(&a.0, &b.0, regex));

        let mut sent = 0;
        for (name, path) in named {
            let entry = fs::read(&path).await.map_err(|e| Error::Decode {
                name: name.clone(),
                reason: e.to_string(),
            });
            let entry = entry.map(|data| ArchiveEntry { name, data });
            if sender.send(entry).await.is_err() {
                log::debug!("Extraction receiver dropped, stopping after {} entries", sent);
                break;
            }
            sent += 1;
        }
        Ok(sent)
    }
}

/// Reads image entries of a ZIP or CBZ archive through a memory map.
#[derive(Debug, Clone)]
pub struct ZipExtractor {
    archive: PathBuf,
    page_regex: Option<Regex>,
}

impl ZipExtractor {
    pub fn new(archive: impl Into<PathBuf>, page_regex: Option<Regex>) -> Self {
        Self {
            archive: archive.into(),
            page_regex,
        }
    }

    fn extract_blocking(
        archive_path: &Path,
        regex: &Regex,
        sender: &mpsc::Sender<Result<ArchiveEntry>>,
    ) -> Result<usize> {
        let file = std::fs::File::open(archive_path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to open archive '{}': {}",
                    path_to_string_lossy(archive_path),
                    e
                ),
            ))
        })?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))?;

        let mut named: Vec<(String, usize)> = (0..archive.len())
            .filter_map(|index| {
                let entry = archive.by_index(index).ok()?;
                let name = entry.name().replace('\\', "/");
                let path = Path::new(&name);
                let hidden = path.components().any(|c| {
                    let part = c.as_os_str().to_string_lossy();
                    part.starts_with('.') || part == "__MACOSX"
                });
                (entry.is_file() && !hidden && is_image_file(path)).then_some((name, index))
            })
            .collect();
        named.sort_by(|a, b| compare_entry_names(&a.0, &b.0, regex));

        let mut sent = 0;
        for (name, index) in named {
            let entry = archive
                .by_index(index)
                .map_err(Error::from)
                .and_then(|mut file| {
                    let mut data = Vec::with_capacity(file.size() as usize);
                    file.read_to_end(&mut data)?;
                    Ok(data)
                })
                .map_err(|e| Error::Decode {
                    name: name.clone(),
                    reason: e.to_string(),
                })
                .map(|data| ArchiveEntry { name, data });
            if sender.blocking_send(entry).is_err() {
                log::debug!("Extraction receiver dropped, stopping after {} entries", sent);
                break;
            }
            sent += 1;
        }
        Ok(sent)
    }
}

#[async_trait]
impl Extractor for ZipExtractor {
    fn source(&self) -> &Path {
        &self.archive
    }

    async fn extract(&self, sender: mpsc::Sender<Result<ArchiveEntry>>) -> Result<usize> {
        let archive = self.archive.clone();
        let regex = self
            .page_regex
            .clone()
            .unwrap_or_else(|| (*DEFAULT_NUMBER_REGEX).clone());
        spawn_blocking(move || Self::extract_blocking(&archive, &regex, &sender))
            .await
            .map_err(|e| Error::AsyncTaskError(e.to_string()))?
    }
}
