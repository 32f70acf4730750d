use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::prelude::*;
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};
use crate::path_utils::{compare_names_naturally, path_to_string_lossy};
use crate::types::{ReadDirection, get_file_info};
use crate::writer::epub::escape_xml;
use crate::writer::{BookInfo, PageWriter};

/// Renders `ComicInfo.xml` for a book of `page_count` pages.
pub fn comic_info_xml(info: &BookInfo, page_count: usize) -> String {
    const TEMPLATE: &str = include_str!("../../templates/ComicInfo.xml");

    let manga = match info.read_direction {
        ReadDirection::Rtl => "YesAndRightToLeft",
        ReadDirection::Ltr => "No",
    };
    let now = Utc::now();

    TEMPLATE
        .replace("%title%", &escape_xml(&info.title))
        .replace("%pagecount%", &page_count.to_string())
        .replace("%language%", &escape_xml(&info.language))
        .replace("%year%", &now.year().to_string())
        .replace("%month%", &now.month().to_string())
        .replace("%day%", &now.day().to_string())
        .replace("%manga%", manga)
        .replace(
            "%blackandwhite%",
            if info.colored { "No" } else { "Yes" },
        )
}

/// Collects pages and packs them into a deflated CBZ archive at shutdown.
///
/// Pages are renamed `page_0001.<ext>`, `page_0002.<ext>`, ... in natural name order.
pub struct CbzWriter {
    output_path: PathBuf,
    info: BookInfo,
    options: SimpleFileOptions,
    accepting: AtomicBool,
    finished: AtomicBool,
    pages: Mutex<Vec<(String, Vec<u8>)>>,
}

impl CbzWriter {
    pub fn new(output_path: impl Into<PathBuf>, info: BookInfo) -> Result<Self> {
        let output_path = output_path.into();
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o755);
        Ok(Self {
            output_path,
            info,
            options,
            accepting: AtomicBool::new(true),
            finished: AtomicBool::new(false),
            pages: Mutex::new(Vec::new()),
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn build(
        output_path: &Path,
        info: &BookInfo,
        options: SimpleFileOptions,
        pages: &[(String, Vec<u8>)],
    ) -> Result<()> {
        let file = File::create(output_path)?;
        let mut zip = ZipWriter::new(file);

        for (index, (name, data)) in pages.iter().enumerate() {
            let (extension, _) = get_file_info(Path::new(name))?;
            zip.start_file(format!("page_{:04}.{}", index + 1, extension), options)?;
            zip.write_all(data)?;
        }

        zip.start_file("ComicInfo.xml", options)?;
        zip.write_all(comic_info_xml(info, pages.len()).as_bytes())?;
        zip.finish()?;
        Ok(())
    }
}

#[async_trait]
impl PageWriter for CbzWriter {
    async fn process(&self, filename: &str, data: Vec<u8>) -> Result<()> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(Error::Writer(format!(
                "CBZ writer for '{}' is closed",
                path_to_string_lossy(&self.output_path)
            )));
        }
        get_file_info(Path::new(filename))?;
        self.pages.lock().await.push((filename.to_string(), data));
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.accepting.store(false, Ordering::Release);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.close()?;
        if self.finished.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut pages = std::mem::take(&mut *self.pages.lock().await);
        if pages.is_empty() {
            log::warn!(
                "No pages for '{}', skipping CBZ generation",
                path_to_string_lossy(&self.output_path)
            );
            return Ok(());
        }
        pages.sort_by(|a, b| compare_names_naturally(&a.0, &b.0));

        let output_path = self.output_path.clone();
        let info = self.info.clone();
        let options = self.options;
        let page_count = pages.len();
        spawn_blocking(move || Self::build(&output_path, &info, options, &pages))
            .await
            .map_err(|e| Error::AsyncTaskError(e.to_string()))??;

        log::info!(
            "Wrote CBZ '{}' with {} pages",
            path_to_string_lossy(&self.output_path),
            page_count
        );
        Ok(())
    }
}
