use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use epub_builder::{EpubBuilder, EpubContent, EpubVersion, ZipLibrary};
use image::ImageReader;
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;

use crate::error::{Error, Result};
use crate::path_utils::{compare_names_naturally, path_to_string_lossy};
use crate::types::get_file_info;
use crate::writer::{BookInfo, PageWriter};

/// Generates the XHTML page wrapping one image.
///
/// # Arguments
///
/// * `image_source` - Path of the image relative to the EPUB content root
/// * `page_title` - Title and alt text of the page
/// * `dimensions` - Pixel size of the image, used for the fixed-layout viewport
fn generate_xhtml(image_source: &str, page_title: &str, dimensions: (u32, u32)) -> String {
    const TEMPLATE: &str = include_str!("../../templates/Page.xhtml");
    TEMPLATE
        .replace("%title%", &escape_xml(page_title))
        .replace("%src%", image_source)
        .replace("%alt%", &escape_xml(page_title))
        .replace("%width%", &dimensions.0.to_string())
        .replace("%height%", &dimensions.1.to_string())
}

pub(crate) fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Collects pages in memory and writes one EPUB 3 book at shutdown.
///
/// Pages are ordered by name, the first one doubles as the cover image.
pub struct EpubWriter {
    output_path: PathBuf,
    info: BookInfo,
    accepting: AtomicBool,
    finished: AtomicBool,
    pages: Mutex<Vec<(String, Vec<u8>)>>,
}

impl EpubWriter {
    /// Creates the writer; the parent directory of `output_path` is created if missing.
    pub fn new(output_path: impl Into<PathBuf>, info: BookInfo) -> Result<Self> {
        let output_path = output_path.into();
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            output_path,
            info,
            accepting: AtomicBool::new(true),
            finished: AtomicBool::new(false),
            pages: Mutex::new(Vec::new()),
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn build(output_path: &Path, info: &BookInfo, pages: &[(String, Vec<u8>)]) -> Result<()> {
        let mut epub = EpubBuilder::new(ZipLibrary::new()?)?;
        epub.epub_version(EpubVersion::V30);
        epub.stylesheet(include_bytes!("../../templates/Style.css").as_slice())?;

        epub.metadata("title", &info.title)?;
        epub.metadata("direction", info.read_direction.to_string())?;
        epub.metadata(
            "description",
            format!("Converted on {}", Utc::now().format("%Y-%m-%d")),
        )?;
        epub.metadata("generator", "inkpress")?;
        epub.set_lang(&info.language);

        for (index, (name, data)) in pages.iter().enumerate() {
            let (extension, mime) = get_file_info(Path::new(name))?;
            let dimensions = ImageReader::new(Cursor::new(data.as_slice()))
                .with_guessed_format()?
                .into_dimensions()?;

            if index == 0 {
                epub.add_cover_image(
                    format!("images/cover.{}", extension),
                    Cursor::new(data.as_slice()),
                    mime,
                )?;
            }

            let image_path = format!("images/page_{:04}.{}", index + 1, extension);
            let page_title = format!("Page {}", index + 1);
            epub.add_resource(&image_path, Cursor::new(data.as_slice()), mime)?;

            let xhtml = generate_xhtml(&image_path, &page_title, dimensions);
            let mut content =
                EpubContent::new(format!("page_{:04}.xhtml", index + 1), xhtml.as_bytes());
            if index == 0 {
                content = content.title(&info.title);
            }
            epub.add_content(content)?;
        }

        let file = File::create(output_path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create EPUB file '{}': {}",
                    path_to_string_lossy(output_path),
                    e
                ),
            ))
        })?;
        epub.generate(file)?;
        Ok(())
    }
}

#[async_trait]
impl PageWriter for EpubWriter {
    async fn process(&self, filename: &str, data: Vec<u8>) -> Result<()> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(Error::Writer(format!(
                "EPUB writer for '{}' is closed",
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
                "No pages for '{}', skipping EPUB generation",
                path_to_string_lossy(&self.output_path)
            );
            return Ok(());
        }
        pages.sort_by(|a, b| compare_names_naturally(&a.0, &b.0));

        let output_path = self.output_path.clone();
        let info = self.info.clone();
        let page_count = pages.len();
        spawn_blocking(move || Self::build(&output_path, &info, &pages))
            .await
            .map_err(|e| Error::AsyncTaskError(e.to_string()))??;

        log::info!(
            "Wrote EPUB '{}' with {} pages",
            path_to_string_lossy(&self.output_path),
            page_count
        );
        Ok(())
    }
}
