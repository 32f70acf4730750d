//! Common test utilities and constants for the Inkpress crate.
//!
//! Provides functions for setting up test directories, building synthetic pages in memory and
//! on disk, and inspecting generated archives.

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use inkpress::error::{Error, Result};
use inkpress::types::Rectangle;
use rand::{Rng, distributions::Alphanumeric};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

#[allow(dead_code)]
pub const TEST_TMP_DIR: &str = "tests/tmp";
#[allow(dead_code)]
pub const TEST_TIMEOUT: Duration = Duration::from_secs(30);

#[allow(dead_code)]
pub const WHITE: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);
#[allow(dead_code)]
pub const BLACK: Rgba<u8> = Rgba([0x00, 0x00, 0x00, 0xff]);

/// Helper function to create a clean test directory with source and target subdirectories.
/// Returns the base test path, the source path, and the target path.
#[allow(dead_code)]
pub async fn setup_test_dirs(sub_path: &str) -> (PathBuf, PathBuf, PathBuf) {
    let rand_string: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let unique_sub_path = format!("{}-{}", sub_path, rand_string);
    let test_dir = PathBuf::from(TEST_TMP_DIR).join(unique_sub_path);
    if test_dir.exists() {
        fs::remove_dir_all(&test_dir).await.unwrap();
    }
    let source_dir = test_dir.join("source");
    let target_dir = test_dir.join("target");

    fs::create_dir_all(&source_dir).await.unwrap();
    fs::create_dir_all(&target_dir).await.unwrap();

    (test_dir, source_dir, target_dir)
}

/// Removes one test directory created by [`setup_test_dirs`].
#[allow(dead_code)]
pub async fn cleanup_test_dir(test_dir: &Path) {
    if test_dir.exists() {
        let _ = fs::remove_dir_all(test_dir).await;
    }
}

/// A `width x height` RGBA image filled with `color`.
#[allow(dead_code)]
pub fn solid_image(width: u32, height: u32, color: Rgba<u8>) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, color))
}

/// A `background` image with `rect` painted in `foreground`.
#[allow(dead_code)]
pub fn framed_image(
    width: u32,
    height: u32,
    background: Rgba<u8>,
    rect: Rectangle,
    foreground: Rgba<u8>,
) -> DynamicImage {
    let mut img = RgbaImage::from_pixel(width, height, background);
    for y in rect.min_y..rect.max_y.min(height) {
        for x in rect.min_x..rect.max_x.min(width) {
            img.put_pixel(x, y, foreground);
        }
    }
    DynamicImage::ImageRgba8(img)
}

/// A white page with a black block inset by a tenth of each side, like a scanned panel.
#[allow(dead_code)]
pub fn page_image(width: u32, height: u32) -> DynamicImage {
    let rect = Rectangle::new(width / 10, height / 10, width - width / 10, height - height / 10);
    framed_image(width, height, WHITE, rect, BLACK)
}

/// Encodes `image` as PNG bytes.
#[allow(dead_code)]
pub fn encode_png(image: &DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Writes a [`page_image`] as PNG to `path`.
#[allow(dead_code)]
pub async fn create_page_file(path: &Path, width: u32, height: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let bytes = tokio::task::spawn_blocking(move || encode_png(&page_image(width, height)))
        .await
        .map_err(|e| Error::AsyncTaskError(e.to_string()))?;
    fs::write(path, bytes).await?;
    Ok(())
}

/// Writes a ZIP archive at `path` holding the given `(name, bytes)` entries.
#[allow(dead_code)]
pub fn create_zip_file(path: &Path, entries: &[(&str, Vec<u8>)]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(data)?;
    }
    zip.finish()?;
    Ok(())
}

/// Checks if a ZIP file (CBZ or EPUB) exists and contains at least one entry.
#[allow(dead_code)]
pub async fn assert_valid_zip_file(path: &Path) {
    assert!(path.exists(), "Output ZIP file does not exist: {:?}", path);
    assert!(path.is_file(), "Output ZIP path is not a file: {:?}", path);

    let file = fs::File::open(path).await.unwrap();
    let file_std = file.into_std().await;
    let zip = zip::ZipArchive::new(file_std).unwrap();
    assert!(zip.len() > 0, "Output ZIP file is empty: {:?}", path);
}

/// Names of every entry of a ZIP file, in archive order.
#[allow(dead_code)]
pub fn zip_entry_names(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).unwrap();
    let archive = zip::ZipArchive::new(file).unwrap();
    archive.file_names().map(|name| name.to_string()).collect()
}

/// Reads one text entry of a ZIP file.
#[allow(dead_code)]
pub fn read_zip_text(path: &Path, name: &str) -> String {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut content = String::new();
    entry.read_to_string(&mut content).unwrap();
    content
}
