//! Core data types and enums shared by the pipeline, the processor and the writers.
//!
//! This module defines:
//! - Geometry primitives (`Rectangle`, `Margins`, `Orientation`, `Rotation`)
//! - Per-run options handed to every pipeline step (`ProcessOptions`)
//! - Output settings (`OutputFormat`, `ImageEncodingOptions`, `ReadDirection`)
//! - Conversion tuning enums (`CropLevel`)
//! - Reporting types (`ConversionReport`)

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::processor::ProcessorStats;

/// Generic four-sided value, used for rectangles, padding sizes and border colors alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Margins<T> {
    pub top: T,
    pub bottom: T,
    pub left: T,
    pub right: T,
}

impl<T: Copy> Margins<T> {
    /// Creates margins with the same value on every side.
    pub fn uniform(value: T) -> Self {
        Self {
            top: value,
            bottom: value,
            left: value,
            right: value,
        }
    }

    /// Applies `f` to every side.
    pub fn map<U, F: Fn(T) -> U>(self, f: F) -> Margins<U> {
        Margins {
            top: f(self.top),
            bottom: f(self.bottom),
            left: f(self.left),
            right: f(self.right),
        }
    }
}

impl<T: Copy + PartialEq> Margins<T> {
    /// Replaces every side equal to `empty` with `fallback`.
    pub fn fill_empty(&mut self, empty: T, fallback: T) {
        for side in [
            &mut self.top,
            &mut self.bottom,
            &mut self.left,
            &mut self.right,
        ] {
            if *side == empty {
                *side = fallback;
            }
        }
    }
}

/// Axis-aligned, half-open pixel rectangle: `[min_x, max_x) x [min_y, max_y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rectangle {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Rectangle {
    pub const fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Rectangle anchored at the origin with the given size.
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> u32 {
        self.max_x.saturating_sub(self.min_x)
    }

    pub fn height(&self) -> u32 {
        self.max_y.saturating_sub(self.min_y)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn orientation(&self) -> Orientation {
        Orientation::from_dimensions(self.width(), self.height())
    }

    /// Largest rectangle contained in both `self` and `other`; empty when they are disjoint.
    pub fn intersect(&self, other: &Rectangle) -> Rectangle {
        let result = Rectangle::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        );
        if result.min_x >= result.max_x || result.min_y >= result.max_y {
            return Rectangle::default();
        }
        result
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn union(&self, other: &Rectangle) -> Rectangle {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rectangle::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    pub fn overlaps(&self, other: &Rectangle) -> bool {
        !self.intersect(other).is_empty()
    }
}

/// Page shape relative to its longest side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Orientation {
    Landscape,
    #[default]
    Portrait,
}

impl Orientation {
    /// Landscape when strictly wider than tall, portrait otherwise (squares included).
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        if width > height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }
}

/// Clockwise rotation angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rotation {
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

/// Page progression direction of the produced book.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReadDirection {
    #[default]
    Ltr,
    Rtl,
}

impl fmt::Display for ReadDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadDirection::Ltr => write!(f, "ltr"),
            ReadDirection::Rtl => write!(f, "rtl"),
        }
    }
}

impl FromStr for ReadDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ltr" | "left-to-right" => Ok(ReadDirection::Ltr),
            "rtl" | "right-to-left" => Ok(ReadDirection::Rtl),
            other => Err(Error::Config(format!("Unknown read direction '{}'", other))),
        }
    }
}

/// Container produced for each converted book.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutputFormat {
    /// Plain directory of encoded pages, with a cover folder
    Folder,
    #[default]
    Epub,
    Cbz,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "folder" | "dir" => Ok(OutputFormat::Folder),
            "epub" => Ok(OutputFormat::Epub),
            "cbz" => Ok(OutputFormat::Cbz),
            other => Err(Error::Config(format!("Unknown output format '{}'", other))),
        }
    }
}

/// How eagerly the auto-crop step classifies border tones as background.
///
/// The level selects the palette pixels are snapped to before background detection:
/// fewer palette entries merge more shades into the background tone.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CropLevel {
    /// Uses the device palette
    Basic,
    /// Four gray levels
    #[default]
    Normal,
    /// Pure black and white
    Aggressive,
}

/// Immutable per-run parameters shared by every step of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessOptions {
    pub gamma: f64,
    pub apply_color: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            gamma: 1.0,
            apply_color: false,
        }
    }
}

impl ProcessOptions {
    /// Colored output with a near-zero gamma falls back to identity gamma.
    pub fn new(gamma: f64, apply_color: bool) -> Self {
        let gamma = if apply_color && gamma < 0.1 { 1.0 } else { gamma };
        Self { gamma, apply_color }
    }

    /// Whether the gamma value asks for an actual correction pass.
    pub fn gamma_requested(&self) -> bool {
        self.gamma > 0.0 && (self.gamma - 1.0).abs() > f64::EPSILON
    }
}

/// Encoding settings for every page handed to the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageEncodingOptions {
    pub quality: u8,
    pub format: String,
}

impl ImageEncodingOptions {
    pub const DEFAULT_QUALITY: u8 = 85;
    pub const MIN_QUALITY: u8 = 60;
    pub const MAX_QUALITY: u8 = 100;

    /// Quality is clamped to `60..=100`; the format is lowercased and defaults to `jpeg`.
    pub fn new(quality: u8, format: &str) -> Self {
        let format = format.trim().to_ascii_lowercase();
        Self {
            quality: quality.clamp(Self::MIN_QUALITY, Self::MAX_QUALITY),
            format: if format.is_empty() {
                "jpeg".to_string()
            } else {
                format
            },
        }
    }

    /// File extension used for encoded pages.
    pub fn extension(&self) -> &str {
        match self.format.as_str() {
            "jpeg" | "jpg" => "jpg",
            "png" => "png",
            other => other,
        }
    }
}

impl Default for ImageEncodingOptions {
    fn default() -> Self {
        Self::new(Self::DEFAULT_QUALITY, "jpeg")
    }
}

/// Outcome of converting one source (folder or archive) into one book.
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub name: String,
    pub output_path: PathBuf,
    pub stats: ProcessorStats,
}

/// Determines file type and MIME type from a file name or path.
///
/// # Arguments
///
/// * `image_path` - Path (or archive entry name) of the file to analyze
///
/// # Returns
///
/// * `Ok((&str, &str))` - A tuple containing (normalized extension, MIME type)
/// * `Err(Error)` - An error if the file format is unsupported
///
/// # Supported formats
///
/// - JPEG/JPG: image/jpeg
/// - PNG: image/png
/// - WebP: image/webp
/// - GIF: image/gif
/// - BMP: image/bmp
/// - TIFF: image/tiff
pub fn get_file_info(image_path: &Path) -> Result<(&'static str, &'static str)> {
    let extension = image_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => Ok(("jpg", "image/jpeg")),
        Some("png") => Ok(("png", "image/png")),
        Some("webp") => Ok(("webp", "image/webp")),
        Some("gif") => Ok(("gif", "image/gif")),
        Some("bmp") => Ok(("bmp", "image/bmp")),
        Some("tif") | Some("tiff") => Ok(("tiff", "image/tiff")),
        _ => Err(Error::Unsupported(format!("Image format {:#?}", extension))),
    }
}
