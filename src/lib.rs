//! Inkpress - Comic and manga page optimizer for e-readers
//!
//! This crate turns folders and archives of comic pages into books tuned for a specific
//! e-reader: pages are converted to the device's gray palette, their blank borders are cropped,
//! landscape spreads are split or rotated, and everything is rescaled to the device resolution
//! before the contrast is stretched.
//!
//! # Getting Started
//!
//! Configure a conversion with [`InkpressConfig::builder`] and run it with
//! [`InkpressConfig::convert_from_source`].
//!
//! ```rust,no_run
//! use inkpress::prelude::*;
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> inkpress::error::Result<()> {
//!     let config = InkpressConfig::builder()
//!         .title("My Awesome Series")
//!         .source_path(PathBuf::from("./my_manga_collection/series_a"))
//!         .target_path(PathBuf::from("./converted"))
//!         .device("KPW5")
//!         .output_format(OutputFormat::Epub)
//!         .read_direction(ReadDirection::Rtl)
//!         .crop_level(CropLevel::Normal)
//!         .build()?;
//!
//!     // Optional: validate paths and device before starting
//!     config.preflight_check()?;
//!
//!     for report in config.convert_from_source().await? {
//!         println!("{}: {} pages written", report.name, report.stats.written);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The building blocks are public as well: a [`pipeline::Pipeline`] can be assembled by hand
//! from the steps in [`pipeline::steps`] and driven over many pages with a
//! [`processor::ImageProcessor`] and any [`writer::PageWriter`].

pub mod device;
pub mod error;
pub mod extractor;
pub mod imgutils;
pub mod inkpress;
pub mod path_utils;
pub mod pipeline;
pub mod processor;
pub mod types;
pub mod writer;

// Publicly expose the main `InkpressConfig` struct and its builder
pub use inkpress::InkpressConfig;
pub use inkpress::InkpressConfigBuilder;

pub use device::{DeviceProfile, PaletteType};
pub use types::{
    ConversionReport, CropLevel, ImageEncodingOptions, Margins, Orientation, OutputFormat,
    ProcessOptions, ReadDirection, Rectangle, Rotation,
};

/// Prelude module for convenient imports.
///
/// Re-exports the most commonly used types and traits, so `use inkpress::prelude::*;` is enough
/// for typical conversions and custom pipelines.
pub mod prelude {
    pub use super::{
        ConversionReport, CropLevel, DeviceProfile, ImageEncodingOptions, InkpressConfig,
        InkpressConfigBuilder, OutputFormat, PaletteType, ProcessOptions, ReadDirection, error,
        types,
    };
    pub use crate::extractor::{ArchiveEntry, Extractor};
    pub use crate::imgutils::{DrawFactory, Palette};
    pub use crate::pipeline::{PipeStep, Pipeline, Step, StepId, UnitStep};
    pub use crate::processor::{ImageProcessor, ProcessorStats};
    pub use crate::writer::{BookInfo, CbzWriter, DirWriter, EpubWriter, PageWriter};
    pub use std::path::{Path, PathBuf};
    pub use std::sync::Arc;
}
