use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use regex::Regex;
use tokio::fs;
use tokio::sync::{Semaphore, mpsc};

use crate::device::DeviceProfile;
use crate::error::{Error, Result};
use crate::extractor::{FolderExtractor, is_archive, open_extractor};
use crate::imgutils::palette::{DrawFactory, Palette};
use crate::path_utils::{compare_names_naturally, path_to_string_lossy, sanitize_filename};
use crate::pipeline::steps::{
    StepAutoContrast, StepAutoCrop, StepCropOrRotate, StepGrayScale, StepMarginWrap, StepRescale,
};
use crate::pipeline::{Pipeline, Step, StepId};
use crate::processor::{DEFAULT_WORKERS, ImageProcessor};
use crate::types::{
    ConversionReport, CropLevel, ImageEncodingOptions, OutputFormat, ProcessOptions,
    ReadDirection,
};
use crate::writer::{BookInfo, create_writer};

/// Default upper bound for reading one source, in seconds.
pub const DEFAULT_EXTRACTION_TIMEOUT_SECS: u64 = 6 * 60 * 60;

/// The main Inkpress conversion configuration, built declaratively using the builder pattern.
///
/// This struct holds everything needed to turn comic sources into device-ready books: where to
/// read and write, which e-reader to target and how aggressively pages are cropped, rotated,
/// padded and rescaled. Once configured, [`convert_from_source`](InkpressConfig::convert_from_source)
/// runs the full conversion.
///
/// ## Builder Pattern
///
/// ```rust,no_run
/// # use inkpress::prelude::*;
/// # use std::path::PathBuf;
/// let config = InkpressConfig::builder()
///     .title("My Book")
///     .source_path(PathBuf::from("./source"))
///     .target_path(PathBuf::from("./output"))
///     .device("KOC")
///     .output_format(OutputFormat::Cbz)
///     .build()
///     .expect("Invalid configuration");
/// ```
#[derive(Debug, Clone, derive_builder::Builder)]
#[builder(setter(into, strip_option), build_fn(validate = "Self::validate"))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct InkpressConfig {
    /// Title of the produced book; also names the output when the source is a single folder.
    #[builder(default = "\"Untitled Conversion\".to_string()")]
    pub title: String,

    /// A folder of images, a folder of `.zip`/`.cbz` archives, or a single archive.
    #[builder(default)]
    pub source_path: PathBuf,

    /// Directory receiving the generated books.
    #[builder(default)]
    pub target_path: PathBuf,

    /// Device code of the target e-reader, see [`DeviceProfile::all`].
    #[builder(default = "\"KPW5\".to_string()")]
    pub device: String,

    #[builder(default)]
    pub output_format: OutputFormat,

    /// Reading direction; decides the order of split page halves and the book's page progression.
    #[builder(default)]
    pub read_direction: ReadDirection,

    #[builder(default)]
    pub crop_level: CropLevel,

    /// Rotate landscape spreads instead of splitting them into two pages.
    #[builder(default = "false")]
    pub rotate_pages: bool,

    /// Stretch pages to the exact device resolution. Ignored when margins are added.
    #[builder(default = "false")]
    pub stretch_pages: bool,

    /// Pad pages with their border color to the device aspect ratio.
    #[builder(default = "false")]
    pub add_margins: bool,

    /// Keep colors instead of converting pages to the device's gray palette.
    #[builder(default = "false")]
    pub colored_pages: bool,

    /// Rescale with nearest-neighbor sampling.
    #[builder(default = "false")]
    pub pixel_art: bool,

    /// Gamma applied before contrast stretching. Defaults to the device scale for gray output and
    /// to `1.0` (no correction) for colored output.
    #[builder(default)]
    pub gamma: Option<f64>,

    /// Percentage of darkest and brightest pixels ignored by the contrast stretch.
    #[builder(default = "(0.0, 0.0)")]
    pub contrast_cutoff: (f64, f64),

    #[builder(default)]
    pub encoding: ImageEncodingOptions,

    /// Concurrent page workers per book.
    #[builder(default = "DEFAULT_WORKERS")]
    pub workers: usize,

    /// Custom regex pattern for extracting page numbers from file names.
    ///
    /// Example: `r"page[\s_-]*(\d+)"` to match "page_001", "page-01"
    #[builder(default)]
    pub page_name_regex_str: Option<String>,

    /// Upper bound for reading and processing one source.
    #[builder(default = "Duration::from_secs(DEFAULT_EXTRACTION_TIMEOUT_SECS)")]
    pub extraction_timeout: Duration,
}

impl InkpressConfig {
    pub fn builder() -> InkpressConfigBuilder {
        InkpressConfigBuilder::default()
    }

    /// Performs validation checks on the configuration before any file is touched.
    ///
    /// `convert_from_source` calls this automatically, so manual invocation is optional.
    ///
    /// # Returns
    ///
    /// * `Ok(&self)` - Configuration is valid
    /// * `Err(Error)` - Missing title or paths, unknown device, or a missing source
    pub fn preflight_check(&self) -> Result<&Self> {
        if self.title.trim().is_empty() {
            return Err(Error::Config("Book title is required".to_string()));
        }
        if self.target_path.as_os_str().is_empty() {
            return Err(Error::Config("Target path is required".to_string()));
        }
        if self.source_path.as_os_str().is_empty() {
            return Err(Error::Config("Source path is required".to_string()));
        }
        if !self.source_path.exists() {
            return Err(Error::NotFound(format!(
                "Source path does not exist: {:?}",
                self.source_path
            )));
        }
        if !self.source_path.is_dir() && !is_archive(&self.source_path) {
            return Err(Error::InvalidPath(
                self.source_path.clone(),
                "Source path is neither a directory nor a ZIP/CBZ archive.".to_string(),
            ));
        }
        self.device_profile()?;
        Ok(self)
    }

    pub fn device_profile(&self) -> Result<&'static DeviceProfile> {
        DeviceProfile::lookup(&self.device)
    }

    /// Compiled page name pattern, if one was configured.
    pub fn page_regex(&self) -> Result<Option<Regex>> {
        Ok(match &self.page_name_regex_str {
            Some(pattern) => Some(Regex::new(pattern)?),
            None => None,
        })
    }

    /// Whether the resize step may change the aspect ratio.
    pub fn allow_stretch(&self) -> bool {
        self.stretch_pages && !self.add_margins
    }

    /// Run-time options derived from the gamma and color settings.
    pub fn process_options(&self, profile: &DeviceProfile) -> ProcessOptions {
        let gamma = self.gamma.unwrap_or(if self.colored_pages {
            1.0
        } else {
            profile.scale
        });
        ProcessOptions::new(gamma, self.colored_pages)
    }

    /// Palette pixels are snapped to when looking for the background in auto-crop.
    pub fn crop_palette(&self, profile: &DeviceProfile) -> Palette {
        match self.crop_level {
            CropLevel::Basic => profile.palette.palette(),
            CropLevel::Normal => Palette::four_grays(),
            CropLevel::Aggressive => Palette::black_and_white(),
        }
    }

    /// Assembles the page pipeline for the configured device.
    ///
    /// Order: auto-crop, margin padding and crop-or-rotate (padding after the rotation when
    /// rotating), rescale and contrast stretch. Gray conversion is a per-pixel step and runs
    /// last in the fused pixel pass.
    pub fn build_pipeline(&self) -> Result<Pipeline> {
        let profile = self.device_profile()?;
        let factory = Arc::new(if self.colored_pages {
            DrawFactory::passthrough()
        } else {
            DrawFactory::new(profile.palette.palette())
        });
        let resolution = profile.resolution();

        let mut layout = vec![
            Step::image(StepMarginWrap::new(resolution, Arc::clone(&factory))),
            Step::image(StepCropOrRotate::new(
                self.rotate_pages,
                profile.orientation(),
                self.read_direction,
            )),
        ];
        if self.rotate_pages {
            layout.swap(0, 1);
        }
        if !self.add_margins {
            layout.retain(|step| step.step_id() != StepId::MarginWrap);
        }

        let mut steps = Vec::with_capacity(6);
        if !self.colored_pages {
            steps.push(Step::pixel(StepGrayScale::new(Arc::clone(&factory))));
        }
        steps.push(Step::image(StepAutoCrop::new(
            self.crop_palette(profile),
            Arc::clone(&factory),
        )));
        steps.extend(layout);
        steps.push(Step::image(
            StepRescale::new(resolution, self.allow_stretch(), Arc::clone(&factory))
                .with_pixel_art(self.pixel_art),
        ));
        let (cutoff_low, cutoff_high) = self.contrast_cutoff;
        steps.push(Step::image(StepAutoContrast::new(
            cutoff_low,
            cutoff_high,
            Arc::clone(&factory),
        )));

        Ok(Pipeline::new(steps, factory, self.process_options(profile)))
    }

    /// Lists the books found below the source path as `(name, source)` pairs.
    ///
    /// Loose images form one book named after the title; every archive is a book of its own.
    pub async fn discover_sources(&self) -> Result<Vec<(String, PathBuf)>> {
        if is_archive(&self.source_path) && !self.source_path.is_dir() {
            return Ok(vec![(self.title.clone(), self.source_path.clone())]);
        }

        let mut archives = Vec::new();
        let mut entries = fs::read_dir(&self.source_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && is_archive(&path) {
                archives.push(path);
            }
        }
        archives.sort_by(|a, b| {
            compare_names_naturally(&path_to_string_lossy(a), &path_to_string_lossy(b))
        });

        let mut books = Vec::new();
        let loose_images = FolderExtractor::new(&self.source_path, None)
            .collect_files()
            .await?;
        if !loose_images.is_empty() {
            books.push((self.title.clone(), self.source_path.clone()));
        }
        books.extend(archives.into_iter().map(|path| {
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_else(|| self.title.clone());
            (name, path)
        }));

        if books.is_empty() {
            return Err(Error::NotFound(format!(
                "No images or archives found in {:?}",
                self.source_path
            )));
        }
        Ok(books)
    }

    /// Converts every book found below the source path.
    ///
    /// The pipeline is built once and shared; up to `min(cpus, 4)` books are converted at the
    /// same time, each with its own writer and worker pool.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<ConversionReport>)` - One report per book, in discovery order
    /// * `Err(Error)` - The configuration is invalid or a book could not be written
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use inkpress::prelude::*;
    /// # #[tokio::main]
    /// # async fn main() -> inkpress::error::Result<()> {
    /// let config = InkpressConfig::builder()
    ///     .title("Series")
    ///     .source_path(PathBuf::from("./source"))
    ///     .target_path(PathBuf::from("./output"))
    ///     .build()?;
    ///
    /// for report in config.convert_from_source().await? {
    ///     println!("{} -> {:?} ({} pages)", report.name, report.output_path, report.stats.written);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn convert_from_source(&self) -> Result<Vec<ConversionReport>> {
        self.preflight_check()?;
        let pipeline = Arc::new(self.build_pipeline()?);
        let books = self.discover_sources().await?;
        fs::create_dir_all(&self.target_path).await?;

        let max_concurrent = num_cpus::get().min(4);
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        log::info!(
            "Converting {} book(s) for {} with up to {} in parallel",
            books.len(),
            self.device,
            max_concurrent
        );

        let tasks = books.into_iter().map(|(name, source)| {
            let config = self.clone();
            let pipeline = Arc::clone(&pipeline);
            let semaphore = Arc::clone(&semaphore);
            tokio::spawn(async move {
                let _permit = semaphore.acquire().await?;
                config.convert_book(name, &source, pipeline).await
            })
        });

        try_join_all(tasks).await?.into_iter().collect()
    }

    /// Converts one source into one book with a dedicated writer and processor.
    pub async fn convert_book(
        &self,
        name: String,
        source: &Path,
        pipeline: Arc<Pipeline>,
    ) -> Result<ConversionReport> {
        let info = BookInfo::new(name.clone(), self.read_direction).with_colored(self.colored_pages);
        let (writer, output_path) = create_writer(
            self.output_format,
            &self.target_path,
            &sanitize_filename(&name),
            info,
        )?;
        let processor =
            ImageProcessor::new(pipeline, writer, self.encoding.clone(), self.workers)?;
        let extractor = open_extractor(source, self.page_regex()?)?;

        let (sender, mut receiver) = mpsc::channel(self.workers);
        let extraction = extractor.extract(sender);
        let feeding = async {
            while let Some(entry) = receiver.recv().await {
                match entry {
                    Ok(entry) => processor.process(entry.name, entry.data).await?,
                    Err(e) => log::warn!("Skipping unreadable entry: {}", e),
                }
            }
            Ok::<(), Error>(())
        };

        let fed = match tokio::time::timeout(self.extraction_timeout, async {
            tokio::try_join!(extraction, feeding)
        })
        .await
        {
            Ok(Ok((count, ()))) => Ok(count),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Timeout(format!(
                "Reading '{}' took longer than {:?}",
                path_to_string_lossy(source),
                self.extraction_timeout
            ))),
        };
        let stats = processor.shutdown().await;

        let count = fed?;
        let stats = stats?;
        log::debug!("'{}': {} entries read from {:?}", name, count, source);

        Ok(ConversionReport {
            name,
            output_path,
            stats,
        })
    }
}

impl InkpressConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(device) = &self.device {
            DeviceProfile::lookup(device).map_err(|e| e.to_string())?;
        }
        if let Some(Some(s)) = &self.page_name_regex_str {
            if Regex::new(s).is_err() {
                return Err(format!("Invalid page_name_regex: {}", s));
            }
        }
        if let Some(0) = self.workers {
            return Err("At least one worker is required.".to_string());
        }
        if let Some(Some(gamma)) = self.gamma {
            if !(gamma >= 0.0) {
                return Err(format!("Gamma must not be negative, got {}", gamma));
            }
        }
        if let Some((low, high)) = self.contrast_cutoff {
            let valid = |pct: f64| (0.0..=100.0).contains(&pct);
            if !valid(low) || !valid(high) {
                return Err(format!(
                    "Contrast cutoffs must be percentages between 0 and 100, got ({}, {})",
                    low, high
                ));
            }
        }
        Ok(())
    }
}
