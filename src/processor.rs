//! Bounded worker pool driving the pipeline over many pages concurrently.
//!
//! Submission waits for a free worker slot, so the producer can never queue more pages than
//! there are workers. Each worker decodes a page, runs it through the shared [`Pipeline`],
//! encodes every resulting image and hands it to the injected [`PageWriter`].
//!
//! Shutdown is two-phase: [`ImageProcessor::close`] stops accepting work (safe to call any
//! number of times) and [`ImageProcessor::shutdown`] joins every worker, then finalizes the
//! writer.

use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::{JoinHandle, spawn_blocking};

use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::types::ImageEncodingOptions;
use crate::writer::PageWriter;

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 10;

/// Counters of a processor run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessorStats {
    /// Items accepted by [`ImageProcessor::process`]
    pub submitted: usize,
    /// Items that went through decode, pipeline and writer successfully
    pub processed: usize,
    /// Items skipped after a decode or pipeline error
    pub failed: usize,
    /// Encoded pages handed to the writer
    pub written: usize,
}

impl ProcessorStats {
    /// Items that were submitted but neither processed nor reported as failed.
    pub fn dropped(&self) -> usize {
        self.submitted
            .saturating_sub(self.processed)
            .saturating_sub(self.failed)
    }
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicUsize,
    processed: AtomicUsize,
    failed: AtomicUsize,
    written: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> ProcessorStats {
        ProcessorStats {
            submitted: self.submitted.load(Ordering::Acquire),
            processed: self.processed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            written: self.written.load(Ordering::Acquire),
        }
    }
}

struct WorkItem {
    name: String,
    data: Vec<u8>,
    _permit: OwnedSemaphorePermit,
}

/// Where in a worker's cycle an item failed.
enum Failure {
    /// Decode or pipeline failure, only the item is lost
    Item(Error),
    /// Encode failure, the worker stops
    Output(Error),
}

/// Pool of workers sharing one pipeline and one writer.
pub struct ImageProcessor {
    sender: Mutex<Option<mpsc::Sender<WorkItem>>>,
    slots: Arc<Semaphore>,
    closed: AtomicBool,
    finished: AtomicBool,
    workers: Mutex<Vec<JoinHandle<Result<()>>>>,
    writer: Arc<dyn PageWriter>,
    counters: Arc<Counters>,
}

impl ImageProcessor {
    /// Spawns `workers` worker tasks on the current tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `pipeline` - Pipeline shared by every worker
    /// * `writer` - Destination of the encoded pages
    /// * `encoding` - Output encoding of every page
    /// * `workers` - Number of concurrent workers, at least one
    ///
    /// # Returns
    ///
    /// * `Ok(ImageProcessor)` - A processor ready to accept work
    /// * `Err(Error)` - If `workers` is zero or no tokio runtime is running
    pub fn new(
        pipeline: Arc<Pipeline>,
        writer: Arc<dyn PageWriter>,
        encoding: ImageEncodingOptions,
        workers: usize,
    ) -> Result<Self> {
        if workers == 0 {
            return Err(Error::Config(
                "The processor needs at least one worker".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::AsyncTaskError(e.to_string()))?;

        let (sender, receiver) = mpsc::channel::<WorkItem>(workers);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let counters = Arc::new(Counters::default());
        let encoding = Arc::new(encoding);

        let handles = (0..workers)
            .map(|id| {
                runtime.spawn(worker_loop(
                    id,
                    Arc::clone(&receiver),
                    Arc::clone(&pipeline),
                    Arc::clone(&writer),
                    Arc::clone(&encoding),
                    Arc::clone(&counters),
                ))
            })
            .collect();

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            slots: Arc::new(Semaphore::new(workers)),
            closed: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            workers: Mutex::new(handles),
            writer,
            counters,
        })
    }

    /// Submits one source page, waiting while every worker is busy.
    ///
    /// # Arguments
    ///
    /// * `name` - Entry name of the page, used to name the outputs
    /// * `data` - Raw encoded bytes of the page
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The page was handed to a worker slot
    /// * `Err(Error::ProcessorClosed)` - The processor no longer accepts work
    pub async fn process(&self, name: impl Into<String>, data: Vec<u8>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ProcessorClosed);
        }
        let permit = Arc::clone(&self.slots).acquire_owned().await?;
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::ProcessorClosed)?;

        let item = WorkItem {
            name: name.into(),
            data,
            _permit: permit,
        };
        sender
            .send(item)
            .await
            .map_err(|_| Error::ProcessorClosed)?;
        self.counters.submitted.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Stops accepting work. Only the first call has an effect.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);
        log::debug!("Processor closed after {} submissions", self.stats().submitted);
        Ok(())
    }

    /// Closes the processor, waits for every worker to exit and finalizes the writer.
    ///
    /// # Returns
    ///
    /// * `Ok(ProcessorStats)` - Final counters of the run
    /// * `Err(Error)` - The first error that stopped a worker or the writer
    pub async fn shutdown(&self) -> Result<ProcessorStats> {
        self.close()?;
        if self.finished.swap(true, Ordering::AcqRel) {
            return Ok(self.stats());
        }

        let handles: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(Error::Join(e));
                }
            }
        }

        if let Err(e) = self.writer.close() {
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.writer.shutdown().await {
            first_error.get_or_insert(e);
        }

        let stats = self.stats();
        log::info!(
            "Processed {}/{} submitted files ({} failed, {} pages written)",
            stats.processed,
            stats.submitted,
            stats.failed,
            stats.written
        );
        if stats.dropped() > 0 {
            log::warn!("{} submitted files were never processed", stats.dropped());
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    pub fn stats(&self) -> ProcessorStats {
        self.counters.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<WorkItem>>>,
    pipeline: Arc<Pipeline>,
    writer: Arc<dyn PageWriter>,
    encoding: Arc<ImageEncodingOptions>,
    counters: Arc<Counters>,
) -> Result<()> {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(WorkItem { name, data, _permit }) = next else {
            log::trace!("Worker {} found the queue closed", id);
            return Ok(());
        };

        let task_pipeline = Arc::clone(&pipeline);
        let task_encoding = Arc::clone(&encoding);
        let task_name = name.clone();
        let rendered =
            spawn_blocking(move || render_page(&task_name, &data, &task_pipeline, &task_encoding))
                .await
                .unwrap_or_else(|e| Err(Failure::Item(Error::Join(e))));

        let pages = match rendered {
            Ok(pages) => pages,
            Err(Failure::Item(e)) => {
                log::warn!("Skipping '{}': {}", name, e);
                counters.failed.fetch_add(1, Ordering::AcqRel);
                continue;
            }
            Err(Failure::Output(e)) => {
                log::error!("Worker {} stopped while encoding '{}': {}", id, name, e);
                return Err(e);
            }
        };

        for (file_name, bytes) in pages {
            if let Err(e) = writer.process(&file_name, bytes).await {
                log::error!("Worker {} stopped while writing '{}': {}", id, file_name, e);
                return Err(e);
            }
            counters.written.fetch_add(1, Ordering::AcqRel);
        }
        counters.processed.fetch_add(1, Ordering::AcqRel);
    }
}

fn render_page(
    name: &str,
    data: &[u8],
    pipeline: &Pipeline,
    encoding: &ImageEncodingOptions,
) -> std::result::Result<Vec<(String, Vec<u8>)>, Failure> {
    let image = image::load_from_memory(data).map_err(|e| {
        Failure::Item(Error::Decode {
            name: name.to_string(),
            reason: e.to_string(),
        })
    })?;
    let outputs = pipeline.process(image).map_err(Failure::Item)?;
    let names = output_names(name, outputs.len(), encoding.extension());

    names
        .into_iter()
        .zip(outputs.iter())
        .map(|(file_name, output)| {
            encode_image(output, encoding)
                .map(|bytes| (file_name, bytes))
                .map_err(Failure::Output)
        })
        .collect()
}

/// File names for the `count` outputs of source entry `name`.
///
/// The source extension is replaced by `extension`; several outputs get a `_<n>` suffix.
pub fn output_names(name: &str, count: usize, extension: &str) -> Vec<String> {
    let path = Path::new(name);
    let stem = match path.extension() {
        Some(_) => path.with_extension("").to_string_lossy().into_owned(),
        None => name.to_string(),
    };
    match count {
        0 => Vec::new(),
        1 => vec![format!("{}.{}", stem, extension)],
        _ => (0..count)
            .map(|index| format!("{}_{}.{}", stem, index, extension))
            .collect(),
    }
}

/// Encodes `image` with the configured format.
///
/// JPEG output keeps gray images single-channel and drops alpha from color images.
pub fn encode_image(image: &DynamicImage, options: &ImageEncodingOptions) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    match options.format.as_str() {
        "jpeg" | "jpg" => {
            let flattened = match image {
                DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => Cow::Borrowed(image),
                other => Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
            };
            let encoder = JpegEncoder::new_with_quality(&mut bytes, options.quality);
            flattened.write_with_encoder(encoder)?;
        }
        "png" => image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?,
        other => {
            return Err(Error::Unsupported(format!(
                "Output image format '{}'",
                other
            )));
        }
    }
    Ok(bytes)
}
