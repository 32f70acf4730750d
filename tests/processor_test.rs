use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::GenericImageView;
use inkpress::error::{Error, Result};
use inkpress::imgutils::DrawFactory;
use inkpress::pipeline::steps::StepCropOrRotate;
use inkpress::pipeline::{Pipeline, Step};
use inkpress::processor::{ImageProcessor, encode_image, output_names};
use inkpress::types::{ImageEncodingOptions, Orientation, ProcessOptions, ReadDirection};
use inkpress::writer::PageWriter;
use tokio::sync::Mutex;

mod common;
use common::{WHITE, encode_png, page_image, solid_image};

/// Writer recording every page and the highest number of concurrent `process` calls.
#[derive(Default)]
struct RecordingWriter {
    pages: Mutex<Vec<(String, Vec<u8>)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    closes: AtomicUsize,
    shutdowns: AtomicUsize,
    fail_on: Option<String>,
}

impl RecordingWriter {
    fn failing_on(name: &str) -> Self {
        Self {
            fail_on: Some(name.to_string()),
            ..Default::default()
        }
    }

    async fn names(&self) -> Vec<String> {
        self.pages
            .lock()
            .await
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl PageWriter for RecordingWriter {
    async fn process(&self, filename: &str, data: Vec<u8>) -> Result<()> {
        if self.fail_on.as_deref() == Some(filename) {
            return Err(Error::Writer(format!("refusing '{}'", filename)));
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.pages.lock().await.push((filename.to_string(), data));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn png_options() -> ImageEncodingOptions {
    ImageEncodingOptions::new(90, "png")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_processor_runs_every_item() -> Result<()> {
    let writer = Arc::new(RecordingWriter::default());
    let processor = ImageProcessor::new(
        Arc::new(Pipeline::empty()),
        writer.clone(),
        png_options(),
        3,
    )?;

    let page = encode_png(&solid_image(8, 8, WHITE));
    for index in 0..25 {
        processor
            .process(format!("page_{:02}.png", index), page.clone())
            .await?;
    }
    let stats = processor.shutdown().await?;

    assert_eq!(stats.submitted, 25);
    assert_eq!(stats.processed, 25);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.written, 25);
    assert_eq!(stats.dropped(), 0);

    let names: HashSet<String> = writer.names().await.into_iter().collect();
    assert_eq!(names.len(), 25);
    assert!(names.contains("page_00.png"));
    assert!(names.contains("page_24.png"));

    let max = writer.max_in_flight.load(Ordering::SeqCst);
    assert!(max >= 1 && max <= 3, "max in flight was {}", max);
    assert_eq!(writer.closes.load(Ordering::SeqCst), 1);
    assert_eq!(writer.shutdowns.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_processor_counts_undecodable_items() -> Result<()> {
    let writer = Arc::new(RecordingWriter::default());
    let processor = ImageProcessor::new(
        Arc::new(Pipeline::empty()),
        writer.clone(),
        png_options(),
        2,
    )?;

    processor
        .process("good.png", encode_png(&solid_image(4, 4, WHITE)))
        .await?;
    processor
        .process("broken.png", b"definitely not an image".to_vec())
        .await?;
    let stats = processor.shutdown().await?;

    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(writer.names().await, vec!["good.png".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_processor_close_semantics() -> Result<()> {
    let writer = Arc::new(RecordingWriter::default());
    let processor = ImageProcessor::new(
        Arc::new(Pipeline::empty()),
        writer.clone(),
        png_options(),
        1,
    )?;

    processor.close()?;
    processor.close()?;
    assert!(processor.is_closed());

    let result = processor
        .process("late.png", encode_png(&solid_image(2, 2, WHITE)))
        .await;
    assert!(matches!(result, Err(Error::ProcessorClosed)));

    let stats = processor.shutdown().await?;
    assert_eq!(stats.submitted, 0);
    // A second shutdown returns the same counters without touching the writer again
    assert_eq!(processor.shutdown().await?, stats);
    assert_eq!(writer.shutdowns.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_processor_requires_workers() -> Result<()> {
    let result = ImageProcessor::new(
        Arc::new(Pipeline::empty()),
        Arc::new(RecordingWriter::default()),
        png_options(),
        0,
    );
    assert!(matches!(result, Err(Error::Config(_))));
    Ok(())
}

#[tokio::test]
async fn test_processor_names_split_outputs() -> Result<()> {
    let pipeline = Pipeline::new(
        vec![Step::image(StepCropOrRotate::new(
            false,
            Orientation::Portrait,
            ReadDirection::Ltr,
        ))],
        Arc::new(DrawFactory::passthrough()),
        ProcessOptions::default(),
    );
    let writer = Arc::new(RecordingWriter::default());
    let processor = ImageProcessor::new(Arc::new(pipeline), writer.clone(), png_options(), 2)?;

    processor
        .process("chapter1/spread.jpg", encode_png(&page_image(80, 40)))
        .await?;
    let stats = processor.shutdown().await?;

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.written, 2);
    let mut names = writer.names().await;
    names.sort();
    assert_eq!(
        names,
        vec![
            "chapter1/spread_0.png".to_string(),
            "chapter1/spread_1.png".to_string()
        ]
    );
    for (_, bytes) in writer.pages.lock().await.iter() {
        let half = image::load_from_memory(bytes)?;
        assert_eq!(half.dimensions(), (40, 40));
    }
    Ok(())
}

#[tokio::test]
async fn test_processor_reports_writer_failure() -> Result<()> {
    let writer = Arc::new(RecordingWriter::failing_on("bad.png"));
    let processor = ImageProcessor::new(
        Arc::new(Pipeline::empty()),
        writer.clone(),
        png_options(),
        1,
    )?;

    processor
        .process("bad.png", encode_png(&solid_image(2, 2, WHITE)))
        .await?;
    let result = processor.shutdown().await;
    assert!(matches!(result, Err(Error::Writer(_))));
    Ok(())
}

#[test]
fn test_output_names() {
    assert_eq!(output_names("001.png", 1, "jpg"), vec!["001.jpg"]);
    assert_eq!(
        output_names("vol1/002.webp", 2, "png"),
        vec!["vol1/002_0.png", "vol1/002_1.png"]
    );
    assert_eq!(output_names("cover", 1, "jpg"), vec!["cover.jpg"]);
    assert!(output_names("empty.png", 0, "jpg").is_empty());
}

#[test]
fn test_encode_image_formats() -> Result<()> {
    let page = page_image(20, 30);

    let jpeg = encode_image(&page, &ImageEncodingOptions::default())?;
    assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    let decoded = image::load_from_memory(&jpeg)?;
    assert_eq!(decoded.dimensions(), (20, 30));

    let png = encode_image(&page, &png_options())?;
    assert_eq!(&png[1..4], b"PNG");

    let unsupported = encode_image(&page, &ImageEncodingOptions::new(85, "tga"));
    assert!(matches!(unsupported, Err(Error::Unsupported(_))));
    Ok(())
}

#[test]
fn test_encoding_options_clamp_quality() {
    assert_eq!(ImageEncodingOptions::new(10, "JPEG").quality, 60);
    assert_eq!(ImageEncodingOptions::new(120, "png").quality, 100);
    assert_eq!(ImageEncodingOptions::new(85, "").extension(), "jpg");
    assert_eq!(ImageEncodingOptions::default().quality, 85);
}
