use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{DynamicImage, GenericImageView, Rgba};
use inkpress::error::{Error, Result};
use inkpress::imgutils::{ColorModel, DrawFactory, Palette};
use inkpress::pipeline::steps::{
    StepAutoContrast, StepCropOrRotate, StepGammaCorrection, StepGrayScale, StepRescale,
};
use inkpress::pipeline::{PipeState, PipeStep, Pipeline, PixelFn, Step, StepId, UnitStep};
use inkpress::types::{Orientation, ProcessOptions, ReadDirection};

mod common;
use common::{BLACK, WHITE, page_image, solid_image};

/// Counts its executions and leaves the image alone.
struct CountingStep {
    id: StepId,
    runs: Arc<AtomicUsize>,
}

impl PipeStep for CountingStep {
    fn step_id(&self) -> StepId {
        self.id
    }

    fn perform_exec(&self, _state: &mut PipeState, _options: &ProcessOptions) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails on images narrower than `min_width`.
struct FailNarrow {
    min_width: u32,
}

impl PipeStep for FailNarrow {
    fn step_id(&self) -> StepId {
        StepId::MarginWrap
    }

    fn perform_exec(&self, state: &mut PipeState, _options: &ProcessOptions) -> Result<()> {
        if state.image().width() < self.min_width {
            return Err(Error::Other("too narrow".to_string()));
        }
        Ok(())
    }
}

/// Inverts every color channel.
struct Invert;

impl UnitStep for Invert {
    fn step_id(&self) -> StepId {
        StepId::AutoContrast
    }

    fn pixel_fn(&self, _options: &ProcessOptions) -> PixelFn<'_> {
        Box::new(|color: Rgba<u8>| {
            let [r, g, b, a] = color.0;
            Rgba([255 - r, 255 - g, 255 - b, a])
        })
    }
}

fn split_step() -> Step {
    Step::image(StepCropOrRotate::new(
        false,
        Orientation::Portrait,
        ReadDirection::Ltr,
    ))
}

#[test]
fn test_empty_pipeline_returns_input() -> Result<()> {
    let pipeline = Pipeline::empty();
    let source = page_image(12, 9);
    let outputs = pipeline.process(source.clone())?;
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].to_rgba8(), source.to_rgba8());
    Ok(())
}

#[test]
fn test_fan_out_skips_steps_already_applied() -> Result<()> {
    let before = Arc::new(AtomicUsize::new(0));
    let after = Arc::new(AtomicUsize::new(0));
    let pipeline = Pipeline::new(
        vec![
            Step::image(CountingStep {
                id: StepId::AutoCrop,
                runs: Arc::clone(&before),
            }),
            split_step(),
            Step::image(CountingStep {
                id: StepId::Rescale,
                runs: Arc::clone(&after),
            }),
        ],
        Arc::new(DrawFactory::passthrough()),
        ProcessOptions::default(),
    );

    // 101x50 splits into a 50x50 and a 51x50 half; the 51x50 half is landscape again
    // but must not be split a second time
    let outputs = pipeline.process(solid_image(101, 50, WHITE))?;
    let widths: Vec<u32> = outputs.iter().map(|img| img.width()).collect();
    assert_eq!(widths, vec![50, 51]);

    assert_eq!(before.load(Ordering::SeqCst), 1);
    assert_eq!(after.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn test_failing_step_only_drops_its_image() -> Result<()> {
    let pipeline = Pipeline::new(
        vec![split_step(), Step::image(FailNarrow { min_width: 51 })],
        Arc::new(DrawFactory::passthrough()),
        ProcessOptions::default(),
    );

    let outputs = pipeline.process(solid_image(101, 50, WHITE))?;
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].width(), 51);

    // Without any surviving output the first error is returned
    let result = pipeline.process(solid_image(10, 5, WHITE));
    assert!(matches!(result, Err(Error::Pipeline(_))));
    Ok(())
}

#[test]
fn test_pixel_steps_run_last_in_one_pass() -> Result<()> {
    let pipeline = Pipeline::new(
        vec![
            Step::pixel(Invert),
            Step::image(StepRescale::new(
                (4, 4),
                true,
                Arc::new(DrawFactory::passthrough()),
            )),
        ],
        Arc::new(DrawFactory::passthrough()),
        ProcessOptions::default(),
    );
    assert_eq!(pipeline.image_step_ids(), vec![StepId::Rescale]);
    assert_eq!(pipeline.pixel_step_ids(), vec![StepId::AutoContrast]);

    let outputs = pipeline.process(solid_image(2, 2, BLACK))?;
    assert_eq!(outputs[0].dimensions(), (4, 4));
    assert_eq!(outputs[0].get_pixel(3, 3), WHITE);
    Ok(())
}

#[test]
fn test_fused_grayscale_and_gamma() -> Result<()> {
    let factory = Arc::new(DrawFactory::passthrough());
    let pipeline = Pipeline::new(
        vec![
            Step::pixel(StepGrayScale::new(Arc::clone(&factory))),
            Step::pixel(StepGammaCorrection::new(2.0, Arc::clone(&factory))),
        ],
        factory,
        ProcessOptions::default(),
    );

    let outputs = pipeline.process(solid_image(3, 3, Rgba([128, 128, 128, 255])))?;
    assert_eq!(ColorModel::of(&outputs[0]), ColorModel::Gray);
    assert_eq!(outputs[0].to_luma8().get_pixel(0, 0).0[0], 64);
    Ok(())
}

#[test]
fn test_outputs_follow_device_palette() -> Result<()> {
    let factory = Arc::new(DrawFactory::new(Palette::four_grays()));
    let pipeline = Pipeline::new(
        vec![
            Step::image(StepGrayScale::new(Arc::clone(&factory))),
            split_step(),
            Step::image(StepRescale::new((30, 40), false, Arc::clone(&factory))),
            Step::image(StepAutoContrast::new(0.0, 0.0, Arc::clone(&factory))),
        ],
        Arc::clone(&factory),
        ProcessOptions::new(1.0, false),
    );

    let source = DynamicImage::ImageRgba8(
        image::RgbaImage::from_fn(80, 60, |x, y| Rgba([(x * 3) as u8, (y * 4) as u8, 90, 255])),
    );
    let outputs = pipeline.process(source)?;
    assert_eq!(outputs.len(), 2);

    let allowed = [0x00u8, 0x55, 0xaa, 0xff];
    for output in &outputs {
        assert_eq!(ColorModel::of(output), ColorModel::Gray);
        let (width, height) = output.dimensions();
        assert!(width <= 30 && height <= 40);
        assert!(output.to_luma8().pixels().all(|p| allowed.contains(&p.0[0])));
    }
    Ok(())
}
