//! Composable image pipeline with sub-image fan-out.
//!
//! A [`Pipeline`] owns two ordered step lists resolved once at construction:
//! full-image steps ([`PipeStep`]) that may replace the current image or split it into
//! sub-images, and pixel-only steps ([`UnitStep`]) that are fused into a single per-pixel
//! pass at the end of every image's traversal.
//!
//! Processing is breadth-first: a step that produces sub-images ends its parent's traversal,
//! and each sub-image is queued together with the set of steps its ancestors already ran, so
//! those steps are not applied a second time.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use image::{DynamicImage, Rgba};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::imgutils::palette::{ColorModel, DrawFactory};
use crate::types::ProcessOptions;

pub mod steps;

/// Identifier of a pipeline step, used for skip-tracking across fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepId {
    AutoCrop,
    CropOrRotate,
    MarginWrap,
    Rescale,
    GrayScale,
    GammaCorrection,
    AutoContrast,
    GaussianBlur,
}

impl StepId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::AutoCrop => "auto_crop",
            StepId::CropOrRotate => "crop_or_rotate",
            StepId::MarginWrap => "margin_wrap",
            StepId::Rescale => "rescale",
            StepId::GrayScale => "grayscale",
            StepId::GammaCorrection => "gamma_correction",
            StepId::AutoContrast => "auto_contrast",
            StepId::GaussianBlur => "gaussian_blur",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable state of one queued image.
#[derive(Debug, Clone)]
pub struct PipeState {
    image: DynamicImage,
    sub_images: Vec<DynamicImage>,
}

impl PipeState {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image,
            sub_images: Vec::new(),
        }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Replaces the current image.
    pub fn set_image(&mut self, image: DynamicImage) {
        self.image = image;
    }

    /// Appends a sub-image; the current image will produce no direct output.
    pub fn push_sub_image(&mut self, image: DynamicImage) {
        self.sub_images.push(image);
    }

    pub fn sub_images(&self) -> &[DynamicImage] {
        &self.sub_images
    }

    pub fn has_sub_images(&self) -> bool {
        !self.sub_images.is_empty()
    }

    pub fn into_parts(self) -> (DynamicImage, Vec<DynamicImage>) {
        (self.image, self.sub_images)
    }
}

/// A step that transforms (or splits) the whole image.
pub trait PipeStep: Send + Sync {
    fn step_id(&self) -> StepId;

    /// Runs the step on `state`, replacing its image or appending sub-images.
    fn perform_exec(&self, state: &mut PipeState, options: &ProcessOptions) -> Result<()>;
}

/// Per-pixel color transform produced by a [`UnitStep`] for one run.
pub type PixelFn<'a> = Box<dyn Fn(Rgba<u8>) -> Rgba<u8> + Send + Sync + 'a>;

/// A step that maps each pixel independently of its neighbours.
pub trait UnitStep: Send + Sync {
    fn step_id(&self) -> StepId;

    /// Color model of the output given the model of the input.
    fn output_model(&self, input: ColorModel) -> ColorModel {
        input
    }

    /// Resolves the run options into the transform applied to every pixel.
    fn pixel_fn(&self, options: &ProcessOptions) -> PixelFn<'_>;
}

/// A configured step tagged with its capability.
pub enum Step {
    Image(Box<dyn PipeStep>),
    Pixel(Box<dyn UnitStep>),
}

impl Step {
    pub fn image<S: PipeStep + 'static>(step: S) -> Self {
        Step::Image(Box::new(step))
    }

    pub fn pixel<S: UnitStep + 'static>(step: S) -> Self {
        Step::Pixel(Box::new(step))
    }

    pub fn step_id(&self) -> StepId {
        match self {
            Step::Image(step) => step.step_id(),
            Step::Pixel(step) => step.step_id(),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Image(step) => write!(f, "Image({})", step.step_id()),
            Step::Pixel(step) => write!(f, "Pixel({})", step.step_id()),
        }
    }
}

/// Runs `steps` as one fused per-pixel pass and draws the result through `factory`.
///
/// # Arguments
///
/// * `image` - Source image
/// * `steps` - Pixel steps, applied in order to every pixel
/// * `options` - Run options handed to each step
/// * `factory` - Drawer factory the output is quantized with
///
/// # Returns
///
/// * `Ok(DynamicImage)` - The transformed image
/// * `Err(Error)` - If the output buffer could not be built
pub fn pixel_pass(
    image: &DynamicImage,
    steps: &[&dyn UnitStep],
    options: &ProcessOptions,
    factory: &DrawFactory,
) -> Result<DynamicImage> {
    let model = steps
        .iter()
        .fold(ColorModel::of(image), |model, step| step.output_model(model));
    let transforms: Vec<PixelFn<'_>> = steps.iter().map(|step| step.pixel_fn(options)).collect();

    let mut buffer = image.to_rgba8();
    buffer.par_chunks_mut(4).for_each(|px| {
        let color = transforms
            .iter()
            .fold(Rgba([px[0], px[1], px[2], px[3]]), |color, transform| {
                transform(color)
            });
        px.copy_from_slice(&color.0);
    });
    factory.draw_rgba(model, buffer)
}

struct Job {
    image: DynamicImage,
    applied: HashSet<StepId>,
}

/// Ordered set of steps shared read-only by every worker of a conversion run.
pub struct Pipeline {
    image_steps: Vec<Box<dyn PipeStep>>,
    pixel_steps: Vec<Box<dyn UnitStep>>,
    factory: Arc<DrawFactory>,
    options: ProcessOptions,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field(
                "image_steps",
                &self.image_steps.iter().map(|s| s.step_id()).collect::<Vec<_>>(),
            )
            .field(
                "pixel_steps",
                &self.pixel_steps.iter().map(|s| s.step_id()).collect::<Vec<_>>(),
            )
            .field("options", &self.options)
            .finish()
    }
}

impl Pipeline {
    /// Splits `steps` by capability, keeping the relative order inside each group.
    pub fn new(steps: Vec<Step>, factory: Arc<DrawFactory>, options: ProcessOptions) -> Self {
        let mut image_steps = Vec::new();
        let mut pixel_steps = Vec::new();
        for step in steps {
            match step {
                Step::Image(step) => image_steps.push(step),
                Step::Pixel(step) => pixel_steps.push(step),
            }
        }
        Self {
            image_steps,
            pixel_steps,
            factory,
            options,
        }
    }

    /// Pipeline without steps; every input comes back unchanged.
    pub fn empty() -> Self {
        Self::new(
            Vec::new(),
            Arc::new(DrawFactory::passthrough()),
            ProcessOptions::default(),
        )
    }

    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    pub fn factory(&self) -> &Arc<DrawFactory> {
        &self.factory
    }

    /// Full-image step identifiers in execution order.
    pub fn image_step_ids(&self) -> Vec<StepId> {
        self.image_steps.iter().map(|s| s.step_id()).collect()
    }

    /// Pixel step identifiers in execution order.
    pub fn pixel_step_ids(&self) -> Vec<StepId> {
        self.pixel_steps.iter().map(|s| s.step_id()).collect()
    }

    /// Runs `image` through every step, expanding fan-out breadth-first.
    ///
    /// A failing step only drops the image it was working on: queued siblings still run and
    /// outputs already produced are kept.
    ///
    /// # Arguments
    ///
    /// * `image` - Decoded source page
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<DynamicImage>)` - One image per leaf of the fan-out, in queue order
    /// * `Err(Error)` - The first step error, when no output could be produced at all
    pub fn process(&self, image: DynamicImage) -> Result<Vec<DynamicImage>> {
        let mut queue = VecDeque::from([Job {
            image,
            applied: HashSet::new(),
        }]);
        let mut outputs = Vec::new();
        let mut first_error = None;

        while let Some(job) = queue.pop_front() {
            match self.run_job(job, &mut queue) {
                Ok(Some(output)) => outputs.push(output),
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Pipeline step failed, dropping image: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if outputs.is_empty() => Err(e),
            _ => Ok(outputs),
        }
    }

    fn run_job(&self, job: Job, queue: &mut VecDeque<Job>) -> Result<Option<DynamicImage>> {
        let Job { image, mut applied } = job;
        let inherited = applied.clone();
        let mut state = PipeState::new(image);

        for step in &self.image_steps {
            let id = step.step_id();
            if inherited.contains(&id) {
                log::trace!("Skipping step '{}' already applied upstream", id);
                continue;
            }
            step.perform_exec(&mut state, &self.options)
                .map_err(|e| Error::Pipeline(format!("step '{}' failed: {}", id, e)))?;
            applied.insert(id);

            if state.has_sub_images() {
                let (_, sub_images) = state.into_parts();
                log::debug!("Step '{}' split the image into {}", id, sub_images.len());
                for sub_image in sub_images {
                    queue.push_back(Job {
                        image: sub_image,
                        applied: applied.clone(),
                    });
                }
                return Ok(None);
            }
        }

        let (image, _) = state.into_parts();
        if self.pixel_steps.is_empty() {
            return Ok(Some(image));
        }
        let steps: Vec<&dyn UnitStep> = self.pixel_steps.iter().map(|s| s.as_ref()).collect();
        pixel_pass(&image, &steps, &self.options, &self.factory).map(Some)
    }
}
