use std::sync::Arc;

use image::GenericImageView;

use crate::error::Result;
use crate::imgutils::convolution::GaussianKernel;
use crate::imgutils::geometry::{CropMode, crop_box, crop_image, margin_box};
use crate::imgutils::palette::{DrawFactory, Palette};
use crate::pipeline::{PipeState, PipeStep, StepId};
use crate::types::{ProcessOptions, Rectangle};

/// Trims uniform page borders.
///
/// Detection runs on a blurred copy so halftone dots and scan noise in the border do not
/// count as content; the crop itself is applied to the unblurred image.
#[derive(Debug, Clone)]
pub struct StepAutoCrop {
    kernel: GaussianKernel,
    crop_palette: Palette,
    factory: Arc<DrawFactory>,
}

impl StepAutoCrop {
    pub const BLUR_RADIUS: u32 = 5;
    /// Share of the content box kept as a margin around it.
    pub const MARGIN_PCT: f64 = 1.6e-2;
    /// A crop is rejected unless both sides keep at least this percentage.
    pub const MIN_KEEP_PCT: u32 = 80;

    /// # Arguments
    ///
    /// * `crop_palette` - Palette pixels are snapped to before background detection
    /// * `factory` - Drawer factory shared by the pipeline
    pub fn new(crop_palette: Palette, factory: Arc<DrawFactory>) -> Self {
        Self {
            kernel: GaussianKernel::new(Self::BLUR_RADIUS),
            crop_palette,
            factory,
        }
    }

    /// Rectangle the step would crop to, or `None` when the image should stay untouched.
    pub fn detect(&self, image: &image::DynamicImage) -> Result<Option<Rectangle>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(None);
        }
        let bounds = Rectangle::from_size(width, height);

        let blurred = self.kernel.convolve(image, &self.factory)?;
        let content = crop_box(&blurred, &self.crop_palette, CropMode::MinimumColor);
        if content == bounds || content.is_empty() {
            return Ok(None);
        }

        let keeps_width = content.width() * 100 / width >= Self::MIN_KEEP_PCT;
        let keeps_height = content.height() * 100 / height >= Self::MIN_KEEP_PCT;
        if !(keeps_width && keeps_height) {
            log::debug!(
                "Rejected crop {:?} of {}x{} page, too much content would be lost",
                content,
                width,
                height
            );
            return Ok(None);
        }

        let grown = margin_box(content, Self::MARGIN_PCT).intersect(&bounds);
        if grown == bounds {
            return Ok(None);
        }
        Ok(Some(grown))
    }
}

impl PipeStep for StepAutoCrop {
    fn step_id(&self) -> StepId {
        StepId::AutoCrop
    }

    fn perform_exec(&self, state: &mut PipeState, _options: &ProcessOptions) -> Result<()> {
        if let Some(rect) = self.detect(state.image())? {
            let cropped = crop_image(state.image(), rect);
            state.set_image(cropped);
        }
        Ok(())
    }
}
