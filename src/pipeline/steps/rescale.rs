use std::sync::Arc;

use image::GenericImageView;
use image::imageops::FilterType;

use crate::error::Result;
use crate::imgutils::palette::DrawFactory;
use crate::pipeline::{PipeState, PipeStep, StepId};
use crate::types::ProcessOptions;

/// Scales pages to the device resolution.
#[derive(Debug, Clone)]
pub struct StepRescale {
    width: u32,
    height: u32,
    allow_stretch: bool,
    pixel_art: bool,
    factory: Arc<DrawFactory>,
}

impl StepRescale {
    /// # Arguments
    ///
    /// * `resolution` - Target `(width, height)`; `(0, 0)` disables the step
    /// * `allow_stretch` - Scale to the exact resolution even if the aspect ratio changes
    /// * `factory` - Drawer factory shared by the pipeline
    pub fn new(resolution: (u32, u32), allow_stretch: bool, factory: Arc<DrawFactory>) -> Self {
        Self {
            width: resolution.0,
            height: resolution.1,
            allow_stretch,
            pixel_art: false,
            factory,
        }
    }

    /// Nearest-neighbour sampling instead of bilinear, for sharp pixel edges.
    pub fn with_pixel_art(mut self, pixel_art: bool) -> Self {
        self.pixel_art = pixel_art;
        self
    }

    /// Output size for a `width x height` source.
    ///
    /// Without stretching this is the largest size with the source aspect ratio that fits in
    /// the target on both axes. A target with a zero side keeps the source size.
    pub fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        if self.width == 0 || self.height == 0 {
            return (width, height);
        }
        if self.allow_stretch || width == 0 || height == 0 {
            return (self.width, self.height);
        }
        let factor =
            (self.width as f64 / width as f64).min(self.height as f64 / height as f64);
        let fit_width = ((width as f64 * factor).round() as u32).clamp(1, self.width);
        let fit_height = ((height as f64 * factor).round() as u32).clamp(1, self.height);
        (fit_width, fit_height)
    }

    fn filter(&self) -> FilterType {
        if self.pixel_art {
            FilterType::Nearest
        } else {
            FilterType::Triangle
        }
    }
}

impl PipeStep for StepRescale {
    fn step_id(&self) -> StepId {
        StepId::Rescale
    }

    fn perform_exec(&self, state: &mut PipeState, _options: &ProcessOptions) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Ok(());
        }
        let (width, height) = state.image().dimensions();
        if width == 0 || height == 0 {
            return Ok(());
        }
        let (target_width, target_height) = self.target_size(width, height);
        if (target_width, target_height) == (width, height) {
            return Ok(());
        }

        let resized = state
            .image()
            .resize_exact(target_width, target_height, self.filter());
        state.set_image(self.factory.redraw(&resized)?);
        Ok(())
    }
}
