use std::sync::Arc;

use image::Rgba;

use crate::error::Result;
use crate::imgutils::palette::{ColorModel, DrawFactory, luma};
use crate::pipeline::{PipeState, PipeStep, PixelFn, StepId, UnitStep, pixel_pass};
use crate::types::ProcessOptions;

/// Converts pages to single-channel gray.
#[derive(Debug, Clone)]
pub struct StepGrayScale {
    factory: Arc<DrawFactory>,
}

impl StepGrayScale {
    pub fn new(factory: Arc<DrawFactory>) -> Self {
        Self { factory }
    }
}

impl UnitStep for StepGrayScale {
    fn step_id(&self) -> StepId {
        StepId::GrayScale
    }

    fn output_model(&self, _input: ColorModel) -> ColorModel {
        ColorModel::Gray
    }

    fn pixel_fn(&self, _options: &ProcessOptions) -> PixelFn<'_> {
        Box::new(|color: Rgba<u8>| {
            let y = luma(color);
            Rgba([y, y, y, color.0[3]])
        })
    }
}

impl PipeStep for StepGrayScale {
    fn step_id(&self) -> StepId {
        StepId::GrayScale
    }

    fn perform_exec(&self, state: &mut PipeState, options: &ProcessOptions) -> Result<()> {
        if ColorModel::of(state.image()) == ColorModel::Gray {
            return Ok(());
        }
        let gray = pixel_pass(state.image(), &[self as &dyn UnitStep], options, &self.factory)?;
        state.set_image(gray);
        Ok(())
    }
}
