use std::sync::Arc;

use image::Rgba;

use crate::error::Result;
use crate::imgutils::palette::DrawFactory;
use crate::pipeline::{PipeState, PipeStep, PixelFn, StepId, UnitStep, pixel_pass};
use crate::types::ProcessOptions;

/// Lookup table for `255 * (v / 255) ^ gamma`, rounded and clamped.
pub fn gamma_lut(gamma: f64) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        let corrected = 255.0 * (value as f64 / 255.0).powf(gamma);
        *slot = corrected.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Applies a gamma curve to the color channels; alpha is left untouched.
#[derive(Debug, Clone)]
pub struct StepGammaCorrection {
    gamma: f64,
    lut: [u8; 256],
    factory: Arc<DrawFactory>,
}

impl StepGammaCorrection {
    /// Precomputes the table for `gamma`; `1.0` is the identity.
    pub fn new(gamma: f64, factory: Arc<DrawFactory>) -> Self {
        Self {
            gamma,
            lut: gamma_lut(gamma),
            factory,
        }
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn lut(&self) -> &[u8; 256] {
        &self.lut
    }
}

fn apply_lut(lut: &[u8; 256], color: Rgba<u8>) -> Rgba<u8> {
    let [r, g, b, a] = color.0;
    Rgba([lut[r as usize], lut[g as usize], lut[b as usize], a])
}

impl UnitStep for StepGammaCorrection {
    fn step_id(&self) -> StepId {
        StepId::GammaCorrection
    }

    fn pixel_fn(&self, options: &ProcessOptions) -> PixelFn<'_> {
        if options.gamma_requested() && options.gamma != self.gamma {
            let lut = gamma_lut(options.gamma);
            return Box::new(move |color| apply_lut(&lut, color));
        }
        Box::new(move |color| apply_lut(&self.lut, color))
    }
}

impl PipeStep for StepGammaCorrection {
    fn step_id(&self) -> StepId {
        StepId::GammaCorrection
    }

    fn perform_exec(&self, state: &mut PipeState, options: &ProcessOptions) -> Result<()> {
        let corrected = pixel_pass(state.image(), &[self as &dyn UnitStep], options, &self.factory)?;
        state.set_image(corrected);
        Ok(())
    }
}
