use std::sync::Arc;

use rayon::prelude::*;

use crate::error::Result;
use crate::imgutils::histogram::calculate_histogram;
use crate::imgutils::palette::{ColorModel, DrawFactory};
use crate::pipeline::steps::StepGammaCorrection;
use crate::pipeline::{PipeState, PipeStep, StepId};
use crate::types::ProcessOptions;

/// Stretches every color channel to the full `0..=255` range.
#[derive(Debug, Clone)]
pub struct StepAutoContrast {
    cutoff_low: f64,
    cutoff_high: f64,
    gamma: StepGammaCorrection,
    factory: Arc<DrawFactory>,
}

impl StepAutoContrast {
    /// # Arguments
    ///
    /// * `cutoff_low` - Percentage of darkest pixels ignored when searching the channel minimum
    /// * `cutoff_high` - Percentage of brightest pixels ignored when searching the channel maximum
    /// * `factory` - Drawer factory shared by the pipeline
    pub fn new(cutoff_low: f64, cutoff_high: f64, factory: Arc<DrawFactory>) -> Self {
        Self {
            cutoff_low,
            cutoff_high,
            gamma: StepGammaCorrection::new(1.0, Arc::clone(&factory)),
            factory,
        }
    }

    /// Per-channel stretch tables for `(min, max)` bounds; `None` bounds give the identity.
    pub fn stretch_luts(bounds: [Option<(u8, u8)>; 3]) -> [[u8; 256]; 3] {
        bounds.map(|bound| {
            let mut lut = [0u8; 256];
            for (value, slot) in lut.iter_mut().enumerate() {
                *slot = match bound {
                    Some((min, max)) if min < max => {
                        let scale = 255.0 / (max - min) as f64;
                        let offset = -(min as f64) * scale;
                        (value as f64 * scale + offset).round().clamp(0.0, 255.0) as u8
                    }
                    _ => value as u8,
                };
            }
            lut
        })
    }
}

impl PipeStep for StepAutoContrast {
    fn step_id(&self) -> StepId {
        StepId::AutoContrast
    }

    fn perform_exec(&self, state: &mut PipeState, options: &ProcessOptions) -> Result<()> {
        if options.gamma_requested() {
            self.gamma.perform_exec(state, options)?;
        }

        let mut histogram = calculate_histogram(state.image());
        if self.cutoff_low > 0.0 || self.cutoff_high > 0.0 {
            histogram = histogram.apply_cutoff(self.cutoff_low, self.cutoff_high);
        }
        let luts = Self::stretch_luts(histogram.hilo());

        let mut buffer = state.image().to_rgba8();
        buffer.par_chunks_mut(4).for_each(|px| {
            for channel in 0..3 {
                px[channel] = luts[channel][px[channel] as usize];
            }
        });
        let stretched = self
            .factory
            .draw_rgba(ColorModel::of(state.image()), buffer)?;
        state.set_image(stretched);
        Ok(())
    }
}
