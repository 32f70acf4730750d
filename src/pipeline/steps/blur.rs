use std::sync::Arc;

use crate::error::Result;
use crate::imgutils::convolution::GaussianKernel;
use crate::imgutils::palette::DrawFactory;
use crate::pipeline::{PipeState, PipeStep, StepId};
use crate::types::ProcessOptions;

/// Gaussian blur as a standalone pipeline step.
#[derive(Debug, Clone)]
pub struct StepGaussianBlur {
    kernel: GaussianKernel,
    factory: Arc<DrawFactory>,
}

impl StepGaussianBlur {
    pub fn new(radius: u32, factory: Arc<DrawFactory>) -> Self {
        Self {
            kernel: GaussianKernel::new(radius),
            factory,
        }
    }
}

impl PipeStep for StepGaussianBlur {
    fn step_id(&self) -> StepId {
        StepId::GaussianBlur
    }

    fn perform_exec(&self, state: &mut PipeState, _options: &ProcessOptions) -> Result<()> {
        let blurred = self.kernel.convolve(state.image(), &self.factory)?;
        state.set_image(blurred);
        Ok(())
    }
}
