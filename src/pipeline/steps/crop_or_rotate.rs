use image::GenericImageView;

use crate::error::Result;
use crate::imgutils::geometry::{crop_image, half_split, rotate_image};
use crate::pipeline::{PipeState, PipeStep, StepId};
use crate::types::{Orientation, ProcessOptions, ReadDirection, Rectangle, Rotation};

/// Makes the page orientation match the device, either by rotating or by splitting spreads.
#[derive(Debug, Clone, Copy)]
pub struct StepCropOrRotate {
    rotate: bool,
    target: Orientation,
    direction: ReadDirection,
}

impl StepCropOrRotate {
    /// # Arguments
    ///
    /// * `rotate` - Rotate mismatched pages by 90 degrees instead of splitting them
    /// * `target` - Orientation of the device screen
    /// * `direction` - Reading direction, which decides the order of split halves
    pub fn new(rotate: bool, target: Orientation, direction: ReadDirection) -> Self {
        Self {
            rotate,
            target,
            direction,
        }
    }
}

impl PipeStep for StepCropOrRotate {
    fn step_id(&self) -> StepId {
        StepId::CropOrRotate
    }

    fn perform_exec(&self, state: &mut PipeState, _options: &ProcessOptions) -> Result<()> {
        let (width, height) = state.image().dimensions();
        if Orientation::from_dimensions(width, height) == self.target {
            return Ok(());
        }

        if self.rotate {
            let rotated = rotate_image(state.image(), Rotation::Deg90);
            state.set_image(rotated);
            return Ok(());
        }

        let halves = half_split(Rectangle::from_size(width, height));
        for half in halves.in_reading_order(self.direction) {
            let sub_image = crop_image(state.image(), half);
            state.push_sub_image(sub_image);
        }
        Ok(())
    }
}
