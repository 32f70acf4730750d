use std::sync::Arc;

use image::{GenericImageView, Rgba};

use crate::error::Result;
use crate::imgutils::geometry::border_dominant_colors;
use crate::imgutils::palette::{ColorModel, DrawFactory};
use crate::pipeline::{PipeState, PipeStep, StepId};
use crate::types::{Margins, ProcessOptions, Rectangle};

/// Pads a page so its aspect ratio matches the device screen.
///
/// Exactly one axis is padded. The padding of each side is filled with the dominant color of
/// the matching border strip of the page, so scanned paper tones continue into the margin.
#[derive(Debug, Clone)]
pub struct StepMarginWrap {
    width: u32,
    height: u32,
    default_color: Rgba<u8>,
    factory: Arc<DrawFactory>,
}

impl StepMarginWrap {
    /// Thickness of the sampled border strips, in percent of the page side.
    pub const SAMPLE_PCT: u32 = 5;

    pub fn new(resolution: (u32, u32), factory: Arc<DrawFactory>) -> Self {
        Self {
            width: resolution.0,
            height: resolution.1,
            default_color: Rgba([0xff, 0xff, 0xff, 0xff]),
            factory,
        }
    }

    /// Color used for sides whose border strip yields no sample.
    pub fn with_default_color(mut self, color: Rgba<u8>) -> Self {
        self.default_color = color;
        self
    }

    /// Padding `(width, height)` needed for a `width x height` page; one of them is always zero.
    pub fn padding(&self, width: u32, height: u32) -> (u32, u32) {
        if self.width == 0 || self.height == 0 || width == 0 || height == 0 {
            return (0, 0);
        }
        let desired = self.width as f64 / self.height as f64;
        let actual = width as f64 / height as f64;
        if (actual - desired).abs() < f64::EPSILON {
            (0, 0)
        } else if actual > desired {
            (0, ((width as f64 / desired) as u32).saturating_sub(height))
        } else {
            (((height as f64 * desired) as u32).saturating_sub(width), 0)
        }
    }
}

impl PipeStep for StepMarginWrap {
    fn step_id(&self) -> StepId {
        StepId::MarginWrap
    }

    fn perform_exec(&self, state: &mut PipeState, _options: &ProcessOptions) -> Result<()> {
        let (width, height) = state.image().dimensions();
        let (pad_width, pad_height) = self.padding(width, height);
        if pad_width == 0 && pad_height == 0 {
            return Ok(());
        }

        let mut colors = border_dominant_colors(state.image(), Self::SAMPLE_PCT);
        colors.fill_empty(Rgba([0, 0, 0, 0]), self.default_color);

        let (full_width, full_height) = (width + pad_width, height + pad_height);
        let offset = Margins {
            top: pad_height / 2,
            bottom: pad_height - pad_height / 2,
            left: pad_width / 2,
            right: pad_width - pad_width / 2,
        };

        let mut canvas =
            self.factory
                .create_draw_image(ColorModel::of(state.image()), full_width, full_height);
        canvas.fill_rect(Rectangle::new(0, 0, full_width, offset.top), colors.top);
        canvas.fill_rect(
            Rectangle::new(0, full_height - offset.bottom, full_width, full_height),
            colors.bottom,
        );
        canvas.fill_rect(Rectangle::new(0, 0, offset.left, full_height), colors.left);
        canvas.fill_rect(
            Rectangle::new(full_width - offset.right, 0, full_width, full_height),
            colors.right,
        );
        canvas.draw_image(state.image(), offset.left, offset.top);

        state.set_image(canvas.into_image());
        Ok(())
    }
}
