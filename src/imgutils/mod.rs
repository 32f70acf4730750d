//! Image engines shared by the pipeline steps.
//!
//! - [`palette`]: palette quantization and the palette-aware drawing buffers
//! - [`histogram`]: per-channel histograms, cutoff and min/max search
//! - [`geometry`]: bounding boxes, splitting, rotation and dominant colors
//! - [`convolution`]: Gaussian kernels and blurring

pub mod convolution;
pub mod geometry;
pub mod histogram;
pub mod palette;

pub use convolution::GaussianKernel;
pub use geometry::{
    CropMode, SplitHalves, border_dominant_colors, crop_box, crop_image, dominant_color_in_region,
    half_split, margin_box, rotate_image,
};
pub use histogram::{ChannelHistogram, ImageHistogram, calculate_histogram};
pub use palette::{ColorConverter, ColorModel, DrawFactory, DrawImage, LumaConverter, Palette};
