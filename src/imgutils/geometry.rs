//! Bounding boxes, splitting, rotation and dominant-color sampling.

use std::collections::HashSet;

use image::{DynamicImage, GenericImageView, Rgba};
use rayon::prelude::*;

use crate::imgutils::palette::{ColorConverter, Palette, luma};
use crate::types::{Margins, Orientation, ReadDirection, Rectangle, Rotation};

/// How [`crop_box`] decides which pixels belong to the page background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropMode {
    /// Fully transparent pixels are background
    Transparent,
    /// Pixels sharing the lightest converted tone of the image are background
    MinimumColor,
}

/// Ordinal lightness of a color: luma first, packed RGB as tie-break.
#[inline]
fn lightness_key(color: Rgba<u8>) -> u32 {
    let [r, g, b, _] = color.0;
    ((luma(color) as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Finds the content rectangle of `image` by trimming uniform background borders.
///
/// In [`CropMode::MinimumColor`] every pixel is mapped through `converter` and the lightest
/// resulting tone is taken as the background. Pages whose foreground is brighter than their
/// border are therefore not cropped correctly.
///
/// # Arguments
///
/// * `image` - Image to analyze
/// * `converter` - Color reduction applied before classification (ignored for `Transparent`)
/// * `mode` - Background classification rule
///
/// # Returns
///
/// * `Rectangle` - Bounds without the fully-background outer rows and columns. The full image
///   bounds when nothing can be trimmed or when every pixel is background.
pub fn crop_box(image: &DynamicImage, converter: &dyn ColorConverter, mode: CropMode) -> Rectangle {
    let (width, height) = image.dimensions();
    let full = Rectangle::from_size(width, height);
    if width == 0 || height == 0 {
        return full;
    }

    let rgba = image.to_rgba8();
    let background: Vec<bool> = match mode {
        CropMode::Transparent => rgba.par_chunks(4).map(|px| px[3] == 0).collect(),
        CropMode::MinimumColor => {
            let keys: Vec<u32> = rgba
                .par_chunks(4)
                .map(|px| lightness_key(converter.convert(Rgba([px[0], px[1], px[2], px[3]]))))
                .collect();
            let Some(lightest) = keys.par_iter().copied().max() else {
                return full;
            };
            keys.par_iter().map(|&key| key == lightest).collect()
        }
    };

    let mut row_counts = vec![0u32; height as usize];
    let mut column_counts = vec![0u32; width as usize];
    for (index, _) in background.iter().enumerate().filter(|(_, bg)| **bg) {
        row_counts[index / width as usize] += 1;
        column_counts[index % width as usize] += 1;
    }

    let Some((min_x, max_x)) = trim_axis(&column_counts, height) else {
        return full;
    };
    let Some((min_y, max_y)) = trim_axis(&row_counts, width) else {
        return full;
    };
    Rectangle::new(min_x, min_y, max_x, max_y)
}

/// Moves both ends of an axis inward past lines made only of background.
///
/// Returns `None` when every line is background.
fn trim_axis(counts: &[u32], full_extent: u32) -> Option<(u32, u32)> {
    let start = counts.iter().position(|&c| c != full_extent)?;
    let end = counts.iter().rposition(|&c| c != full_extent)? + 1;
    Some((start as u32, end as u32))
}

/// Grows `rect` by `pct` of its own width on X and of its own height on Y, on both sides.
///
/// The result never goes below zero; callers clamp the far edges to the image bounds.
pub fn margin_box(rect: Rectangle, pct: f64) -> Rectangle {
    let dx = (rect.width() as f64 * pct) as u32;
    let dy = (rect.height() as f64 * pct) as u32;
    Rectangle::new(
        rect.min_x.saturating_sub(dx),
        rect.min_y.saturating_sub(dy),
        rect.max_x.saturating_add(dx),
        rect.max_y.saturating_add(dy),
    )
}

/// Two halves of a bisected rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitHalves {
    LeftRight { left: Rectangle, right: Rectangle },
    TopBottom { top: Rectangle, bottom: Rectangle },
}

impl SplitHalves {
    /// Halves in spatial order: left then right, or top then bottom.
    pub fn halves(&self) -> [Rectangle; 2] {
        match *self {
            SplitHalves::LeftRight { left, right } => [left, right],
            SplitHalves::TopBottom { top, bottom } => [top, bottom],
        }
    }

    /// Halves in the order a reader meets them; right-to-left books start with the right half.
    pub fn in_reading_order(&self, direction: ReadDirection) -> [Rectangle; 2] {
        match (*self, direction) {
            (SplitHalves::LeftRight { left, right }, ReadDirection::Rtl) => [right, left],
            _ => self.halves(),
        }
    }
}

/// Bisects `rect` along its long axis; the second half takes the odd pixel.
pub fn half_split(rect: Rectangle) -> SplitHalves {
    match rect.orientation() {
        Orientation::Landscape => {
            let mid = rect.min_x + rect.width() / 2;
            SplitHalves::LeftRight {
                left: Rectangle::new(rect.min_x, rect.min_y, mid, rect.max_y),
                right: Rectangle::new(mid, rect.min_y, rect.max_x, rect.max_y),
            }
        }
        Orientation::Portrait => {
            let mid = rect.min_y + rect.height() / 2;
            SplitHalves::TopBottom {
                top: Rectangle::new(rect.min_x, rect.min_y, rect.max_x, mid),
                bottom: Rectangle::new(rect.min_x, mid, rect.max_x, rect.max_y),
            }
        }
    }
}

/// Rotates clockwise. 90 and 270 degrees swap width and height.
pub fn rotate_image(image: &DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::Deg90 => image.rotate90(),
        Rotation::Deg180 => image.rotate180(),
        Rotation::Deg270 => image.rotate270(),
    }
}

/// Copies the part of `image` covered by `rect` (clipped to the image).
pub fn crop_image(image: &DynamicImage, rect: Rectangle) -> DynamicImage {
    let (width, height) = image.dimensions();
    let rect = rect.intersect(&Rectangle::from_size(width, height));
    image.crop_imm(rect.min_x, rect.min_y, rect.width(), rect.height())
}

/// Representative color of `rect` in `image`, ignoring fully transparent pixels.
///
/// # Arguments
///
/// * `image` - Image to sample
/// * `rect` - Region to sample, clipped to the image
/// * `take_average` - Return the channel mean instead of the sampled color closest to it
///
/// # Returns
///
/// * `Rgba<u8>` - The dominant color, or `Rgba([0, 0, 0, 0])` for an empty or transparent region
pub fn dominant_color_in_region(
    image: &DynamicImage,
    rect: Rectangle,
    take_average: bool,
) -> Rgba<u8> {
    let (width, height) = image.dimensions();
    let rect = rect.intersect(&Rectangle::from_size(width, height));

    let mut sums = [0u64; 4];
    let mut count = 0u64;
    let mut seen = HashSet::new();
    let mut distinct = Vec::new();
    for y in rect.min_y..rect.max_y {
        for x in rect.min_x..rect.max_x {
            let color = image.get_pixel(x, y);
            if color.0[3] == 0 {
                continue;
            }
            for (sum, &channel) in sums.iter_mut().zip(color.0.iter()) {
                *sum += channel as u64;
            }
            count += 1;
            if seen.insert(color.0) {
                distinct.push(color);
            }
        }
    }

    if count == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mean = Rgba(sums.map(|sum| (sum / count) as u8));
    if take_average {
        return mean;
    }
    Palette::new(distinct).nearest(mean)
}

/// Dominant colors of the four border strips, each `pct` percent (at least one pixel) thick.
pub fn border_dominant_colors(image: &DynamicImage, pct: u32) -> Margins<Rgba<u8>> {
    let (width, height) = image.dimensions();
    let thick_x = (width * pct / 100).max(1).min(width);
    let thick_y = (height * pct / 100).max(1).min(height);

    let strips = Margins {
        top: Rectangle::new(0, 0, width, thick_y),
        bottom: Rectangle::new(0, height - thick_y, width, height),
        left: Rectangle::new(0, 0, thick_x, height),
        right: Rectangle::new(width - thick_x, 0, width, height),
    };
    strips.map(|strip| dominant_color_in_region(image, strip, false))
}
