//! Palette quantization and palette-aware drawing buffers.
//!
//! Every image produced by a pipeline step is written through a [`DrawImage`] obtained from a
//! shared [`DrawFactory`], so each pixel already conforms to the device palette when the step
//! returns. There is no separate quantization pass.

use image::{ColorType, DynamicImage, GenericImageView, GrayImage, Luma, Rgba, RgbaImage};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::types::Rectangle;

/// Maps an arbitrary color onto a restricted color space.
pub trait ColorConverter: Send + Sync {
    fn convert(&self, color: Rgba<u8>) -> Rgba<u8>;
}

/// Standard luma of an RGB color, using 16-bit fixed point weights.
#[inline]
pub fn luma(color: Rgba<u8>) -> u8 {
    let [r, g, b, _] = color.0;
    ((19595 * r as u32 + 38470 * g as u32 + 7471 * b as u32 + (1 << 15)) >> 16) as u8
}

/// Converts any color to its opaque gray equivalent.
#[derive(Debug, Clone, Copy, Default)]
pub struct LumaConverter;

impl ColorConverter for LumaConverter {
    fn convert(&self, color: Rgba<u8>) -> Rgba<u8> {
        let y = luma(color);
        Rgba([y, y, y, color.0[3]])
    }
}

/// Fixed, ordered set of target colors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Rgba<u8>>,
}

impl Palette {
    pub fn new(colors: Vec<Rgba<u8>>) -> Self {
        Self { colors }
    }

    /// A palette without entries; quantizing through it is the identity.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn black_and_white() -> Self {
        Self::from_grays(&[0x00, 0xff])
    }

    /// Black, white and the two intermediate grays `0x55` and `0xaa`.
    pub fn four_grays() -> Self {
        Self::from_grays(&[0x00, 0xff, 0xaa, 0x55])
    }

    pub fn from_grays(levels: &[u8]) -> Self {
        Self::new(levels.iter().map(|&v| Rgba([v, v, v, 0xff])).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn colors(&self) -> &[Rgba<u8>] {
        &self.colors
    }

    /// Index of the entry closest to `color` by squared RGBA distance; first entry wins ties.
    pub fn index_of_nearest(&self, color: Rgba<u8>) -> Option<usize> {
        self.colors
            .iter()
            .enumerate()
            .min_by_key(|(_, entry)| squared_distance(**entry, color))
            .map(|(index, _)| index)
    }

    /// Closest palette entry, or `color` unchanged when the palette is empty.
    #[inline]
    pub fn nearest(&self, color: Rgba<u8>) -> Rgba<u8> {
        self.index_of_nearest(color)
            .map(|index| self.colors[index])
            .unwrap_or(color)
    }
}

impl ColorConverter for Palette {
    fn convert(&self, color: Rgba<u8>) -> Rgba<u8> {
        self.nearest(color)
    }
}

/// Squared euclidean distance over the four RGBA channels.
#[inline]
pub fn squared_distance(a: Rgba<u8>, b: Rgba<u8>) -> u32 {
    a.0.iter()
        .zip(b.0.iter())
        .map(|(&x, &y)| {
            let d = x as i32 - y as i32;
            (d * d) as u32
        })
        .sum()
}

/// Storage layout of a drawing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorModel {
    Gray,
    Rgba,
}

impl ColorModel {
    /// Single-channel gray sources keep single-channel storage; everything else is RGBA.
    pub fn of(image: &DynamicImage) -> Self {
        match image.color() {
            ColorType::L8 | ColorType::L16 => ColorModel::Gray,
            _ => ColorModel::Rgba,
        }
    }
}

enum Canvas {
    Gray(GrayImage),
    Rgba(RgbaImage),
}

/// Mutable pixel buffer whose writes are quantized to a palette.
pub struct DrawImage<'a> {
    palette: &'a Palette,
    canvas: Canvas,
}

impl DrawImage<'_> {
    pub fn width(&self) -> u32 {
        match &self.canvas {
            Canvas::Gray(img) => img.width(),
            Canvas::Rgba(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match &self.canvas {
            Canvas::Gray(img) => img.height(),
            Canvas::Rgba(img) => img.height(),
        }
    }

    pub fn color_model(&self) -> ColorModel {
        match &self.canvas {
            Canvas::Gray(_) => ColorModel::Gray,
            Canvas::Rgba(_) => ColorModel::Rgba,
        }
    }

    /// Writes one pixel after quantizing it. Out-of-bounds writes are ignored.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Rgba<u8>) {
        if x >= self.width() || y >= self.height() {
            return;
        }
        let color = self.palette.nearest(color);
        self.put_quantized(x, y, color);
    }

    #[inline]
    fn put_quantized(&mut self, x: u32, y: u32, color: Rgba<u8>) {
        match &mut self.canvas {
            Canvas::Gray(img) => img.put_pixel(x, y, Luma([luma(color)])),
            Canvas::Rgba(img) => img.put_pixel(x, y, color),
        }
    }

    /// Fills `rect` (clipped to the canvas) with a single quantized color.
    pub fn fill_rect(&mut self, rect: Rectangle, color: Rgba<u8>) {
        let rect = rect.intersect(&Rectangle::from_size(self.width(), self.height()));
        let color = self.palette.nearest(color);
        for y in rect.min_y..rect.max_y {
            for x in rect.min_x..rect.max_x {
                self.put_quantized(x, y, color);
            }
        }
    }

    /// Copies `source` with its top-left corner at `(offset_x, offset_y)`.
    pub fn draw_image(&mut self, source: &DynamicImage, offset_x: u32, offset_y: u32) {
        for (x, y, color) in source.pixels() {
            self.set(x + offset_x, y + offset_y, color);
        }
    }

    pub fn into_image(self) -> DynamicImage {
        match self.canvas {
            Canvas::Gray(img) => DynamicImage::ImageLuma8(img),
            Canvas::Rgba(img) => DynamicImage::ImageRgba8(img),
        }
    }
}

/// Creates palette-aware drawing buffers. One factory is shared by every step of a pipeline.
#[derive(Debug, Clone, Default)]
pub struct DrawFactory {
    palette: Palette,
}

impl DrawFactory {
    pub fn new(palette: Palette) -> Self {
        Self { palette }
    }

    /// Factory whose buffers store colors exactly as written.
    pub fn passthrough() -> Self {
        Self::default()
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Creates an empty buffer of the given model and size.
    ///
    /// # Arguments
    ///
    /// * `model` - Color model of the image being drawn from
    /// * `width` - Buffer width in pixels
    /// * `height` - Buffer height in pixels
    ///
    /// # Returns
    ///
    /// * `DrawImage` - A zeroed buffer quantizing every write to this factory's palette
    pub fn create_draw_image(&self, model: ColorModel, width: u32, height: u32) -> DrawImage<'_> {
        let canvas = match model {
            ColorModel::Gray => Canvas::Gray(GrayImage::new(width, height)),
            ColorModel::Rgba => Canvas::Rgba(RgbaImage::new(width, height)),
        };
        DrawImage {
            palette: &self.palette,
            canvas,
        }
    }

    /// Quantizes a whole RGBA buffer in parallel and stores it with the requested model.
    ///
    /// # Arguments
    ///
    /// * `model` - Storage model of the result
    /// * `buffer` - Unquantized pixels
    ///
    /// # Returns
    ///
    /// * `Ok(DynamicImage)` - Gray or RGBA image, every pixel a palette entry
    /// * `Err(Error)` - If the buffer could not be repacked
    pub fn draw_rgba(&self, model: ColorModel, mut buffer: RgbaImage) -> Result<DynamicImage> {
        let (width, height) = buffer.dimensions();
        let palette = &self.palette;
        match model {
            ColorModel::Rgba => {
                if !palette.is_empty() {
                    buffer.par_chunks_mut(4).for_each(|px| {
                        let quantized = palette.nearest(Rgba([px[0], px[1], px[2], px[3]]));
                        px.copy_from_slice(&quantized.0);
                    });
                }
                Ok(DynamicImage::ImageRgba8(buffer))
            }
            ColorModel::Gray => {
                let data: Vec<u8> = buffer
                    .par_chunks(4)
                    .map(|px| luma(palette.nearest(Rgba([px[0], px[1], px[2], px[3]]))))
                    .collect();
                GrayImage::from_raw(width, height, data)
                    .map(DynamicImage::ImageLuma8)
                    .ok_or_else(|| {
                        Error::Pipeline(format!(
                            "Gray buffer does not match {}x{} pixels",
                            width, height
                        ))
                    })
            }
        }
    }

    /// Re-draws `image` through the palette, keeping its color model.
    pub fn redraw(&self, image: &DynamicImage) -> Result<DynamicImage> {
        self.draw_rgba(ColorModel::of(image), image.to_rgba8())
    }
}
