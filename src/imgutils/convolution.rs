//! Gaussian kernel construction and 2D convolution.

use std::f64::consts::PI;

use image::{DynamicImage, GenericImageView, RgbaImage};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::imgutils::palette::{ColorModel, DrawFactory};

/// Square Gaussian kernel of side `2 * radius + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    radius: u32,
    sigma: f64,
    weights: Vec<f64>,
    weight_sum: f64,
    profile: Vec<f64>,
}

impl GaussianKernel {
    /// Builds the kernel with `sigma = max(radius / 2, 1)`.
    pub fn new(radius: u32) -> Self {
        let sigma = (radius as f64 / 2.0).max(1.0);
        let two_sigma_sq = 2.0 * sigma * sigma;
        let r = radius as i64;

        let mut weights = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
        let mut weight_sum = 0.0;
        for dy in -r..=r {
            for dx in -r..=r {
                let weight = (-((dx * dx + dy * dy) as f64) / two_sigma_sq).exp() / (PI * two_sigma_sq);
                weight_sum += weight;
                weights.push(weight);
            }
        }

        let profile = (-r..=r)
            .map(|d| (-((d * d) as f64) / two_sigma_sq).exp())
            .collect();

        Self {
            radius,
            sigma,
            weights,
            weight_sum,
            profile,
        }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Side length of the kernel matrix.
    pub fn size(&self) -> usize {
        2 * self.radius as usize + 1
    }

    /// Sum of every weight of the matrix.
    pub fn weight_sum(&self) -> f64 {
        self.weight_sum
    }

    /// Raw weight at offset `(dx, dy)` from the center, `None` outside the kernel.
    pub fn weight(&self, dx: i32, dy: i32) -> Option<f64> {
        let r = self.radius as i32;
        if dx.abs() > r || dy.abs() > r {
            return None;
        }
        let index = (dy + r) as usize * self.size() + (dx + r) as usize;
        self.weights.get(index).copied()
    }

    /// Weight at `(dx, dy)` divided by the kernel's total weight.
    pub fn normalized_weight(&self, dx: i32, dy: i32) -> Option<f64> {
        self.weight(dx, dy).map(|w| w / self.weight_sum)
    }

    /// Convolves every RGBA channel of `image` with the kernel and draws the result.
    ///
    /// Taps falling outside the image are skipped and the remaining taps are renormalized
    /// against their own weight, so borders keep their brightness. The Gaussian is separable,
    /// which makes a horizontal pass followed by a vertical pass equal to the 2D sum.
    ///
    /// # Arguments
    ///
    /// * `image` - Source image, left untouched
    /// * `factory` - Drawer factory the blurred pixels are written through
    ///
    /// # Returns
    ///
    /// * `Ok(DynamicImage)` - Blurred image with the source's color model
    /// * `Err(Error)` - If an intermediate buffer could not be built
    pub fn convolve(&self, image: &DynamicImage, factory: &DrawFactory) -> Result<DynamicImage> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(image.clone());
        }

        let source = image.to_rgba8();
        let stride = width as usize * 4;
        let r = self.radius as i64;

        let mut horizontal = vec![0f32; stride * height as usize];
        horizontal
            .par_chunks_mut(stride)
            .zip(source.par_chunks(stride))
            .for_each(|(out_row, src_row)| {
                for x in 0..width as i64 {
                    let mut acc = [0f64; 4];
                    let mut norm = 0f64;
                    for k in -r..=r {
                        let sx = x - k;
                        if sx < 0 || sx >= width as i64 {
                            continue;
                        }
                        let weight = self.profile[(k + r) as usize];
                        let base = sx as usize * 4;
                        for (c, value) in acc.iter_mut().enumerate() {
                            *value += weight * src_row[base + c] as f64;
                        }
                        norm += weight;
                    }
                    let base = x as usize * 4;
                    for (c, value) in acc.iter().enumerate() {
                        out_row[base + c] = (value / norm) as f32;
                    }
                }
            });

        let mut output = vec![0u8; stride * height as usize];
        output
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, out_row)| {
                let y = y as i64;
                for x in 0..width as usize {
                    let mut acc = [0f64; 4];
                    let mut norm = 0f64;
                    for k in -r..=r {
                        let sy = y - k;
                        if sy < 0 || sy >= height as i64 {
                            continue;
                        }
                        let weight = self.profile[(k + r) as usize];
                        let base = sy as usize * stride + x * 4;
                        for (c, value) in acc.iter_mut().enumerate() {
                            *value += weight * horizontal[base + c] as f64;
                        }
                        norm += weight;
                    }
                    for (c, value) in acc.iter().enumerate() {
                        out_row[x * 4 + c] = (value / norm).round().clamp(0.0, 255.0) as u8;
                    }
                }
            });

        let blurred = RgbaImage::from_raw(width, height, output).ok_or_else(|| {
            Error::Pipeline(format!(
                "Blur buffer does not match {}x{} pixels",
                width, height
            ))
        })?;
        factory.draw_rgba(ColorModel::of(image), blurred)
    }
}
