//! Per-channel intensity histograms, percentile cutoff and min/max search.

use image::{DynamicImage, GenericImageView};
use rayon::prelude::*;

/// Number of buckets per channel, one per 8-bit intensity.
pub const BUCKETS: usize = 256;

/// Pixel counts for a single color channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelHistogram(pub [u32; BUCKETS]);

impl Default for ChannelHistogram {
    fn default() -> Self {
        Self([0; BUCKETS])
    }
}

impl ChannelHistogram {
    /// Builds a channel histogram from `(bucket, count)` pairs; every other bucket is zero.
    pub fn from_counts(counts: &[(u8, u32)]) -> Self {
        let mut histogram = Self::default();
        for &(bucket, count) in counts {
            histogram.0[bucket as usize] = count;
        }
        histogram
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|&c| c as u64).sum()
    }

    /// Trims `low_pct` percent of the pixels from the dark end and `high_pct` from the bright end.
    ///
    /// Both ends are walked inside the same loop. Buckets fully covered by the remaining budget
    /// are zeroed; the bucket straddling the budget is partially decremented.
    ///
    /// # Arguments
    ///
    /// * `low_pct` - Percentage (0-100) of pixels to drop from the dark end
    /// * `high_pct` - Percentage (0-100) of pixels to drop from the bright end
    ///
    /// # Returns
    ///
    /// * `ChannelHistogram` - The trimmed copy
    pub fn apply_cutoff(&self, low_pct: f64, high_pct: f64) -> ChannelHistogram {
        let total = self.total() as f64;
        let mut low_budget = ((total * low_pct.max(0.0)) as u64) / 100;
        let mut high_budget = ((total * high_pct.max(0.0)) as u64) / 100;

        let mut result = *self;
        for step in 0..BUCKETS {
            if low_budget == 0 && high_budget == 0 {
                break;
            }
            cut_bucket(&mut result.0[step], &mut low_budget);
            cut_bucket(&mut result.0[BUCKETS - 1 - step], &mut high_budget);
        }
        result
    }

    /// Lowest and highest non-empty bucket, or `None` when every bucket is empty.
    ///
    /// The two ends are searched alternately until both settle or they collide.
    pub fn hilo(&self) -> Option<(u8, u8)> {
        let mut min = 0usize;
        let mut max = BUCKETS - 1;
        let mut min_done = false;
        let mut max_done = false;

        while !(min_done && max_done) {
            if !min_done {
                if self.0[min] != 0 || min >= max {
                    min_done = true;
                } else {
                    min += 1;
                }
            }
            if !max_done {
                if self.0[max] != 0 || max <= min {
                    max_done = true;
                } else {
                    max -= 1;
                }
            }
        }

        if self.0[min] == 0 && self.0[max] == 0 {
            return None;
        }
        Some((min as u8, max as u8))
    }
}

/// Removes as much of `budget` as `bucket` can absorb.
#[inline]
fn cut_bucket(bucket: &mut u32, budget: &mut u64) {
    if *budget == 0 {
        return;
    }
    let count = *bucket as u64;
    if *budget >= count {
        *budget -= count;
        *bucket = 0;
    } else {
        *bucket = (count - *budget) as u32;
        *budget = 0;
    }
}

/// Histograms of the R, G and B channels of one image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageHistogram(pub [ChannelHistogram; 3]);

impl ImageHistogram {
    pub fn channel(&self, index: usize) -> &ChannelHistogram {
        &self.0[index]
    }

    /// Applies the same cutoff to every channel.
    pub fn apply_cutoff(&self, low_pct: f64, high_pct: f64) -> ImageHistogram {
        ImageHistogram(self.0.map(|channel| channel.apply_cutoff(low_pct, high_pct)))
    }

    /// Per-channel `(min, max)`. Empty channels are reported as `None`.
    pub fn hilo(&self) -> [Option<(u8, u8)>; 3] {
        self.0.map(|channel| channel.hilo())
    }
}

/// Counts every pixel of `image` per RGB channel; alpha is ignored.
///
/// Rows are counted in parallel and merged.
pub fn calculate_histogram(image: &DynamicImage) -> ImageHistogram {
    let rgba = image.to_rgba8();
    let (width, _) = image.dimensions();
    if width == 0 {
        return ImageHistogram::default();
    }

    rgba.par_chunks(width as usize * 4)
        .fold(ImageHistogram::default, |mut acc, row| {
            for px in row.chunks_exact(4) {
                for channel in 0..3 {
                    acc.0[channel].0[px[channel] as usize] += 1;
                }
            }
            acc
        })
        .reduce(ImageHistogram::default, |mut a, b| {
            for channel in 0..3 {
                for bucket in 0..BUCKETS {
                    a.0[channel].0[bucket] += b.0[channel].0[bucket];
                }
            }
            a
        })
}
