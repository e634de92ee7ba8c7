//! Per-pixel background statistics learned from an initialization window.
//!
//! Depth is normalized by the configured maximum depth before accumulation.
//! Thresholds are only available on [`BackgroundStatistics`], which can only
//! be produced by [`BackgroundModel::finalize`].

use crate::constants::{
    BG_DIFF_HIGH_SCALE, BG_DIFF_LOW_SCALE, CENTER_COLUMN_RATIO, MIN_AVG_DIFF_MM, SURFACE_OFFSET,
};
use crate::sensor::DepthFrame;
use crate::{Error, Result};
use log::{debug, info};
use ndarray::{Array2, Zip};

/// Parameters turning averages into foreground thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdParams {
    /// Scale applied in the center column
    pub low_scale: f32,
    /// Scale applied at the pixel farthest from the optical center
    pub high_scale: f32,
    /// Floor of the per-pixel average difference in millimeters
    pub min_avg_diff_mm: f32,
    /// Half width of the center column as a fraction of the frame width
    pub center_column_ratio: f32,
    /// Camera-to-surface offset in pixels
    pub surface_offset: f32,
    /// Center column; defaults to `width / 2`
    pub center_column: Option<usize>,
    /// Optical center (x, y); defaults to the frame center
    pub optical_center: Option<(f32, f32)>,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            low_scale: BG_DIFF_LOW_SCALE,
            high_scale: BG_DIFF_HIGH_SCALE,
            min_avg_diff_mm: MIN_AVG_DIFF_MM,
            center_column_ratio: CENTER_COLUMN_RATIO,
            surface_offset: SURFACE_OFFSET,
            center_column: None,
            optical_center: None,
        }
    }
}

impl ThresholdParams {
    /// Parameters with explicit low and high scales
    #[must_use]
    pub fn with_scales(low_scale: f32, high_scale: f32) -> Self {
        Self {
            low_scale,
            high_scale,
            ..Self::default()
        }
    }
}

/// Accumulates depth and frame-to-frame differences
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    width: usize,
    height: usize,
    max_depth: f32,
    depth_sum: Array2<f32>,
    diff_sum: Array2<f32>,
    previous: Option<Array2<f32>>,
    frame_count: u64,
}

impl BackgroundModel {
    /// Create an empty model for `width` x `height` frames
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `max_depth` is zero
    pub fn new(width: usize, height: usize, max_depth: u16) -> Result<Self> {
        if max_depth == 0 {
            return Err(Error::InvalidInput("Maximum depth must be positive".to_string()));
        }
        Ok(Self {
            width,
            height,
            max_depth: f32::from(max_depth),
            depth_sum: Array2::zeros((height, width)),
            diff_sum: Array2::zeros((height, width)),
            previous: None,
            frame_count: 0,
        })
    }

    /// Number of accumulated frames
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Discard all accumulated frames
    pub fn clear(&mut self) {
        *self = self.emptied();
    }

    /// Move the accumulated sums out, leaving an empty model of the same size
    #[must_use]
    pub fn take(&mut self) -> Self {
        let empty = self.emptied();
        std::mem::replace(self, empty)
    }

    fn emptied(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            max_depth: self.max_depth,
            depth_sum: Array2::zeros((self.height, self.width)),
            diff_sum: Array2::zeros((self.height, self.width)),
            previous: None,
            frame_count: 0,
        }
    }

    /// Add one frame to the running sums
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameSize`] if the frame does not match the model
    pub fn accumulate(&mut self, frame: &DepthFrame) -> Result<()> {
        frame.ensure_size(self.width, self.height)?;
        let max_depth = self.max_depth;
        let normalized = frame.depth.mapv(|d| f32::from(d) / max_depth);

        self.depth_sum += &normalized;
        if let Some(previous) = &self.previous {
            Zip::from(&mut self.diff_sum)
                .and(&normalized)
                .and(previous)
                .for_each(|sum, &current, &prev| *sum += (current - prev).abs());
        }
        self.previous = Some(normalized);
        self.frame_count += 1;
        Ok(())
    }

    /// Average the sums and derive the threshold images
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyBackground`] when no frame was accumulated
    #[allow(clippy::cast_precision_loss)]
    pub fn finalize(self, params: &ThresholdParams) -> Result<BackgroundStatistics> {
        if self.frame_count == 0 {
            return Err(Error::EmptyBackground);
        }
        let frames = self.frame_count as f32;
        let avg = self.depth_sum / frames;
        let raw_diff = if self.frame_count > 1 {
            self.diff_sum / (frames - 1.0)
        } else {
            self.diff_sum
        };
        let raw_diff_mean = raw_diff.mean().unwrap_or(0.0) * self.max_depth;

        let floor = params.min_avg_diff_mm / self.max_depth;
        let diff = raw_diff.mapv(|d| d.max(floor));

        let center_column = params.center_column.unwrap_or(self.width / 2);
        let center_half_width = self.width as f32 * params.center_column_ratio;
        let scale = adaptive_scale(self.width, self.height, center_column, center_half_width, params);

        let mut high = Array2::zeros((self.height, self.width));
        let mut low = Array2::zeros((self.height, self.width));
        Zip::from(&mut high)
            .and(&mut low)
            .and(&avg)
            .and(&diff)
            .and(&scale)
            .for_each(|h, l, &a, &d, &s| {
                *h = a + d * s;
                *l = a - d * s;
            });

        let stats = BackgroundStatistics {
            width: self.width,
            height: self.height,
            max_depth: self.max_depth,
            frame_count: self.frame_count,
            avg,
            diff,
            high,
            low,
            raw_diff_mean,
            center_column,
            center_half_width,
        };
        info!("{}", stats.stats());
        Ok(stats)
    }
}

/// Per-pixel scale: `low_scale` in the center column, otherwise linear in the
/// squared distance from the optical center up to `high_scale` at the
/// farthest pixel
#[allow(clippy::cast_precision_loss)]
fn adaptive_scale(
    width: usize,
    height: usize,
    center_column: usize,
    center_half_width: f32,
    params: &ThresholdParams,
) -> Array2<f32> {
    let (cx, cy) = params
        .optical_center
        .unwrap_or((width as f32 / 2.0, height as f32 / 2.0));
    let offset2 = params.surface_offset * params.surface_offset;
    let dist2 = |x: f32, y: f32| (x - cx).powi(2) + (y - cy).powi(2) + offset2;

    let far_x = if width == 0 { 0.0 } else { (width - 1) as f32 };
    let far_y = if height == 0 { 0.0 } else { (height - 1) as f32 };
    let max_dist2 = [(0.0, 0.0), (far_x, 0.0), (0.0, far_y), (far_x, far_y)]
        .iter()
        .map(|&(x, y)| dist2(x, y))
        .fold(offset2, f32::max);
    let span = max_dist2 - offset2;
    debug!("Adaptive scale span {span:.1}, center column {center_column} +/- {center_half_width:.1}");

    Array2::from_shape_fn((height, width), |(y, x)| {
        if (x as f32 - center_column as f32).abs() <= center_half_width || span <= 0.0 {
            params.low_scale
        } else {
            let t = (dist2(x as f32, y as f32) - offset2) / span;
            params.low_scale + (params.high_scale - params.low_scale) * t
        }
    })
}

/// Finalized, read-only background statistics
#[derive(Debug, Clone)]
pub struct BackgroundStatistics {
    width: usize,
    height: usize,
    max_depth: f32,
    frame_count: u64,
    avg: Array2<f32>,
    diff: Array2<f32>,
    high: Array2<f32>,
    low: Array2<f32>,
    raw_diff_mean: f32,
    center_column: usize,
    center_half_width: f32,
}

impl BackgroundStatistics {
    /// Frame width
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Frame height
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Maximum depth used for normalization, in millimeters
    #[must_use]
    pub fn max_depth(&self) -> f32 {
        self.max_depth
    }

    /// Number of frames in the initialization window
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Whether column `x` lies in the low-noise center column (inclusive)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn is_in_center_column(&self, x: usize) -> bool {
        (x as f32 - self.center_column as f32).abs() <= self.center_half_width
    }

    /// Mean of the average depth in millimeters
    #[must_use]
    pub fn avg_depth(&self) -> f32 {
        self.avg.mean().unwrap_or(0.0) * self.max_depth
    }

    /// Mean of the unfloored average difference in millimeters
    #[must_use]
    pub fn avg_diff(&self) -> f32 {
        self.raw_diff_mean
    }

    /// Average depth at a pixel in millimeters
    #[must_use]
    pub fn depth_at(&self, x: usize, y: usize) -> Option<f32> {
        self.avg.get((y, x)).map(|v| v * self.max_depth)
    }

    /// Floored average difference at a pixel in millimeters
    #[must_use]
    pub fn diff_at(&self, x: usize, y: usize) -> Option<f32> {
        self.diff.get((y, x)).map(|v| v * self.max_depth)
    }

    /// Normalized average depth image
    #[must_use]
    pub fn average_depth(&self) -> &Array2<f32> {
        &self.avg
    }

    /// Normalized floored average difference image
    #[must_use]
    pub fn average_diff(&self) -> &Array2<f32> {
        &self.diff
    }

    /// Normalized upper threshold image
    #[must_use]
    pub fn high_threshold(&self) -> &Array2<f32> {
        &self.high
    }

    /// Normalized lower threshold image
    #[must_use]
    pub fn low_threshold(&self) -> &Array2<f32> {
        &self.low
    }

    /// Whether a raw depth sample is foreground at a pixel.
    ///
    /// The low bound belongs to the background, the high bound does not.
    /// Out-of-image pixels are background.
    #[must_use]
    pub fn is_foreground(&self, x: usize, y: usize, depth_mm: u16) -> bool {
        let value = f32::from(depth_mm) / self.max_depth;
        match (self.low.get((y, x)), self.high.get((y, x))) {
            (Some(&low), Some(&high)) => value < low || value >= high,
            _ => false,
        }
    }

    /// One-line summary of the statistics
    #[must_use]
    pub fn stats(&self) -> String {
        format!(
            "Background over {} frames: avg depth {:.2} mm, avg diff {:.3} mm",
            self.frame_count,
            self.avg_depth(),
            self.avg_diff()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn constant_model(width: usize, height: usize, value: u16, frames: u64) -> BackgroundModel {
        let mut model = BackgroundModel::new(width, height, 2000).unwrap();
        for id in 0..frames {
            model.accumulate(&DepthFrame::filled(id, width, height, value)).unwrap();
        }
        model
    }

    #[test]
    fn test_finalize_without_frames_is_fatal() {
        let model = BackgroundModel::new(4, 4, 1000).unwrap();
        assert!(matches!(model.finalize(&ThresholdParams::default()), Err(Error::EmptyBackground)));
    }

    #[test]
    fn test_take_leaves_empty_model() {
        let mut model = constant_model(3, 2, 700, 4);
        let taken = model.take();
        assert_eq!(taken.frame_count(), 4);
        assert_eq!(model.frame_count(), 0);
        assert!(matches!(model.finalize(&ThresholdParams::default()), Err(Error::EmptyBackground)));

        let mut model = constant_model(3, 2, 700, 4);
        model.clear();
        assert_eq!(model.frame_count(), 0);
        model.accumulate(&DepthFrame::filled(9, 3, 2, 500)).unwrap();
        let stats = model.finalize(&ThresholdParams::default()).unwrap();
        assert!((stats.avg_depth() - 500.0).abs() < 0.05);
    }

    #[test]
    fn test_zero_max_depth_rejected() {
        assert!(matches!(BackgroundModel::new(4, 4, 0), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_wrong_frame_size_rejected() {
        let mut model = BackgroundModel::new(4, 4, 1000).unwrap();
        let result = model.accumulate(&DepthFrame::filled(0, 5, 4, 1));
        assert!(matches!(result, Err(Error::FrameSize { .. })));
        assert_eq!(model.frame_count(), 0);
    }

    #[test]
    fn test_constant_stream_statistics() {
        let stats = constant_model(8, 6, 900, 11)
            .finalize(&ThresholdParams::default())
            .unwrap();
        assert!((stats.avg_depth() - 900.0).abs() < 0.05);
        assert!(stats.avg_diff().abs() < 1e-4);
        assert!((stats.diff_at(0, 0).unwrap() - MIN_AVG_DIFF_MM).abs() < 1e-3);
        assert!(stats.depth_at(8, 0).is_none());
    }

    #[test]
    fn test_average_difference_over_frame_pairs() {
        let mut model = BackgroundModel::new(2, 2, 1000).unwrap();
        for (id, value) in [100u16, 110, 100].into_iter().enumerate() {
            model.accumulate(&DepthFrame::filled(id as u64, 2, 2, value)).unwrap();
        }
        let stats = model.finalize(&ThresholdParams::default()).unwrap();
        assert!((stats.avg_diff() - 10.0).abs() < 1e-3);
        assert!((stats.diff_at(1, 1).unwrap() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_single_frame_has_floored_diff() {
        let stats = constant_model(3, 3, 500, 1).finalize(&ThresholdParams::default()).unwrap();
        assert_eq!(stats.avg_diff(), 0.0);
        assert!((stats.diff_at(1, 1).unwrap() - MIN_AVG_DIFF_MM).abs() < 1e-3);
    }

    #[test]
    fn test_center_column_is_inclusive() {
        let stats = constant_model(10, 4, 500, 2).finalize(&ThresholdParams::default()).unwrap();
        assert!(stats.is_in_center_column(3));
        assert!(stats.is_in_center_column(5));
        assert!(stats.is_in_center_column(7));
        assert!(!stats.is_in_center_column(2));
        assert!(!stats.is_in_center_column(8));
    }

    #[test]
    fn test_scale_grows_away_from_center_column() {
        let stats = constant_model(40, 30, 1000, 3)
            .finalize(&ThresholdParams::default())
            .unwrap();
        let band = |x: usize, y: usize| stats.high_threshold()[(y, x)] - stats.low_threshold()[(y, x)];
        assert!(band(0, 0) > band(20, 15));
        assert!(band(0, 0) > band(5, 15));
        assert!((band(20, 0) - band(20, 15)).abs() < 1e-6);
    }

    #[test]
    fn test_foreground_bounds() {
        let stats = constant_model(10, 10, 1000, 11)
            .finalize(&ThresholdParams::with_scales(1.0, 1.0))
            .unwrap();
        assert!(!stats.is_foreground(2, 2, 1000));
        assert!(stats.is_foreground(2, 2, 1002));
        assert!(stats.is_foreground(2, 2, 998));
        assert!(!stats.is_foreground(20, 2, 0));
    }

    proptest! {
        #[test]
        fn prop_center_column_is_centered_band(width in 10usize..400) {
            let stats = constant_model(width, 2, 800, 1).finalize(&ThresholdParams::default()).unwrap();
            let inside: Vec<usize> = (0..width).filter(|&x| stats.is_in_center_column(x)).collect();
            prop_assert!(inside.contains(&(width / 2)));
            prop_assert!(!stats.is_in_center_column(0));
            prop_assert!(!stats.is_in_center_column(width - 1));
            // Contiguous
            prop_assert_eq!(inside.len(), inside[inside.len() - 1] - inside[0] + 1);
        }
    }
}
