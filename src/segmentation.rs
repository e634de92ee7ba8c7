//! Foreground segmentation against learned background statistics.

use crate::background::BackgroundStatistics;
use crate::constants::{MORPH_ITERATIONS, MORPH_KERNEL_SIZE};
use crate::sensor::DepthFrame;
use crate::utils::image_conversion::{array2_f32_to_mat, array2_u8_to_mat, mat_to_array2_f32, mat_to_array2_u8};
use crate::{Error, Result};
use ndarray::{Array2, Zip};
use opencv::core::{Mat, Point, Size, BORDER_CONSTANT, BORDER_DEFAULT, CV_32F};
use opencv::imgproc;

/// Morphological opening parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentationParams {
    /// Odd side length of the rectangular structuring element
    pub morph_kernel_size: i32,
    /// Erosion/dilation iterations
    pub morph_iterations: i32,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self {
            morph_kernel_size: MORPH_KERNEL_SIZE,
            morph_iterations: MORPH_ITERATIONS,
        }
    }
}

/// Per-frame segmentation images, all with shape (height, width)
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    /// 255 for foreground, 0 for background
    pub mask: Array2<u8>,
    /// Foreground depth scaled to 8 bits, 0 for background
    pub depth_8u: Array2<u8>,
    /// Opened `depth_8u`
    pub cleaned: Array2<u8>,
    /// Second-order Sobel derivative of the normalized depth
    pub derivative: Array2<f32>,
}

impl Segmentation {
    /// All-background images of the given size
    #[must_use]
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            mask: Array2::zeros((height, width)),
            depth_8u: Array2::zeros((height, width)),
            cleaned: Array2::zeros((height, width)),
            derivative: Array2::zeros((height, width)),
        }
    }

    /// Number of foreground pixels in the mask
    #[must_use]
    pub fn foreground_count(&self) -> usize {
        self.mask.iter().filter(|&&v| v == 255).count()
    }
}

/// Classifies each pixel against the background band and cleans the result
#[derive(Debug, Clone, Default)]
pub struct ForegroundSegmenter {
    params: SegmentationParams,
}

impl ForegroundSegmenter {
    /// Create a segmenter
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel size is not a positive odd number or
    /// the iteration count is negative
    pub fn new(params: SegmentationParams) -> Result<Self> {
        if params.morph_kernel_size <= 0 || params.morph_kernel_size % 2 == 0 {
            return Err(Error::InvalidInput(format!(
                "Morphology kernel size must be positive and odd, got {}",
                params.morph_kernel_size
            )));
        }
        if params.morph_iterations < 0 {
            return Err(Error::InvalidInput(format!(
                "Morphology iterations must be non-negative, got {}",
                params.morph_iterations
            )));
        }
        Ok(Self { params })
    }

    /// Segment one frame
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameSize`] for frames that do not match the
    /// background, or an `OpenCV` error from morphology or Sobel
    pub fn segment(&self, background: &BackgroundStatistics, frame: &DepthFrame) -> Result<Segmentation> {
        let mask = foreground_mask(background, frame)?;

        let max_depth = background.max_depth();
        let mut depth_8u = Array2::<u8>::zeros(mask.raw_dim());
        Zip::from(&mut depth_8u)
            .and(&mask)
            .and(&frame.depth)
            .for_each(|out, &m, &d| {
                if m != 0 {
                    *out = scale_to_u8(d, max_depth);
                }
            });

        let cleaned = self.open(&depth_8u)?;
        let normalized = frame.depth.mapv(|d| f32::from(d) / max_depth);
        let derivative = second_derivative(&normalized)?;

        Ok(Segmentation {
            mask,
            depth_8u,
            cleaned,
            derivative,
        })
    }

    fn open(&self, image: &Array2<u8>) -> Result<Array2<u8>> {
        if self.params.morph_iterations == 0 {
            return Ok(image.clone());
        }
        let src = array2_u8_to_mat(image)?;
        let kernel = imgproc::get_structuring_element(
            imgproc::MORPH_RECT,
            Size::new(self.params.morph_kernel_size, self.params.morph_kernel_size),
            Point::new(-1, -1),
        )?;
        let mut dst = Mat::default();
        imgproc::morphology_ex(
            &src,
            &mut dst,
            imgproc::MORPH_OPEN,
            &kernel,
            Point::new(-1, -1),
            self.params.morph_iterations,
            BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;
        mat_to_array2_u8(&dst)
    }
}

/// Binary foreground mask: 255 where the depth leaves the background band
///
/// # Errors
///
/// Returns [`Error::FrameSize`] if the frame does not match the background
pub fn foreground_mask(background: &BackgroundStatistics, frame: &DepthFrame) -> Result<Array2<u8>> {
    frame.ensure_size(background.width(), background.height())?;
    let max_depth = background.max_depth();
    let mut mask = Array2::<u8>::zeros(frame.depth.raw_dim());
    Zip::from(&mut mask)
        .and(&frame.depth)
        .and(background.low_threshold())
        .and(background.high_threshold())
        .for_each(|m, &d, &low, &high| {
            let value = f32::from(d) / max_depth;
            if value < low || value >= high {
                *m = 255;
            }
        });
    Ok(mask)
}

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn scale_to_u8(depth: u16, max_depth: f32) -> u8 {
    (f32::from(depth) * 255.0 / max_depth).clamp(0.0, 255.0) as u8
}

fn second_derivative(normalized: &Array2<f32>) -> Result<Array2<f32>> {
    let src = array2_f32_to_mat(normalized)?;
    let mut dst = Mat::default();
    imgproc::sobel(&src, &mut dst, CV_32F, 2, 2, 3, 1.0, 0.0, BORDER_DEFAULT)?;
    mat_to_array2_f32(&dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::{BackgroundModel, ThresholdParams};

    fn flat_background(width: usize, height: usize, value: u16) -> BackgroundStatistics {
        let mut model = BackgroundModel::new(width, height, 1000).unwrap();
        for id in 0..5 {
            model.accumulate(&DepthFrame::filled(id, width, height, value)).unwrap();
        }
        model.finalize(&ThresholdParams::with_scales(1.0, 1.0)).unwrap()
    }

    #[test]
    fn test_rejects_even_kernel() {
        let params = SegmentationParams {
            morph_kernel_size: 4,
            morph_iterations: 1,
        };
        assert!(ForegroundSegmenter::new(params).is_err());
    }

    #[test]
    fn test_mask_marks_object_above_surface() {
        let background = flat_background(20, 20, 900);
        let mut frame = DepthFrame::filled(10, 20, 20, 900);
        for y in 5..15 {
            for x in 5..15 {
                frame.depth[(y, x)] = 800;
            }
        }
        let mask = foreground_mask(&background, &frame).unwrap();
        assert_eq!(mask[(10, 10)], 255);
        assert_eq!(mask[(0, 0)], 0);
        assert_eq!(mask.iter().filter(|&&v| v == 255).count(), 100);
    }

    #[test]
    fn test_depth_8u_scaling() {
        assert_eq!(scale_to_u8(1000, 1000.0), 255);
        assert_eq!(scale_to_u8(2000, 1000.0), 255);
        assert_eq!(scale_to_u8(500, 1000.0), 127);
    }

    #[test]
    fn test_opening_removes_isolated_pixels() {
        let background = flat_background(20, 20, 900);
        let mut frame = DepthFrame::filled(10, 20, 20, 900);
        frame.depth[(2, 2)] = 700;
        for y in 8..16 {
            for x in 8..16 {
                frame.depth[(y, x)] = 700;
            }
        }
        let segmenter = ForegroundSegmenter::new(SegmentationParams::default()).unwrap();
        let segmentation = segmenter.segment(&background, &frame).unwrap();
        assert_eq!(segmentation.foreground_count(), 65);
        assert_eq!(segmentation.cleaned[(2, 2)], 0);
        assert_eq!(segmentation.cleaned[(12, 12)], scale_to_u8(700, 1000.0));
        assert_eq!(segmentation.derivative.dim(), (20, 20));
    }
}
