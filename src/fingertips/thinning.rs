//! Skeleton-based fingertip detection.
//!
//! The hand region of the cleaned image is thinned by iterated hit-or-miss
//! transforms and pruned of short spurs. The longest chain of single-pixel
//! skeleton points running down the region is taken as the finger, and its
//! top-most point as the fingertip.

use super::{FingertipDetector, FrameContext};
use crate::constants::{PRUNING_PASSES, THINNING_PASSES};
use crate::forelimb::FingertipCandidate;
use crate::regions::Silhouette;
use crate::utils::clip_rect;
use crate::utils::safe_cast::usize_to_i32;
use nalgebra::Point3;
use ndarray::{s, Array2};

/// Hit-or-miss structuring element, row-major: 0 background, 1 foreground,
/// 2 don't care
type Kernel = [u8; 9];

const THINNING_KERNEL_ORTH: Kernel = [0, 0, 0, 2, 1, 2, 1, 1, 1];
const THINNING_KERNEL_DIAG: Kernel = [2, 0, 0, 1, 1, 0, 2, 1, 2];
const PRUNING_KERNEL_1: Kernel = [0, 0, 0, 0, 1, 0, 0, 2, 2];
const PRUNING_KERNEL_2: Kernel = [0, 0, 0, 0, 1, 0, 2, 2, 0];

/// Finds one fingertip per hand region from its skeleton
pub struct ThinningDetector {
    thinning_passes: usize,
    pruning_passes: usize,
}

impl ThinningDetector {
    #[must_use]
    pub fn new(thinning_passes: usize, pruning_passes: usize) -> Self {
        Self {
            thinning_passes,
            pruning_passes,
        }
    }

    /// Thin and prune a binary image in place
    pub fn skeletonize(&self, pixels: &mut Array2<bool>) {
        let mut orth = THINNING_KERNEL_ORTH;
        let mut diag = THINNING_KERNEL_DIAG;
        for _ in 0..self.thinning_passes {
            thin_once(pixels, &orth);
            thin_once(pixels, &diag);
            orth = rotate_clockwise(&orth);
            diag = rotate_clockwise(&diag);
        }
        let mut prune1 = PRUNING_KERNEL_1;
        let mut prune2 = PRUNING_KERNEL_2;
        for _ in 0..self.pruning_passes {
            thin_once(pixels, &prune1);
            thin_once(pixels, &prune2);
            prune1 = rotate_clockwise(&prune1);
            prune2 = rotate_clockwise(&prune2);
        }
    }
}

impl Default for ThinningDetector {
    fn default() -> Self {
        Self::new(THINNING_PASSES, PRUNING_PASSES)
    }
}

impl FingertipDetector for ThinningDetector {
    #[allow(clippy::cast_precision_loss)]
    fn detect(&self, silhouette: &Silhouette, context: &FrameContext<'_>) -> Vec<FingertipCandidate> {
        let Some(hand) = silhouette.hand_region else {
            return Vec::new();
        };
        let cleaned = &context.segmentation.cleaned;
        let (Ok(width), Ok(height)) = (usize_to_i32(cleaned.ncols()), usize_to_i32(cleaned.nrows())) else {
            return Vec::new();
        };
        let rect = clip_rect(hand, width, height);
        let (Ok(x0), Ok(y0), Ok(w), Ok(h)) = (
            usize::try_from(rect.x),
            usize::try_from(rect.y),
            usize::try_from(rect.width),
            usize::try_from(rect.height),
        ) else {
            return Vec::new();
        };
        if w == 0 || h == 0 {
            return Vec::new();
        }

        let mut pixels = cleaned.slice(s![y0..y0 + h, x0..x0 + w]).mapv(|v| v != 0);
        self.skeletonize(&mut pixels);

        let Some(&(fx, fy)) = longest_vertical_run(&pixels).last() else {
            return Vec::new();
        };
        let (x, y) = (x0 + fx, y0 + fy);
        let depth = context.frame.depth_at(x, y).map_or(0.0, f32::from);
        vec![FingertipCandidate::new(Point3::new(x as f32, y as f32, depth), 1.0)]
    }

    fn name(&self) -> &str {
        "Thinning"
    }
}

/// Remove every foreground pixel whose 3x3 neighbourhood matches `kernel`.
/// Pixels outside the image count as background.
fn thin_once(pixels: &mut Array2<bool>, kernel: &Kernel) {
    let (rows, cols) = pixels.dim();
    let value_at = |r: isize, c: isize| -> bool {
        usize::try_from(r)
            .ok()
            .zip(usize::try_from(c).ok())
            .and_then(|(r, c)| pixels.get((r, c)).copied())
            .unwrap_or(false)
    };

    let mut hits = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            if !pixels[(r, c)] {
                continue;
            }
            let matched = kernel.iter().enumerate().all(|(k, &expected)| {
                #[allow(clippy::cast_possible_wrap)]
                let (nr, nc) = (r as isize + (k / 3) as isize - 1, c as isize + (k % 3) as isize - 1);
                match expected {
                    0 => !value_at(nr, nc),
                    1 => value_at(nr, nc),
                    _ => true,
                }
            });
            if matched {
                hits.push((r, c));
            }
        }
    }
    for index in hits {
        pixels[index] = false;
    }
}

fn rotate_clockwise(kernel: &Kernel) -> Kernel {
    let mut rotated = [0u8; 9];
    for r in 0..3 {
        for c in 0..3 {
            rotated[r * 3 + c] = kernel[(2 - c) * 3 + r];
        }
    }
    rotated
}

/// A foreground pixel without foreground neighbours on its row
fn is_single_pixel(pixels: &Array2<bool>, row: usize, col: usize) -> bool {
    let cols = pixels.ncols();
    pixels[(row, col)]
        && !(col > 0 && pixels[(row, col - 1)])
        && !(col + 1 < cols && pixels[(row, col + 1)])
}

/// Longest chain of single pixels moving at most one column per row.
///
/// Returns `(x, y)` points from the bottom of the chain to its top.
fn longest_vertical_run(pixels: &Array2<bool>) -> Vec<(usize, usize)> {
    let (rows, cols) = pixels.dim();
    if rows == 0 || cols == 0 {
        return Vec::new();
    }
    let mut score = Array2::<u32>::zeros((rows, cols));
    let mut parent = Array2::<isize>::zeros((rows, cols));
    for c in 0..cols {
        score[(0, c)] = u32::from(is_single_pixel(pixels, 0, c));
    }
    for r in 1..rows {
        for c in 0..cols {
            let mut best = score[(r - 1, c)];
            let mut step = 0isize;
            if c > 0 && score[(r - 1, c - 1)] > best {
                best = score[(r - 1, c - 1)];
                step = -1;
            }
            if c + 1 < cols && score[(r - 1, c + 1)] > best {
                best = score[(r - 1, c + 1)];
                step = 1;
            }
            score[(r, c)] = best + u32::from(is_single_pixel(pixels, r, c));
            parent[(r, c)] = step;
        }
    }

    let mut current = 0;
    let mut best = 0;
    for c in 0..cols {
        if score[(rows - 1, c)] > best {
            best = score[(rows - 1, c)];
            current = c;
        }
    }

    let mut run = Vec::new();
    for r in (0..rows).rev() {
        if is_single_pixel(pixels, r, current) {
            run.push((current, r));
        }
        current = current.saturating_add_signed(parent[(r, current)]);
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::Segmentation;
    use crate::sensor::DepthFrame;
    use opencv::core::Rect;

    #[test]
    fn test_rotate_four_times_is_identity() {
        let mut kernel = THINNING_KERNEL_DIAG;
        for _ in 0..4 {
            kernel = rotate_clockwise(&kernel);
        }
        assert_eq!(kernel, THINNING_KERNEL_DIAG);
        assert_eq!(rotate_clockwise(&THINNING_KERNEL_ORTH), [1, 2, 0, 1, 1, 0, 1, 2, 0]);
    }

    #[test]
    fn test_longest_run_follows_diagonal_line() {
        let mut pixels = Array2::from_elem((6, 6), false);
        for (x, y) in [(1, 5), (2, 4), (2, 3), (3, 2), (4, 1)] {
            pixels[(y, x)] = true;
        }
        let run = longest_vertical_run(&pixels);
        assert_eq!(run.len(), 5);
        assert_eq!(run.last(), Some(&(4, 1)));
    }

    #[test]
    fn test_thick_pixels_are_not_single() {
        let mut pixels = Array2::from_elem((3, 4), false);
        pixels[(1, 1)] = true;
        pixels[(1, 2)] = true;
        assert!(!is_single_pixel(&pixels, 1, 1));
        assert!(longest_vertical_run(&pixels).is_empty());
    }

    #[test]
    fn test_bar_thins_to_fingertip() {
        let (width, height) = (40, 80);
        let mut segmentation = Segmentation::empty(width, height);
        for y in 10..80 {
            for x in 18..23 {
                segmentation.cleaned[(y, x)] = 120;
            }
        }
        let frame = DepthFrame::filled(0, width, height, 640);
        let shape = Silhouette {
            polygon: Vec::new(),
            bounding_box: Rect::new(18, 10, 5, 70),
            hull: Vec::new(),
            defects: Vec::new(),
            hand_region: Some(Rect::new(0, 0, 40, 70)),
            arm_joint_region: None,
        };
        let context = FrameContext {
            frame: &frame,
            segmentation: &segmentation,
        };
        let candidates = ThinningDetector::default().detect(&shape, &context);
        assert_eq!(candidates.len(), 1);
        let tip = candidates[0].position;
        assert!((18.0..23.0).contains(&tip.x));
        assert!(tip.y >= 10.0 && tip.y < 60.0);
        assert_eq!(tip.z, 640.0);
    }
}
