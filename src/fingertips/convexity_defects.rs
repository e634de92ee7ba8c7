use super::{check_threshold, FingertipDetector, FrameContext};
use crate::forelimb::FingertipCandidate;
use crate::regions::{ConvexityDefect, Silhouette};
use crate::utils::geometry::angle_between;
use crate::utils::point_in_rect;
use crate::utils::safe_cast::round_to_pixel;
use crate::Result;
use nalgebra::{Point2, Point3, Vector2};
use ndarray::Array2;
use opencv::core::{Point, Rect};

/// Finds fingers between adjacent convexity defects
pub struct ConvexityDefectDetector {
    angle_threshold: f32,
    fingertip_width: f32,
    gradient_threshold: f32,
}

impl ConvexityDefectDetector {
    /// # Errors
    ///
    /// Returns an error if any threshold is not positive
    pub fn new(angle_threshold: f32, fingertip_width: f32, gradient_threshold: f32) -> Result<Self> {
        check_threshold("Angle threshold", angle_threshold)?;
        check_threshold("Fingertip width", fingertip_width)?;
        check_threshold("Gradient threshold", gradient_threshold)?;
        Ok(Self {
            angle_threshold,
            fingertip_width,
            gradient_threshold,
        })
    }

    /// Minimum squared distance between the two hull points of a finger
    #[must_use]
    pub fn width_threshold(&self) -> f32 {
        self.fingertip_width * self.fingertip_width / 4.0
    }

    /// Midpoint and unit bisector of a qualifying defect pair.
    ///
    /// `first.end` and `second.start` must lie inside `hand`, the vectors from
    /// each deepest point to those hull points must be at most
    /// `angle_threshold` apart, and the hull points must be farther apart
    /// than the width threshold.
    #[must_use]
    pub fn finger_between(
        &self,
        first: &ConvexityDefect,
        second: &ConvexityDefect,
        hand: Rect,
    ) -> Option<(Point2<f32>, Vector2<f32>)> {
        if !point_in_rect(first.end, hand) || !point_in_rect(second.start, hand) {
            return None;
        }
        let end = to_point2(first.end);
        let start = to_point2(second.start);
        let v1 = end - to_point2(first.deepest);
        let v2 = start - to_point2(second.deepest);
        if angle_between(&v1, &v2) > self.angle_threshold {
            return None;
        }
        if (end - start).norm_squared() <= self.width_threshold() {
            return None;
        }
        let bisector = v1.normalize() + v2.normalize();
        let direction = if bisector.norm() > f32::EPSILON {
            bisector.normalize()
        } else {
            Vector2::zeros()
        };
        Some((nalgebra::center(&end, &start), direction))
    }

    /// Walk from `origin` along `direction` until the derivative exceeds the
    /// gradient threshold, then step back half a fingertip width
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    #[allow(clippy::cast_precision_loss)]
    fn search_fingertip(&self, origin: Point2<f32>, direction: Vector2<f32>, derivative: &Array2<f32>) -> Point2<f32> {
        let (height, width) = derivative.dim();
        let mut p = origin;
        let mut count = 0.0f32;
        while count <= self.fingertip_width
            && p.x >= 0.0
            && p.y >= 0.0
            && p.x < width as f32
            && p.y < height as f32
        {
            if derivative[(p.y as usize, p.x as usize)].abs() > self.gradient_threshold {
                break;
            }
            p += direction;
            count += 1.0;
        }
        let tip = p - direction * (self.fingertip_width / 2.0);
        Point2::new(
            tip.x.clamp(0.0, (width.max(1) - 1) as f32),
            tip.y.clamp(0.0, (height.max(1) - 1) as f32),
        )
    }
}

impl Default for ConvexityDefectDetector {
    fn default() -> Self {
        let params = super::DetectorParams::default();
        Self {
            angle_threshold: params.angle_threshold,
            fingertip_width: params.fingertip_width,
            gradient_threshold: params.gradient_threshold,
        }
    }
}

impl FingertipDetector for ConvexityDefectDetector {
    #[allow(clippy::cast_precision_loss)]
    fn detect(&self, silhouette: &Silhouette, context: &FrameContext<'_>) -> Vec<FingertipCandidate> {
        let Some(hand) = silhouette.hand_region else {
            return Vec::new();
        };
        let defects = &silhouette.defects;
        if defects.len() < 2 {
            return Vec::new();
        }
        let derivative = &context.segmentation.derivative;
        let (width, height) = (context.frame.width(), context.frame.height());

        let mut candidates = Vec::new();
        for (i, first) in defects.iter().enumerate() {
            let second = &defects[(i + 1) % defects.len()];
            let Some((origin, direction)) = self.finger_between(first, second, hand) else {
                continue;
            };
            let tip = self.search_fingertip(origin, direction, derivative);
            let Some((x, y)) = round_to_pixel(tip.x, tip.y, width, height) else {
                continue;
            };
            let depth = context.frame.depth_at(x, y).map_or(0.0, f32::from);
            candidates.push(FingertipCandidate::new(Point3::new(x as f32, y as f32, depth), 1.0));
        }
        candidates
    }

    fn name(&self) -> &str {
        "ConvexityDefects"
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_point2(p: Point) -> Point2<f32> {
    Point2::new(p.x as f32, p.y as f32)
}
