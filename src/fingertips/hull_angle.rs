use super::{check_threshold, FingertipDetector, FrameContext};
use crate::constants::HULL_FINGERTIP_ANGLE;
use crate::forelimb::FingertipCandidate;
use crate::regions::Silhouette;
use crate::utils::geometry::triangle_angle;
use crate::Result;
use nalgebra::{Point2, Point3};

/// Accepts sharp hull vertices inside the hand's vertical band
pub struct HullAngleDetector {
    angle_threshold: f32,
}

impl HullAngleDetector {
    /// # Errors
    ///
    /// Returns an error if `angle_threshold` is not positive
    pub fn new(angle_threshold: f32) -> Result<Self> {
        check_threshold("Angle threshold", angle_threshold)?;
        Ok(Self { angle_threshold })
    }
}

impl Default for HullAngleDetector {
    fn default() -> Self {
        Self {
            angle_threshold: HULL_FINGERTIP_ANGLE,
        }
    }
}

impl FingertipDetector for HullAngleDetector {
    #[allow(clippy::cast_precision_loss)]
    fn detect(&self, silhouette: &Silhouette, context: &FrameContext<'_>) -> Vec<FingertipCandidate> {
        let Some(hand) = silhouette.hand_region else {
            return Vec::new();
        };
        let polygon = &silhouette.polygon;
        let n = polygon.len();
        if n < 3 {
            return Vec::new();
        }
        let as_point2 = |i: usize| Point2::new(polygon[i].x as f32, polygon[i].y as f32);

        silhouette
            .hull
            .iter()
            .filter(|&&idx| idx < n)
            .filter_map(|&idx| {
                let c = polygon[idx];
                let angle = triangle_angle(&as_point2((idx + n - 1) % n), &as_point2((idx + 1) % n), &as_point2(idx));
                let in_band = c.y >= hand.y && c.y <= hand.y + hand.height;
                (angle < self.angle_threshold && in_band).then(|| {
                    FingertipCandidate::new(Point3::new(c.x as f32, c.y as f32, context.depth_at(c.x, c.y)), 1.0)
                })
            })
            .collect()
    }

    fn name(&self) -> &str {
        "HullAngle"
    }
}
