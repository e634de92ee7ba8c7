//! Per-frame forelimb model: fingertips, arm joint and hand pose.

use crate::constants::FINGERTIP_CONFIDENCE_MIN;
use nalgebra::{Point3, Vector3};

/// Fingertip position (image x, image y, raw depth) with a confidence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FingertipCandidate {
    /// Image x, image y, depth in millimeters
    pub position: Point3<f32>,
    /// Confidence in `[0, 1]`
    pub confidence: f32,
}

impl FingertipCandidate {
    /// Create a candidate; confidence is clamped to `[0, 1]`
    #[must_use]
    pub fn new(position: Point3<f32>, confidence: f32) -> Self {
        Self {
            position,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Hand pose estimated from the hand point cloud
#[derive(Debug, Clone, PartialEq)]
pub struct Hand {
    pub(crate) position: Point3<f32>,
    pub(crate) distance_to_surface: f32,
    pub(crate) width: f32,
    pub(crate) velocity: Vector3<f32>,
    pub(crate) acceleration: Vector3<f32>,
    pub(crate) rotation: Vector3<f32>,
    pub(crate) point_cloud: Vec<Point3<f32>>,
}

impl Hand {
    /// Hand center in world coordinates (mm)
    #[must_use]
    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    /// Signed distance from the hand center to the surface plane
    #[must_use]
    pub fn distance_to_surface(&self) -> f32 {
        self.distance_to_surface
    }

    /// Hand width in millimeters
    #[must_use]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// Velocity in millimeters per frame
    #[must_use]
    pub fn velocity(&self) -> Vector3<f32> {
        self.velocity
    }

    /// Acceleration in millimeters per frame squared
    #[must_use]
    pub fn acceleration(&self) -> Vector3<f32> {
        self.acceleration
    }

    /// Euler angles of the hand orientation
    #[must_use]
    pub fn rotation(&self) -> Vector3<f32> {
        self.rotation
    }

    /// Aligned inlier points of the hand
    #[must_use]
    pub fn point_cloud(&self) -> &[Point3<f32>] {
        &self.point_cloud
    }
}

/// Image and world coordinates of the same point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPoint {
    /// Image x, image y, depth
    pub image: Point3<f32>,
    /// World coordinates in millimeters
    pub world: Point3<f32>,
}

/// Immutable per-frame forelimb estimate
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Forelimb {
    fingertips: Vec<FingertipCandidate>,
    fingertips_world: Vec<Point3<f32>>,
    arm_joint: Option<TrackedPoint>,
    hand: Option<Hand>,
}

impl Forelimb {
    /// Build a forelimb.
    ///
    /// `fingertips_world` holds the world coordinates of `fingertips` in the
    /// same order; it may be empty when no conversion is available.
    #[must_use]
    pub fn new(
        fingertips: Vec<FingertipCandidate>,
        fingertips_world: Vec<Point3<f32>>,
        arm_joint: Option<TrackedPoint>,
        hand: Option<Hand>,
    ) -> Self {
        Self {
            fingertips,
            fingertips_world,
            arm_joint,
            hand,
        }
    }

    /// Forelimb with image-space fingertips only
    #[must_use]
    pub fn from_fingertips(fingertips: Vec<FingertipCandidate>) -> Self {
        Self::new(fingertips, Vec::new(), None, None)
    }

    /// Image-space fingertips with confidence above the reporting minimum
    #[must_use]
    pub fn fingertips(&self) -> Vec<Point3<f32>> {
        self.fingertips
            .iter()
            .filter(|c| c.confidence > FINGERTIP_CONFIDENCE_MIN)
            .map(|c| c.position)
            .collect()
    }

    /// All candidates regardless of confidence
    #[must_use]
    pub fn candidates(&self) -> &[FingertipCandidate] {
        &self.fingertips
    }

    /// World-space fingertips with confidence above the reporting minimum
    #[must_use]
    pub fn fingertips_world(&self) -> Vec<Point3<f32>> {
        self.fingertips
            .iter()
            .zip(&self.fingertips_world)
            .filter(|(c, _)| c.confidence > FINGERTIP_CONFIDENCE_MIN)
            .map(|(_, w)| *w)
            .collect()
    }

    /// Arm joint, if found
    #[must_use]
    pub fn arm_joint(&self) -> Option<&TrackedPoint> {
        self.arm_joint.as_ref()
    }

    /// Hand pose, if estimated
    #[must_use]
    pub fn hand(&self) -> Option<&Hand> {
        self.hand.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_confidence_fingertips_hidden() {
        let forelimb = Forelimb::new(
            vec![
                FingertipCandidate::new(Point3::new(1.0, 2.0, 3.0), 1.0),
                FingertipCandidate::new(Point3::new(4.0, 5.0, 6.0), 0.5),
            ],
            vec![Point3::new(10.0, 20.0, 30.0), Point3::new(40.0, 50.0, 60.0)],
            None,
            None,
        );
        assert_eq!(forelimb.fingertips(), vec![Point3::new(1.0, 2.0, 3.0)]);
        assert_eq!(forelimb.fingertips_world(), vec![Point3::new(10.0, 20.0, 30.0)]);
        assert_eq!(forelimb.candidates().len(), 2);
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(FingertipCandidate::new(Point3::origin(), 3.0).confidence, 1.0);
        assert_eq!(FingertipCandidate::new(Point3::origin(), -1.0).confidence, 0.0);
    }
}
