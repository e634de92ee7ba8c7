//! Pointing-ray intersection with the surface plane.

use crate::forelimb::Forelimb;
use crate::surface::InteractionSurface;
use crate::utils::geometry::line_plane_intersection;
use nalgebra::Point3;

/// Intersects the arm joint to fingertip ray with the surface
#[derive(Debug, Clone, Copy, Default)]
pub struct PointingGestureHandler;

impl PointingGestureHandler {
    /// World points where each forelimb points at the surface.
    ///
    /// Uses the first reported fingertip of forelimbs that have an arm
    /// joint. Empty when the surface plane was not fitted.
    #[must_use]
    pub fn update(&self, forelimbs: &[Forelimb], surface: &InteractionSurface) -> Vec<Point3<f32>> {
        let (Some(center), Some(normal)) = (surface.center(), surface.normal()) else {
            return Vec::new();
        };
        forelimbs
            .iter()
            .filter_map(|forelimb| {
                let joint = forelimb.arm_joint()?;
                let tip = forelimb.fingertips_world().first().copied()?;
                line_plane_intersection(&joint.world, &tip, &center, &normal)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forelimb::{FingertipCandidate, TrackedPoint};
    use nalgebra::Vector3;

    fn surface() -> InteractionSurface {
        InteractionSurface::default()
            .with_plane(Point3::new(0.0, 0.0, 1000.0), Vector3::new(0.0, 0.0, 1.0))
            .unwrap()
    }

    fn pointing_forelimb(joint: Point3<f32>, tip: Point3<f32>) -> Forelimb {
        Forelimb::new(
            vec![FingertipCandidate::new(Point3::new(1.0, 1.0, tip.z), 1.0)],
            vec![tip],
            Some(TrackedPoint { image: Point3::origin(), world: joint }),
            None,
        )
    }

    #[test]
    fn test_ray_hits_plane() {
        let forelimbs = [pointing_forelimb(Point3::new(0.0, 0.0, 800.0), Point3::new(10.0, 0.0, 900.0))];
        let hits = PointingGestureHandler.update(&forelimbs, &surface());
        assert_eq!(hits.len(), 1);
        assert!((hits[0] - Point3::new(20.0, 0.0, 1000.0)).norm() < 1e-3);
    }

    #[test]
    fn test_parallel_ray_misses() {
        let forelimbs = [pointing_forelimb(Point3::new(0.0, 0.0, 900.0), Point3::new(10.0, 0.0, 900.0))];
        assert!(PointingGestureHandler.update(&forelimbs, &surface()).is_empty());
    }

    #[test]
    fn test_no_plane_no_hits() {
        let forelimbs = [pointing_forelimb(Point3::new(0.0, 0.0, 800.0), Point3::new(10.0, 0.0, 900.0))];
        assert!(PointingGestureHandler.update(&forelimbs, &InteractionSurface::default()).is_empty());
    }

    #[test]
    fn test_forelimb_without_joint_ignored() {
        let forelimbs = [Forelimb::new(
            vec![FingertipCandidate::new(Point3::new(1.0, 1.0, 900.0), 1.0)],
            vec![Point3::new(10.0, 0.0, 900.0)],
            None,
            None,
        )];
        assert!(PointingGestureHandler.update(&forelimbs, &surface()).is_empty());
    }
}
