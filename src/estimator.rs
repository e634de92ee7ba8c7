//! Builds the per-frame forelimb models from silhouettes.

use crate::fingertips::{FingertipDetector, FrameContext};
use crate::forelimb::{Forelimb, TrackedPoint};
use crate::hand_features::{foreground_points, HandFeatureDetector, HandMotion};
use crate::regions::Silhouette;
use crate::sensor::CoordinateConverter;
use crate::surface::InteractionSurface;
use crate::Result;
use log::debug;
use nalgebra::{Point3, Vector3};
use opencv::core::Rect;

#[allow(clippy::cast_precision_loss)]
fn centroid(points: &[Point3<f32>]) -> Option<Point3<f32>> {
    if points.is_empty() {
        return None;
    }
    let sum = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Some(Point3::from(sum / points.len() as f32))
}

/// Centroid of the foreground pixels of `region`, in image and world space
///
/// # Errors
///
/// Returns an error if coordinate conversion fails
pub fn arm_joint(
    region: Rect,
    context: &FrameContext<'_>,
    converter: &dyn CoordinateConverter,
) -> Result<Option<TrackedPoint>> {
    let points = foreground_points(region, &context.segmentation.mask, context.frame);
    let Some(image) = centroid(&points) else {
        return Ok(None);
    };
    let world = converter.projective_to_world(&points)?;
    Ok(centroid(&world).map(|world| TrackedPoint { image, world }))
}

/// Turns silhouettes into [`Forelimb`]s
pub struct ForelimbModelEstimator {
    detector: Box<dyn FingertipDetector>,
    hand_features: HandFeatureDetector,
    motion: HandMotion,
}

impl ForelimbModelEstimator {
    #[must_use]
    pub fn new(detector: Box<dyn FingertipDetector>) -> Self {
        Self {
            detector,
            hand_features: HandFeatureDetector,
            motion: HandMotion::default(),
        }
    }

    /// Name of the fingertip detector in use
    #[must_use]
    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// One forelimb per silhouette with a hand region, in silhouette order.
    ///
    /// Only the first hand of the frame feeds the motion estimate.
    ///
    /// # Errors
    ///
    /// Returns an error if coordinate conversion fails
    pub fn estimate(
        &mut self,
        silhouettes: &[Silhouette],
        context: &FrameContext<'_>,
        converter: &dyn CoordinateConverter,
        surface: &InteractionSurface,
    ) -> Result<Vec<Forelimb>> {
        let mut forelimbs = Vec::with_capacity(silhouettes.len());
        let mut hand_seen = false;

        for silhouette in silhouettes {
            let Some(hand_region) = silhouette.hand_region else {
                continue;
            };

            let candidates = self.detector.detect(silhouette, context);
            let positions: Vec<Point3<f32>> = candidates.iter().map(|c| c.position).collect();
            let world = converter.projective_to_world(&positions)?;

            let joint = match silhouette.arm_joint_region {
                Some(region) => arm_joint(region, context, converter)?,
                None => None,
            };

            let mut hand = self.hand_features.detect(
                hand_region,
                &context.segmentation.cleaned,
                context.frame,
                converter,
                surface,
            )?;
            if let Some(hand) = hand.as_mut() {
                if !hand_seen {
                    self.motion.update(hand);
                    hand_seen = true;
                }
            }

            debug!(
                "{}: {} fingertip candidates in hand region {:?}",
                self.detector.name(),
                candidates.len(),
                hand_region
            );
            forelimbs.push(Forelimb::new(candidates, world, joint, hand));
        }

        if !hand_seen {
            self.motion.reset();
        }
        Ok(forelimbs)
    }

    /// Forget the hand motion history
    pub fn reset(&mut self) {
        self.motion.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::Segmentation;
    use crate::sensor::{DepthFrame, PinholeCamera};

    #[test]
    fn test_arm_joint_centroid() {
        let frame = DepthFrame::filled(0, 10, 10, 1000);
        let mut segmentation = Segmentation::empty(10, 10);
        segmentation.mask[(2, 2)] = 255;
        segmentation.mask[(2, 4)] = 255;
        segmentation.mask[(4, 3)] = 255;
        let context = FrameContext {
            frame: &frame,
            segmentation: &segmentation,
        };
        let camera = PinholeCamera::new(100.0, 100.0, 0.0, 0.0);
        let joint = arm_joint(Rect::new(0, 0, 10, 10), &context, &camera).unwrap().unwrap();
        assert!((joint.image.x - 3.0).abs() < 1e-5);
        assert!((joint.image.y - 8.0 / 3.0).abs() < 1e-5);
        assert!((joint.image.z - 1000.0).abs() < 1e-3);
        assert!((joint.world.x - 30.0).abs() < 1e-3);
    }

    #[test]
    fn test_empty_arm_region_has_no_joint() {
        let frame = DepthFrame::filled(0, 10, 10, 1000);
        let segmentation = Segmentation::empty(10, 10);
        let context = FrameContext {
            frame: &frame,
            segmentation: &segmentation,
        };
        let camera = PinholeCamera::centered(100.0, 10, 10);
        assert!(arm_joint(Rect::new(0, 0, 5, 5), &context, &camera).unwrap().is_none());
    }
}
