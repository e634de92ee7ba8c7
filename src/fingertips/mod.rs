//! Fingertip detection strategies.
//!
//! Three interchangeable detectors share the [`FingertipDetector`] contract:
//! a silhouette with a hand region in, fingertip candidates out. The
//! strategy is chosen once through [`DetectorKind`].

/// Adjacent convexity-defect pairs with bisector refinement
pub mod convexity_defects;

/// Sharp convex-hull vertices
pub mod hull_angle;

/// Morphological skeleton of the hand region
pub mod thinning;

use crate::constants::{FINGERTIP_ANGLE, FINGERTIP_WIDTH, GRADIENT_THRESHOLD, HULL_FINGERTIP_ANGLE};
use crate::forelimb::FingertipCandidate;
use crate::regions::Silhouette;
use crate::segmentation::Segmentation;
use crate::sensor::DepthFrame;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use convexity_defects::ConvexityDefectDetector;
pub use hull_angle::HullAngleDetector;
pub use thinning::ThinningDetector;

/// Per-frame images a detector may read
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    /// Raw depth frame
    pub frame: &'a DepthFrame,
    /// Segmentation of `frame`
    pub segmentation: &'a Segmentation,
}

impl FrameContext<'_> {
    /// Raw depth at a pixel as `f32`, 0 outside the frame
    #[must_use]
    pub fn depth_at(&self, x: i32, y: i32) -> f32 {
        match (usize::try_from(x), usize::try_from(y)) {
            (Ok(x), Ok(y)) => self.frame.depth_at(x, y).map_or(0.0, f32::from),
            _ => 0.0,
        }
    }
}

/// Trait for all fingertip detectors
pub trait FingertipDetector: Send + Sync {
    /// Fingertip candidates of one silhouette; empty without a hand region
    fn detect(&self, silhouette: &Silhouette, context: &FrameContext<'_>) -> Vec<FingertipCandidate>;

    /// Get detector name
    fn name(&self) -> &str;
}

/// Available detection strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// Convexity-defect pairs
    #[default]
    ConvexityDefects,
    /// Hull vertex angle
    HullAngle,
    /// Skeleton thinning
    Thinning,
}

impl FromStr for DetectorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "convexity_defects" | "defects" => Ok(Self::ConvexityDefects),
            "hull_angle" | "hull" => Ok(Self::HullAngle),
            "thinning" | "skeleton" => Ok(Self::Thinning),
            _ => Err(Error::DetectorError(format!("Unknown detector type: {s}"))),
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConvexityDefects => "convexity_defects",
            Self::HullAngle => "hull_angle",
            Self::Thinning => "thinning",
        };
        f.write_str(name)
    }
}

/// Thresholds shared by the detectors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorParams {
    /// Maximum angle between defect vectors (radians)
    pub angle_threshold: f32,
    /// Maximum triangle angle at a hull vertex (radians)
    pub hull_angle_threshold: f32,
    /// Fingertip width in pixels
    pub fingertip_width: f32,
    /// Derivative magnitude ending the bisector walk
    pub gradient_threshold: f32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            angle_threshold: FINGERTIP_ANGLE,
            hull_angle_threshold: HULL_FINGERTIP_ANGLE,
            fingertip_width: FINGERTIP_WIDTH,
            gradient_threshold: GRADIENT_THRESHOLD,
        }
    }
}

/// Create a detector of the given kind
///
/// # Errors
///
/// Returns [`Error::DetectorError`] if a threshold of the chosen kind is not
/// positive
pub fn create_detector(kind: DetectorKind, params: &DetectorParams) -> Result<Box<dyn FingertipDetector>> {
    Ok(match kind {
        DetectorKind::ConvexityDefects => Box::new(ConvexityDefectDetector::new(
            params.angle_threshold,
            params.fingertip_width,
            params.gradient_threshold,
        )?),
        DetectorKind::HullAngle => Box::new(HullAngleDetector::new(params.hull_angle_threshold)?),
        DetectorKind::Thinning => Box::new(ThinningDetector::default()),
    })
}

pub(crate) fn check_threshold(name: &str, value: f32) -> Result<()> {
    if value.is_nan() || value <= 0.0 {
        return Err(Error::DetectorError(format!("{name} must be positive, got {value}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_kind_parsing() {
        assert_eq!("convexity_defects".parse::<DetectorKind>().unwrap(), DetectorKind::ConvexityDefects);
        assert_eq!("Hull-Angle".parse::<DetectorKind>().unwrap(), DetectorKind::HullAngle);
        assert_eq!("thinning".parse::<DetectorKind>().unwrap(), DetectorKind::Thinning);
        assert!("sift".parse::<DetectorKind>().is_err());
        assert_eq!(DetectorKind::default().to_string(), "convexity_defects");
    }

    #[test]
    fn test_create_detector() {
        let params = DetectorParams::default();
        for kind in [DetectorKind::ConvexityDefects, DetectorKind::HullAngle, DetectorKind::Thinning] {
            let detector = create_detector(kind, &params).unwrap();
            assert!(!detector.name().is_empty());
        }
        let zero_gradient = DetectorParams {
            gradient_threshold: 0.0,
            ..DetectorParams::default()
        };
        assert!(matches!(
            create_detector(DetectorKind::ConvexityDefects, &zero_gradient),
            Err(Error::DetectorError(_))
        ));
        // Thresholds of other kinds are not consulted
        assert!(create_detector(DetectorKind::Thinning, &zero_gradient).is_ok());
    }

    #[test]
    fn test_depth_outside_frame_is_zero() {
        let frame = DepthFrame::filled(0, 4, 4, 700);
        let segmentation = Segmentation::empty(4, 4);
        let context = FrameContext {
            frame: &frame,
            segmentation: &segmentation,
        };
        assert_eq!(context.depth_at(1, 1), 700.0);
        assert_eq!(context.depth_at(-1, 1), 0.0);
        assert_eq!(context.depth_at(4, 0), 0.0);
    }
}
