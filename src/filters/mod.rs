//! Temporal filtering of the tracked fingertip.
//!
//! Filters see the forelimbs of every frame, including frames without a
//! fingertip, and return the smoothed position of the tracked fingertip in
//! image coordinates (x, y, depth). A frame without an observation resets
//! the filter, so smoothing restarts from the next raw observation.

/// Double exponential (level + trend) smoothing
pub mod double_exponential;

/// Constant-velocity Kalman filter with nearest-candidate association
pub mod kalman;

use crate::constants::{KALMAN_GATING_DISTANCE, SMOOTH_FACTOR, TREND_SMOOTH_FACTOR};
use crate::forelimb::Forelimb;
use crate::{Error, Result};
use nalgebra::Point3;

pub use double_exponential::DoubleExponentialFilter;
pub use kalman::KalmanFilter;

/// Trait for all fingertip filters
pub trait FingertipFilter: Send + Sync {
    /// Filter the fingertip of one frame
    fn apply(&mut self, forelimbs: &[Forelimb]) -> Option<Point3<f32>>;

    /// Reset filter state
    fn reset(&mut self);

    /// Get filter name
    fn name(&self) -> &str;
}

/// No-op filter that passes the first fingertip through unchanged
pub struct NoFilter;

impl FingertipFilter for NoFilter {
    fn apply(&mut self, forelimbs: &[Forelimb]) -> Option<Point3<f32>> {
        first_fingertip(forelimbs)
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "NoFilter"
    }
}

/// First fingertip of the first forelimb
pub(crate) fn first_fingertip(forelimbs: &[Forelimb]) -> Option<Point3<f32>> {
    forelimbs.first().and_then(|f| f.fingertips().first().copied())
}

/// Create a fingertip filter by type name.
///
/// Accepts `"name"` or `"name:param"`; the parameter sets both smoothing
/// factors of `double_exponential` or the gating distance of `kalman`.
///
/// # Errors
///
/// Returns [`Error::FilterError`] for unknown names or unparsable parameters
pub fn create_filter(filter_type: &str) -> Result<Box<dyn FingertipFilter>> {
    let (name, param) = match filter_type.split_once(':') {
        Some((name, param)) => {
            let value = param
                .trim()
                .parse::<f32>()
                .map_err(|_| Error::FilterError(format!("Invalid filter parameter in {filter_type}")))?;
            (name, Some(value))
        }
        None => (filter_type, None),
    };

    match name.trim().to_lowercase().as_str() {
        "none" | "nofilter" => Ok(Box::new(NoFilter)),
        "double_exponential" | "doubleexponential" | "exponential" => {
            let alpha = param.unwrap_or(SMOOTH_FACTOR);
            let beta = param.unwrap_or(TREND_SMOOTH_FACTOR);
            Ok(Box::new(DoubleExponentialFilter::new(alpha, beta)?))
        }
        "kalman" => Ok(Box::new(KalmanFilter::new(param.unwrap_or(KALMAN_GATING_DISTANCE))?)),
        _ => Err(Error::FilterError(format!("Unknown filter type: {filter_type}"))),
    }
}
