use super::{first_fingertip, FingertipFilter};
use crate::forelimb::Forelimb;
use crate::{Error, Result};
use nalgebra::{Point3, Vector3};

/// Holt double exponential smoothing of the first fingertip
pub struct DoubleExponentialFilter {
    alpha: f32,
    beta: f32,
    level: Option<Point3<f32>>,
    trend: Option<Vector3<f32>>,
}

impl DoubleExponentialFilter {
    /// # Errors
    ///
    /// Returns [`Error::FilterError`] if a factor is outside `(0, 1]`
    pub fn new(alpha: f32, beta: f32) -> Result<Self> {
        for (name, value) in [("Alpha", alpha), ("Beta", beta)] {
            if value.is_nan() || value <= 0.0 || value > 1.0 {
                return Err(Error::FilterError(format!("{name} must be in (0, 1], got {value}")));
            }
        }
        Ok(Self {
            alpha,
            beta,
            level: None,
            trend: None,
        })
    }

    /// Smooth one raw observation
    pub fn update(&mut self, raw: Point3<f32>) -> Point3<f32> {
        match (self.level, self.trend) {
            (None, _) => {
                self.level = Some(raw);
            }
            (Some(previous), None) => {
                self.trend = Some(raw - previous);
                self.level = Some(raw);
            }
            (Some(previous), Some(trend)) => {
                let level = raw.coords * self.alpha + (previous.coords + trend) * (1.0 - self.alpha);
                let level = Point3::from(level);
                self.trend = Some((level - previous) * self.beta + trend * (1.0 - self.beta));
                self.level = Some(level);
                return level;
            }
        }
        raw
    }
}

impl Default for DoubleExponentialFilter {
    fn default() -> Self {
        Self {
            alpha: crate::constants::SMOOTH_FACTOR,
            beta: crate::constants::TREND_SMOOTH_FACTOR,
            level: None,
            trend: None,
        }
    }
}

impl FingertipFilter for DoubleExponentialFilter {
    fn apply(&mut self, forelimbs: &[Forelimb]) -> Option<Point3<f32>> {
        match first_fingertip(forelimbs) {
            Some(raw) => Some(self.update(raw)),
            None => {
                self.reset();
                None
            }
        }
    }

    fn reset(&mut self) {
        self.level = None;
        self.trend = None;
    }

    fn name(&self) -> &str {
        "DoubleExponential"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization_passes_raw_values() {
        let mut filter = DoubleExponentialFilter::new(0.5, 0.5).unwrap();
        assert_eq!(filter.update(Point3::new(10.0, 10.0, 100.0)), Point3::new(10.0, 10.0, 100.0));
        assert_eq!(filter.update(Point3::new(12.0, 10.0, 100.0)), Point3::new(12.0, 10.0, 100.0));
    }

    #[test]
    fn test_smoothing_follows_trend() {
        let mut filter = DoubleExponentialFilter::new(0.5, 0.5).unwrap();
        filter.update(Point3::new(0.0, 0.0, 0.0));
        filter.update(Point3::new(2.0, 0.0, 0.0));
        // level = 0.5 * 3 + 0.5 * (2 + 2) = 3.5, trend = 0.5 * 1.5 + 0.5 * 2 = 1.75
        let smoothed = filter.update(Point3::new(3.0, 0.0, 0.0));
        assert!((smoothed.x - 3.5).abs() < 1e-6);
        let next = filter.update(Point3::new(3.0, 0.0, 0.0));
        assert!((next.x - (0.5 * 3.0 + 0.5 * (3.5 + 1.75))).abs() < 1e-6);
    }

    #[test]
    fn test_unit_factors_track_raw() {
        let mut filter = DoubleExponentialFilter::new(1.0, 1.0).unwrap();
        for x in [1.0, 5.0, -3.0, 8.0] {
            assert_eq!(filter.update(Point3::new(x, 0.0, 0.0)).x, x);
        }
    }

    #[test]
    fn test_invalid_factors() {
        assert!(matches!(DoubleExponentialFilter::new(0.0, 0.5), Err(Error::FilterError(_))));
        assert!(DoubleExponentialFilter::new(0.5, 1.5).is_err());
        assert!(DoubleExponentialFilter::new(f32::NAN, 0.5).is_err());
    }

    #[test]
    fn test_gap_resets() {
        let mut filter = DoubleExponentialFilter::default();
        filter.update(Point3::new(0.0, 0.0, 0.0));
        filter.update(Point3::new(5.0, 0.0, 0.0));
        assert_eq!(filter.apply(&[]), None);
        assert_eq!(filter.update(Point3::new(40.0, 1.0, 2.0)), Point3::new(40.0, 1.0, 2.0));
    }
}
