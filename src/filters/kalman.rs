use super::FingertipFilter;
use crate::forelimb::Forelimb;
use crate::{Error, Result};
use log::debug;
use nalgebra::{Matrix2, Matrix2x4, Matrix4, Point3, Vector2, Vector4};

/// Kalman filter over `[x, y, vx, vy]` of the first forelimb's fingertip
pub struct KalmanFilter {
    // State: [x, y, vx, vy]
    state: Vector4<f32>,
    // State covariance
    covariance: Matrix4<f32>,
    // Process noise
    process_noise: Matrix4<f32>,
    // Measurement noise
    measurement_noise: Matrix2<f32>,
    // State transition matrix
    transition: Matrix4<f32>,
    // Measurement matrix
    measurement: Matrix2x4<f32>,
    // Maximum distance between prediction and associated observation
    gating_distance: f32,
    initialized: bool,
}

impl KalmanFilter {
    /// # Errors
    ///
    /// Returns [`Error::FilterError`] if `gating_distance` is not positive
    pub fn new(gating_distance: f32) -> Result<Self> {
        if gating_distance.is_nan() || gating_distance <= 0.0 {
            return Err(Error::FilterError(format!("Gating distance must be positive, got {gating_distance}")));
        }
        Ok(Self::with_gating(gating_distance))
    }

    fn with_gating(gating_distance: f32) -> Self {
        // Constant velocity, one frame per step
        #[rustfmt::skip]
        let transition = Matrix4::new(
            1.0, 0.0, 1.0, 0.0,
            0.0, 1.0, 0.0, 1.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        // We only measure position
        #[rustfmt::skip]
        let measurement = Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        );

        // Velocity is far less certain than position
        let process_noise = Matrix4::from_diagonal(&Vector4::new(1.0, 1.0, 10.0, 10.0));

        Self {
            state: Vector4::zeros(),
            covariance: Matrix4::identity(),
            process_noise,
            measurement_noise: Matrix2::identity(),
            transition,
            measurement,
            gating_distance,
            initialized: false,
        }
    }

    /// Whether the filter is tracking a fingertip
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn initialize(&mut self, x: f32, y: f32) {
        self.state = Vector4::new(x, y, 0.0, 0.0);
        self.covariance = Matrix4::identity();
        self.initialized = true;
    }

    fn predict(&mut self) -> Vector2<f32> {
        self.state = self.transition * self.state;
        self.covariance = self.transition * self.covariance * self.transition.transpose() + self.process_noise;
        Vector2::new(self.state[0], self.state[1])
    }

    fn correct(&mut self, observation: Vector2<f32>) {
        let innovation = observation - self.measurement * self.state;
        let innovation_cov = self.measurement * self.covariance * self.measurement.transpose() + self.measurement_noise;
        // Positive definite: covariance terms plus identity measurement noise
        let Some(inverse) = innovation_cov.try_inverse() else {
            debug!("Singular innovation covariance, skipping correction");
            return;
        };
        let gain = self.covariance * self.measurement.transpose() * inverse;
        self.state += gain * innovation;
        self.covariance = (Matrix4::identity() - gain * self.measurement) * self.covariance;
    }
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::with_gating(crate::constants::KALMAN_GATING_DISTANCE)
    }
}

impl FingertipFilter for KalmanFilter {
    fn apply(&mut self, forelimbs: &[Forelimb]) -> Option<Point3<f32>> {
        let candidates = forelimbs.first().map(Forelimb::fingertips).unwrap_or_default();
        if candidates.is_empty() {
            self.reset();
            return None;
        }

        if !self.initialized {
            // Hand assumed to extend from the bottom of the image
            let best = candidates
                .iter()
                .min_by(|a, b| a.y.total_cmp(&b.y))
                .copied()?;
            self.initialize(best.x, best.y);
            return Some(best);
        }

        let predicted = self.predict();
        let closest = candidates
            .iter()
            .map(|c| ((Vector2::new(c.x, c.y) - predicted).norm_squared(), c))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(d2, c)| (d2.sqrt(), *c))?;

        if closest.0 > self.gating_distance {
            debug!("Nearest fingertip {:.1} px from prediction, beyond gate", closest.0);
            return None;
        }
        self.correct(Vector2::new(closest.1.x, closest.1.y));
        Some(Point3::new(self.state[0], self.state[1], closest.1.z))
    }

    fn reset(&mut self) {
        self.state = Vector4::zeros();
        self.covariance = Matrix4::identity();
        self.initialized = false;
    }

    fn name(&self) -> &str {
        "Kalman"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forelimb::FingertipCandidate;

    fn forelimb(points: &[(f32, f32, f32)]) -> Vec<Forelimb> {
        vec![Forelimb::from_fingertips(
            points
                .iter()
                .map(|&(x, y, z)| FingertipCandidate::new(Point3::new(x, y, z), 1.0))
                .collect(),
        )]
    }

    #[test]
    fn test_initializes_at_topmost_candidate() {
        let mut filter = KalmanFilter::default();
        let out = filter.apply(&forelimb(&[(10.0, 50.0, 800.0), (30.0, 20.0, 810.0)]));
        assert_eq!(out, Some(Point3::new(30.0, 20.0, 810.0)));
        assert!(filter.is_initialized());
    }

    #[test]
    fn test_smooths_toward_observation() {
        let mut filter = KalmanFilter::default();
        filter.apply(&forelimb(&[(10.0, 10.0, 800.0)]));
        let out = filter.apply(&forelimb(&[(12.0, 10.0, 805.0)])).unwrap();
        assert!(out.x > 10.0 && out.x < 12.0);
        assert!((out.y - 10.0).abs() < 1e-4);
        assert_eq!(out.z, 805.0);
    }

    #[test]
    fn test_gating_rejects_distant_candidate() {
        let mut filter = KalmanFilter::new(5.0).unwrap();
        filter.apply(&forelimb(&[(10.0, 10.0, 800.0)]));
        assert_eq!(filter.apply(&forelimb(&[(100.0, 100.0, 800.0)])), None);
        assert!(filter.is_initialized());
    }

    #[test]
    fn test_invalid_gating_distance() {
        assert!(matches!(KalmanFilter::new(0.0), Err(Error::FilterError(_))));
        assert!(KalmanFilter::new(f32::NAN).is_err());
    }

    #[test]
    fn test_reset_on_missing_observation() {
        let mut filter = KalmanFilter::default();
        filter.apply(&forelimb(&[(10.0, 10.0, 800.0)]));
        assert_eq!(filter.apply(&[]), None);
        assert!(!filter.is_initialized());
        assert_eq!(filter.apply(&forelimb(&[(70.0, 5.0, 820.0)])), Some(Point3::new(70.0, 5.0, 820.0)));
    }
}
