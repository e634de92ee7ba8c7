//! Mapping from depth-image coordinates to display coordinates.
//!
//! Two models are supported: a planar homography, and an extrinsic pose of
//! the display plane relative to a camera with fixed intrinsics and lens
//! distortion. Both can be fitted from corresponding point lists and stored
//! in a YAML calibration file.

use crate::utils::safe_cast::usize_to_i32;
use crate::{Error, Result};
use log::{debug, info};
use nalgebra::{Matrix3, Point2, Rotation3, Vector3};
use opencv::calib3d;
use opencv::core::{Mat, Point2f, Point3f, Vector, CV_64F};
use opencv::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Minimum number of corresponding points for a fit
pub const MIN_CALIBRATION_POINTS: usize = 4;

/// Maps image coordinates to display coordinates
pub trait CalibrationTransform: Send + Sync {
    /// Display position of an image position
    fn image_to_display(&self, x: f32, y: f32) -> Point2<f32>;

    /// Sum of squared distances between converted image points and their
    /// measured display points
    ///
    /// # Errors
    ///
    /// Returns an error if the lists differ in length
    fn reprojection_error(&self, display: &[Point2<f32>], image: &[Point2<f32>]) -> Result<f32> {
        check_correspondences(image, display, 0)?;
        Ok(display
            .iter()
            .zip(image)
            .map(|(d, i)| (self.image_to_display(i.x, i.y) - d).norm_squared())
            .sum())
    }
}

/// Display coordinates equal image coordinates
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCalibration;

impl CalibrationTransform for IdentityCalibration {
    fn image_to_display(&self, x: f32, y: f32) -> Point2<f32> {
        Point2::new(x, y)
    }
}

fn check_correspondences(image: &[Point2<f32>], display: &[Point2<f32>], minimum: usize) -> Result<()> {
    if image.len() != display.len() {
        return Err(Error::InvalidInput(format!(
            "Calibration needs equal point lists, got {} image and {} display points",
            image.len(),
            display.len()
        )));
    }
    if image.len() < minimum {
        return Err(Error::InvalidInput(format!(
            "Calibration needs at least {minimum} point pairs, got {}",
            image.len()
        )));
    }
    Ok(())
}

/// Planar homography from image to display
#[derive(Debug, Clone, PartialEq)]
pub struct HomographyCalibration {
    matrix: Matrix3<f64>,
}

impl HomographyCalibration {
    /// Wrap an image-to-display homography
    #[must_use]
    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    /// The homography matrix
    #[must_use]
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Least-squares homography from corresponding points
    ///
    /// # Errors
    ///
    /// Returns an error for unequal lists, fewer than four pairs, or a
    /// failed fit
    pub fn fit(image_points: &[Point2<f32>], display_points: &[Point2<f32>]) -> Result<Self> {
        check_correspondences(image_points, display_points, MIN_CALIBRATION_POINTS)?;
        let src: Vector<Point2f> = image_points.iter().map(|p| Point2f::new(p.x, p.y)).collect();
        let dst: Vector<Point2f> = display_points.iter().map(|p| Point2f::new(p.x, p.y)).collect();
        let mut mask = Mat::default();
        let h = calib3d::find_homography(&src, &dst, &mut mask, 0, 3.0)?;
        if h.rows() != 3 || h.cols() != 3 {
            return Err(Error::Calibration("Homography estimation failed".to_string()));
        }
        let mut matrix = Matrix3::zeros();
        for row in 0..3 {
            for col in 0..3 {
                matrix[(row, col)] = *h.at_2d::<f64>(usize_to_i32(row)?, usize_to_i32(col)?)?;
            }
        }
        info!("Fitted homography from {} point pairs", image_points.len());
        Ok(Self { matrix })
    }
}

impl CalibrationTransform for HomographyCalibration {
    #[allow(clippy::cast_possible_truncation)]
    fn image_to_display(&self, x: f32, y: f32) -> Point2<f32> {
        let p = self.matrix * Vector3::new(f64::from(x), f64::from(y), 1.0);
        if p.z.abs() <= f64::EPSILON {
            return Point2::new(f32::NAN, f32::NAN);
        }
        Point2::new((p.x / p.z) as f32, (p.y / p.z) as f32)
    }
}

/// Pinhole intrinsics with `k1, k2, p1, p2, k3` lens distortion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub distortion: [f64; 5],
}

impl Default for CameraIntrinsics {
    /// Calibrated intrinsics of the tabletop camera
    fn default() -> Self {
        Self {
            fx: 5.942_143_421_192_325e2,
            fy: 5.910_405_369_687_078e2,
            cx: 3.393_078_097_530_031e2,
            cy: 2.427_391_376_175_162e2,
            distortion: [
                -2.638_648_975_312_883e-1,
                9.996_683_216_372_976e-1,
                -7.627_586_214_361_067e-4,
                5.035_094_009_081_427e-3,
                -1.305_362_808_997_632,
            ],
        }
    }
}

impl CameraIntrinsics {
    /// Intrinsics without lens distortion
    #[must_use]
    pub fn undistorted(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            distortion: [0.0; 5],
        }
    }

    /// Normalized, undistorted camera coordinates of a pixel
    #[must_use]
    pub fn undistort(&self, u: f64, v: f64) -> (f64, f64) {
        let [k1, k2, p1, p2, k3] = self.distortion;
        let x0 = (u - self.cx) / self.fx;
        let y0 = (v - self.cy) / self.fy;
        let (mut x, mut y) = (x0, y0);
        for _ in 0..20 {
            let r2 = x * x + y * y;
            let inverse = 1.0 / (1.0 + ((k3 * r2 + k2) * r2 + k1) * r2);
            let dx = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
            let dy = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
            x = (x0 - dx) * inverse;
            y = (y0 - dy) * inverse;
        }
        (x, y)
    }

    /// Pixel of a normalized camera coordinate after lens distortion
    #[must_use]
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let [k1, k2, p1, p2, k3] = self.distortion;
        let r2 = x * x + y * y;
        let radial = 1.0 + ((k3 * r2 + k2) * r2 + k1) * r2;
        let xd = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        (xd * self.fx + self.cx, yd * self.fy + self.cy)
    }

    fn camera_matrix(&self) -> Result<Mat> {
        let mut matrix = Mat::zeros(3, 3, CV_64F)?.to_mat()?;
        let values = [self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0];
        for (idx, &value) in values.iter().enumerate() {
            *matrix.at_2d_mut::<f64>(usize_to_i32(idx / 3)?, usize_to_i32(idx % 3)?)? = value;
        }
        Ok(matrix)
    }

    fn distortion_coeffs(&self) -> Result<Mat> {
        let mut coeffs = Mat::zeros(5, 1, CV_64F)?.to_mat()?;
        for (idx, &value) in self.distortion.iter().enumerate() {
            *coeffs.at_2d_mut::<f64>(usize_to_i32(idx)?, 0)? = value;
        }
        Ok(coeffs)
    }
}

/// Pose of the display plane (z = 0) in camera coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct ExtrinsicCalibration {
    intrinsics: CameraIntrinsics,
    rotation: Rotation3<f64>,
    translation: Vector3<f64>,
}

impl ExtrinsicCalibration {
    /// Build from a Rodrigues rotation vector and a translation
    #[must_use]
    pub fn from_rodrigues(rotation: [f64; 3], translation: [f64; 3], intrinsics: CameraIntrinsics) -> Self {
        Self {
            intrinsics,
            rotation: Rotation3::new(Vector3::from(rotation)),
            translation: Vector3::from(translation),
        }
    }

    /// Rodrigues rotation vector
    #[must_use]
    pub fn rotation_vector(&self) -> [f64; 3] {
        self.rotation.scaled_axis().into()
    }

    /// Translation of the display origin in camera coordinates
    #[must_use]
    pub fn translation(&self) -> [f64; 3] {
        self.translation.into()
    }

    /// Camera intrinsics
    #[must_use]
    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    /// Solve the display pose from corresponding image and display points
    ///
    /// # Errors
    ///
    /// Returns an error for unequal lists, fewer than four pairs, or a
    /// failed `solvePnP`
    pub fn fit(
        image_points: &[Point2<f32>],
        display_points: &[Point2<f32>],
        intrinsics: CameraIntrinsics,
    ) -> Result<Self> {
        check_correspondences(image_points, display_points, MIN_CALIBRATION_POINTS)?;
        let object: Vector<Point3f> = display_points.iter().map(|p| Point3f::new(p.x, p.y, 0.0)).collect();
        let image: Vector<Point2f> = image_points.iter().map(|p| Point2f::new(p.x, p.y)).collect();

        let mut rvec = Mat::default();
        let mut tvec = Mat::default();
        let solved = calib3d::solve_pnp(
            &object,
            &image,
            &intrinsics.camera_matrix()?,
            &intrinsics.distortion_coeffs()?,
            &mut rvec,
            &mut tvec,
            false,
            calib3d::SOLVEPNP_ITERATIVE,
        )?;
        if !solved {
            return Err(Error::Calibration("solvePnP did not converge".to_string()));
        }

        let mut rotation_matrix = Mat::default();
        calib3d::rodrigues(&rvec, &mut rotation_matrix, &mut Mat::default())?;
        let mut rotation = Matrix3::zeros();
        for row in 0..3 {
            for col in 0..3 {
                rotation[(row, col)] = *rotation_matrix.at_2d::<f64>(usize_to_i32(row)?, usize_to_i32(col)?)?;
            }
        }
        let translation = Vector3::new(
            *tvec.at_2d::<f64>(0, 0)?,
            *tvec.at_2d::<f64>(1, 0)?,
            *tvec.at_2d::<f64>(2, 0)?,
        );
        debug!("Extrinsic rotation {rotation:?}, translation {translation:?}");
        Ok(Self {
            intrinsics,
            rotation: Rotation3::from_matrix(&rotation),
            translation,
        })
    }

    /// Image position of a display point
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn display_to_image(&self, x: f32, y: f32) -> Point2<f32> {
        let camera = self.rotation * Vector3::new(f64::from(x), f64::from(y), 0.0) + self.translation;
        let (u, v) = self.intrinsics.distort(camera.x / camera.z, camera.y / camera.z);
        Point2::new(u as f32, v as f32)
    }
}

impl CalibrationTransform for ExtrinsicCalibration {
    /// Intersects the viewing ray of the undistorted pixel with the display
    /// plane
    #[allow(clippy::cast_possible_truncation)]
    fn image_to_display(&self, x: f32, y: f32) -> Point2<f32> {
        let (xn, yn) = self.intrinsics.undistort(f64::from(x), f64::from(y));
        let inverse = self.rotation.inverse();
        let ray = inverse * Vector3::new(xn, yn, 1.0);
        let origin = inverse * self.translation;
        if ray.z.abs() <= f64::EPSILON {
            return Point2::new(f32::NAN, f32::NAN);
        }
        let scale = origin.z / ray.z;
        let display = ray * scale - origin;
        Point2::new(display.x as f32, display.y as f32)
    }
}

/// Persisted calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum CalibrationFile {
    /// Row-major 3x3 image-to-display homography
    Homography { matrix: [[f64; 3]; 3] },
    /// Rodrigues rotation and translation of the display plane
    Extrinsic {
        rotation: [f64; 3],
        translation: [f64; 3],
        #[serde(default)]
        intrinsics: CameraIntrinsics,
    },
}

impl CalibrationFile {
    /// Load a calibration file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Calibration`] if the file is missing or corrupt
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Calibration(format!("Cannot read {}: {e}", path.display())))?;
        let file: Self = serde_yaml::from_str(&contents)
            .map_err(|e| Error::Calibration(format!("Corrupt calibration {}: {e}", path.display())))?;
        info!("Loaded {} calibration from {}", file.model_name(), path.display());
        Ok(file)
    }

    /// Save the calibration as YAML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Model name
    #[must_use]
    pub fn model_name(&self) -> &'static str {
        match self {
            Self::Homography { .. } => "homography",
            Self::Extrinsic { .. } => "extrinsic",
        }
    }

    /// Build the transform this file describes
    #[must_use]
    pub fn into_transform(self) -> Box<dyn CalibrationTransform> {
        match self {
            Self::Homography { matrix } => Box::new(HomographyCalibration::from_matrix(Matrix3::from_fn(|r, c| matrix[r][c]))),
            Self::Extrinsic {
                rotation,
                translation,
                intrinsics,
            } => Box::new(ExtrinsicCalibration::from_rodrigues(rotation, translation, intrinsics)),
        }
    }
}

impl From<&HomographyCalibration> for CalibrationFile {
    fn from(calibration: &HomographyCalibration) -> Self {
        let m = calibration.matrix();
        Self::Homography {
            matrix: [
                [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
                [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
                [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
            ],
        }
    }
}

impl From<&ExtrinsicCalibration> for CalibrationFile {
    fn from(calibration: &ExtrinsicCalibration) -> Self {
        Self::Extrinsic {
            rotation: calibration.rotation_vector(),
            translation: calibration.translation(),
            intrinsics: *calibration.intrinsics(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        assert_eq!(IdentityCalibration.image_to_display(3.0, 4.0), Point2::new(3.0, 4.0));
    }

    #[test]
    fn test_homography_application() {
        let calibration = HomographyCalibration::from_matrix(Matrix3::new(2.0, 0.0, 10.0, 0.0, 2.0, -5.0, 0.0, 0.0, 1.0));
        assert_eq!(calibration.image_to_display(1.0, 1.0), Point2::new(12.0, -3.0));
    }

    #[test]
    fn test_unequal_lists_rejected_before_fit() {
        let image = vec![Point2::new(0.0, 0.0); 5];
        let display = vec![Point2::new(0.0, 0.0); 4];
        assert!(matches!(HomographyCalibration::fit(&image, &display), Err(Error::InvalidInput(_))));
        assert!(matches!(
            ExtrinsicCalibration::fit(&image, &display, CameraIntrinsics::default()),
            Err(Error::InvalidInput(_))
        ));
        let few = vec![Point2::new(0.0, 0.0); 3];
        assert!(matches!(HomographyCalibration::fit(&few, &few), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_undistort_inverts_distort() {
        let intrinsics = CameraIntrinsics::default();
        let (u, v) = intrinsics.distort(0.2, -0.15);
        let (x, y) = intrinsics.undistort(u, v);
        assert!((x - 0.2).abs() < 1e-6);
        assert!((y + 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_extrinsic_round_trip() {
        let calibration = ExtrinsicCalibration::from_rodrigues([0.1, -0.05, 0.02], [-300.0, -200.0, 1500.0], CameraIntrinsics::default());
        let image = calibration.display_to_image(350.0, 180.0);
        let display = calibration.image_to_display(image.x, image.y);
        assert!((display.x - 350.0).abs() < 0.05);
        assert!((display.y - 180.0).abs() < 0.05);
    }

    #[test]
    fn test_reprojection_error() {
        let calibration = HomographyCalibration::from_matrix(Matrix3::identity());
        let display = vec![Point2::new(1.0, 1.0), Point2::new(3.0, 3.0)];
        let image = vec![Point2::new(1.0, 2.0), Point2::new(3.0, 3.0)];
        assert!((calibration.reprojection_error(&display, &image).unwrap() - 1.0).abs() < 1e-6);
        assert!(calibration.reprojection_error(&display, &image[..1]).is_err());
    }
}
