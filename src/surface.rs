//! Interaction surface: plane geometry and the per-pixel contact band.

use crate::background::BackgroundStatistics;
use crate::constants::CONTACT_DIFF_SCALE;
use crate::sensor::CoordinateConverter;
use crate::utils::geometry::{closest_points_line_to_line, fit_line, midpoint};
use crate::utils::safe_cast::round_to_pixel;
use crate::{Error, Result};
use log::{info, warn};
use nalgebra::{Point3, Vector3};
use ndarray::Array2;

/// Decides whether a fingertip touches the surface
pub trait ContactTest {
    /// Whether depth `z` (mm) at image position (`x`, `y`) is in contact
    fn is_in_contact(&self, x: f32, y: f32, z: f32) -> bool;
}

/// Surface plane and contact test, fit once per session
#[derive(Debug, Clone)]
pub struct InteractionSurface {
    avg_mm: Array2<f32>,
    diff_mm: Array2<f32>,
    diff_scale: f32,
    center: Option<Point3<f32>>,
    normal: Option<Vector3<f32>>,
}

impl InteractionSurface {
    /// Fit the surface from finalized background statistics.
    ///
    /// The plane is absent when the mid row or mid column has fewer than two
    /// valid samples or the fitted lines are parallel; contact testing works
    /// either way.
    ///
    /// # Errors
    ///
    /// Returns an error if coordinate conversion fails
    pub fn fit(
        stats: &BackgroundStatistics,
        converter: &dyn CoordinateConverter,
        diff_scale: f32,
    ) -> Result<Self> {
        let max_depth = stats.max_depth();
        let avg_mm = stats.average_depth().mapv(|v| v * max_depth);
        let diff_mm = stats.average_diff().mapv(|v| v * max_depth);
        let mut surface = Self::with_band(avg_mm, diff_mm, diff_scale)?;
        surface.fit_plane(converter)?;
        Ok(surface)
    }

    /// Surface with a contact band only, from average depth and average
    /// difference images in millimeters
    ///
    /// # Errors
    ///
    /// Returns an error if the images differ in shape or the scale is not
    /// positive
    pub fn with_band(avg_mm: Array2<f32>, diff_mm: Array2<f32>, diff_scale: f32) -> Result<Self> {
        if avg_mm.dim() != diff_mm.dim() {
            return Err(Error::InvalidInput(format!(
                "Average depth {:?} and difference {:?} images differ in shape",
                avg_mm.dim(),
                diff_mm.dim()
            )));
        }
        if diff_scale <= 0.0 {
            return Err(Error::InvalidInput(format!("Contact scale must be positive, got {diff_scale}")));
        }
        Ok(Self {
            avg_mm,
            diff_mm,
            diff_scale,
            center: None,
            normal: None,
        })
    }

    /// Replace the plane with a known one; the normal is flipped to face the
    /// camera if needed
    ///
    /// # Errors
    ///
    /// Returns an error for a zero normal
    pub fn with_plane(mut self, center: Point3<f32>, normal: Vector3<f32>) -> Result<Self> {
        if normal.norm() <= f32::EPSILON {
            return Err(Error::InvalidInput("Surface normal must be nonzero".to_string()));
        }
        let normal = normal.normalize();
        self.center = Some(center);
        self.normal = Some(if normal.z > 0.0 { -normal } else { normal });
        Ok(self)
    }

    #[allow(clippy::cast_precision_loss)]
    fn fit_plane(&mut self, converter: &dyn CoordinateConverter) -> Result<()> {
        let (height, width) = self.avg_mm.dim();
        if width == 0 || height == 0 {
            warn!("Empty depth image, surface plane not fitted");
            return Ok(());
        }
        let mid_row = height / 2;
        let mid_col = width / 2;

        let row_samples: Vec<Point3<f32>> = (0..width)
            .map(|x| Point3::new(x as f32, mid_row as f32, self.avg_mm[(mid_row, x)]))
            .filter(|p| p.z > 0.0)
            .collect();
        let col_samples: Vec<Point3<f32>> = (0..height)
            .map(|y| Point3::new(mid_col as f32, y as f32, self.avg_mm[(y, mid_col)]))
            .filter(|p| p.z > 0.0)
            .collect();

        let row_world = converter.projective_to_world(&row_samples)?;
        let col_world = converter.projective_to_world(&col_samples)?;

        let (Some((p_h, v_h)), Some((p_v, v_v))) = (fit_line(&row_world), fit_line(&col_world)) else {
            warn!(
                "Too few surface samples ({} horizontal, {} vertical), plane not fitted",
                row_world.len(),
                col_world.len()
            );
            return Ok(());
        };
        info!("Surface horizontal line: point {p_h:?}, direction {v_h:?}");
        info!("Surface vertical line: point {p_v:?}, direction {v_v:?}");

        let Some((q_h, q_v)) = closest_points_line_to_line(&p_h, &v_h, &p_v, &v_v) else {
            warn!("Surface lines are parallel, plane not fitted");
            return Ok(());
        };
        let cross = v_h.cross(&v_v);
        if cross.norm() <= f32::EPSILON {
            warn!("Degenerate surface normal, plane not fitted");
            return Ok(());
        }
        // Normal faces the camera
        let mut normal = cross.normalize();
        if normal.z > 0.0 {
            normal = -normal;
        }
        let center = midpoint(&q_h, &q_v);
        info!("Surface center {center:?}, normal {normal:?}");
        self.center = Some(center);
        self.normal = Some(normal);
        Ok(())
    }

    /// Plane center in world coordinates
    #[must_use]
    pub fn center(&self) -> Option<Point3<f32>> {
        self.center
    }

    /// Unit plane normal pointing toward the camera
    #[must_use]
    pub fn normal(&self) -> Option<Vector3<f32>> {
        self.normal
    }

    /// Signed distance of a world point above the plane, if fitted
    #[must_use]
    pub fn distance_to_plane(&self, point: &Point3<f32>) -> Option<f32> {
        Some((point - self.center?).dot(&self.normal?))
    }

    /// Multiplier of the average difference defining the contact band
    #[must_use]
    pub fn diff_scale(&self) -> f32 {
        self.diff_scale
    }

    /// Whether depth `z` (mm) at image position (`x`, `y`) touches the surface.
    /// Out-of-image positions are never in contact.
    #[must_use]
    pub fn is_in_contact(&self, x: f32, y: f32, z: f32) -> bool {
        let (height, width) = self.avg_mm.dim();
        let Some((px, py)) = round_to_pixel(x, y, width, height) else {
            return false;
        };
        let avg = self.avg_mm[(py, px)];
        let band = self.diff_mm[(py, px)] * self.diff_scale;
        z > avg - band && z < avg + band
    }
}

impl ContactTest for InteractionSurface {
    fn is_in_contact(&self, x: f32, y: f32, z: f32) -> bool {
        InteractionSurface::is_in_contact(self, x, y, z)
    }
}

impl Default for InteractionSurface {
    fn default() -> Self {
        Self {
            avg_mm: Array2::zeros((0, 0)),
            diff_mm: Array2::zeros((0, 0)),
            diff_scale: CONTACT_DIFF_SCALE,
            center: None,
            normal: None,
        }
    }
}
