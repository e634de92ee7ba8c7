//! Hand pose from the hand-region point cloud.
//!
//! The foreground pixels of a hand region are converted to world
//! coordinates and aligned with their principal axes. Points far from the
//! aligned center are dropped until the cloud is stable; what is left gives
//! the hand center, width and orientation.

use crate::forelimb::Hand;
use crate::sensor::{CoordinateConverter, DepthFrame};
use crate::surface::InteractionSurface;
use crate::utils::geometry::rotation_to_euler;
use crate::Result;
use log::debug;
use ndarray::Array2;
use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};
use opencv::core::Rect;

/// Fewest points a hand cloud needs for a pose
pub const MIN_HAND_POINTS: usize = 3;

/// Foreground pixels of `region` as (x, y, depth) points.
///
/// A pixel counts when `mask` is nonzero and its depth is valid. Parts of
/// the region outside the image are ignored.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
pub fn foreground_points(region: Rect, mask: &Array2<u8>, frame: &DepthFrame) -> Vec<Point3<f32>> {
    let (height, width) = mask.dim();
    let x0 = region.x.max(0) as usize;
    let y0 = region.y.max(0) as usize;
    let x1 = ((region.x + region.width).max(0) as usize).min(width);
    let y1 = ((region.y + region.height).max(0) as usize).min(height);

    let mut points = Vec::new();
    for y in y0..y1 {
        for x in x0..x1 {
            if mask[(y, x)] == 0 {
                continue;
            }
            match frame.depth_at(x, y) {
                Some(depth) if depth > 0 => points.push(Point3::new(x as f32, y as f32, f32::from(depth))),
                _ => {}
            }
        }
    }
    points
}

/// Outlier radius in millimeters for a cloud of `n` points; one pixel is
/// roughly 2 mm on the table
#[allow(clippy::cast_precision_loss)]
fn hand_radius(n: usize) -> f32 {
    (n as f32).sqrt() * 2.0
}

/// Principal axes as rows, sorted by decreasing variance, with the axis
/// closest to the depth direction last, pointing away from the camera and
/// forming a right-handed frame
fn principal_axes(covariance: Matrix3<f32>) -> Matrix3<f32> {
    let eigen = SymmetricEigen::new(covariance);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
    let mut axes: Vec<Vector3<f32>> = order.iter().map(|&i| eigen.eigenvectors.column(i).into_owned()).collect();

    let depth_axis = (0..3)
        .max_by(|&a, &b| axes[a].z.abs().total_cmp(&axes[b].z.abs()))
        .unwrap_or(2);
    let depth = axes.remove(depth_axis);
    axes.push(depth);

    if axes[2].z < 0.0 {
        axes[2] = -axes[2];
    }
    if axes[0].cross(&axes[1]).dot(&axes[2]) < 0.0 {
        axes[0] = -axes[0];
    }
    Matrix3::from_rows(&[axes[0].transpose(), axes[1].transpose(), axes[2].transpose()])
}

/// Drop points outside the shrinking radius around the cloud center until
/// none is removed. Returns the final center, or `None` if every point is
/// dropped.
#[allow(clippy::cast_precision_loss)]
fn remove_outliers(points: &mut Vec<Point3<f32>>) -> Option<Vector3<f32>> {
    let mut center = Vector3::zeros();
    loop {
        let radius = hand_radius(points.len());
        let radius2 = radius * radius;
        let before = points.len();
        points.retain(|p| {
            let dx = p.x - center.x;
            let dy = p.y - center.y;
            dx * dx + dy * dy <= radius2
        });
        if points.is_empty() {
            return None;
        }
        center = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / points.len() as f32;
        if points.len() == before {
            return Some(center);
        }
    }
}

/// Computes [`Hand`] poses from hand regions
#[derive(Debug, Clone, Copy, Default)]
pub struct HandFeatureDetector;

impl HandFeatureDetector {
    /// Estimate the hand pose in `region`.
    ///
    /// `cleaned` selects the hand pixels. Velocity and acceleration are left
    /// at zero; [`HandMotion`] fills them in.
    ///
    /// # Errors
    ///
    /// Returns an error if coordinate conversion fails
    #[allow(clippy::cast_precision_loss)]
    pub fn detect(
        &self,
        region: Rect,
        cleaned: &Array2<u8>,
        frame: &DepthFrame,
        converter: &dyn CoordinateConverter,
        surface: &InteractionSurface,
    ) -> Result<Option<Hand>> {
        let image_points = foreground_points(region, cleaned, frame);
        if image_points.len() < MIN_HAND_POINTS {
            return Ok(None);
        }
        let world = converter.projective_to_world(&image_points)?;
        if world.len() < MIN_HAND_POINTS {
            return Ok(None);
        }

        let n = world.len() as f32;
        let mean = world.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n;
        let covariance = world.iter().fold(Matrix3::zeros(), |acc, p| {
            let d = p.coords - mean;
            acc + d * d.transpose()
        }) / n;
        let axes = principal_axes(covariance);

        let mut aligned: Vec<Point3<f32>> = world.iter().map(|p| Point3::from(axes * (p.coords - mean))).collect();
        let Some(offset) = remove_outliers(&mut aligned) else {
            debug!("Hand cloud of {} points fully rejected as outliers", world.len());
            return Ok(None);
        };
        for p in &mut aligned {
            p.coords -= offset;
        }

        let position = Point3::from(mean + axes.transpose() * offset);
        let distance_to_surface = surface.distance_to_plane(&position).unwrap_or(0.0);
        let width = hand_radius(aligned.len()) * 2.0;

        Ok(Some(Hand {
            position,
            distance_to_surface,
            width,
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            rotation: rotation_to_euler(&axes.transpose()),
            point_cloud: aligned,
        }))
    }
}

/// Finite-difference motion of the tracked hand across frames
#[derive(Debug, Clone, Default)]
pub struct HandMotion {
    position: Option<Point3<f32>>,
    velocity: Option<Vector3<f32>>,
}

impl HandMotion {
    /// Fill in velocity and acceleration of `hand` from the previous frames
    pub fn update(&mut self, hand: &mut Hand) {
        let velocity = self.position.map_or_else(Vector3::zeros, |previous| hand.position - previous);
        let acceleration = self.velocity.map_or_else(Vector3::zeros, |previous| velocity - previous);
        if self.position.is_some() {
            self.velocity = Some(velocity);
        }
        self.position = Some(hand.position);
        hand.velocity = velocity;
        hand.acceleration = acceleration;
    }

    /// Forget the history
    pub fn reset(&mut self) {
        self.position = None;
        self.velocity = None;
    }
}
