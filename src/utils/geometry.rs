//! Vector geometry shared by the detectors, the surface model, and pointing.

use nalgebra::{Matrix3, Point2, Point3, SymmetricEigen, Vector2, Vector3};
use std::f32::consts::PI;

/// Angle in radians between two 2D vectors
///
/// Degenerate (zero-length) vectors give `PI` so that they never pass an
/// "angle below threshold" test.
#[must_use]
pub fn angle_between(v1: &Vector2<f32>, v2: &Vector2<f32>) -> f32 {
    let norms = v1.norm() * v2.norm();
    if norms <= f32::EPSILON {
        return PI;
    }
    (v1.dot(v2) / norms).clamp(-1.0, 1.0).acos()
}

/// Angle at vertex `c` of triangle `abc`; 0 when `c` coincides with `a` or `b`
#[must_use]
pub fn triangle_angle(a: &Point2<f32>, b: &Point2<f32>, c: &Point2<f32>) -> f32 {
    let ca = a - c;
    let cb = b - c;
    if ca.norm_squared() == 0.0 || cb.norm_squared() == 0.0 {
        return 0.0;
    }
    (ca.dot(&cb) / (ca.norm() * cb.norm())).clamp(-1.0, 1.0).acos()
}

/// Closest points between the lines `p1 + s * v1` and `p2 + t * v2`
///
/// Returns `None` for parallel lines.
#[must_use]
pub fn closest_points_line_to_line(
    p1: &Point3<f32>,
    v1: &Vector3<f32>,
    p2: &Point3<f32>,
    v2: &Vector3<f32>,
) -> Option<(Point3<f32>, Point3<f32>)> {
    let w0 = p1 - p2;
    let a = v1.dot(v1);
    let b = v1.dot(v2);
    let c = v2.dot(v2);
    let d = v1.dot(&w0);
    let e = v2.dot(&w0);
    let denom = a * c - b * b;
    if denom.abs() <= f32::EPSILON * a.max(1.0) * c.max(1.0) {
        return None;
    }
    let s = (b * e - c * d) / denom;
    let t = (a * e - b * d) / denom;
    Some((p1 + v1 * s, p2 + v2 * t))
}

/// Midpoint of two points
#[must_use]
pub fn midpoint(a: &Point3<f32>, b: &Point3<f32>) -> Point3<f32> {
    nalgebra::center(a, b)
}

/// Intersection of the line through `from` and `to` with the plane through
/// `plane_point` with normal `normal`
///
/// Returns `None` when the line is parallel to the plane or degenerate.
#[must_use]
pub fn line_plane_intersection(
    from: &Point3<f32>,
    to: &Point3<f32>,
    plane_point: &Point3<f32>,
    normal: &Vector3<f32>,
) -> Option<Point3<f32>> {
    let direction = to - from;
    let denom = normal.dot(&direction);
    if denom.abs() <= f32::EPSILON {
        return None;
    }
    let t = normal.dot(&(plane_point - from)) / denom;
    Some(from + direction * t)
}

/// Least-squares 3D line fit: the centroid and the unit direction of largest
/// variance
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn fit_line(points: &[Point3<f32>]) -> Option<(Point3<f32>, Vector3<f32>)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f32;
    let centroid = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n;

    let covariance = points.iter().fold(Matrix3::zeros(), |acc, p| {
        let d = p.coords - centroid;
        acc + d * d.transpose()
    }) / n;

    let eigen = SymmetricEigen::new(covariance);
    let (index, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
    let direction = eigen.eigenvectors.column(index).into_owned();
    if direction.norm() <= f32::EPSILON {
        return None;
    }
    Some((Point3::from(centroid), direction.normalize()))
}

/// Euler angles (rotation about x, y, z) of a rotation matrix
#[must_use]
pub fn rotation_to_euler(rotation: &Matrix3<f32>) -> Vector3<f32> {
    let sy = (rotation[(0, 0)].powi(2) + rotation[(1, 0)].powi(2)).sqrt();
    if sy > 1e-6 {
        Vector3::new(
            rotation[(2, 1)].atan2(rotation[(2, 2)]),
            (-rotation[(2, 0)]).atan2(sy),
            rotation[(1, 0)].atan2(rotation[(0, 0)]),
        )
    } else {
        Vector3::new(
            (-rotation[(1, 2)]).atan2(rotation[(1, 1)]),
            (-rotation[(2, 0)]).atan2(sy),
            0.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_between() {
        let right = Vector2::new(1.0, 0.0);
        let up = Vector2::new(0.0, 1.0);
        assert!((angle_between(&right, &up) - PI / 2.0).abs() < 1e-6);
        assert!(angle_between(&right, &right).abs() < 1e-3);
        assert_eq!(angle_between(&right, &Vector2::zeros()), PI);
    }

    #[test]
    fn test_triangle_angle() {
        let a = Point2::new(1.0, 0.0);
        let b = Point2::new(0.0, 1.0);
        let c = Point2::new(0.0, 0.0);
        assert!((triangle_angle(&a, &b, &c) - PI / 2.0).abs() < 1e-6);
        assert_eq!(triangle_angle(&c, &b, &c), 0.0);
    }

    #[test]
    fn test_closest_points_of_crossing_lines() {
        let (q1, q2) = closest_points_line_to_line(
            &Point3::new(0.0, 0.0, 0.0),
            &Vector3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 5.0, 2.0),
            &Vector3::new(0.0, 1.0, 0.0),
        )
        .unwrap();
        assert!((q1 - Point3::new(0.0, 0.0, 0.0)).norm() < 1e-5);
        assert!((q2 - Point3::new(0.0, 0.0, 2.0)).norm() < 1e-5);
        assert!((midpoint(&q1, &q2) - Point3::new(0.0, 0.0, 1.0)).norm() < 1e-5);
    }

    #[test]
    fn test_parallel_lines_have_no_closest_pair() {
        let v = Vector3::new(0.0, 0.0, 1.0);
        assert!(closest_points_line_to_line(&Point3::origin(), &v, &Point3::new(1.0, 0.0, 0.0), &v).is_none());
    }

    #[test]
    fn test_line_plane_intersection() {
        let hit = line_plane_intersection(
            &Point3::new(0.0, 0.0, 10.0),
            &Point3::new(1.0, 1.0, 9.0),
            &Point3::origin(),
            &Vector3::new(0.0, 0.0, 1.0),
        )
        .unwrap();
        assert!((hit - Point3::new(10.0, 10.0, 0.0)).norm() < 1e-4);

        let parallel = line_plane_intersection(
            &Point3::new(0.0, 0.0, 1.0),
            &Point3::new(1.0, 0.0, 1.0),
            &Point3::origin(),
            &Vector3::new(0.0, 0.0, 1.0),
        );
        assert!(parallel.is_none());
    }

    #[test]
    fn test_fit_line_recovers_direction() {
        let points: Vec<Point3<f32>> = (0..20).map(|i| Point3::new(i as f32, 2.0 * i as f32, 5.0)).collect();
        let (centroid, direction) = fit_line(&points).unwrap();
        assert!((centroid - Point3::new(9.5, 19.0, 5.0)).norm() < 1e-3);
        let expected = Vector3::new(1.0, 2.0, 0.0).normalize();
        assert!(direction.dot(&expected).abs() > 0.999);
        assert!(fit_line(&points[..1]).is_none());
    }

    #[test]
    fn test_rotation_to_euler_identity() {
        let euler = rotation_to_euler(&Matrix3::identity());
        assert!(euler.norm() < 1e-6);
    }
}
