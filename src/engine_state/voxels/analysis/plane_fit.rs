//! Least-squares plane fitting.
//!
//! Builds the covariance of the points about their centroid and solves for the
//! normal along the axis whose cofactor determinant is largest, which keeps the
//! solve well conditioned whatever the plane's orientation.

use cgmath::{InnerSpace, Point3, Vector3};

/// A plane through `centroid` with unit `normal`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    /// Mean of the fitted points.
    pub centroid: Point3<f32>,
    /// Unit normal. Sign follows the dominant determinant, not any side.
    pub normal: Vector3<f32>,
}

/// Fits a plane to `points`.
///
/// Returns `None` for fewer than three points or when the points are
/// collinear (every cofactor determinant is zero).
pub fn best_fitting_plane(points: &[Point3<i32>]) -> Option<Plane> {
    if points.len() < 3 {
        return None;
    }

    let n = points.len() as f32;
    let sum = points.iter().fold(Vector3::new(0.0f32, 0.0, 0.0), |acc, p| {
        acc + Vector3::new(p.x as f32, p.y as f32, p.z as f32)
    });
    let centroid = Point3::new(sum.x / n, sum.y / n, sum.z / n);

    let (mut xx, mut xy, mut xz, mut yy, mut yz, mut zz) = (0.0f32, 0.0, 0.0, 0.0, 0.0, 0.0);
    for p in points {
        let r = Point3::new(p.x as f32, p.y as f32, p.z as f32) - centroid;
        xx += r.x * r.x;
        xy += r.x * r.y;
        xz += r.x * r.z;
        yy += r.y * r.y;
        yz += r.y * r.z;
        zz += r.z * r.z;
    }

    let det_x = yy * zz - yz * yz;
    let det_y = xx * zz - xz * xz;
    let det_z = xx * yy - xy * xy;
    let det_max = det_x.max(det_y).max(det_z);
    if det_max <= 0.0 {
        return None;
    }

    let dir = if det_max == det_x {
        Vector3::new(det_x, xz * yz - xy * zz, xy * yz - xz * yy)
    } else if det_max == det_y {
        Vector3::new(xz * yz - xy * zz, det_y, xy * xz - yz * xx)
    } else {
        Vector3::new(xy * yz - xz * yy, xy * xz - yz * xx, det_z)
    };

    Some(Plane {
        centroid,
        normal: dir.normalize(),
    })
}
