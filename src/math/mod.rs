mod plane;

pub use plane::CutPlane;

/// 3D point type.
pub type Point3 = nalgebra::Point3<f64>;

/// 3D vector type.
pub type Vector3 = nalgebra::Vector3<f64>;

/// 3x3 matrix type.
pub type Matrix3 = nalgebra::Matrix3<f64>;

/// Global geometric tolerance for floating-point comparisons.
pub const TOLERANCE: f64 = 1e-10;

/// Normal of the triangle `(a, apex, b)`, scaled by twice its area.
///
/// Computed as `(a - apex) × (b - apex)`, so a counter-clockwise polygon
/// fanned around its centroid yields normals along the polygon normal.
#[must_use]
pub fn triangle_normal(a: &Point3, apex: &Point3, b: &Point3) -> Vector3 {
    (a - apex).cross(&(b - apex))
}

/// Unit vector along `v`, or zero when `v` is shorter than [`TOLERANCE`].
#[must_use]
pub fn unit_or_zero(v: &Vector3) -> Vector3 {
    let len = v.norm();
    if len < TOLERANCE {
        Vector3::zeros()
    } else {
        v / len
    }
}

/// Arithmetic mean of a set of points. Returns the origin for an empty set.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn centroid(points: &[Point3]) -> Point3 {
    if points.is_empty() {
        return Point3::origin();
    }
    let sum = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Point3::from(sum / points.len() as f64)
}
