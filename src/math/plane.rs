use crate::error::{GeometryError, Result};

use super::{Point3, Vector3, TOLERANCE};

/// An oriented plane `n · x + d = 0` with unit normal `n`.
///
/// Used to partition a vertex neighborhood when splitting: points with a
/// non-negative signed distance lie on the positive side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutPlane {
    normal: Vector3,
    offset: f64,
}

impl CutPlane {
    /// Creates a plane through `origin` with the given (not necessarily unit) normal.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::ZeroVector`] if the normal is zero-length.
    pub fn from_point_normal(origin: &Point3, normal: &Vector3) -> Result<Self> {
        let len = normal.norm();
        if len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        let normal = normal / len;
        Ok(Self {
            normal,
            offset: -normal.dot(&origin.coords),
        })
    }

    /// Returns the unit normal.
    #[must_use]
    pub fn normal(&self) -> &Vector3 {
        &self.normal
    }

    /// Signed distance of `point` from the plane.
    #[must_use]
    pub fn signed_distance(&self, point: &Point3) -> f64 {
        self.normal.dot(&point.coords) + self.offset
    }

    /// Returns `true` if `point` lies on the positive side or on the plane.
    #[must_use]
    pub fn is_positive_side(&self, point: &Point3) -> bool {
        self.signed_distance(point) >= 0.0
    }
}
