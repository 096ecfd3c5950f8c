use serde::Serialize;

use crate::{error::ConfigError, pointcloud::point::Point};

/// Physical rotation axis of the turntable: a pivot point and a unit direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageGeometry {
    pivot: [f64; 3],
    axis: [f64; 3],
}

impl StageGeometry {
    pub const MIN_AXIS_NORM: f64 = 1e-9;

    /// The direction is normalized here, once, so callers may pass a calibration
    /// vector that is only approximately unit length.
    pub fn new(pivot: [f64; 3], dir: [f64; 3]) -> Result<Self, ConfigError> {
        if pivot.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::InvalidPivot(pivot));
        }
        if dir.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::DegenerateAxis(dir));
        }

        let norm = dot(&dir, &dir).sqrt();
        if norm < Self::MIN_AXIS_NORM {
            return Err(ConfigError::DegenerateAxis(dir));
        }

        let axis = [dir[0] / norm, dir[1] / norm, dir[2] / norm];
        Ok(Self { pivot, axis })
    }

    pub fn pivot(&self) -> [f64; 3] {
        self.pivot
    }

    pub fn axis(&self) -> [f64; 3] {
        self.axis
    }

    /// Perpendicular distance from `point` to the axis line through the pivot.
    pub fn distance_to_axis(&self, point: &Point) -> f64 {
        let v = [
            point.x - self.pivot[0],
            point.y - self.pivot[1],
            point.z - self.pivot[2],
        ];
        let t = dot(&v, &self.axis);
        let perpendicular = [
            v[0] - self.axis[0] * t,
            v[1] - self.axis[1] * t,
            v[2] - self.axis[2] * t,
        ];
        dot(&perpendicular, &perpendicular).sqrt()
    }
}

fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}
