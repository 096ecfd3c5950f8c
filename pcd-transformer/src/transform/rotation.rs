use nalgebra::{Point3, Rotation3, Unit, Vector3};
use rayon::iter::{IntoParallelRefIterator as _, ParallelIterator as _};

use pcd_core::{
    geometry::StageGeometry,
    pointcloud::point::{Point, PointCloud},
};

use super::Transform;

/// Rotation about an arbitrary axis through a pivot:
/// `P' = p + R(axis, angle) (P - p)`, with `R` the Rodrigues rotation matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    pivot: Point3<f64>,
    rotation: Rotation3<f64>,
}

impl RigidTransform {
    /// `angle` is in radians, right-handed about the stage axis.
    pub fn new(stage: &StageGeometry, angle: f64) -> Self {
        let axis = Unit::new_normalize(Vector3::from(stage.axis()));
        Self {
            pivot: Point3::from(stage.pivot()),
            rotation: Rotation3::from_axis_angle(&axis, angle),
        }
    }

    /// Maps a view captured with the turntable at `stage_angle_deg` into the
    /// canonical frame. The stage turned the object by +angle, so the view is
    /// rotated back by -angle.
    pub fn for_view(stage: &StageGeometry, stage_angle_deg: f64) -> Self {
        Self::new(stage, -stage_angle_deg.to_radians())
    }

    pub fn apply_point(&self, point: &Point) -> Point {
        let local = Vector3::new(point.x, point.y, point.z) - self.pivot.coords;
        let rotated = self.pivot.coords + self.rotation * local;
        Point::new(rotated.x, rotated.y, rotated.z)
    }

    pub fn apply(&self, cloud: &PointCloud) -> PointCloud {
        let points: Vec<Point> = cloud
            .points
            .par_iter()
            .map(|point| self.apply_point(point))
            .collect();
        PointCloud::new(points)
    }
}

impl Transform for RigidTransform {
    fn transform(&self, point_cloud: PointCloud) -> PointCloud {
        self.apply(&point_cloud)
    }
}
