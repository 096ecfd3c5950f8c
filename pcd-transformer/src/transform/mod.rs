use pcd_core::pointcloud::point::PointCloud;

pub mod rotation;

/// A stage that consumes a cloud and hands back a new one.
pub trait Transform {
    fn transform(&self, point_cloud: PointCloud) -> PointCloud;
}
