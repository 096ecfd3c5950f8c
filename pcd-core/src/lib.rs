pub mod error;
pub mod format;
pub mod geometry;
pub mod pointcloud;
