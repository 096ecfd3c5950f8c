use pcd_core::pointcloud::point::PointCloud;

use crate::error::ParseError;

pub mod ply;

pub trait ParserProvider {
    fn get_parser(&self) -> Box<dyn Parser>;
}

pub trait Parser {
    fn parse(&self) -> Result<PointCloud, ParseError>;
}
