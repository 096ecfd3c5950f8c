pub mod filter;
pub mod transform;

pub use filter::{FilterCriteria, FilterReport, ViewFilter};
pub use transform::{rotation::RigidTransform, Transform};
