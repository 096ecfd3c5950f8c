pub mod error;
pub mod gltf;
pub mod ply;

mod atomic;

pub use error::ExportError;
