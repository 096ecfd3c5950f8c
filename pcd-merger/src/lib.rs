pub mod error;
pub mod job;
pub mod pipeline;
pub mod reconstruct;

pub use error::{MergeError, ReconstructionError, ViewError};
pub use job::{ScanLayout, ViewJob};
pub use pipeline::{MergePipeline, MergeReport, ViewReport, ViewSource};
pub use reconstruct::{ExternalReconstructor, Reconstructor};
