use std::{io, path::PathBuf, process::ExitStatus, time::Duration};

use pcd_exporter::ExportError;
use pcd_parser::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum ReconstructionError {
    #[error("failed to launch {bin:?}: {source}")]
    Spawn {
        bin: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("reconstruction exited with {0}")]
    ExitStatus(ExitStatus),
    #[error("reconstruction did not finish within {0:?}")]
    Timeout(Duration),
    #[error("reconstruction succeeded but {0:?} was not written")]
    MissingOutput(PathBuf),
    #[error("I/O error while waiting for reconstruction: {0}")]
    Io(#[from] io::Error),
}

/// Why a single view could not be merged.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error(transparent)]
    Reconstruction(#[from] ReconstructionError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("view at {angle_deg} deg: {source}")]
    View {
        angle_deg: u32,
        #[source]
        source: ViewError,
    },
    #[error("failed to write full model: {0}")]
    Export(#[from] ExportError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl MergeError {
    pub(crate) fn view(angle_deg: u32, source: impl Into<ViewError>) -> Self {
        Self::View {
            angle_deg,
            source: source.into(),
        }
    }
}
