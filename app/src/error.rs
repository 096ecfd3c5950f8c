use std::{io, path::PathBuf};

use pcd_core::error::ConfigError;
use pcd_exporter::ExportError;
use pcd_merger::MergeError;
use pcd_parser::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid calibration file {path:?}: {source}")]
    Calibration {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error("failed to parse point cloud: {0}")]
    Parse(#[from] ParseError),
    #[error("failed to export: {0}")]
    Export(#[from] ExportError),
    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("no input files matched {0:?}")]
    NoInput(Vec<String>),
    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
