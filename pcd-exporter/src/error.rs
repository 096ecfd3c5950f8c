use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode glTF JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to encode GLB: {0}")]
    Glb(#[from] gltf::Error),
    #[error("GLB of {0} bytes exceeds the 4 GiB container limit")]
    TooLarge(usize),
}
