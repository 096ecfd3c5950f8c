use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid PLY format: {0}")]
    Format(String),
}

impl ParseError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        ParseError::Format(message.into())
    }
}
