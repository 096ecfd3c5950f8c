/// Configuration problems detected once at startup, before any view is processed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("stage axis is degenerate or not finite: {0:?}")]
    DegenerateAxis([f64; 3]),
    #[error("stage pivot is not finite: {0:?}")]
    InvalidPivot([f64; 3]),
    #[error("invalid z range: z_min ({z_min}) > z_max ({z_max})")]
    InvalidZRange { z_min: f64, z_max: f64 },
    #[error("filter bound '{0}' is not finite")]
    NonFiniteBound(&'static str),
    #[error("max radius must be non-negative, got {0}")]
    NegativeRadius(f64),
    #[error("unknown point cloud layout: {0}")]
    UnknownLayout(String),
}
