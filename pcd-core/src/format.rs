use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Body encoding of a PLY file, as declared by its `format` header line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    Ascii,
    #[default]
    BinaryLittleEndian,
}

impl Layout {
    pub fn header_keyword(&self) -> &'static str {
        match self {
            Layout::Ascii => "ascii",
            Layout::BinaryLittleEndian => "binary_little_endian",
        }
    }

    pub fn from_header_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "ascii" => Some(Layout::Ascii),
            "binary_little_endian" => Some(Layout::BinaryLittleEndian),
            _ => None,
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_keyword())
    }
}

impl FromStr for Layout {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ascii" | "text" => Ok(Layout::Ascii),
            "binary" | "binary_little_endian" => Ok(Layout::BinaryLittleEndian),
            other => Err(ConfigError::UnknownLayout(other.to_string())),
        }
    }
}
