//! Parameter types for image conversions.
//!
//! These describe *what* to produce; the [`backend`](super::backend) decides
//! how. Keeping them separate lets the optimizer run against a mock.

use crate::config::ImageFormat;
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// Re-encode `source` as `format` at `output`, keeping its dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub format: ImageFormat,
    /// Used by lossy encoders only.
    pub quality: Quality,
}
