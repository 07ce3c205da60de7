use std::path::PathBuf;

use thiserror::Error;

/// Failure kinds shared by every processing stage.
///
/// Per-photo skips during alignment are not errors (see
/// [`crate::registration::AlignOutcome`]); these variants are for conditions
/// that abort a stage or a whole site run.
#[derive(Debug, Error)]
pub enum ShoreError {
    #[error("missing input: {what} ({path})")]
    MissingInput { what: &'static str, path: PathBuf },

    #[error("insufficient correspondences: need at least {needed}, found {found}")]
    InsufficientCorrespondences { needed: usize, found: usize },

    #[error("geometry failure: {0}")]
    GeometryFailure(String),

    #[error("invalid site configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ShoreError {
    pub fn missing(what: &'static str, path: impl Into<PathBuf>) -> Self {
        ShoreError::MissingInput {
            what,
            path: path.into(),
        }
    }

    /// Whether this error should abort a whole site run rather than a single photo.
    /// Only an undecodable image is confined to its photo.
    pub fn is_fatal_for_run(&self) -> bool {
        !matches!(self, ShoreError::Image(_))
    }
}

impl From<serde_json::Error> for ShoreError {
    fn from(e: serde_json::Error) -> Self {
        ShoreError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for ShoreError {
    fn from(e: toml::de::Error) -> Self {
        ShoreError::InvalidConfig(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShoreError>;
