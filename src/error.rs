use std::io;

use tch::TchError;
use thiserror::Error;

/// Main library error type.
#[derive(Error, Debug)]
pub enum GanError {
    /// Invalid hyper-parameter or configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A tensor does not have the expected shape.
    #[error("invalid shape: {0}")]
    Shape(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Configuration file parsing error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Progress bar template error.
    #[error(transparent)]
    Template(#[from] indicatif::style::TemplateError),

    /// Errors returned by the Torch C++ API.
    #[error(transparent)]
    Torch(#[from] TchError),
}

impl GanError {
    pub fn path_context(self, path_name: &str) -> Self {
        match self {
            GanError::Io(error) => {
                GanError::Io(io::Error::new(error.kind(), format!("{path_name}: {error}")))
            }
            GanError::Torch(error) => {
                GanError::Torch(TchError::Torch(format!("{path_name}: {error}")))
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, GanError>;
