use std::path::PathBuf;

use thiserror::Error;

pub type RecipeResult<T> = Result<T, RecipeError>;

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("unsupported operation `{operation}`")]
    UnsupportedOperation { operation: String },

    #[error("invalid arguments for `{operation}`: {reason}")]
    InvalidArguments { operation: String, reason: String },

    #[error("data fidelity check failed for {element_id}.{argument}: {reason}")]
    DataFidelity {
        element_id: String,
        argument: String,
        reason: String,
    },

    #[error("broken data reference for {element_id}.{argument} at `{}`: {reason}", path.display())]
    BrokenDataRef {
        element_id: String,
        argument: String,
        path: PathBuf,
        reason: String,
    },

    #[error("corrupt recipe document: {0}")]
    RecipeCorrupt(String),

    #[error("unsupported recipe format version `{found}` (supported: {supported})")]
    UnsupportedFormatVersion { found: String, supported: String },

    #[error("layout overflow on {axis} axis: required {required_mm:.3}mm exceeds figure {available_mm:.3}mm")]
    LayoutOverflow {
        axis: &'static str,
        required_mm: f64,
        available_mm: f64,
    },

    #[error("reproduction mismatch: mse={mse:.6}, dimension_match={dimension_match}")]
    ValidationMismatch { mse: f64, dimension_match: bool },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("io error at `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RecipeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Referential errors are recoverable per call during replay.
    #[must_use]
    pub fn is_referential(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedOperation { .. } | Self::BrokenDataRef { .. }
        )
    }
}
