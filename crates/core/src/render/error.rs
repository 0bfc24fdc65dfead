use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by renderers and artifact stores.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The renderer rejected its input. Retrying will not help.
    #[error("Invalid render input: {0}")]
    InvalidInput(String),

    /// The renderer failed.
    #[error("Rendering failed: {0}")]
    Failed(String),

    #[error("Rendering timed out after {0}s")]
    Timeout(u64),

    #[error("Failed to write artifact {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidInput(_))
    }
}
