use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Problems with what the caller handed in. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("no documents provided")]
    NoDocuments,

    #[error("at least two documents required, got {found}")]
    TooFewDocuments { found: usize },

    #[error("no valid documents (accepted extensions: {accepted})")]
    NoValidDocuments { accepted: String },
}

#[derive(Error, Debug)]
pub enum QsimError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("similarity threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f32),

    #[error("cannot read document {}: {reason}", path.display())]
    Document { path: PathBuf, reason: String },

    #[error("embedding provider failed")]
    Provider(#[source] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl QsimError {
    pub fn document(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Document {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the failure is caused by the caller's input rather than by
    /// the embedding backend or the host.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Input(_) | Self::InvalidConfig(_) | Self::InvalidThreshold(_) | Self::Document { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, QsimError>;
