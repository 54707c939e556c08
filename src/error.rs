// File: src/error.rs

/// Errors surfaced by the prediction engine and its model files.
///
/// Data-quality failures (bad files, unknown ids) are absorbed inside the
/// engine and only show up in logs; these variants travel between the
/// lower layers and the places that decide to log them.
#[derive(Debug, thiserror::Error)]
pub enum WpError {
    #[error("invalid model id: {0}")]
    InvalidLmid(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad model file: {0}")]
    Format(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] bincode::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("model failed to load, refusing to save: {0}")]
    LoadError(String),

    #[error("model is not persistent: {0}")]
    NotPersistent(String),
}

pub type Result<T> = std::result::Result<T, WpError>;
