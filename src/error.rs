use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("no face or landmarks detected")]
    DetectionEmpty,

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("landmark index {index} out of range for a set of {len} points")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("invalid record at line {line}: {reason}")]
    InvalidRecord { line: u64, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("model error: {0}")]
    Model(String),
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Model(format!("{:#}", e))
    }
}

impl Error {
    /// Whether the caller sent something unusable, as opposed to a fault on
    /// our side.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::SchemaMismatch(_)
                | Error::IndexOutOfRange { .. }
                | Error::MissingField(_)
                | Error::MalformedPayload(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
