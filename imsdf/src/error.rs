use imscore::error::DatasetError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImsDfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Decoding error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Pattern error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// Input file that does not follow the expected layout.
    #[error("Invalid format in {path}: {message}")]
    Format { path: String, message: String },
}

impl ImsDfError {
    pub fn format(path: impl AsRef<std::path::Path>, message: impl Into<String>) -> Self {
        ImsDfError::Format {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ImsDfError>;
