use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForensicsError {
    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("Image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Error level analysis failed: {0}")]
    Ela(String),

    #[error("Metadata extraction error: {0}")]
    MetadataError(String),

    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Credential missing: {0}")]
    CredentialMissing(String),

    #[error("Narrative generation failed: {0}")]
    Narrative(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ForensicsError {
    /// Only a decode failure stops a request; everything else has a fallback.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ForensicsError::Decode(_))
    }
}

pub type Result<T> = std::result::Result<T, ForensicsError>;
