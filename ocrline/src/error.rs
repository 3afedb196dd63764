use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrlineError {
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("OCR engine timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

impl OcrlineError {
    /// Stable tag for the failure kind, attached to failed responses by callers.
    pub fn kind(&self) -> &'static str {
        match self {
            OcrlineError::UnsupportedFormat(_) => "unsupported_format",
            OcrlineError::Decode(_) => "decode",
            OcrlineError::Validation(_) => "validation",
            OcrlineError::EngineUnavailable(_) => "engine_unavailable",
            OcrlineError::Recognition(_) => "recognition",
            OcrlineError::Timeout { .. } => "timeout",
        }
    }

    /// HTTP status an API layer should report for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            OcrlineError::UnsupportedFormat(_) => 415,
            OcrlineError::Decode(_) => 422,
            OcrlineError::Validation(_) => 400,
            OcrlineError::EngineUnavailable(_) => 503,
            OcrlineError::Recognition(_) => 500,
            OcrlineError::Timeout { .. } => 504,
        }
    }
}

pub type Result<T> = std::result::Result<T, OcrlineError>;
