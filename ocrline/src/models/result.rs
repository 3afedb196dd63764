use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EngineKind, ImageFormat, Token};

/// Final output of one extraction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub request_id: String,
    /// Corrected text, one output line per visual text line.
    pub full_text: String,
    /// Retained tokens ordered by `(line_id, x0)`, in original image coordinates.
    pub tokens: Vec<Token>,
    pub overall_confidence: f32,
    pub engine_used: EngineKind,
    pub languages: Vec<String>,
    pub language_detected: String,
    pub processing_time_ms: u64,
    pub image_width: u32,
    pub image_height: u32,
    pub image_format: ImageFormat,
    pub preprocessed: bool,
    /// Factor the image was resized by before recognition; 1.0 when untouched.
    pub scale_factor: f32,
    pub created_at: DateTime<Utc>,
}

impl ExtractionResult {
    pub fn word_count(&self) -> usize {
        self.full_text.split_whitespace().count()
    }

    pub fn line_count(&self) -> usize {
        self.full_text.lines().filter(|l| !l.trim().is_empty()).count()
    }
}

/// What the extraction core can do with the current configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub supported_engines: Vec<EngineKind>,
    pub supported_formats: Vec<ImageFormat>,
    pub default_engine: EngineKind,
    pub default_languages: Vec<String>,
    pub tesseract_data_path: Option<String>,
    /// Language packs found under the Tesseract data path.
    pub tesseract_languages: Vec<String>,
    pub easyocr_configured: bool,
    pub easyocr_languages: Vec<String>,
    pub max_image_dimension: u32,
    pub min_image_dimension: u32,
    pub preprocessing_stages: Vec<String>,
    pub features: CapabilityFeatures,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityFeatures {
    pub text_regions: bool,
    pub confidence_scores: bool,
    pub bounding_boxes: bool,
    pub language_detection: bool,
    pub image_preprocessing: bool,
    pub spacing_correction: bool,
}

impl Default for CapabilityFeatures {
    fn default() -> Self {
        Self {
            text_regions: true,
            confidence_scores: true,
            bounding_boxes: true,
            language_detection: true,
            image_preprocessing: true,
            spacing_correction: true,
        }
    }
}
