use serde::Deserialize;
use std::env;

use crate::error::{OcrlineError, Result};
use crate::models::EngineKind;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a comma-separated list, e.g. `OCR_LANGUAGES=eng,deu`
fn parse_env_list(var: &str, default: &[&str]) -> Vec<String> {
    match env::var(var) {
        Ok(val) if !val.trim().is_empty() => val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engines: EngineConfig,
    pub images: ImageConfig,
    pub preprocessing: PreprocessingConfig,
    pub spacing: SpacingConfig,
    /// Request defaults, overridden per call by the caller.
    pub ocr: OcrConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub tesseract_data_path: Option<String>,
    pub easyocr_url: Option<String>,
    pub easyocr_api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tesseract_data_path: None,
            easyocr_url: None,
            easyocr_api_key: None,
            timeout_secs: 60,
            max_workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    pub max_image_dimension: u32,
    pub min_image_dimension: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_image_dimension: 4096,
            min_image_dimension: 10,
        }
    }
}

/// Independently toggleable preprocessing stages, applied in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PreprocessingConfig {
    pub grayscale: bool,
    pub denoise: bool,
    /// Contrast limited adaptive histogram equalization.
    pub contrast_enhance: bool,
    pub sharpen: bool,
    /// Otsu thresholding to pure black and white.
    pub binarize: bool,
    /// Opening followed by closing on the luminance image.
    pub morphology: bool,
    /// Removes long horizontal strokes, such as ruled lines, that bridge
    /// neighbouring text lines.
    pub line_separation: bool,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            grayscale: true,
            denoise: true,
            contrast_enhance: true,
            sharpen: true,
            binarize: false,
            morphology: false,
            line_separation: false,
        }
    }
}

impl PreprocessingConfig {
    pub fn disabled() -> Self {
        Self {
            grayscale: false,
            denoise: false,
            contrast_enhance: false,
            sharpen: false,
            binarize: false,
            morphology: false,
            line_separation: false,
        }
    }

    /// True when some enabled stage works on luminance only.
    pub fn needs_luma(&self) -> bool {
        self.grayscale
            || self.contrast_enhance
            || self.sharpen
            || self.binarize
            || self.morphology
            || self.line_separation
    }

    pub fn enabled_stages(&self) -> Vec<&'static str> {
        [
            (self.grayscale, "grayscale"),
            (self.denoise, "denoise"),
            (self.contrast_enhance, "contrast_enhance"),
            (self.sharpen, "sharpen"),
            (self.binarize, "binarize"),
            (self.morphology, "morphology"),
            (self.line_separation, "line_separation"),
        ]
        .into_iter()
        .filter_map(|(enabled, name)| enabled.then_some(name))
        .collect()
    }
}

/// Gap multipliers, in units of the line's median character width.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SpacingConfig {
    pub merge_threshold: f32,
    pub tab_threshold: f32,
}

impl Default for SpacingConfig {
    fn default() -> Self {
        Self {
            merge_threshold: 0.3,
            tab_threshold: 3.0,
        }
    }
}

impl SpacingConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.merge_threshold.is_finite() || self.merge_threshold < 0.0 {
            return Err(OcrlineError::Validation(format!(
                "merge_threshold must be a non-negative number, got {}",
                self.merge_threshold
            )));
        }
        if !self.tab_threshold.is_finite() || self.tab_threshold <= self.merge_threshold {
            return Err(OcrlineError::Validation(format!(
                "tab_threshold must be greater than merge_threshold ({}), got {}",
                self.merge_threshold, self.tab_threshold
            )));
        }
        Ok(())
    }
}

/// Per-request OCR options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OcrConfig {
    pub engine: EngineKind,
    /// Ordered language codes; duplicates are dropped during validation.
    pub languages: Vec<String>,
    pub confidence_threshold: f32,
    pub preprocess: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Tesseract,
            languages: vec!["eng".to_string()],
            confidence_threshold: 0.5,
            preprocess: true,
        }
    }
}

impl OcrConfig {
    /// Checks the options and returns a copy with trimmed, lowercased,
    /// deduplicated language codes.
    pub fn validated(&self) -> Result<OcrConfig> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(OcrlineError::Validation(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }

        let mut languages: Vec<String> = Vec::with_capacity(self.languages.len());
        for raw in &self.languages {
            let code = raw.trim().to_lowercase();
            if code.is_empty()
                || !code
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(OcrlineError::Validation(format!(
                    "invalid language code '{raw}'"
                )));
            }
            if !languages.contains(&code) {
                languages.push(code);
            }
        }
        if languages.is_empty() {
            return Err(OcrlineError::Validation(
                "at least one language is required".to_string(),
            ));
        }

        Ok(OcrConfig {
            engine: self.engine,
            languages,
            confidence_threshold: self.confidence_threshold,
            preprocess: self.preprocess,
        })
    }

    /// Stage toggles for this request: the configured stages, or none at all
    /// when preprocessing is switched off.
    pub fn preprocessing(&self, configured: PreprocessingConfig) -> PreprocessingConfig {
        if self.preprocess {
            configured
        } else {
            PreprocessingConfig::disabled()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engines: EngineConfig::default(),
            images: ImageConfig::default(),
            preprocessing: PreprocessingConfig::default(),
            spacing: SpacingConfig::default(),
            ocr: OcrConfig::default(),
        }
    }
}

impl Config {
    /// Built-in defaults overridden by whatever the environment sets.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let preprocessing = defaults.preprocessing;
        let spacing = defaults.spacing;

        Self {
            engines: EngineConfig {
                tesseract_data_path: env::var("TESSDATA_PREFIX").ok(),
                easyocr_url: env::var("EASYOCR_URL").ok(),
                easyocr_api_key: env::var("EASYOCR_API_KEY").ok(),
                timeout_secs: parse_env_or("OCR_TIMEOUT", defaults.engines.timeout_secs),
                max_workers: parse_env_or("OCR_MAX_WORKERS", defaults.engines.max_workers).max(1),
            },
            images: ImageConfig {
                max_image_dimension: parse_env_or(
                    "OCR_MAX_DIMENSION",
                    defaults.images.max_image_dimension,
                ),
                min_image_dimension: parse_env_or(
                    "OCR_MIN_DIMENSION",
                    defaults.images.min_image_dimension,
                ),
            },
            preprocessing: PreprocessingConfig {
                grayscale: parse_env_or("PREPROCESS_GRAYSCALE", preprocessing.grayscale),
                denoise: parse_env_or("PREPROCESS_DENOISE", preprocessing.denoise),
                contrast_enhance: parse_env_or(
                    "PREPROCESS_CONTRAST",
                    preprocessing.contrast_enhance,
                ),
                sharpen: parse_env_or("PREPROCESS_SHARPEN", preprocessing.sharpen),
                binarize: parse_env_or("PREPROCESS_BINARIZE", preprocessing.binarize),
                morphology: parse_env_or("PREPROCESS_MORPHOLOGY", preprocessing.morphology),
                line_separation: parse_env_or(
                    "PREPROCESS_LINE_SEPARATION",
                    preprocessing.line_separation,
                ),
            },
            spacing: SpacingConfig {
                merge_threshold: parse_env_or("SPACING_MERGE_THRESHOLD", spacing.merge_threshold),
                tab_threshold: parse_env_or("SPACING_TAB_THRESHOLD", spacing.tab_threshold),
            },
            ocr: OcrConfig {
                engine: parse_env_or("OCR_ENGINE", defaults.ocr.engine),
                languages: parse_env_list("OCR_LANGUAGES", &["eng"]),
                confidence_threshold: parse_env_or(
                    "OCR_CONFIDENCE_THRESHOLD",
                    defaults.ocr.confidence_threshold,
                ),
                preprocess: parse_env_or("OCR_PREPROCESS", defaults.ocr.preprocess),
            },
        }
    }
}
