use image::DynamicImage;

use crate::config::EngineConfig;
use crate::error::{OcrlineError, Result};
use crate::models::{EngineKind, RawToken};

use super::easyocr::EasyOcrEngine;
use super::pool::WorkerPool;
use super::tesseract::TesseractEngine;

/// (EasyOCR name, Tesseract name) for languages both engines ship.
const LANGUAGE_CODES: &[(&str, &str)] = &[
    ("en", "eng"),
    ("de", "deu"),
    ("fr", "fra"),
    ("es", "spa"),
    ("it", "ita"),
    ("pt", "por"),
    ("nl", "nld"),
    ("pl", "pol"),
    ("ru", "rus"),
    ("uk", "ukr"),
    ("tr", "tur"),
    ("ar", "ara"),
    ("hi", "hin"),
    ("ja", "jpn"),
    ("ko", "kor"),
    ("ch_sim", "chi_sim"),
    ("ch_tra", "chi_tra"),
];

pub(crate) fn to_tesseract_code(code: &str) -> String {
    let code = if code == "zh" { "ch_sim" } else { code };
    LANGUAGE_CODES
        .iter()
        .find(|(short, _)| *short == code)
        .map(|(_, long)| long.to_string())
        .unwrap_or_else(|| code.to_string())
}

pub(crate) fn to_easyocr_code(code: &str) -> String {
    LANGUAGE_CODES
        .iter()
        .find(|(_, long)| *long == code)
        .map(|(short, _)| short.to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Language codes the EasyOCR service is expected to accept.
pub fn easyocr_languages() -> Vec<String> {
    LANGUAGE_CODES
        .iter()
        .map(|(short, _)| short.to_string())
        .collect()
}

pub(crate) fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut output), image::ImageFormat::Png)
        .map_err(|e| OcrlineError::Recognition(format!("Failed to encode image: {e}")))?;
    Ok(output)
}

/// A ready-to-use recognition backend.
pub enum OcrEngine {
    Tesseract(TesseractEngine),
    EasyOcr(EasyOcrEngine),
}

impl OcrEngine {
    /// Load the backend for `languages`. Slow: reads language data or asks the
    /// EasyOCR service to load its reader.
    pub async fn initialize(
        kind: EngineKind,
        languages: &[String],
        config: &EngineConfig,
    ) -> Result<Self> {
        match kind {
            EngineKind::Tesseract => {
                let data_path = config.tesseract_data_path.clone();
                let languages = languages.to_vec();
                tokio::task::spawn_blocking(move || {
                    TesseractEngine::new(data_path.as_deref(), &languages)
                })
                .await
                .map_err(|e| {
                    OcrlineError::EngineUnavailable(format!(
                        "Tesseract initialization panicked: {e}"
                    ))
                })?
                .map(OcrEngine::Tesseract)
            }
            EngineKind::EasyOcr => EasyOcrEngine::connect(config, languages)
                .await
                .map(OcrEngine::EasyOcr),
        }
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            OcrEngine::Tesseract(_) => EngineKind::Tesseract,
            OcrEngine::EasyOcr(_) => EngineKind::EasyOcr,
        }
    }

    /// Recognize text in `image`, returning tokens in the image's own coordinates.
    pub async fn extract(&self, image: &DynamicImage, pool: &WorkerPool) -> Result<Vec<RawToken>> {
        match self {
            OcrEngine::Tesseract(engine) => engine.extract(image, pool).await,
            OcrEngine::EasyOcr(engine) => pool.run(engine.extract(image)).await,
        }
    }
}
