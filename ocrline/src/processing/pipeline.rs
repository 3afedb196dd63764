use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use image::GenericImageView;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{Config, OcrConfig};
use crate::error::{OcrlineError, Result};
use crate::models::{
    Capabilities, CapabilityFeatures, EngineKind, ExtractionResult, ImageFormat, RawToken, Token,
};
use crate::ocr::{
    decode_image, easyocr_languages, installed_languages, resolve_format, EngineRegistry,
    ImagePreprocessor, WorkerPool,
};

use super::confidence::{aggregate, filter_lines};
use super::spacing::{render, SpacingCorrector};
use super::{detect_language, normalize};

/// Text recovered from a token stream, before it is tied to an image.
#[derive(Debug, Clone, PartialEq)]
pub struct TextOutput {
    pub full_text: String,
    /// Retained tokens ordered by `(line_id, x0)`.
    pub tokens: Vec<Token>,
    pub overall_confidence: f32,
}

/// Runs one image through decoding, preprocessing, recognition and text
/// reconstruction. Requests are independent; the pipeline can be shared.
pub struct ExtractionPipeline {
    config: Config,
    registry: Arc<EngineRegistry>,
    pool: WorkerPool,
    preprocessor: ImagePreprocessor,
    corrector: SpacingCorrector,
}

impl ExtractionPipeline {
    /// Pipeline backed by the process-wide engine registry.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_registry(config, EngineRegistry::shared())
    }

    pub fn with_registry(config: &Config, registry: Arc<EngineRegistry>) -> Result<Self> {
        config.spacing.validate()?;

        Ok(Self {
            config: config.clone(),
            registry,
            pool: WorkerPool::new(
                config.engines.max_workers,
                Duration::from_secs(config.engines.timeout_secs),
            ),
            preprocessor: ImagePreprocessor::new(&config.images),
            corrector: SpacingCorrector::new(&config.spacing),
        })
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    /// Request options used when the caller has none of its own.
    pub fn default_options(&self) -> &OcrConfig {
        &self.config.ocr
    }

    /// Extract text from an encoded image.
    ///
    /// Any failure aborts the request; there is no partial result.
    pub async fn extract(
        &self,
        bytes: &[u8],
        declared_format: Option<ImageFormat>,
        options: &OcrConfig,
    ) -> Result<ExtractionResult> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let options = options.validated()?;
        let format = resolve_format(bytes, declared_format)?;

        debug!(
            request_id = %request_id,
            format = %format,
            bytes = bytes.len(),
            engine = %options.engine,
            "Starting extraction"
        );

        let stages = options.preprocessing(self.config.preprocessing);
        let preprocessor = self.preprocessor.clone();
        let owned = bytes.to_vec();
        let (original_width, original_height, processed) =
            tokio::task::spawn_blocking(move || -> Result<_> {
                let image = decode_image(&owned, format)?;
                let (width, height) = image.dimensions();
                let processed = preprocessor.process(&image, &stages)?;
                Ok((width, height, processed))
            })
            .await
            .map_err(|e| OcrlineError::Decode(format!("Image preprocessing panicked: {e}")))??;

        let engine = self
            .registry
            .get_or_init(options.engine, &options.languages, &self.config.engines)
            .await?;
        let raw_tokens = engine.extract(&processed.image, &self.pool).await?;

        let mut output = self.postprocess(raw_tokens, engine.kind(), options.confidence_threshold);
        output.tokens = rescale_tokens(output.tokens, processed.scale_x, processed.scale_y);

        let processing_time_ms = started.elapsed().as_millis() as u64;
        let language_detected = detect_language(&output.full_text).to_string();

        info!(
            request_id = %request_id,
            engine = %options.engine,
            tokens = output.tokens.len(),
            confidence = output.overall_confidence,
            processing_time_ms,
            "Extraction completed"
        );

        Ok(ExtractionResult {
            request_id,
            full_text: output.full_text,
            tokens: output.tokens,
            overall_confidence: output.overall_confidence,
            engine_used: engine.kind(),
            languages: options.languages,
            language_detected,
            processing_time_ms,
            image_width: original_width,
            image_height: original_height,
            image_format: format,
            preprocessed: options.preprocess,
            scale_factor: processed.scale,
            created_at: Utc::now(),
        })
    }

    /// Normalize, space-correct and filter an already recognized token stream.
    pub fn postprocess(
        &self,
        raw_tokens: Vec<RawToken>,
        engine: EngineKind,
        min_confidence: f32,
    ) -> TextOutput {
        let tokens = normalize(raw_tokens, engine);
        let lines = self.corrector.correct(&tokens);

        let merged: Vec<Token> = lines.iter().flat_map(|l| l.tokens.iter().cloned()).collect();
        let (mut kept, overall_confidence) = aggregate(&merged, min_confidence);
        kept.sort_by(|a, b| {
            a.line_id
                .cmp(&b.line_id)
                .then(a.bbox.x0.total_cmp(&b.bbox.x0))
        });

        let full_text = render(&filter_lines(lines, min_confidence));

        TextOutput {
            full_text,
            tokens: kept,
            overall_confidence,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        capabilities(&self.config)
    }
}

/// Map boxes from the preprocessed image back to the original one.
fn rescale_tokens(tokens: Vec<Token>, scale_x: f32, scale_y: f32) -> Vec<Token> {
    if (scale_x == 1.0 && scale_y == 1.0) || scale_x <= 0.0 || scale_y <= 0.0 {
        return tokens;
    }
    let (fx, fy) = (1.0 / scale_x, 1.0 / scale_y);
    tokens
        .into_iter()
        .map(|token| Token {
            bbox: token.bbox.scaled(fx, fy),
            ..token
        })
        .collect()
}

/// What this build can do under `config`.
pub fn capabilities(config: &Config) -> Capabilities {
    Capabilities {
        supported_engines: EngineKind::ALL.to_vec(),
        supported_formats: ImageFormat::ALL.to_vec(),
        default_engine: config.ocr.engine,
        default_languages: config.ocr.languages.clone(),
        tesseract_data_path: config.engines.tesseract_data_path.clone(),
        tesseract_languages: config
            .engines
            .tesseract_data_path
            .as_deref()
            .map(installed_languages)
            .unwrap_or_default(),
        easyocr_configured: config
            .engines
            .easyocr_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty()),
        easyocr_languages: easyocr_languages(),
        max_image_dimension: config.images.max_image_dimension,
        min_image_dimension: config.images.min_image_dimension,
        preprocessing_stages: config
            .preprocessing
            .enabled_stages()
            .into_iter()
            .map(String::from)
            .collect(),
        features: CapabilityFeatures::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpacingConfig;
    use crate::models::BoundingBox;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    fn pipeline() -> ExtractionPipeline {
        ExtractionPipeline::with_registry(&Config::default(), Arc::new(EngineRegistry::new()))
            .unwrap()
    }

    fn raw(text: &str, x0: f32, x1: f32, y0: f32, confidence: f32) -> RawToken {
        RawToken::new(text, BoundingBox::new(x0, y0, x1, y0 + 20.0), confidence)
    }

    fn boxed(bbox: BoundingBox) -> Token {
        Token {
            text: "x".to_string(),
            bbox,
            confidence: 1.0,
            engine: EngineKind::Tesseract,
            line_id: 0,
        }
    }

    #[test]
    fn test_rescale_inverts_downscale() {
        let token = boxed(BoundingBox::new(10.0, 10.0, 20.0, 20.0));
        let rescaled = rescale_tokens(vec![token], 0.5, 0.5);
        assert_eq!(rescaled[0].bbox, BoundingBox::new(20.0, 20.0, 40.0, 40.0));
    }

    #[test]
    fn test_rescale_uses_each_axis_factor() {
        // 1000x333 downscaled to 500x167.
        let token = boxed(BoundingBox::new(100.0, 167.0, 200.0, 167.0));
        let rescaled = rescale_tokens(vec![token], 0.5, 167.0 / 333.0);
        let bbox = rescaled[0].bbox;

        assert_eq!((bbox.x0, bbox.x1), (200.0, 400.0));
        assert!((bbox.y1 - 333.0).abs() < 1e-3, "{bbox:?}");
    }

    #[test]
    fn test_postprocess_builds_lines() {
        let output = pipeline().postprocess(
            vec![
                raw("Tot", 0.0, 30.0, 40.0, 0.9),
                raw("al", 31.0, 50.0, 40.0, 0.9),
                raw("9.99", 150.0, 190.0, 40.0, 0.8),
                raw("Invoice", 0.0, 70.0, 0.0, 0.95),
            ],
            EngineKind::Tesseract,
            0.5,
        );

        assert_eq!(output.full_text, "Invoice\nTotal    9.99");
        let texts: Vec<&str> = output.tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["Invoice", "Total", "9.99"]);
    }

    #[test]
    #[serial]
    fn test_postprocess_ignores_spacing_environment() {
        std::env::set_var("SPACING_TAB_THRESHOLD", "4.5");
        let output = pipeline().postprocess(
            vec![
                raw("Invoice", 0.0, 70.0, 0.0, 0.95),
                raw("Total", 0.0, 50.0, 40.0, 0.9),
                raw("9.99", 150.0, 190.0, 40.0, 0.8),
            ],
            EngineKind::Tesseract,
            0.5,
        );
        std::env::remove_var("SPACING_TAB_THRESHOLD");

        assert_eq!(output.full_text, "Invoice\nTotal    9.99");
    }

    #[test]
    fn test_postprocess_filters_low_confidence() {
        let output = pipeline().postprocess(
            vec![
                raw("keep", 0.0, 40.0, 0.0, 0.9),
                raw("~~", 50.0, 70.0, 0.0, 0.1),
                raw("also", 80.0, 120.0, 0.0, 0.7),
                raw("smudge", 0.0, 60.0, 40.0, 0.2),
            ],
            EngineKind::EasyOcr,
            0.5,
        );

        assert_eq!(output.full_text, "keep also");
        assert_eq!(output.tokens.len(), 2);
        assert!((output.overall_confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_postprocess_empty_stream() {
        let output = pipeline().postprocess(Vec::new(), EngineKind::Tesseract, 0.5);
        assert_eq!(output.full_text, "");
        assert!(output.tokens.is_empty());
        assert_eq!(output.overall_confidence, 0.0);
    }

    #[test]
    fn test_invalid_spacing_config_is_rejected() {
        let config = Config {
            spacing: SpacingConfig {
                merge_threshold: 1.0,
                tab_threshold: 0.5,
            },
            ..Config::default()
        };
        let result = ExtractionPipeline::with_registry(&config, Arc::new(EngineRegistry::new()));
        assert!(matches!(result, Err(OcrlineError::Validation(_))));
    }

    #[test]
    fn test_capabilities_reflect_config() {
        let data = tempfile::tempdir().unwrap();
        std::fs::write(data.path().join("eng.traineddata"), b"").unwrap();
        std::fs::write(data.path().join("fra.traineddata"), b"").unwrap();

        let mut config = Config::default();
        config.engines.easyocr_url = Some("http://localhost:8010".to_string());
        config.engines.tesseract_data_path = Some(data.path().display().to_string());
        config.preprocessing.binarize = true;

        let caps = capabilities(&config);
        assert_eq!(caps.tesseract_languages, vec!["eng", "fra"]);
        assert!(caps.easyocr_languages.contains(&"en".to_string()));
        assert_eq!(caps.supported_engines, vec![EngineKind::Tesseract, EngineKind::EasyOcr]);
        assert_eq!(caps.supported_formats.len(), 6);
        assert!(caps.easyocr_configured);
        assert!(caps.preprocessing_stages.contains(&"binarize".to_string()));
        assert!(caps.features.spacing_correction);
    }

    #[tokio::test]
    async fn test_unsupported_bytes_fail_before_any_stage() {
        let result = pipeline()
            .extract(b"definitely not an image", None, &OcrConfig::default())
            .await;
        assert!(matches!(result, Err(OcrlineError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_invalid_options_fail_first() {
        let options = OcrConfig {
            confidence_threshold: 2.0,
            ..OcrConfig::default()
        };
        let result = pipeline().extract(b"garbage", None, &options).await;
        assert!(matches!(result, Err(OcrlineError::Validation(_))));
    }
}
