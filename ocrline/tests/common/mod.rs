#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ocrline::config::Config;
use ocrline::models::{BoundingBox, EngineKind, Token};
use ocrline::ocr::EngineRegistry;
use ocrline::ExtractionPipeline;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// White PNG with a few dark bars, roughly where text would sit.
pub fn text_like_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let in_row = y > height / 4 && y < height * 3 / 4;
        let in_word = (x / 12) % 3 != 2;
        if in_row && in_word {
            Rgb([20, 20, 20])
        } else {
            Rgb([250, 250, 250])
        }
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
}

pub fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut output = Vec::new();
    img.write_to(&mut Cursor::new(&mut output), format)
        .expect("Failed to encode test image");
    output
}

/// An EasyOCR detection as the sidecar reports it.
pub fn detection(text: &str, x0: f32, y0: f32, x1: f32, y1: f32, confidence: f32) -> Value {
    json!({
        "box": [[x0, y0], [x1, y0], [x1, y1], [x0, y1]],
        "text": text,
        "confidence": confidence,
    })
}

pub async fn mount_reader(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/readers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ready" })))
        .mount(server)
        .await;
}

pub async fn mount_readtext(server: &MockServer, detections: Vec<Value>) {
    Mock::given(method("POST"))
        .and(path("/v1/readtext"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": detections })))
        .mount(server)
        .await;
}

pub async fn mount_slow_readtext(server: &MockServer, delay: Duration) {
    Mock::given(method("POST"))
        .and(path("/v1/readtext"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "results": [] }))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Default configuration pointed at a mock EasyOCR service.
pub fn easyocr_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.engines.easyocr_url = Some(server.uri());
    config.engines.easyocr_api_key = None;
    config.engines.timeout_secs = 10;
    config.ocr.engine = EngineKind::EasyOcr;
    config.ocr.languages = vec!["en".to_string()];
    config.ocr.confidence_threshold = 0.5;
    config.ocr.preprocess = true;
    config
}

/// Pipeline with its own registry so tests do not share engines.
pub fn isolated_pipeline(config: &Config) -> ExtractionPipeline {
    ExtractionPipeline::with_registry(config, Arc::new(EngineRegistry::new()))
        .expect("Failed to build pipeline")
}

pub fn token(text: &str, x0: f32, x1: f32, line_id: usize, confidence: f32) -> Token {
    let y0 = line_id as f32 * 40.0;
    Token {
        text: text.to_string(),
        bbox: BoundingBox::new(x0, y0, x1, y0 + 20.0),
        confidence,
        engine: EngineKind::Tesseract,
        line_id,
    }
}
