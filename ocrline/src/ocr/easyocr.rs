use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::DynamicImage;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{OcrlineError, Result};
use crate::models::{BoundingBox, RawToken};

use super::engine::{encode_png, to_easyocr_code};

/// Client for an EasyOCR recognition service.
///
/// EasyOCR only exists as a Python library, so it runs as a sidecar process.
/// `POST /v1/readers` loads a reader for a language set and
/// `POST /v1/readtext` recognizes a base64 encoded PNG.
#[derive(Clone, Debug)]
pub struct EasyOcrEngine {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    languages: Vec<String>,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct ReaderRequest<'a> {
    languages: &'a [String],
}

#[derive(Debug, Serialize)]
struct ReadTextRequest<'a> {
    languages: &'a [String],
    image: String,
    detail: u8,
}

#[derive(Debug, Deserialize)]
struct ReadTextResponse {
    results: Vec<Detection>,
}

/// One EasyOCR detection: a quadrilateral, its text and a 0-1 confidence.
#[derive(Debug, Deserialize)]
struct Detection {
    #[serde(rename = "box")]
    polygon: Vec<[f32; 2]>,
    text: String,
    confidence: f32,
}

impl Detection {
    fn into_raw_token(self) -> Option<RawToken> {
        let Some(bbox) = BoundingBox::from_points(&self.polygon) else {
            debug!(text = %self.text, "Skipping EasyOCR detection without geometry");
            return None;
        };
        let confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Some(RawToken::new(self.text, bbox, confidence))
    }
}

impl EasyOcrEngine {
    /// Connect to the service and have it load a reader for `languages`.
    pub async fn connect(config: &EngineConfig, languages: &[String]) -> Result<Self> {
        let base_url = config
            .easyocr_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                OcrlineError::EngineUnavailable("EASYOCR_URL is not configured".to_string())
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                OcrlineError::EngineUnavailable(format!("Failed to create HTTP client: {e}"))
            })?;

        let engine = Self {
            client,
            base_url,
            api_key: config.easyocr_api_key.clone(),
            languages: languages.iter().map(|code| to_easyocr_code(code)).collect(),
            timeout_secs: config.timeout_secs,
        };

        engine.load_reader().await?;
        info!(
            base_url = %engine.base_url,
            languages = ?engine.languages,
            "EasyOCR backend initialized"
        );

        Ok(engine)
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    async fn load_reader(&self) -> Result<()> {
        let response = self
            .post("/v1/readers")
            .json(&ReaderRequest {
                languages: &self.languages,
            })
            .send()
            .await
            .map_err(|e| {
                OcrlineError::EngineUnavailable(format!("EasyOCR service unreachable: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OcrlineError::EngineUnavailable(format!(
                "EasyOCR could not load languages {:?}: {status} - {body}",
                self.languages
            )));
        }

        Ok(())
    }

    pub async fn extract(&self, image: &DynamicImage) -> Result<Vec<RawToken>> {
        let png = encode_png(image)?;
        let request = ReadTextRequest {
            languages: &self.languages,
            image: STANDARD.encode(png),
            detail: 1,
        };

        let response = self
            .post("/v1/readtext")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OcrlineError::Recognition(format!(
                "EasyOCR request failed: {status} - {body}"
            )));
        }

        let parsed: ReadTextResponse = response.json().await.map_err(|e| {
            OcrlineError::Recognition(format!("Failed to parse EasyOCR response: {e}"))
        })?;

        let tokens: Vec<RawToken> = parsed
            .results
            .into_iter()
            .filter_map(Detection::into_raw_token)
            .collect();
        debug!(token_count = tokens.len(), "EasyOCR recognition finished");
        Ok(tokens)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let builder = self.client.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn request_error(&self, e: reqwest::Error) -> OcrlineError {
        if e.is_timeout() {
            OcrlineError::Timeout {
                seconds: self.timeout_secs,
            }
        } else {
            OcrlineError::Recognition(format!("EasyOCR request failed: {e}"))
        }
    }
}
