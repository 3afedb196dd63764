//! Text extraction from images over interchangeable OCR engines.
//!
//! An upload is decoded, cleaned up, recognized by Tesseract or EasyOCR and
//! turned back into text whose word spacing is rebuilt from token geometry.
//!
//! ```rust,ignore
//! let pipeline = ExtractionPipeline::new(&Config::from_env())?;
//! let result = pipeline.extract(&bytes, None, &OcrConfig::default()).await?;
//! println!("{}", result.full_text);
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod ocr;
pub mod processing;

pub use config::{Config, OcrConfig};
pub use error::{OcrlineError, Result};
pub use models::{EngineKind, ExtractionResult, ImageFormat, Token};
pub use processing::ExtractionPipeline;
