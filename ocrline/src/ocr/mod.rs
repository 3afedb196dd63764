//! Image preparation and recognition engines.
//!
//! # Architecture
//!
//! - `ImagePreprocessor` bounds image size and applies the enabled cleanup stages
//! - `OcrEngine` is the closed set of backends:
//!   - `TesseractEngine` runs libtesseract locally through leptess
//!   - `EasyOcrEngine` talks to an EasyOCR service over HTTP
//! - `EngineRegistry` loads each (engine, languages) pair once and shares it
//! - `WorkerPool` bounds concurrent recognition calls and applies the timeout
//!
//! Engines return `RawToken`s in the coordinates of the image they were given.
//! Mapping back to the original image is the caller's job.

mod easyocr;
mod engine;
mod pool;
mod preprocessing;
mod registry;
mod tesseract;

pub use easyocr::EasyOcrEngine;
pub use engine::{easyocr_languages, OcrEngine};
pub use pool::WorkerPool;
pub use preprocessing::{decode_image, resolve_format, ImagePreprocessor, ProcessedImage};
pub use registry::{EngineKey, EngineRegistry};
pub use tesseract::{installed_languages, TesseractEngine};
