use std::fs;
use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use leptess::LepTess;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{OcrlineError, Result};
use crate::models::{BoundingBox, RawToken};

use super::engine::{encode_png, to_tesseract_code};
use super::pool::WorkerPool;

/// TSV `level` column value for word rows.
const WORD_LEVEL: u32 = 5;
/// Resolution reported to Tesseract for images that carry no DPI metadata.
const SOURCE_RESOLUTION: i32 = 300;
const TRAINEDDATA_EXTENSION: &str = "traineddata";

/// Local recognition through libtesseract.
pub struct TesseractEngine {
    api: Arc<Mutex<LepTess>>,
}

impl TesseractEngine {
    /// Load Tesseract with the given languages joined as `eng+deu`.
    ///
    /// Fails with `EngineUnavailable` when language data is missing.
    pub fn new(data_path: Option<&str>, languages: &[String]) -> Result<Self> {
        let languages = languages
            .iter()
            .map(|code| to_tesseract_code(code))
            .collect::<Vec<_>>()
            .join("+");

        let api = LepTess::new(data_path, &languages).map_err(|e| {
            OcrlineError::EngineUnavailable(format!(
                "Tesseract could not load languages '{languages}': {e}"
            ))
        })?;

        info!(languages = %languages, "Tesseract OCR initialized");

        Ok(Self {
            api: Arc::new(Mutex::new(api)),
        })
    }

    pub async fn extract(&self, image: &DynamicImage, pool: &WorkerPool) -> Result<Vec<RawToken>> {
        let png = encode_png(image)?;
        let api = Arc::clone(&self.api);

        let tsv = pool
            .run_blocking(move || {
                let mut lt = api.blocking_lock();
                lt.set_image_from_mem(&png)
                    .map_err(|e| OcrlineError::Recognition(format!("Failed to set image: {e}")))?;
                lt.set_source_resolution(SOURCE_RESOLUTION);
                lt.get_tsv_text(0)
                    .map_err(|e| OcrlineError::Recognition(format!("Failed to extract text: {e}")))
            })
            .await?;

        let tokens = parse_tsv(&tsv);
        debug!(token_count = tokens.len(), "Tesseract recognition finished");
        Ok(tokens)
    }
}

/// Language packs (`<code>.traineddata`) installed under `data_path`.
///
/// `data_path` may point at the `tessdata` directory itself or at its parent,
/// as `TESSDATA_PREFIX` does. Returns a sorted list, empty when nothing is found.
pub fn installed_languages(data_path: &str) -> Vec<String> {
    let root = Path::new(data_path);
    let mut languages: Vec<String> = [root.to_path_buf(), root.join("tessdata")]
        .iter()
        .filter_map(|dir| fs::read_dir(dir).ok())
        .flatten()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext == TRAINEDDATA_EXTENSION)
        })
        .filter_map(|path| path.file_stem()?.to_str().map(str::to_string))
        .collect();

    languages.sort();
    languages.dedup();
    debug!(data_path, count = languages.len(), "Listed Tesseract languages");
    languages
}

/// Word rows of Tesseract TSV output as raw tokens.
///
/// Columns: level, page, block, paragraph, line, word, left, top, width,
/// height, conf, text. Header lines, non-word rows and rows with a negative
/// confidence are skipped. Confidence is rescaled from 0-100 to 0-1.
pub(crate) fn parse_tsv(tsv: &str) -> Vec<RawToken> {
    tsv.lines().filter_map(parse_tsv_row).collect()
}

fn parse_tsv_row(line: &str) -> Option<RawToken> {
    let fields: Vec<&str> = line.trim_end_matches('\r').splitn(12, '\t').collect();
    if fields.len() < 12 {
        return None;
    }

    let level: u32 = fields[0].parse().ok()?;
    if level != WORD_LEVEL {
        return None;
    }

    let left: f32 = fields[6].parse().ok()?;
    let top: f32 = fields[7].parse().ok()?;
    let width: f32 = fields[8].parse().ok()?;
    let height: f32 = fields[9].parse().ok()?;
    let conf: f32 = fields[10].parse().ok()?;
    if conf < 0.0 {
        return None;
    }

    Some(RawToken::new(
        fields[11],
        BoundingBox::from_xywh(left, top, width, height),
        (conf / 100.0).clamp(0.0, 1.0),
    ))
}
