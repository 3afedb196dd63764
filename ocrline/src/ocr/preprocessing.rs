use image::{DynamicImage, GenericImageView, GrayImage, ImageReader, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{self, Mask};
use imageproc::{contrast, filter};
use tracing::debug;

use crate::config::{ImageConfig, PreprocessingConfig};
use crate::error::{OcrlineError, Result};
use crate::models::{detect_image_format, ImageFormat};

const CLAHE_CLIP_LIMIT: f32 = 2.0;
const CLAHE_GRID: u32 = 8;
/// Half width of the horizontal stroke detector; strokes of at least
/// `2 * radius + 1` pixels count as ruled lines.
const LINE_KERNEL_RADIUS: u8 = 20;

/// Preprocessed image plus the resize factor applied to it.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub image: DynamicImage,
    /// `processed / original`; 1.0 when the image was not resized.
    pub scale: f32,
    /// Exact per-axis factors after rounding to whole pixels.
    pub scale_x: f32,
    pub scale_y: f32,
}

/// Resolve the format of an upload.
///
/// Magic bytes win over the declared format. Fails with
/// `UnsupportedFormat` when neither yields one of the supported formats.
pub fn resolve_format(bytes: &[u8], declared: Option<ImageFormat>) -> Result<ImageFormat> {
    match (detect_image_format(bytes), declared) {
        (Some(sniffed), Some(declared)) if sniffed != declared => {
            debug!(
                %sniffed,
                %declared,
                "Declared image format differs from content, using content"
            );
            Ok(sniffed)
        }
        (Some(sniffed), _) => Ok(sniffed),
        (None, Some(declared)) => Ok(declared),
        (None, None) => Err(OcrlineError::UnsupportedFormat(
            "could not determine image format from content".to_string(),
        )),
    }
}

/// Decode image bytes of a known format into a pixel grid.
pub fn decode_image(bytes: &[u8], format: ImageFormat) -> Result<DynamicImage> {
    let mut reader = ImageReader::new(std::io::Cursor::new(bytes));
    reader.set_format(format.to_image_format());
    reader
        .decode()
        .map_err(|e| OcrlineError::Decode(format!("Failed to decode {format} image: {e}")))
}

/// Normalizes and enhances images before recognition.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    max_dimension: u32,
    min_dimension: u32,
}

impl ImagePreprocessor {
    pub fn new(config: &ImageConfig) -> Self {
        Self {
            max_dimension: config.max_image_dimension.max(1),
            min_dimension: config.min_image_dimension,
        }
    }

    /// Runs the enabled stages in fixed order: resize, grayscale, denoise,
    /// contrast, sharpen, binarize, morphology.
    ///
    /// The input is left untouched so callers can keep using it.
    pub fn process(
        &self,
        image: &DynamicImage,
        config: &PreprocessingConfig,
    ) -> Result<ProcessedImage> {
        let (width, height) = image.dimensions();
        if width < self.min_dimension || height < self.min_dimension {
            return Err(OcrlineError::Validation(format!(
                "Image too small: {}x{}, minimum {}x{}",
                width, height, self.min_dimension, self.min_dimension
            )));
        }

        let (resized, scale) = resize_if_needed(image, self.max_dimension);
        let img = resized.unwrap_or_else(|| image.clone());

        let img = if config.needs_luma() {
            let mut gray = img.to_luma8();
            if config.denoise {
                gray = filter::median_filter(&gray, 1, 1);
            }
            if config.contrast_enhance {
                gray = clahe(&gray, CLAHE_GRID, CLAHE_CLIP_LIMIT);
            }
            if config.sharpen {
                gray = filter::sharpen3x3(&gray);
            }
            if config.binarize {
                gray = binarize(&gray);
            }
            if config.morphology {
                gray = morphology::open(&gray, Norm::LInf, 1);
                gray = morphology::close(&gray, Norm::LInf, 1);
            }
            if config.line_separation {
                gray = separate_lines(&gray);
            }
            DynamicImage::ImageLuma8(gray)
        } else if config.denoise {
            DynamicImage::ImageRgb8(filter::median_filter(&img.to_rgb8(), 1, 1))
        } else {
            img
        };

        debug!(
            width = img.width(),
            height = img.height(),
            scale,
            stages = ?config.enabled_stages(),
            "Image preprocessed"
        );

        Ok(ProcessedImage {
            scale_x: img.width() as f32 / width as f32,
            scale_y: img.height() as f32 / height as f32,
            image: img,
            scale,
        })
    }
}

/// Downscale so the longest side fits `max_dim`, keeping the aspect ratio.
///
/// Returns `None` with a factor of 1.0 when no resize was needed.
fn resize_if_needed(img: &DynamicImage, max_dim: u32) -> (Option<DynamicImage>, f32) {
    let (width, height) = img.dimensions();

    if width <= max_dim && height <= max_dim {
        return (None, 1.0);
    }

    let ratio = if width > height {
        max_dim as f32 / width as f32
    } else {
        max_dim as f32 / height as f32
    };

    let new_width = ((width as f32 * ratio).round() as u32).clamp(1, max_dim);
    let new_height = ((height as f32 * ratio).round() as u32).clamp(1, max_dim);

    // Lanczos3 keeps glyph edges crisp when downscaling.
    let resized = img.resize_exact(new_width, new_height, image::imageops::FilterType::Lanczos3);
    (Some(resized), ratio)
}

/// Lighten long dark horizontal strokes (ruled lines, underlines) so they do
/// not bridge neighbouring text lines, then close small vertical gaps.
fn separate_lines(gray: &GrayImage) -> GrayImage {
    let width = u32::from(LINE_KERNEL_RADIUS) * 2 + 1;
    let horizontal = Mask::from_image(
        &GrayImage::from_pixel(width, 1, Luma([255])),
        LINE_KERNEL_RADIUS,
        0,
    );
    let vertical = Mask::from_image(&GrayImage::from_pixel(1, 3, Luma([255])), 0, 1);

    // Dark strokes are bright in the inverted image; opening keeps only the long runs.
    let mut inverted = gray.clone();
    image::imageops::invert(&mut inverted);
    let strokes = morphology::grayscale_open(&inverted, &horizontal);

    let cleaned = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([gray.get_pixel(x, y)[0].saturating_add(strokes.get_pixel(x, y)[0])])
    });
    morphology::grayscale_close(&cleaned, &vertical)
}

/// Global Otsu threshold to pure black and white.
fn binarize(gray: &GrayImage) -> GrayImage {
    let level = contrast::otsu_level(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] > level {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Contrast limited adaptive histogram equalization.
///
/// The image is split into at most `grid x grid` tiles. Each tile gets a
/// clipped, redistributed histogram and its own lookup table; pixels are
/// mapped by bilinear interpolation between the four nearest tile centres.
fn clahe(gray: &GrayImage, grid: u32, clip_limit: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let tile_w = width.div_ceil(grid.clamp(1, width));
    let tile_h = height.div_ceil(grid.clamp(1, height));
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts.push(tile_lut(gray, x0, y0, x1, y1, clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];

    GrayImage::from_fn(width, height, |x, y| {
        let value = gray.get_pixel(x, y)[0] as usize;

        let fx = ((x as f32 + 0.5) / tile_w as f32 - 0.5).max(0.0);
        let fy = ((y as f32 + 0.5) / tile_h as f32 - 0.5).max(0.0);
        let tx0 = (fx.floor() as u32).min(tiles_x - 1);
        let ty0 = (fy.floor() as u32).min(tiles_y - 1);
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let ax = (fx - tx0 as f32).clamp(0.0, 1.0);
        let ay = (fy - ty0 as f32).clamp(0.0, 1.0);

        let top = lut_at(tx0, ty0)[value] as f32 * (1.0 - ax) + lut_at(tx1, ty0)[value] as f32 * ax;
        let bottom =
            lut_at(tx0, ty1)[value] as f32 * (1.0 - ax) + lut_at(tx1, ty1)[value] as f32 * ax;
        let mapped = top * (1.0 - ay) + bottom * ay;

        Luma([mapped.round().clamp(0.0, 255.0) as u8])
    })
}

fn tile_lut(gray: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut histogram = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            histogram[gray.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let pixel_count = (x1 - x0) * (y1 - y0);
    let limit = ((clip_limit * pixel_count as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for bin in histogram.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let share = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in histogram.iter_mut().enumerate() {
        *bin += share + u32::from(i < remainder);
    }

    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;
    for (value, count) in histogram.iter().enumerate() {
        cumulative += count;
        let mapped = cumulative as f32 * 255.0 / pixel_count.max(1) as f32;
        lut[value] = mapped.round().clamp(0.0, 255.0) as u8;
    }
    lut
}
