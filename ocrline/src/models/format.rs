use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::OcrlineError;

/// Image format detected from magic bytes or declared by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Bmp,
    Tiff,
    WebP,
    Gif,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 6] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Bmp,
        ImageFormat::Tiff,
        ImageFormat::WebP,
        ImageFormat::Gif,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Tiff => "tiff",
            ImageFormat::WebP => "webp",
            ImageFormat::Gif => "gif",
        }
    }

    /// File extensions accepted for this format, leading dot omitted.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ImageFormat::Jpeg => &["jpg", "jpeg"],
            ImageFormat::Png => &["png"],
            ImageFormat::Bmp => &["bmp"],
            ImageFormat::Tiff => &["tif", "tiff"],
            ImageFormat::WebP => &["webp"],
            ImageFormat::Gif => &["gif"],
        }
    }

    /// Resolve a declared format from a file name, extension or MIME type.
    pub fn from_extension(declared: &str) -> Option<Self> {
        let lower = declared.trim().to_lowercase();
        let ext = lower
            .rsplit(['.', '/'])
            .next()
            .unwrap_or(lower.as_str());

        Self::ALL
            .into_iter()
            .find(|format| format.extensions().contains(&ext))
    }

    pub fn to_image_format(self) -> image::ImageFormat {
        match self {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Bmp => image::ImageFormat::Bmp,
            ImageFormat::Tiff => image::ImageFormat::Tiff,
            ImageFormat::WebP => image::ImageFormat::WebP,
            ImageFormat::Gif => image::ImageFormat::Gif,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = OcrlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| {
            OcrlineError::UnsupportedFormat(format!(
                "'{s}', supported formats: jpeg, png, bmp, tiff, webp, gif"
            ))
        })
    }
}

/// Detect image format from magic bytes
pub fn detect_image_format(bytes: &[u8]) -> Option<ImageFormat> {
    // JPEG: FF D8 FF
    if bytes.len() >= 3 && bytes[0..3] == [0xFF, 0xD8, 0xFF] {
        return Some(ImageFormat::Jpeg);
    }
    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if bytes.len() >= 8 && bytes[0..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
        return Some(ImageFormat::Png);
    }
    // GIF: "GIF87a" / "GIF89a"
    if bytes.len() >= 6 && (&bytes[0..6] == b"GIF87a" || &bytes[0..6] == b"GIF89a") {
        return Some(ImageFormat::Gif);
    }
    // WebP: RIFF....WEBP
    if bytes.len() >= 12
        && bytes[0..4] == [0x52, 0x49, 0x46, 0x46]
        && bytes[8..12] == [0x57, 0x45, 0x42, 0x50]
    {
        return Some(ImageFormat::WebP);
    }
    // TIFF Little Endian: 49 49 2A 00
    if bytes.len() >= 4 && bytes[0..4] == [0x49, 0x49, 0x2A, 0x00] {
        return Some(ImageFormat::Tiff);
    }
    // TIFF Big Endian: 4D 4D 00 2A
    if bytes.len() >= 4 && bytes[0..4] == [0x4D, 0x4D, 0x00, 0x2A] {
        return Some(ImageFormat::Tiff);
    }
    // BMP: 42 4D
    if bytes.len() >= 2 && bytes[0..2] == [0x42, 0x4D] {
        return Some(ImageFormat::Bmp);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_png_and_jpeg() {
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
        assert_eq!(detect_image_format(&png), Some(ImageFormat::Png));
        assert_eq!(
            detect_image_format(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(ImageFormat::Jpeg)
        );
    }

    #[test]
    fn test_detect_gif_and_webp() {
        assert_eq!(detect_image_format(b"GIF89a...."), Some(ImageFormat::Gif));
        assert_eq!(
            detect_image_format(b"RIFF\x00\x00\x00\x00WEBPVP8 "),
            Some(ImageFormat::WebP)
        );
    }

    #[test]
    fn test_detect_tiff_both_endians() {
        assert_eq!(
            detect_image_format(&[0x49, 0x49, 0x2A, 0x00]),
            Some(ImageFormat::Tiff)
        );
        assert_eq!(
            detect_image_format(&[0x4D, 0x4D, 0x00, 0x2A]),
            Some(ImageFormat::Tiff)
        );
    }

    #[test]
    fn test_detect_unknown_bytes() {
        assert_eq!(detect_image_format(b"%PDF-1.7"), None);
        assert_eq!(detect_image_format(&[]), None);
    }

    #[test]
    fn test_from_extension_accepts_names_and_mime_types() {
        assert_eq!(ImageFormat::from_extension("scan.JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension(".tif"), Some(ImageFormat::Tiff));
        assert_eq!(ImageFormat::from_extension("image/webp"), Some(ImageFormat::WebP));
        assert_eq!(ImageFormat::from_extension("gif"), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::from_extension("report.pdf"), None);
    }

    #[test]
    fn test_from_str_reports_unsupported_format() {
        let err = "svg".parse::<ImageFormat>().unwrap_err();
        assert!(matches!(err, OcrlineError::UnsupportedFormat(_)));
    }
}
