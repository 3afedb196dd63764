use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recognition backend selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Tesseract,
    EasyOcr,
}

impl EngineKind {
    pub const ALL: [EngineKind; 2] = [EngineKind::Tesseract, EngineKind::EasyOcr];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Tesseract => "tesseract",
            EngineKind::EasyOcr => "easyocr",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tesseract" => Ok(EngineKind::Tesseract),
            "easyocr" | "easy_ocr" | "easy-ocr" => Ok(EngineKind::EasyOcr),
            other => Err(format!(
                "unknown OCR engine '{other}', expected one of: tesseract, easyocr"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_engine_names() {
        assert_eq!("tesseract".parse(), Ok(EngineKind::Tesseract));
        assert_eq!("EasyOCR".parse(), Ok(EngineKind::EasyOcr));
        assert_eq!(" easy-ocr ".parse(), Ok(EngineKind::EasyOcr));
        assert!("paddle".parse::<EngineKind>().is_err());
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&EngineKind::EasyOcr).unwrap();
        assert_eq!(json, "\"easyocr\"");
        let parsed: EngineKind = serde_json::from_str("\"tesseract\"").unwrap();
        assert_eq!(parsed, EngineKind::Tesseract);
    }
}
