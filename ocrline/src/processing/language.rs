/// Share of ASCII characters above which text is reported as English.
const ASCII_RATIO_THRESHOLD: f32 = 0.8;

/// Rough language guess for extracted text.
/// Returns "unknown" for blank text, "en" for mostly-ASCII text, "other" otherwise.
pub fn detect_language(text: &str) -> &'static str {
    if text.trim().is_empty() {
        return "unknown";
    }

    let total = text.chars().count();
    let ascii = text.chars().filter(char::is_ascii).count();

    if ascii as f32 / total as f32 > ASCII_RATIO_THRESHOLD {
        "en"
    } else {
        "other"
    }
}
