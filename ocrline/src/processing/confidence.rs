use tracing::debug;

use crate::models::Token;

use super::spacing::{CorrectedLine, Separator};

/// Drop tokens below `min_confidence` and average the rest.
///
/// The mean is `0.0` when nothing survives.
pub fn aggregate(tokens: &[Token], min_confidence: f32) -> (Vec<Token>, f32) {
    let kept: Vec<Token> = tokens
        .iter()
        .filter(|t| t.confidence >= min_confidence)
        .cloned()
        .collect();
    let overall = mean_confidence(&kept);
    (kept, overall)
}

pub fn mean_confidence(tokens: &[Token]) -> f32 {
    if tokens.is_empty() {
        return 0.0;
    }
    let sum: f32 = tokens.iter().map(|t| t.confidence).sum();
    (sum / tokens.len() as f32).clamp(0.0, 1.0)
}

/// Remove low-confidence tokens from corrected lines.
///
/// Separators were computed with every token present. When a run of removed
/// tokens sits between two kept ones, the kept pair is joined by the widest
/// separator the run spanned. Lines left without tokens are dropped.
pub fn filter_lines(lines: Vec<CorrectedLine>, min_confidence: f32) -> Vec<CorrectedLine> {
    let mut removed = 0usize;

    let filtered: Vec<CorrectedLine> = lines
        .into_iter()
        .filter_map(|line| {
            let CorrectedLine {
                line_id,
                tokens,
                separators,
            } = line;

            let mut kept: Vec<Token> = Vec::with_capacity(tokens.len());
            let mut kept_separators: Vec<Separator> = Vec::new();
            // Widest separator seen since the last kept token.
            let mut pending: Option<Separator> = None;

            for (i, token) in tokens.into_iter().enumerate() {
                if i > 0 && !kept.is_empty() {
                    let sep = separators[i - 1];
                    pending = Some(pending.map_or(sep, |p| p.widest(sep)));
                }
                if token.confidence >= min_confidence {
                    if let Some(sep) = pending.take() {
                        kept_separators.push(sep);
                    }
                    kept.push(token);
                } else {
                    removed += 1;
                }
            }

            (!kept.is_empty()).then_some(CorrectedLine {
                line_id,
                tokens: kept,
                separators: kept_separators,
            })
        })
        .collect();

    if removed > 0 {
        debug!(removed, min_confidence, "Filtered low-confidence tokens");
    }
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, EngineKind};
    use crate::processing::spacing::render;
    use pretty_assertions::assert_eq;

    fn token(text: &str, confidence: f32) -> Token {
        Token {
            text: text.to_string(),
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            confidence,
            engine: EngineKind::EasyOcr,
            line_id: 0,
        }
    }

    fn line(line_id: usize, tokens: Vec<Token>, separators: Vec<Separator>) -> CorrectedLine {
        CorrectedLine {
            line_id,
            tokens,
            separators,
        }
    }

    #[test]
    fn test_aggregate_empty() {
        let (kept, overall) = aggregate(&[], 0.5);
        assert!(kept.is_empty());
        assert_eq!(overall, 0.0);
    }

    #[test]
    fn test_aggregate_filters_and_averages() {
        let tokens = vec![token("a", 0.9), token("b", 0.2), token("c", 0.5)];
        let (kept, overall) = aggregate(&tokens, 0.5);
        let texts: Vec<&str> = kept.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "c"]);
        assert!((overall - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_aggregate_nothing_kept_is_zero_not_nan() {
        let (kept, overall) = aggregate(&[token("a", 0.1)], 0.5);
        assert!(kept.is_empty());
        assert_eq!(overall, 0.0);
    }

    #[test]
    fn test_filter_keeps_widest_spanned_separator() {
        let lines = vec![line(
            0,
            vec![
                token("Name", 0.9),
                token("~", 0.1),
                token("^", 0.1),
                token("Value", 0.9),
            ],
            vec![Separator::Space, Separator::Wide(4), Separator::Space],
        )];

        let filtered = filter_lines(lines, 0.5);
        assert_eq!(filtered[0].separators, vec![Separator::Wide(4)]);
        assert_eq!(render(&filtered), "Name    Value");
    }

    #[test]
    fn test_filter_drops_leading_and_trailing_runs() {
        let lines = vec![line(
            0,
            vec![token("x", 0.1), token("keep", 0.9), token("y", 0.1)],
            vec![Separator::Wide(3), Separator::Wide(5)],
        )];

        let filtered = filter_lines(lines, 0.5);
        assert_eq!(filtered[0].tokens.len(), 1);
        assert!(filtered[0].separators.is_empty());
        assert_eq!(render(&filtered), "keep");
    }

    #[test]
    fn test_filter_drops_empty_lines() {
        let lines = vec![
            line(0, vec![token("noise", 0.1)], vec![]),
            line(1, vec![token("a", 0.8), token("b", 0.8)], vec![Separator::Space]),
        ];

        let filtered = filter_lines(lines, 0.5);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].line_id, 1);
        assert_eq!(render(&filtered), "a b");
    }

    #[test]
    fn test_zero_threshold_keeps_everything() {
        let lines = vec![line(
            0,
            vec![token("a", 0.0), token("b", 1.0)],
            vec![Separator::Space],
        )];
        let filtered = filter_lines(lines.clone(), 0.0);
        assert_eq!(filtered, lines);
    }
}
