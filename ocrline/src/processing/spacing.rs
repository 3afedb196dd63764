use std::collections::BTreeMap;

use tracing::debug;

use crate::config::SpacingConfig;
use crate::models::Token;

/// Widest separator ever emitted, in spaces.
const MAX_WIDE_SPACES: usize = 8;
/// Lower bound for a line's median character width, in pixels.
const MIN_CHAR_WIDTH: f32 = 1.0;

/// Whitespace between two adjacent tokens on a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    Space,
    /// Two or more spaces marking a column break.
    Wide(usize),
}

impl Separator {
    pub fn width(&self) -> usize {
        match self {
            Separator::Space => 1,
            Separator::Wide(n) => *n,
        }
    }

    /// The wider of two separators.
    pub fn widest(self, other: Separator) -> Separator {
        if other.width() > self.width() {
            other
        } else {
            self
        }
    }

    fn push_to(&self, out: &mut String) {
        out.extend(std::iter::repeat(' ').take(self.width()));
    }
}

/// One corrected text line.
///
/// `separators[i]` sits between `tokens[i]` and `tokens[i + 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedLine {
    pub line_id: usize,
    pub tokens: Vec<Token>,
    pub separators: Vec<Separator>,
}

impl CorrectedLine {
    pub fn text(&self) -> String {
        let mut out = String::new();
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                self.separators[i - 1].push_to(&mut out);
            }
            out.push_str(&token.text);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn top(&self) -> f32 {
        self.tokens
            .iter()
            .map(|t| t.bbox.y0)
            .fold(f32::INFINITY, f32::min)
    }
}

/// Rebuilds word spacing from token geometry.
///
/// Gaps are measured in units of the line's median character width `w`:
/// below `merge_threshold * w` the tokens are glued together, from
/// `tab_threshold * w` on a wide separator is emitted, anything between is a
/// single space.
#[derive(Debug, Clone, Copy)]
pub struct SpacingCorrector {
    merge_threshold: f32,
    tab_threshold: f32,
}

impl Default for SpacingCorrector {
    fn default() -> Self {
        Self::new(&SpacingConfig::default())
    }
}

impl SpacingCorrector {
    pub fn new(config: &SpacingConfig) -> Self {
        Self {
            merge_threshold: config.merge_threshold,
            tab_threshold: config.tab_threshold,
        }
    }

    /// Group tokens by line, merge glued fragments and compute separators.
    ///
    /// Lines come back top to bottom. Never fails; empty input gives no lines.
    pub fn correct(&self, tokens: &[Token]) -> Vec<CorrectedLine> {
        let mut by_line: BTreeMap<usize, Vec<Token>> = BTreeMap::new();
        for token in tokens {
            by_line.entry(token.line_id).or_default().push(token.clone());
        }

        let mut lines: Vec<CorrectedLine> = by_line
            .into_iter()
            .map(|(line_id, tokens)| self.correct_line(line_id, tokens))
            .collect();

        // BTreeMap order already breaks ties by line_id; the sort is stable.
        lines.sort_by(|a, b| a.top().total_cmp(&b.top()));

        debug!(
            input_tokens = tokens.len(),
            output_tokens = lines.iter().map(|l| l.tokens.len()).sum::<usize>(),
            lines = lines.len(),
            "Spacing corrected"
        );
        lines
    }

    fn correct_line(&self, line_id: usize, mut tokens: Vec<Token>) -> CorrectedLine {
        tokens.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));

        let char_width = loop {
            let w = median_char_width(&tokens);
            let (merged, changed) = self.merge_pass(tokens, w);
            tokens = merged;
            if !changed {
                break w;
            }
        };

        let separators = tokens
            .windows(2)
            .map(|pair| self.separator_for(pair[0].gap_to(&pair[1]), char_width))
            .collect();

        CorrectedLine {
            line_id,
            tokens,
            separators,
        }
    }

    /// One left-to-right pass. Returns the new tokens and whether anything merged.
    fn merge_pass(&self, tokens: Vec<Token>, char_width: f32) -> (Vec<Token>, bool) {
        let merge_gap = self.merge_threshold * char_width;
        let mut changed = false;
        let mut out: Vec<Token> = Vec::with_capacity(tokens.len());

        for token in tokens {
            match out.last_mut() {
                Some(current) if current.gap_to(&token) < merge_gap => {
                    *current = current.merged_with(&token);
                    changed = true;
                }
                _ => out.push(token),
            }
        }

        (out, changed)
    }

    fn separator_for(&self, gap: f32, char_width: f32) -> Separator {
        let tab_gap = self.tab_threshold * char_width;
        if gap >= tab_gap && tab_gap > 0.0 {
            let spaces = 1 + (gap / tab_gap).floor() as usize;
            Separator::Wide(spaces.clamp(2, MAX_WIDE_SPACES))
        } else {
            Separator::Space
        }
    }
}

/// Median of `(x1 - x0) / chars` across the tokens, floored at one pixel.
fn median_char_width(tokens: &[Token]) -> f32 {
    let mut widths: Vec<f32> = tokens.iter().map(Token::char_width).collect();
    if widths.is_empty() {
        return MIN_CHAR_WIDTH;
    }
    widths.sort_by(f32::total_cmp);

    let mid = widths.len() / 2;
    let median = if widths.len() % 2 == 0 {
        (widths[mid - 1] + widths[mid]) / 2.0
    } else {
        widths[mid]
    };
    median.max(MIN_CHAR_WIDTH)
}

/// Join non-empty lines with newlines.
pub fn render(lines: &[CorrectedLine]) -> String {
    lines
        .iter()
        .filter(|line| !line.is_empty())
        .map(CorrectedLine::text)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, EngineKind};
    use pretty_assertions::assert_eq;

    fn token(text: &str, x0: f32, x1: f32, line_id: usize) -> Token {
        let y0 = line_id as f32 * 30.0;
        Token {
            text: text.to_string(),
            bbox: BoundingBox::new(x0, y0, x1, y0 + 20.0),
            confidence: 0.9,
            engine: EngineKind::Tesseract,
            line_id,
        }
    }

    #[test]
    fn test_median_char_width() {
        assert_eq!(median_char_width(&[]), 1.0);
        assert_eq!(
            median_char_width(&[token("ab", 0.0, 20.0, 0), token("abc", 30.0, 90.0, 0)]),
            15.0
        );
        assert_eq!(
            median_char_width(&[
                token("a", 0.0, 4.0, 0),
                token("a", 10.0, 20.0, 0),
                token("a", 30.0, 100.0, 0),
            ]),
            10.0
        );
        assert_eq!(median_char_width(&[token("abcd", 0.0, 2.0, 0)]), 1.0);
    }

    #[test]
    fn test_glued_fragments_merge() {
        let corrector = SpacingCorrector::default();
        let lines = corrector.correct(&[token("Hel", 0.0, 30.0, 0), token("lo", 31.0, 50.0, 0)]);

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].tokens.len(), 1);
        assert_eq!(lines[0].tokens[0].text, "Hello");
        assert_eq!(lines[0].tokens[0].bbox.x0, 0.0);
        assert_eq!(lines[0].tokens[0].bbox.x1, 50.0);
        assert!(lines[0].separators.is_empty());
    }

    #[test]
    fn test_gap_at_tab_threshold_is_wide() {
        let corrector = SpacingCorrector::default();
        let lines = corrector.correct(&[
            token("Hello", 0.0, 50.0, 0),
            token("World", 80.0, 130.0, 0),
        ]);
        assert_eq!(lines[0].separators, vec![Separator::Wide(2)]);
        assert_eq!(render(&lines), "Hello  World");
    }

    #[test]
    fn test_normal_gap_is_single_space() {
        let corrector = SpacingCorrector::default();
        let lines = corrector.correct(&[
            token("Hello", 0.0, 50.0, 0),
            token("World", 60.0, 110.0, 0),
        ]);
        assert_eq!(render(&lines), "Hello World");
    }

    #[test]
    fn test_wide_separator_grows_and_caps() {
        let corrector = SpacingCorrector::default();
        // w = 10, tab gap = 30: a gap of 65 gives 1 + 2 spaces.
        let lines = corrector.correct(&[token("ab", 0.0, 20.0, 0), token("cd", 85.0, 105.0, 0)]);
        assert_eq!(lines[0].separators, vec![Separator::Wide(3)]);

        let lines = corrector.correct(&[token("ab", 0.0, 20.0, 0), token("cd", 1020.0, 1040.0, 0)]);
        assert_eq!(lines[0].separators, vec![Separator::Wide(MAX_WIDE_SPACES)]);
    }

    #[test]
    fn test_merging_repeats_until_fixpoint() {
        let corrector = SpacingCorrector::default();
        let lines = corrector.correct(&[
            token("a", 0.0, 10.0, 0),
            token("b", 11.0, 21.0, 0),
            token("c", 22.0, 32.0, 0),
            token("next", 50.0, 90.0, 0),
        ]);
        assert_eq!(render(&lines), "abc next");
    }

    #[test]
    fn test_tokens_are_sorted_by_x_within_line() {
        let corrector = SpacingCorrector::default();
        let lines = corrector.correct(&[
            token("second", 100.0, 160.0, 0),
            token("first", 0.0, 50.0, 0),
        ]);
        assert_eq!(lines[0].tokens[0].text, "first");
    }

    #[test]
    fn test_lines_are_ordered_top_to_bottom() {
        let corrector = SpacingCorrector::default();
        let mut low = token("bottom", 0.0, 60.0, 0);
        low.bbox = BoundingBox::new(0.0, 100.0, 60.0, 120.0);
        let lines = corrector.correct(&[low, token("top", 0.0, 30.0, 1)]);
        assert_eq!(render(&lines), "top\nbottom");
    }

    #[test]
    fn test_correct_is_idempotent() {
        let corrector = SpacingCorrector::default();
        let input = vec![
            token("Inv", 0.0, 30.0, 0),
            token("oice", 31.0, 71.0, 0),
            token("No.", 80.0, 110.0, 0),
            token("42", 200.0, 220.0, 0),
            token("Total", 0.0, 50.0, 1),
            token("$", 120.0, 130.0, 1),
            token("9.99", 131.0, 171.0, 1),
        ];

        let first = corrector.correct(&input);
        let flattened: Vec<Token> = first.iter().flat_map(|l| l.tokens.clone()).collect();
        let second = corrector.correct(&flattened);

        assert_eq!(first, second);
        assert_eq!(render(&first), render(&second));
    }

    #[test]
    fn test_empty_input() {
        let lines = SpacingCorrector::default().correct(&[]);
        assert!(lines.is_empty());
        assert_eq!(render(&lines), "");
    }

    #[test]
    fn test_widest_separator() {
        assert_eq!(Separator::Space.widest(Separator::Wide(3)), Separator::Wide(3));
        assert_eq!(Separator::Wide(4).widest(Separator::Wide(2)), Separator::Wide(4));
    }
}
