use tracing::debug;

use crate::models::{BoundingBox, EngineKind, RawToken, Token};

/// Minimum share of the shorter token's height two boxes must overlap by to
/// sit on the same line.
const LINE_OVERLAP_RATIO: f32 = 0.5;

/// Turn adapter output into canonical tokens with line assignments.
///
/// Text is trimmed and empty tokens are dropped. Confidence is clamped to
/// `[0, 1]` with non-finite values becoming `0`. Lines are found in one pass
/// over emission order, each token compared against the first token of the
/// current line. Line ids are then assigned top to bottom and the result is
/// sorted by `(line_id, x0)`.
pub fn normalize(raw_tokens: Vec<RawToken>, engine: EngineKind) -> Vec<Token> {
    let received = raw_tokens.len();
    let mut clusters: Vec<Cluster> = Vec::new();

    for raw in raw_tokens {
        let text = raw.text.trim();
        if text.is_empty() || !is_finite_box(&raw.bbox) {
            continue;
        }

        let token = Token {
            text: text.to_string(),
            bbox: BoundingBox::new(raw.bbox.x0, raw.bbox.y0, raw.bbox.x1, raw.bbox.y1),
            confidence: clamp_confidence(raw.confidence),
            engine,
            line_id: 0,
        };

        match clusters.last_mut() {
            Some(current) if same_line(&current.reference, &token.bbox) => current.push(token),
            _ => clusters.push(Cluster::new(token)),
        }
    }

    // Stable sort keeps creation order for clusters starting at the same height.
    clusters.sort_by(|a, b| a.top.total_cmp(&b.top));

    let mut tokens: Vec<Token> = clusters
        .into_iter()
        .enumerate()
        .flat_map(|(line_id, cluster)| {
            cluster.tokens.into_iter().map(move |mut token| {
                token.line_id = line_id;
                token
            })
        })
        .collect();
    tokens.sort_by(|a, b| {
        a.line_id
            .cmp(&b.line_id)
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
    });

    debug!(
        received,
        kept = tokens.len(),
        lines = tokens.last().map_or(0, |t| t.line_id + 1),
        "Normalized OCR tokens"
    );
    tokens
}

struct Cluster {
    reference: BoundingBox,
    top: f32,
    tokens: Vec<Token>,
}

impl Cluster {
    fn new(token: Token) -> Self {
        Self {
            reference: token.bbox,
            top: token.bbox.y0,
            tokens: vec![token],
        }
    }

    fn push(&mut self, token: Token) {
        self.top = self.top.min(token.bbox.y0);
        self.tokens.push(token);
    }
}

fn same_line(reference: &BoundingBox, candidate: &BoundingBox) -> bool {
    let shorter = reference.height().min(candidate.height());
    if shorter <= 0.0 {
        // A flat box belongs to the line when it lies inside the other's range.
        return reference.y0.max(candidate.y0) <= reference.y1.min(candidate.y1);
    }
    reference.vertical_overlap(candidate) > LINE_OVERLAP_RATIO * shorter
}

fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn is_finite_box(bbox: &BoundingBox) -> bool {
    [bbox.x0, bbox.y0, bbox.x1, bbox.y1]
        .iter()
        .all(|v| v.is_finite())
}
