mod confidence;
mod language;
mod normalizer;
mod pipeline;
mod spacing;

pub use confidence::{aggregate, filter_lines, mean_confidence};
pub use language::detect_language;
pub use normalizer::normalize;
pub use pipeline::{capabilities, ExtractionPipeline, TextOutput};
pub use spacing::{render, CorrectedLine, Separator, SpacingCorrector};
