mod compose;
mod fit;
mod font;

pub use compose::{Composite, Compositor};
pub use fit::{Alignment, FitParams, Placement, fit_font_size, is_sentence, place_text};
pub use font::{
    EstimatedMetrics, FontMetrics, FontSource, GlyphMetrics, ResolvedFont, TextExtent,
    load_font_metrics, resolve_font,
};

/// Why a single line could not be drawn. The line is skipped; the rest of
/// the image is still composited.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("line has no translated text")]
    MissingTranslation,
    #[error("nothing to draw")]
    EmptyText,
    #[error("failed to measure text: {0}")]
    Measure(String),
    #[error("font error: {0}")]
    Font(String),
    #[error("failed to draw text: {0}")]
    Draw(String),
}
