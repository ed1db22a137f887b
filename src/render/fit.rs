use serde::Serialize;

use super::RenderError;
use super::font::{GlyphMetrics, TextExtent};
use crate::ocr::BBoxPx;

const SENTENCE_ENDINGS: &[&str] = &["。", "！", "？", "…", ".", "!", "?", "..."];
const PARTICLES: &[char] = &['的', '了', '著', '過', '是', '有'];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitParams {
    pub min_font_size: f32,
    /// First-pass font size as a multiple of the line height.
    pub height_scale: f32,
    /// Shrink once the text is wider than this multiple of the line width.
    pub overflow_ratio: f32,
    /// Extra factor applied to the shrink ratio.
    pub shrink_margin: f32,
    /// Pixels the text is raised to offset font ascent.
    pub baseline_shift: i32,
    /// Texts longer than this many characters count as sentences.
    pub sentence_min_chars: usize,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            min_font_size: 6.0,
            height_scale: 1.2,
            overflow_ratio: 1.15,
            shrink_margin: 0.95,
            baseline_shift: 5,
            sentence_min_chars: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Alignment {
    Left,
    Center,
}

/// Where and how large a line's translation is drawn. `(x, y)` is the
/// top-left corner of the measured text box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub font_size: f32,
    pub x: i32,
    pub y: i32,
    pub extent: TextExtent,
    pub alignment: Alignment,
}

/// Picks a font size from the line height and shrinks it once if the text
/// overflows the original width. Any overflow left after that is accepted.
pub fn fit_font_size(
    text: &str,
    bbox: &BBoxPx,
    metrics: &dyn GlyphMetrics,
    params: &FitParams,
) -> Result<(f32, TextExtent), RenderError> {
    let mut font_size = (bbox.h as f32 * params.height_scale).max(params.min_font_size);
    let mut extent = metrics.measure(text, font_size)?;
    let target_width = bbox.w as f32;
    if extent.width > target_width * params.overflow_ratio {
        let ratio = target_width / extent.width * params.shrink_margin;
        font_size = (font_size * ratio).floor().max(params.min_font_size);
        extent = metrics.measure(text, font_size)?;
    }
    Ok((font_size, extent))
}

/// Sentences are left-aligned; labels and short words are centered.
pub fn is_sentence(text: &str, params: &FitParams) -> bool {
    let trimmed = text.trim();
    SENTENCE_ENDINGS.iter().any(|ending| trimmed.ends_with(ending))
        || trimmed.chars().count() > params.sentence_min_chars
        || text.chars().any(|ch| PARTICLES.contains(&ch))
}

pub fn place_text(
    original: &str,
    translated: &str,
    bbox: &BBoxPx,
    metrics: &dyn GlyphMetrics,
    params: &FitParams,
) -> Result<Placement, RenderError> {
    let (font_size, extent) = fit_font_size(translated, bbox, metrics, params)?;
    let alignment = if is_sentence(original, params) || is_sentence(translated, params) {
        Alignment::Left
    } else {
        Alignment::Center
    };

    let x = match alignment {
        Alignment::Left => bbox.x as i32,
        Alignment::Center => bbox.x as i32 + ((bbox.w as f32 - extent.width) / 2.0).floor() as i32,
    };
    let y = bbox.y as i32 + ((bbox.h as f32 - extent.height) / 2.0).floor() as i32
        - params.baseline_shift;

    Ok(Placement {
        font_size,
        x,
        y,
        extent,
        alignment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every character is half an em wide and one em tall, at whole-pixel sizes.
    struct HalfEm;

    impl GlyphMetrics for HalfEm {
        fn family(&self) -> Option<&str> {
            None
        }

        fn measure(&self, text: &str, font_size: f32) -> Result<TextExtent, RenderError> {
            let size = font_size.round();
            Ok(TextExtent {
                width: text.chars().count() as f32 * size * 0.5,
                height: size,
            })
        }

        fn ascent(&self, font_size: f32) -> f32 {
            font_size
        }
    }

    fn fit(text: &str, bbox: BBoxPx) -> (f32, TextExtent) {
        fit_font_size(text, &bbox, &HalfEm, &FitParams::default()).unwrap()
    }

    #[test]
    fn narrow_text_keeps_first_pass_size() {
        let (size, extent) = fit("short", BBoxPx::new(0, 0, 100, 20));
        assert!((size - 24.0).abs() < 1e-4);
        assert_eq!(extent.width, 60.0);
    }

    #[test]
    fn text_just_inside_the_overflow_bound_is_not_shrunk() {
        // bound is 138 px; 11 chars measure 132 px, 12 chars 144 px
        let bbox = BBoxPx::new(0, 0, 120, 20);
        let (kept, _) = fit(&"x".repeat(11), bbox);
        let (shrunk, _) = fit(&"x".repeat(12), bbox);
        assert!((kept - 24.0).abs() < 1e-4);
        assert!(shrunk < kept);
    }

    #[test]
    fn wide_text_is_shrunk_once() {
        let text = "a".repeat(20);
        let (size, extent) = fit(&text, BBoxPx::new(0, 0, 100, 20));
        // 24 * (100 / 240) * 0.95 = 9.5, floored
        assert_eq!(size, 9.0);
        assert_eq!(extent.width, 90.0);
    }

    #[test]
    fn shrink_never_goes_below_minimum() {
        let text = "a".repeat(400);
        let (size, extent) = fit(&text, BBoxPx::new(0, 0, 100, 20));
        assert_eq!(size, 6.0);
        // the remaining overflow is accepted
        assert!(extent.width > 100.0);
    }

    #[test]
    fn tiny_lines_start_at_minimum_size() {
        let (size, _) = fit("ok", BBoxPx::new(0, 0, 100, 3));
        assert_eq!(size, 6.0);
    }

    #[test]
    fn sentence_classification() {
        let params = FitParams::default();
        assert!(is_sentence("Done.", &params));
        assert!(is_sentence("好！", &params));
        assert!(is_sentence("Wait...", &params));
        assert!(is_sentence("Settings", &params));
        assert!(is_sentence("我的", &params));
        assert!(!is_sentence("OK", &params));
        assert!(!is_sentence("  File  ", &params));
        assert!(!is_sentence("設定", &params));
    }

    #[test]
    fn labels_are_centered() {
        let bbox = BBoxPx::new(10, 40, 100, 20);
        let placement = place_text("Save", "存檔", &bbox, &HalfEm, &FitParams::default()).unwrap();
        assert_eq!(placement.alignment, Alignment::Center);
        // width 24, height 24
        assert_eq!(placement.x, 10 + 38);
        assert_eq!(placement.y, 40 - 2 - 5);
    }

    #[test]
    fn sentences_are_left_aligned() {
        let bbox = BBoxPx::new(10, 40, 200, 20);
        let placement = place_text(
            "Open the settings",
            "打開設定",
            &bbox,
            &HalfEm,
            &FitParams::default(),
        )
        .unwrap();
        assert_eq!(placement.alignment, Alignment::Left);
        assert_eq!(placement.x, 10);
    }

    #[test]
    fn measurement_errors_propagate() {
        struct Broken;
        impl GlyphMetrics for Broken {
            fn family(&self) -> Option<&str> {
                None
            }
            fn measure(&self, _: &str, _: f32) -> Result<TextExtent, RenderError> {
                Err(RenderError::Measure("broken".to_string()))
            }
            fn ascent(&self, _: f32) -> f32 {
                0.0
            }
        }
        let bbox = BBoxPx::new(0, 0, 10, 10);
        let result = place_text("a", "b", &bbox, &Broken, &FitParams::default());
        assert_eq!(result, Err(RenderError::Measure("broken".to_string())));
    }
}
