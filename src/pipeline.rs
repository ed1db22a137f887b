use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info};

use crate::color::{ColorParams, DARK_BACKGROUND_BELOW, DEFAULT_LIGHTNESS, Rgb, analyze_lines};
use crate::erase::{EraseParams, reconstruct_background};
use crate::ocr::{BBoxPx, Line, MergeParams, OcrEngine, merge_tokens};
use crate::render::{Alignment, Compositor, Placement, RenderError};
use crate::translate::{SEPARATOR, TextTranslator, translate_lines};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub target_language: String,
    pub separator: String,
    pub merge: MergeParams,
    pub color: ColorParams,
    pub erase: EraseParams,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            target_language: "繁體中文".to_string(),
            separator: SEPARATOR.to_string(),
            merge: MergeParams::default(),
            color: ColorParams::default(),
            erase: EraseParams::default(),
        }
    }
}

/// One image-processing invocation: OCR, merge, color analysis, batch
/// translation, background reconstruction and compositing, in that order.
pub struct Pipeline {
    ocr: Box<dyn OcrEngine>,
    translator: Box<dyn TextTranslator>,
    compositor: Compositor,
    options: PipelineOptions,
}

/// Everything an invocation produced. The lines are kept for callers that
/// want more than the diagnostic summary.
pub struct Processed {
    pub image: RgbImage,
    pub lines: Vec<Line>,
    pub diagnostics: Diagnostics,
}

impl Pipeline {
    pub fn new(
        ocr: Box<dyn OcrEngine>,
        translator: Box<dyn TextTranslator>,
        compositor: Compositor,
        options: PipelineOptions,
    ) -> Self {
        Self {
            ocr,
            translator,
            compositor,
            options,
        }
    }

    /// Fails only when OCR fails; every later problem is absorbed per line.
    pub async fn process_image(&self, image: &DynamicImage) -> Result<Processed> {
        let original = image.to_rgb8();
        let tokens = self
            .ocr
            .recognize(image)
            .with_context(|| "text recognition failed")?;
        debug!("{} tokens recognized", tokens.len());

        let mut lines = merge_tokens(&tokens, &self.options.merge);
        info!("{} lines detected", lines.len());
        analyze_lines(&original, &mut lines, &self.options.color);
        translate_lines(
            self.translator.as_ref(),
            &mut lines,
            &self.options.target_language,
            &self.options.separator,
        )
        .await;

        let cleaned = reconstruct_background(&original, &lines, &self.options.erase);
        let composite = self.compositor.compose(cleaned, &lines);
        info!("{} of {} lines drawn", composite.drawn(), lines.len());

        let diagnostics = Diagnostics::new(&lines, &composite.results);
        Ok(Processed {
            image: composite.image,
            lines,
            diagnostics,
        })
    }

    /// Decodes `input`, processes it and writes the result to `output`.
    pub async fn process(&self, input: &Path, output: &Path) -> Result<Diagnostics> {
        let image = image::open(input)
            .with_context(|| format!("failed to decode image: {}", input.display()))?;
        let processed = self.process_image(&image).await?;
        processed
            .image
            .save(output)
            .with_context(|| format!("failed to write image: {}", output.display()))?;
        info!("wrote {}", output.display());
        Ok(processed.diagnostics)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineReport {
    pub index: usize,
    pub original_text: String,
    pub translated_text: Option<String>,
    pub average_confidence: f32,
    pub background_lightness: Option<f32>,
    pub foreground: Option<Rgb>,
    pub bbox: BBoxPx,
    pub font_size: Option<f32>,
    pub alignment: Option<Alignment>,
    pub error: Option<String>,
}

/// Per-image summary for humans; not a stable machine format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub lines: Vec<LineReport>,
    /// Background lightness of the last analyzed line.
    pub lightdeck: f32,
}

impl Diagnostics {
    pub fn new(lines: &[Line], results: &[Result<Placement, RenderError>]) -> Self {
        let lightdeck = lines
            .iter()
            .rev()
            .find_map(|line| line.color.map(|color| color.background_lightness))
            .unwrap_or(DEFAULT_LIGHTNESS);
        let lines = lines
            .iter()
            .enumerate()
            .map(|(index, line)| {
                let placement = results.get(index).and_then(|result| result.as_ref().ok());
                let error = match results.get(index) {
                    Some(Err(err)) => Some(err.to_string()),
                    _ => None,
                };
                LineReport {
                    index,
                    original_text: line.original_text.clone(),
                    translated_text: line.translated_text.clone(),
                    average_confidence: line.average_confidence(),
                    background_lightness: line.color.map(|color| color.background_lightness),
                    foreground: line.color.map(|color| color.foreground),
                    bbox: line.bbox,
                    font_size: placement.map(|placement| placement.font_size),
                    alignment: placement.map(|placement| placement.alignment),
                    error,
                }
            })
            .collect();
        Self { lines, lightdeck }
    }

    pub fn is_dark_background(&self) -> bool {
        self.lightdeck < DARK_BACKGROUND_BELOW
    }
}

pub fn format_diagnostics(diagnostics: &Diagnostics) -> String {
    let mut out = String::new();
    let shade = if diagnostics.is_dark_background() {
        "dark"
    } else {
        "light"
    };
    let _ = writeln!(
        out,
        "{} lines, lightdeck {:.1} ({} background)",
        diagnostics.lines.len(),
        diagnostics.lightdeck,
        shade
    );
    for line in &diagnostics.lines {
        let translated = line
            .translated_text
            .as_deref()
            .map(|text| format!("{:?}", text))
            .unwrap_or_else(|| "(none)".to_string());
        let _ = write!(
            out,
            "[{}] {:?} -> {} | conf {:.1}",
            line.index, line.original_text, translated, line.average_confidence
        );
        if let Some(lightness) = line.background_lightness {
            let _ = write!(out, " | lightness {:.1}", lightness);
        }
        if let Some([r, g, b]) = line.foreground {
            let _ = write!(out, " | color #{:02x}{:02x}{:02x}", r, g, b);
        }
        let _ = write!(
            out,
            " | bbox {},{} {}x{}",
            line.bbox.x, line.bbox.y, line.bbox.w, line.bbox.h
        );
        match (&line.error, line.font_size, line.alignment) {
            (Some(err), _, _) => {
                let _ = write!(out, " | skipped: {}", err);
            }
            (None, Some(size), Some(alignment)) => {
                let align = match alignment {
                    Alignment::Left => "left",
                    Alignment::Center => "center",
                };
                let _ = write!(out, " | size {:.1} {}", size, align);
            }
            _ => {}
        }
        out.push('\n');
    }
    out
}
