mod geom;
mod merge;
mod tesseract;

use anyhow::Result;
use image::DynamicImage;
use serde::Serialize;

use crate::color::LineColor;

pub(crate) use geom::clamp_to;
pub use geom::{expand_clamped, union_bbox};
pub use merge::{MergeParams, is_valid_text, merge_tokens};
pub use tesseract::{TesseractCli, list_tesseract_languages, parse_tsv_tokens};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BBoxPx {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BBoxPx {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    pub fn contains(&self, other: &BBoxPx) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// One word or fragment reported by the OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub text: String,
    pub bbox: BBoxPx,
    /// Engine confidence in `0..=100`; negative for non-word rows.
    pub conf: f32,
}

impl Token {
    pub fn new(text: impl Into<String>, x: u32, y: u32, w: u32, h: u32, conf: f32) -> Self {
        Self {
            text: text.into(),
            bbox: BBoxPx::new(x, y, w, h),
            conf,
        }
    }
}

/// A run of tokens taken to be one visual text line.
///
/// Created by [`merge_tokens`], then enriched in place: `color` by the
/// region analyzer and `translated_text` by the batch translation step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub tokens: Vec<Token>,
    pub bbox: BBoxPx,
    pub confidences: Vec<f32>,
    pub original_text: String,
    pub color: Option<LineColor>,
    pub translated_text: Option<String>,
}

impl Line {
    pub fn average_confidence(&self) -> f32 {
        if self.confidences.is_empty() {
            return 0.0;
        }
        self.confidences.iter().sum::<f32>() / self.confidences.len() as f32
    }
}

/// The OCR collaborator: returns tokens in scan order
/// (top-to-bottom, then left-to-right within a region).
pub trait OcrEngine {
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<Token>>;
}

impl<T: OcrEngine + ?Sized> OcrEngine for &T {
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<Token>> {
        (**self).recognize(image)
    }
}
