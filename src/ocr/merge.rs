use crate::ocr::{Line, Token};

use super::geom::union_bbox;

/// Thresholds for grouping OCR tokens into lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeParams {
    /// Tokens must score strictly above this confidence.
    pub min_confidence: f32,
    /// Tokens narrower than this are treated as icons when starting a line.
    pub min_text_width: u32,
    /// Allowed `|top - line.y|` as a multiple of the line height.
    pub vertical_ratio: f32,
    /// Allowed gap to the line's right edge as a multiple of the line height.
    pub horizontal_ratio: f32,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            min_confidence: 10.0,
            min_text_width: 20,
            vertical_ratio: 1.0,
            horizontal_ratio: 0.8,
        }
    }
}

/// Whether a token may open a new line.
///
/// Narrow tokens are usually icons or bullets, except short ASCII words that
/// contain an `a` (case-insensitive), which tesseract tends to box tightly.
/// The `a` rule is literal; other vowels do not qualify.
pub fn is_valid_text(token: &Token, params: &MergeParams) -> bool {
    if token.bbox.w >= params.min_text_width {
        return true;
    }
    let text = token.text.trim();
    text.is_ascii() && text.chars().count() >= 2 && text.to_ascii_lowercase().contains('a')
}

fn is_usable(token: &Token, params: &MergeParams) -> bool {
    !token.text.trim().is_empty() && token.conf > params.min_confidence
}

/// Groups tokens into lines with a single left-to-right sweep.
///
/// A line absorbs the next token while it sits on the same row and follows
/// the current right edge without overlap or a wide gap. The first token that
/// fails closes the line; unusable tokens (blank or low confidence) close it
/// too and are then dropped.
pub fn merge_tokens(tokens: &[Token], params: &MergeParams) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut idx = 0usize;
    while idx < tokens.len() {
        let token = &tokens[idx];
        if !is_usable(token, params) || !is_valid_text(token, params) {
            idx += 1;
            continue;
        }

        let mut builder = LineBuilder::start(token);
        let mut next = idx + 1;
        while let Some(candidate) = tokens.get(next) {
            if !is_usable(candidate, params) || !builder.accepts(candidate, params) {
                break;
            }
            builder.absorb(candidate);
            next += 1;
        }
        lines.push(builder.finish());
        idx = next;
    }
    lines
}

struct LineBuilder {
    tokens: Vec<Token>,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl LineBuilder {
    fn start(token: &Token) -> Self {
        Self {
            tokens: vec![trimmed(token)],
            x: token.bbox.x,
            y: token.bbox.y,
            width: token.bbox.w,
            height: token.bbox.h,
        }
    }

    fn accepts(&self, token: &Token, params: &MergeParams) -> bool {
        let height = self.height as f32;
        let vertical_diff = (token.bbox.y as i64 - self.y as i64).abs() as f32;
        let gap = token.bbox.x as i64 - (self.x as i64 + self.width as i64);
        vertical_diff < height * params.vertical_ratio
            && gap >= 0
            && (gap as f32) < height * params.horizontal_ratio
    }

    fn absorb(&mut self, token: &Token) {
        self.width = token.bbox.right().saturating_sub(self.x);
        self.height = self.height.max(token.bbox.h);
        self.tokens.push(trimmed(token));
    }

    fn finish(self) -> Line {
        let bbox = self
            .tokens
            .iter()
            .skip(1)
            .fold(self.tokens[0].bbox, |acc, token| union_bbox(&acc, &token.bbox));
        let original_text = self
            .tokens
            .iter()
            .map(|token| token.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let confidences = self.tokens.iter().map(|token| token.conf).collect();
        Line {
            tokens: self.tokens,
            bbox,
            confidences,
            original_text,
            color: None,
            translated_text: None,
        }
    }
}

fn trimmed(token: &Token) -> Token {
    Token {
        text: token.text.trim().to_string(),
        ..token.clone()
    }
}
