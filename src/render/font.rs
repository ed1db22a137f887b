use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

use super::RenderError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextExtent {
    pub width: f32,
    pub height: f32,
}

/// Measures text for the fitting step.
pub trait GlyphMetrics: Send + Sync {
    fn family(&self) -> Option<&str>;

    fn measure(&self, text: &str, font_size: f32) -> Result<TextExtent, RenderError>;

    /// Distance from the top of the measured box to the baseline.
    fn ascent(&self, font_size: f32) -> f32;
}

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    descender: i16,
    family: Option<String>,
    face_index: u32,
}

impl FontMetrics {
    fn scale(&self, font_size: f32) -> f32 {
        font_size / self.units_per_em.max(1) as f32
    }
}

impl GlyphMetrics for FontMetrics {
    fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    fn measure(&self, text: &str, font_size: f32) -> Result<TextExtent, RenderError> {
        if text.trim().is_empty() {
            return Err(RenderError::EmptyText);
        }
        let face = Face::parse(&self.data, self.face_index)
            .map_err(|err| RenderError::Font(err.to_string()))?;
        let mut advance = 0u32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            let glyph_advance = if ch == ' ' {
                self.space_advance
            } else {
                face.glyph_index(ch)
                    .and_then(|glyph| face.glyph_hor_advance(glyph))
                    .unwrap_or(self.space_advance)
            };
            advance = advance.saturating_add(glyph_advance as u32);
        }
        let scale = self.scale(font_size);
        let height = (self.ascender as i32 - self.descender as i32).max(1) as f32 * scale;
        Ok(TextExtent {
            width: advance as f32 * scale,
            height,
        })
    }

    fn ascent(&self, font_size: f32) -> f32 {
        self.ascender.max(0) as f32 * self.scale(font_size)
    }
}

/// Per-character width estimate used when no font file can be loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatedMetrics;

impl GlyphMetrics for EstimatedMetrics {
    fn family(&self) -> Option<&str> {
        None
    }

    fn measure(&self, text: &str, font_size: f32) -> Result<TextExtent, RenderError> {
        if text.trim().is_empty() {
            return Err(RenderError::EmptyText);
        }
        Ok(TextExtent {
            width: estimate_text_width_units(text) * font_size,
            height: font_size * 1.15,
        })
    }

    fn ascent(&self, font_size: f32) -> f32 {
        font_size * 0.9
    }
}

fn estimate_char_units_for_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF | 0x3000..=0x303F | 0xFF00..=0xFFEF
    ) {
        1.0
    } else {
        0.9
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars()
        .filter(|ch| *ch != '\n')
        .map(estimate_char_units_for_width)
        .sum()
}

/// Where to look for the overlay font, in priority order.
#[derive(Debug, Clone, Copy)]
pub enum FontSource<'a> {
    File(&'a Path),
    Family(&'a str),
}

/// The font chosen for drawing: its metrics plus the raw data to hand to the
/// rasterizer when it came from a file.
#[derive(Clone)]
pub struct ResolvedFont {
    pub metrics: Arc<dyn GlyphMetrics>,
    pub data: Option<Arc<Vec<u8>>>,
}

impl ResolvedFont {
    pub fn estimated() -> Self {
        Self {
            metrics: Arc::new(EstimatedMetrics),
            data: None,
        }
    }

    pub fn from_metrics(metrics: FontMetrics) -> Self {
        let data = Some(metrics.data.clone());
        Self {
            metrics: Arc::new(metrics),
            data,
        }
    }

    pub fn family(&self) -> Option<&str> {
        self.metrics.family()
    }
}

/// Tries each source in order; the first font that loads wins. Falls back to
/// [`EstimatedMetrics`], so this never fails.
pub fn resolve_font(sources: &[FontSource<'_>]) -> ResolvedFont {
    let mut db: Option<fontdb::Database> = None;
    for source in sources {
        let loaded = match source {
            FontSource::File(path) => load_font_metrics(path),
            FontSource::Family(family) => {
                let db = db.get_or_insert_with(|| {
                    let mut db = fontdb::Database::new();
                    db.load_system_fonts();
                    db
                });
                load_font_metrics_from_family(db, family)
            }
        };
        match loaded {
            Ok(metrics) => {
                info!(
                    "overlay font: {}",
                    metrics.family().unwrap_or("(unnamed face)")
                );
                return ResolvedFont::from_metrics(metrics);
            }
            Err(err) => debug!("font candidate {:?} unavailable: {}", source, err),
        }
    }
    warn!("no overlay font found; using estimated glyph metrics");
    ResolvedFont::estimated()
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

fn load_font_metrics_from_data(data: Vec<u8>, preferred_family: Option<&str>) -> Result<FontMetrics> {
    let data = Arc::new(data);
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
    for index in 0..count {
        let Ok(face) = Face::parse(&data, index) else {
            continue;
        };
        let family = extract_family_name(&face);
        let units_per_em = face.units_per_em().max(1);
        let space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(units_per_em / 2);
        let metrics = FontMetrics {
            data: data.clone(),
            units_per_em,
            space_advance,
            ascender: face.ascender(),
            descender: face.descender(),
            family: family.clone(),
            face_index: index,
        };
        if let (Some(preferred), Some(found)) = (preferred_family, &family)
            && found.eq_ignore_ascii_case(preferred)
        {
            return Ok(metrics);
        }
        if fallback.is_none() {
            fallback = Some(metrics);
        }
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn load_font_metrics_from_family(db: &fontdb::Database, family: &str) -> Result<FontMetrics> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let data = db
        .with_face_data(id, |data, _index| data.to_vec())
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    load_font_metrics_from_data(data, Some(family))
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}
