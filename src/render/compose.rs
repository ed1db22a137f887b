use image::RgbImage;
use std::sync::Arc;
use tiny_skia::{Pixmap, Transform};
use tracing::{debug, warn};
use usvg::{Options, Tree, fontdb};

use super::fit::{FitParams, Placement, place_text};
use super::font::ResolvedFont;
use super::RenderError;
use crate::color::{BLACK, Rgb};
use crate::ocr::Line;

/// The composited image plus one result per input line, in line order.
pub struct Composite {
    pub image: RgbImage,
    pub results: Vec<Result<Placement, RenderError>>,
}

impl Composite {
    pub fn drawn(&self) -> usize {
        self.results.iter().filter(|result| result.is_ok()).count()
    }
}

/// Draws translated lines onto the cleaned image, one line at a time.
pub struct Compositor {
    font: ResolvedFont,
    fontdb: Arc<fontdb::Database>,
    params: FitParams,
}

impl Compositor {
    /// Uses the system fonts plus the resolved font's own data for drawing.
    pub fn new(font: ResolvedFont, params: FitParams) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        if let Some(data) = font.data.as_ref() {
            db.load_font_data(data.to_vec());
        }
        if font.family().is_none() {
            point_sans_serif_at_installed_face(&mut db);
        }
        Self::with_fontdb(font, db, params)
    }

    pub fn with_fontdb(font: ResolvedFont, db: fontdb::Database, params: FitParams) -> Self {
        Self {
            font,
            fontdb: Arc::new(db),
            params,
        }
    }

    /// A failing line is logged and skipped; it never stops the others.
    pub fn compose(&self, cleaned: RgbImage, lines: &[Line]) -> Composite {
        let mut image = cleaned;
        let results = lines
            .iter()
            .enumerate()
            .map(|(idx, line)| {
                let result = self.draw_line(&mut image, line);
                match &result {
                    Ok(placement) => debug!(
                        "line {}: drawn at ({}, {}) size {:.1}",
                        idx, placement.x, placement.y, placement.font_size
                    ),
                    Err(err) => warn!("line {} skipped: {}", idx, err),
                }
                result
            })
            .collect();
        Composite { image, results }
    }

    fn draw_line(&self, canvas: &mut RgbImage, line: &Line) -> Result<Placement, RenderError> {
        let text = line
            .translated_text
            .as_deref()
            .ok_or(RenderError::MissingTranslation)?;
        let metrics = self.font.metrics.as_ref();
        let placement = place_text(&line.original_text, text, &line.bbox, metrics, &self.params)?;
        let color = line.color.map(|color| color.foreground).unwrap_or(BLACK);
        self.rasterize(canvas, text, &placement, color)?;
        Ok(placement)
    }

    fn rasterize(
        &self,
        canvas: &mut RgbImage,
        text: &str,
        placement: &Placement,
        color: Rgb,
    ) -> Result<(), RenderError> {
        let pad = (placement.font_size * 0.5).ceil() as i32;
        let width = placement.extent.width.ceil() as i32 + pad * 2;
        let height = placement.extent.height.ceil() as i32 + pad * 2;
        if width <= 0 || height <= 0 {
            return Err(RenderError::Draw("empty text box".to_string()));
        }
        let baseline = pad as f32 + self.font.metrics.ascent(placement.font_size);
        let svg = text_svg(
            text,
            width as u32,
            height as u32,
            pad as f32,
            baseline,
            placement.font_size,
            color,
            self.font.family(),
        );

        let options = Options {
            fontdb: self.fontdb.clone(),
            ..Options::default()
        };
        let tree = Tree::from_str(&svg, &options).map_err(|err| RenderError::Draw(err.to_string()))?;
        let mut pixmap = Pixmap::new(width as u32, height as u32)
            .ok_or_else(|| RenderError::Draw("failed to allocate text layer".to_string()))?;
        resvg::render(&tree, Transform::identity(), &mut pixmap.as_mut());
        // usvg drops text it has no face for
        if pixmap.pixels().iter().all(|pixel| pixel.alpha() == 0) {
            return Err(RenderError::Font(format!(
                "no face available for '{}'",
                self.font.family().unwrap_or("sans-serif")
            )));
        }

        blend_over(canvas, &pixmap, placement.x - pad, placement.y - pad);
        Ok(())
    }
}

/// The generic `sans-serif` family defaults to a fixed name; when no face by
/// that name is installed, use the first installed family instead.
fn point_sans_serif_at_installed_face(db: &mut fontdb::Database) {
    let query = fontdb::Query {
        families: &[fontdb::Family::SansSerif],
        ..Default::default()
    };
    if db.query(&query).is_some() {
        return;
    }
    let installed = db
        .faces()
        .find_map(|face| face.families.first().map(|(name, _)| name.clone()));
    match installed {
        Some(name) => {
            debug!("sans-serif mapped to installed family {}", name);
            db.set_sans_serif_family(name);
        }
        None => warn!("no fonts installed; translated text cannot be drawn"),
    }
}

#[allow(clippy::too_many_arguments)]
fn text_svg(
    text: &str,
    width: u32,
    height: u32,
    x: f32,
    baseline: f32,
    font_size: f32,
    color: Rgb,
    family: Option<&str>,
) -> String {
    let family = match family {
        Some(name) => format!("'{}', sans-serif", escape_xml(name)),
        None => "sans-serif".to_string(),
    };
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><text x="{x}" y="{y}" font-size="{size}" font-family="{family}" fill="rgb({r},{g},{b})" xml:space="preserve">{text}</text></svg>"#,
        w = width,
        h = height,
        x = x,
        y = baseline,
        size = font_size,
        family = family,
        r = color[0],
        g = color[1],
        b = color[2],
        text = escape_xml(text)
    )
}

/// Source-over blend of a premultiplied layer onto the canvas, clipped to
/// the canvas bounds.
fn blend_over(canvas: &mut RgbImage, layer: &Pixmap, origin_x: i32, origin_y: i32) {
    let (canvas_w, canvas_h) = (canvas.width() as i32, canvas.height() as i32);
    let layer_w = layer.width() as i32;
    for (idx, src) in layer.pixels().iter().enumerate() {
        let alpha = src.alpha() as u32;
        if alpha == 0 {
            continue;
        }
        let x = origin_x + idx as i32 % layer_w;
        let y = origin_y + idx as i32 / layer_w;
        if x < 0 || y < 0 || x >= canvas_w || y >= canvas_h {
            continue;
        }
        let dst = canvas.get_pixel_mut(x as u32, y as u32);
        let inverse = 255 - alpha;
        let mix = |src: u8, dst: u8| (src as u32 + (dst as u32 * inverse + 127) / 255).min(255) as u8;
        dst.0 = [
            mix(src.red(), dst.0[0]),
            mix(src.green(), dst.0[1]),
            mix(src.blue(), dst.0[2]),
        ];
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
