use image::{GrayImage, Luma, RgbImage};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::ocr::{BBoxPx, Line, clamp_to};

pub type Rgb = [u8; 3];

pub const BLACK: Rgb = [0, 0, 0];

/// Lightness reported when a line has no pixels to sample.
pub const DEFAULT_LIGHTNESS: f32 = 128.0;

/// Below this lightness a background counts as dark.
pub const DARK_BACKGROUND_BELOW: f32 = 145.0;

/// Colors sampled from one line's text area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineColor {
    /// Mean luma of the crop's border ring ("lightdeck").
    pub background_lightness: f32,
    /// Stylized dominant glyph color.
    pub foreground: Rgb,
}

/// One `color_up` pass: HSV saturation/value scaling followed by a levels remap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAdjust {
    pub saturation: f32,
    pub value: f32,
    pub levels: (f32, f32),
}

impl ColorAdjust {
    pub fn apply(&self, rgb: Rgb) -> Rgb {
        color_up(rgb, self.saturation, self.value, self.levels)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorParams {
    /// Width of the border ring sampled for the background.
    pub border: u32,
    /// Below this lightness the text is taken to be light-on-dark.
    pub dark_background_below: f32,
    /// Above this lightness the bright-background pass is applied.
    pub bright_background_above: f32,
    pub primary: ColorAdjust,
    pub bright_pass: ColorAdjust,
}

impl Default for ColorParams {
    fn default() -> Self {
        Self {
            border: 3,
            dark_background_below: DARK_BACKGROUND_BELOW,
            bright_background_above: 175.0,
            primary: ColorAdjust {
                saturation: 1.6,
                value: 1.2,
                levels: (20.0, 200.0),
            },
            bright_pass: ColorAdjust {
                saturation: 0.7,
                value: 0.7,
                levels: (160.0, 255.0),
            },
        }
    }
}

/// Annotates every line with its background lightness and foreground color.
pub fn analyze_lines(image: &RgbImage, lines: &mut [Line], params: &ColorParams) {
    for (idx, line) in lines.iter_mut().enumerate() {
        let color = analyze_region(image, &line.bbox, params);
        debug!(
            "line {}: lightness {:.0}, color {:?}",
            idx, color.background_lightness, color.foreground
        );
        line.color = Some(color);
    }
}

pub fn analyze_region(image: &RgbImage, bbox: &BBoxPx, params: &ColorParams) -> LineColor {
    let Some(area) = clamp_to(bbox, image.width(), image.height()) else {
        warn!("text area {:?} lies outside the image; using defaults", bbox);
        return LineColor {
            background_lightness: DEFAULT_LIGHTNESS,
            foreground: BLACK,
        };
    };
    let crop = image::imageops::crop_imm(image, area.x, area.y, area.w, area.h).to_image();
    let gray = to_luma(&crop);
    let (level, binary) = binarize(&gray);
    let lightness = border_lightness(&gray, params.border);
    debug!("text area {:?}: otsu level {}", area, level);

    let dark_background = lightness < params.dark_background_below;
    // ink is the bright class on dark backgrounds and the dark class otherwise
    let ink_value = if dark_background { 255 } else { 0 };
    let ink = binary
        .pixels()
        .map(|pixel| pixel[0] == ink_value)
        .collect::<Vec<_>>();

    let foreground = match dominant_color(&crop, &ink) {
        Some(raw) => stylize(raw, lightness, params),
        None => {
            warn!("no ink pixels in text area {:?}; using black", area);
            BLACK
        }
    };

    LineColor {
        background_lightness: lightness,
        foreground,
    }
}

pub fn to_luma(image: &RgbImage) -> GrayImage {
    let mut luma = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let value = (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8;
        luma.put_pixel(x, y, Luma([value]));
    }
    luma
}

/// Otsu binarization: pixels above the Otsu level become 255, the rest 0.
/// A single-level crop has level 0.
pub fn binarize(gray: &GrayImage) -> (u8, GrayImage) {
    let level = otsu_level(gray);
    (level, threshold(gray, level, ThresholdType::Binary))
}

/// Mean luma under a ring of `border` pixels along all four edges.
pub fn border_lightness(gray: &GrayImage, border: u32) -> f32 {
    let (width, height) = gray.dimensions();
    let mut sum = 0u64;
    let mut count = 0u64;
    for (x, y, pixel) in gray.enumerate_pixels() {
        let on_ring = y < border
            || y >= height.saturating_sub(border)
            || x < border
            || x >= width.saturating_sub(border);
        if on_ring {
            sum += pixel[0] as u64;
            count += 1;
        }
    }
    if count == 0 {
        return DEFAULT_LIGHTNESS;
    }
    sum as f32 / count as f32
}

/// Most frequent RGB triple among masked pixels. Ties go to the smallest
/// packed `0xRRGGBB` value.
pub fn dominant_color(image: &RgbImage, mask: &[bool]) -> Option<Rgb> {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for (pixel, selected) in image.pixels().zip(mask) {
        if *selected {
            let [r, g, b] = pixel.0;
            let code = (r as u32) << 16 | (g as u32) << 8 | b as u32;
            *counts.entry(code).or_default() += 1;
        }
    }
    let (code, _) = counts
        .into_iter()
        .max_by(|(code_a, count_a), (code_b, count_b)| {
            count_a.cmp(count_b).then(code_b.cmp(code_a))
        })?;
    Some([(code >> 16) as u8, (code >> 8) as u8, code as u8])
}

/// Applies the primary adjustment, then the darkening pass on very bright
/// backgrounds.
pub fn stylize(raw: Rgb, background_lightness: f32, params: &ColorParams) -> Rgb {
    let color = params.primary.apply(raw);
    if background_lightness > params.bright_background_above {
        params.bright_pass.apply(color)
    } else {
        color
    }
}

/// Scales saturation and value in HSV space, then remaps levels so that
/// `black_point` maps to 0 and `white_point` to 255.
///
/// When the value is scaled, it is computed against a blue channel dimmed to
/// 85%. A value factor of exactly 1.0 skips the dimming, so
/// `color_up(c, 1.0, 1.0, (0.0, 255.0)) == c`.
pub fn color_up(rgb: Rgb, saturation: f32, value: f32, levels: (f32, f32)) -> Rgb {
    let r = rgb[0] as f64 / 255.0;
    let g = rgb[1] as f64 / 255.0;
    let mut b = rgb[2] as f64 / 255.0;
    if value != 1.0 {
        b *= 0.85;
    }
    let (h, s, v) = rgb_to_hsv(r, g, b);
    let s = (s * saturation as f64).clamp(0.0, 1.0);
    let v = (v * value as f64).clamp(0.0, 1.0);
    let (r, g, b) = hsv_to_rgb(h, s, v);

    let (black_point, white_point) = (levels.0 as f64, levels.1 as f64);
    let span = white_point - black_point;
    let span = if span == 0.0 { 1.0 } else { span };
    let remap = |channel: f64| {
        let value = 255.0 * (channel * 255.0 - black_point) / span;
        value.clamp(0.0, 255.0).round() as u8
    };
    [remap(r), remap(g), remap(b)]
}

fn rgb_to_hsv(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == min {
        return (0.0, 0.0, max);
    }
    let delta = max - min;
    let s = delta / max;
    let rc = (max - r) / delta;
    let gc = (max - g) / delta;
    let bc = (max - b) / delta;
    let h = if r == max {
        bc - gc
    } else if g == max {
        2.0 + rc - bc
    } else {
        4.0 + gc - rc
    };
    ((h / 6.0).rem_euclid(1.0), s, max)
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        return (v, v, v);
    }
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match (sector as i64).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}
