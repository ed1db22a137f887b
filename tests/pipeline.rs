use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use image::{DynamicImage, Rgb, RgbImage};
use inplace_translator_rust::ocr::{OcrEngine, Token};
use inplace_translator_rust::render::{Compositor, FitParams, ResolvedFont, load_font_metrics};
use inplace_translator_rust::translate::{Passthrough, TextTranslator, TranslateFuture};
use inplace_translator_rust::{Pipeline, PipelineOptions, format_diagnostics};
use insta::assert_snapshot;
use std::path::Path;
use usvg::fontdb;

const FONT_FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/fonts/Tuffy.ttf");

const WHITE: [u8; 3] = [255, 255, 255];
const BLACK: [u8; 3] = [0, 0, 0];

struct FixedOcr(Vec<Token>);

impl OcrEngine for FixedOcr {
    fn recognize(&self, _image: &DynamicImage) -> Result<Vec<Token>> {
        Ok(self.0.clone())
    }
}

struct BrokenOcr;

impl OcrEngine for BrokenOcr {
    fn recognize(&self, _image: &DynamicImage) -> Result<Vec<Token>> {
        Err(anyhow!("engine unavailable"))
    }
}

struct Scripted {
    reply: String,
    calls: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl TextTranslator for Scripted {
    fn translate<'a>(&'a self, text: &'a str, _target_language: &'a str) -> TranslateFuture<'a> {
        self.calls.lock().unwrap().push(text.to_string());
        let reply = self.reply.clone();
        Box::pin(async move { Ok(reply) })
    }
}

fn paint(image: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32, color: [u8; 3]) {
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            image.put_pixel(x, y, Rgb(color));
        }
    }
}

/// Dark "Hello" on white at the top, white "Settings" on a black panel below.
fn screenshot() -> RgbImage {
    let mut image = RgbImage::from_pixel(300, 120, Rgb(WHITE));
    paint(&mut image, 30, 25, 140, 10, BLACK);
    paint(&mut image, 10, 60, 150, 50, BLACK);
    paint(&mut image, 40, 80, 80, 10, WHITE);
    image
}

fn tokens() -> Vec<Token> {
    vec![
        Token::new("Hello", 20, 20, 160, 20, 90.0),
        Token::new("Settings", 30, 75, 100, 20, 80.0),
        Token::new("noise", 200, 100, 40, 10, 5.0),
    ]
}

/// Whether any pixel in `[x0, x1) x [y0, y1)` satisfies `test`.
fn any_pixel(image: &RgbImage, (x0, x1): (u32, u32), (y0, y1): (u32, u32), test: impl Fn([u8; 3]) -> bool) -> bool {
    (y0..y1).any(|y| (x0..x1).any(|x| test(image.get_pixel(x, y).0)))
}

fn pipeline(ocr: impl OcrEngine + 'static, translator: impl TextTranslator + 'static) -> Pipeline {
    let font = ResolvedFont::from_metrics(load_font_metrics(Path::new(FONT_FIXTURE)).unwrap());
    let mut db = fontdb::Database::new();
    db.load_font_data(std::fs::read(FONT_FIXTURE).unwrap());
    let compositor = Compositor::with_fontdb(font, db, FitParams::default());
    Pipeline::new(
        Box::new(ocr),
        Box::new(translator),
        compositor,
        PipelineOptions::default(),
    )
}

fn scripted(reply: &str) -> Arc<Scripted> {
    Arc::new(Scripted::new(reply))
}

#[tokio::test]
async fn translates_and_redraws_every_line() {
    let translator = scripted("Hi ◆★◆ Open");
    let image = DynamicImage::ImageRgb8(screenshot());
    let processed = pipeline(FixedOcr(tokens()), translator.clone())
        .process_image(&image)
        .await
        .unwrap();

    assert_eq!(
        *translator.calls.lock().unwrap(),
        vec!["Hello◆★◆Settings".to_string()]
    );
    assert_eq!(processed.image.dimensions(), (300, 120));
    // glyph pixels outside the redrawn text are erased with their surroundings
    assert_eq!(processed.image.get_pixel(150, 30).0, WHITE);
    assert_eq!(processed.image.get_pixel(115, 85).0, BLACK);
    // each translation is drawn in its line's foreground color
    assert!(any_pixel(&processed.image, (20, 180), (10, 40), |p| p.iter().all(|&c| c < 60)));
    assert!(any_pixel(&processed.image, (20, 135), (65, 95), |p| p.iter().all(|&c| c > 200)));
    // the low-confidence token never becomes a line
    assert_eq!(processed.lines.len(), 2);

    assert_snapshot!(format_diagnostics(&processed.diagnostics), @r###"
    2 lines, lightdeck 0.0 (dark background)
    [0] "Hello" -> "Hi" | conf 90.0 | lightness 255.0 | color #000000 | bbox 20,20 160x20 | size 24.0 center
    [1] "Settings" -> "Open" | conf 80.0 | lightness 0.0 | color #fffff6 | bbox 30,75 100x20 | size 24.0 left
    "###);
}

#[tokio::test]
async fn failed_translation_redraws_original_text() {
    let image = DynamicImage::ImageRgb8(screenshot());
    let processed = pipeline(FixedOcr(tokens()), Passthrough)
        .process_image(&image)
        .await
        .unwrap();

    let translated = processed
        .lines
        .iter()
        .map(|line| line.translated_text.as_deref())
        .collect::<Vec<_>>();
    assert_eq!(translated, vec![Some("Hello"), Some("Settings")]);
    assert!(processed.diagnostics.lines.iter().all(|line| line.error.is_none()));
}

#[tokio::test]
async fn short_translation_skips_trailing_lines() {
    let image = DynamicImage::ImageRgb8(screenshot());
    let processed = pipeline(FixedOcr(tokens()), scripted("Hi"))
        .process_image(&image)
        .await
        .unwrap();

    let reports = &processed.diagnostics.lines;
    assert!(reports[0].error.is_none());
    assert_eq!(reports[1].translated_text, None);
    assert_eq!(reports[1].error.as_deref(), Some("line has no translated text"));
}

#[tokio::test]
async fn blank_segment_leaves_the_erased_region_flat() {
    let image = DynamicImage::ImageRgb8(screenshot());
    let processed = pipeline(FixedOcr(tokens()), scripted("Hi◆★◆ "))
        .process_image(&image)
        .await
        .unwrap();

    let reports = &processed.diagnostics.lines;
    assert!(reports[0].error.is_none());
    assert_eq!(reports[1].translated_text.as_deref(), Some(""));
    assert_eq!(reports[1].error.as_deref(), Some("nothing to draw"));
    // the white glyphs on the panel are gone and nothing replaced them
    assert!(!any_pixel(&processed.image, (30, 130), (75, 95), |p| p != BLACK));
}

#[tokio::test]
async fn blank_image_keeps_default_lightdeck() {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb(WHITE)));
    let translator = scripted("unused");
    let processed = pipeline(FixedOcr(Vec::new()), translator.clone())
        .process_image(&image)
        .await
        .unwrap();

    assert!(translator.calls.lock().unwrap().is_empty());
    assert_eq!(processed.image, image.to_rgb8());
    assert_snapshot!(format_diagnostics(&processed.diagnostics), @"0 lines, lightdeck 128.0 (light background)");
}

#[tokio::test]
async fn ocr_failure_aborts_the_image() {
    let image = DynamicImage::ImageRgb8(screenshot());
    let err = pipeline(BrokenOcr, Passthrough)
        .process_image(&image)
        .await
        .err()
        .unwrap();
    assert!(format!("{:#}", err).contains("engine unavailable"));
}

#[tokio::test]
async fn process_writes_an_image_of_the_same_size() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("menu.png");
    let output = dir.path().join("menu_translated.png");
    screenshot().save(&input).unwrap();

    let diagnostics = pipeline(FixedOcr(tokens()), scripted("Hi◆★◆Open"))
        .process(&input, &output)
        .await
        .unwrap();

    assert_eq!(diagnostics.lines.len(), 2);
    let written = image::open(&output).unwrap();
    assert_eq!((written.width(), written.height()), (300, 120));
}

#[tokio::test]
async fn undecodable_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.png");
    std::fs::write(&input, b"definitely not a png").unwrap();

    let err = pipeline(FixedOcr(tokens()), Passthrough)
        .process(&input, &dir.path().join("out.png"))
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("failed to decode image"));
}
