use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub mod color;
pub mod erase;
pub mod logging;
pub mod ocr;
pub mod pipeline;
pub mod render;
pub mod settings;
pub mod translate;

pub use pipeline::{Diagnostics, LineReport, Pipeline, PipelineOptions, Processed, format_diagnostics};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub lang: Option<String>,
    pub model: Option<String>,
    pub key: Option<String>,
    pub ocr_languages: Option<String>,
    pub font_path: Option<String>,
    pub font_family: Option<String>,
    pub settings_path: Option<String>,
    pub no_translate: bool,
}

/// Where the result lands and what happened to each line.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub output: PathBuf,
    pub diagnostics: Diagnostics,
}

pub async fn run(config: Config) -> Result<RunOutput> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;

    if !config.input.exists() {
        return Err(anyhow!("input image not found: {}", config.input.display()));
    }
    let output = config
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&config.input));

    let ocr = ocr::TesseractCli {
        languages: pick(config.ocr_languages.as_deref(), &settings.ocr_languages),
        oem: settings.ocr_oem,
        psm: settings.ocr_psm,
        blacklist: settings.ocr_blacklist.clone(),
    };

    let translator: Box<dyn translate::TextTranslator> = if config.no_translate {
        info!("translation disabled; redrawing original text");
        Box::new(translate::Passthrough)
    } else {
        match translate::resolve_api_key(config.key.as_deref()) {
            Some(key) => Box::new(
                translate::Gemini::new(key)
                    .with_model(pick(config.model.as_deref(), &settings.model))
                    .with_separator(settings.separator.clone()),
            ),
            None => {
                warn!("no API key found (checked --key, GEMINI_API_KEY, GOOGLE_API_KEY); redrawing original text");
                Box::new(translate::Passthrough)
            }
        }
    };

    let font_path = config
        .font_path
        .clone()
        .or_else(|| settings.overlay_font_path.clone());
    let font_family = config
        .font_family
        .clone()
        .or_else(|| settings.overlay_font_family.clone());
    let mut sources = Vec::new();
    if let Some(path) = font_path.as_deref() {
        sources.push(render::FontSource::File(Path::new(path)));
    }
    if let Some(family) = font_family.as_deref() {
        sources.push(render::FontSource::Family(family));
    }
    sources.extend(
        settings
            .fallback_fonts
            .iter()
            .map(|family| render::FontSource::Family(family.as_str())),
    );
    let font = render::resolve_font(&sources);
    let compositor = render::Compositor::new(font, render::FitParams::default());

    let options = PipelineOptions {
        target_language: pick(config.lang.as_deref(), &settings.target_language),
        separator: settings.separator.clone(),
        ..PipelineOptions::default()
    };
    let pipeline = Pipeline::new(Box::new(ocr), translator, compositor, options);
    let diagnostics = pipeline.process(&config.input, &output).await?;

    Ok(RunOutput {
        output,
        diagnostics,
    })
}

/// `<stem>_translated.png` next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{}_translated.png", stem))
}

fn pick(override_value: Option<&str>, fallback: &str) -> String {
    override_value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
