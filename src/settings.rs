use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub ocr_languages: String,
    pub ocr_oem: u32,
    pub ocr_psm: u32,
    pub ocr_blacklist: String,
    pub target_language: String,
    pub model: String,
    pub separator: String,
    pub overlay_font_path: Option<String>,
    pub overlay_font_family: Option<String>,
    pub fallback_fonts: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ocr_languages: "eng+chi_tra".to_string(),
            ocr_oem: 3,
            ocr_psm: 6,
            ocr_blacklist: "●▲■□".to_string(),
            target_language: "繁體中文".to_string(),
            model: "gemini-1.5-flash".to_string(),
            separator: "◆★◆".to_string(),
            overlay_font_path: None,
            overlay_font_family: None,
            fallback_fonts: vec![
                "Microsoft JhengHei".to_string(),
                "Noto Sans CJK TC".to_string(),
                "Arial".to_string(),
            ],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    ocr: Option<OcrSettings>,
    translate: Option<TranslateSettings>,
    overlay: Option<OverlaySettings>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    languages: Option<String>,
    oem: Option<u32>,
    psm: Option<u32>,
    blacklist: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslateSettings {
    target_language: Option<String>,
    model: Option<String>,
    separator: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    font_path: Option<String>,
    font_family: Option<String>,
    fallback_fonts: Option<Vec<String>>,
}

/// Embedded defaults, then `./settings.toml`, `./settings.local.toml` and
/// finally `extra_path`, which must exist when given.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }
    load_layers(&ordered_paths)
}

fn load_layers(paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    let embedded: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).context("failed to parse embedded settings")?;
    settings.merge(embedded);

    for path in paths.iter().filter(|path| path.exists()) {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        let parsed: SettingsFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        settings.merge(parsed);
    }
    Ok(settings)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(ocr) = incoming.ocr {
            if let Some(languages) = non_blank(ocr.languages) {
                self.ocr_languages = languages;
            }
            if let Some(oem) = ocr.oem {
                self.ocr_oem = oem;
            }
            if let Some(psm) = ocr.psm.filter(|psm| *psm > 0) {
                self.ocr_psm = psm;
            }
            // an empty blacklist is a valid way to disable it
            if let Some(blacklist) = ocr.blacklist {
                self.ocr_blacklist = blacklist;
            }
        }
        if let Some(translate) = incoming.translate {
            if let Some(target) = non_blank(translate.target_language) {
                self.target_language = target;
            }
            if let Some(model) = non_blank(translate.model) {
                self.model = model;
            }
            if let Some(separator) = non_blank(translate.separator) {
                self.separator = separator;
            }
        }
        if let Some(overlay) = incoming.overlay {
            if let Some(path) = non_blank(overlay.font_path) {
                self.overlay_font_path = Some(path);
            }
            if let Some(family) = non_blank(overlay.font_family) {
                self.overlay_font_family = Some(family);
            }
            if let Some(fonts) = overlay.fallback_fonts {
                self.fallback_fonts = fonts
                    .into_iter()
                    .filter(|font| !font.trim().is_empty())
                    .collect();
            }
        }
    }
}
