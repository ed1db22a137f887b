use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "inplace-translator-rust",
    version,
    about = "Replace the text in an image with its translation, in place"
)]
struct Cli {
    /// Image to translate (PNG, BMP, JPEG, ...)
    input: PathBuf,

    /// Output image (default: <input-stem>_translated.png)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Target language label passed to the translator (default from settings)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Gemini model name
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides GEMINI_API_KEY / GOOGLE_API_KEY)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Tesseract language set, e.g. eng+chi_tra
    #[arg(long = "ocr-languages")]
    ocr_languages: Option<String>,

    /// Font file used to draw the translation
    #[arg(long = "font-path")]
    font_path: Option<String>,

    /// Font family used to draw the translation
    #[arg(long = "font-family")]
    font_family: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Skip translation and redraw the recognized text
    #[arg(long = "no-translate")]
    no_translate: bool,

    /// Print diagnostics as JSON
    #[arg(long = "json")]
    json: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    inplace_translator_rust::logging::init(cli.verbose)?;

    let config = inplace_translator_rust::Config {
        input: cli.input,
        output: cli.output,
        lang: cli.lang,
        model: cli.model,
        key: cli.key,
        ocr_languages: cli.ocr_languages,
        font_path: cli.font_path,
        font_family: cli.font_family,
        settings_path: cli.read_settings,
        no_translate: cli.no_translate,
    };
    let result = inplace_translator_rust::run(config).await?;

    if cli.json {
        let json = serde_json::to_string_pretty(&result.diagnostics)
            .with_context(|| "failed to serialize diagnostics")?;
        println!("{}", json);
    } else {
        print!(
            "{}",
            inplace_translator_rust::format_diagnostics(&result.diagnostics)
        );
        println!("saved: {}", result.output.display());
    }
    Ok(())
}
