use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

use crate::ocr::{OcrEngine, Token};

/// Runs the `tesseract` binary and reads word rows from its TSV output.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    pub languages: String,
    pub oem: u32,
    pub psm: u32,
    pub blacklist: String,
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self {
            languages: "eng+chi_tra".to_string(),
            oem: 3,
            psm: 6,
            blacklist: "●▲■□".to_string(),
        }
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<Token>> {
        let languages = normalize_ocr_languages(&self.languages)?;
        let mut tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        image
            .write_to(&mut tmp, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;
        tmp.flush()
            .with_context(|| "failed to flush temp image for OCR")?;

        let tsv = self.run_tsv(tmp.path(), &languages)?;
        let tokens = parse_tsv_tokens(&tsv);
        debug!("tesseract returned {} word rows", tokens.len());
        Ok(tokens)
    }
}

impl TesseractCli {
    fn run_tsv(&self, path: &Path, languages: &str) -> Result<String> {
        let mut command = Command::new("tesseract");
        command
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(languages)
            .arg("--oem")
            .arg(self.oem.to_string())
            .arg("--psm")
            .arg(self.psm.to_string());
        if !self.blacklist.is_empty() {
            command
                .arg("-c")
                .arg(format!("tessedit_char_blacklist={}", self.blacklist));
        }
        let output = command
            .arg("tsv")
            .output()
            .with_context(|| "failed to run tesseract (is it installed?)")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("tesseract failed: {}", stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

pub fn list_tesseract_languages() -> Result<Vec<String>> {
    let output = Command::new("tesseract")
        .arg("--list-langs")
        .output()
        .with_context(|| "failed to run tesseract --list-langs")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect())
}

fn normalize_ocr_languages(requested: &str) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }

    let available = match list_tesseract_languages() {
        Ok(list) => list,
        Err(_) => return Ok(trimmed.to_string()),
    };

    let (chosen, missing): (Vec<&str>, Vec<&str>) = trimmed
        .split(['+', ',', ' '])
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .partition(|lang| available.iter().any(|value| value == lang));

    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        warn!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        );
    }

    Ok(chosen.join("+"))
}

/// Reads word-level (level 5) rows from tesseract TSV output, keeping the
/// emission order. Rows with malformed geometry are dropped; confidence and
/// text are passed through untouched for the line merger to judge.
pub fn parse_tsv_tokens(tsv: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for row in tsv.lines().skip(1) {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        if cols[0].trim().parse::<i32>().ok() != Some(5) {
            continue;
        }
        let geometry = (
            cols[6].trim().parse::<u32>(),
            cols[7].trim().parse::<u32>(),
            cols[8].trim().parse::<u32>(),
            cols[9].trim().parse::<u32>(),
        );
        let (Ok(left), Ok(top), Ok(width), Ok(height)) = geometry else {
            continue;
        };
        let conf = cols[10].trim().parse::<f32>().unwrap_or(-1.0);
        // the text column may itself contain tabs
        let text = cols[11..].join("\t");
        tokens.push(Token::new(text, left, top, width, height, conf));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn parses_word_rows_in_order() {
        let tsv = format!(
            "{HEADER}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t\n\
             4\t1\t1\t1\t1\t0\t10\t12\t120\t22\t-1\t\n\
             5\t1\t1\t1\t1\t1\t10\t12\t50\t22\t96.5\tHello\n\
             5\t1\t1\t1\t1\t2\t66\t13\t64\t21\t91\tworld\n\
             5\t1\t1\t1\t1\t3\t140\t13\t8\t21\t-1\t \n"
        );
        let tokens = parse_tsv_tokens(&tsv);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], Token::new("Hello", 10, 12, 50, 22, 96.5));
        assert_eq!(tokens[1].text, "world");
        assert_eq!(tokens[1].conf, 91.0);
        assert_eq!(tokens[2].conf, -1.0);
    }

    #[test]
    fn skips_malformed_rows() {
        let tsv = format!("{HEADER}\n5\t1\t1\t1\t1\t1\tx\t12\t50\t22\t96\tBad\n5\t1\t1\n");
        assert!(parse_tsv_tokens(&tsv).is_empty());
    }

    #[test]
    fn default_engine_config_matches_screenshot_setup() {
        let engine = TesseractCli::default();
        assert_eq!(engine.languages, "eng+chi_tra");
        assert_eq!(engine.psm, 6);
        assert_eq!(engine.oem, 3);
        assert!(engine.blacklist.contains('●'));
    }
}
