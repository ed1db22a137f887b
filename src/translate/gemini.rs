use anyhow::{Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::retry::{Backoff, retry_after};
use super::{TextTranslator, TranslateFuture};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub(crate) const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Gemini `generateContent` client used as the batch translation collaborator.
#[derive(Debug, Clone)]
pub struct Gemini {
    key: String,
    model: String,
    separator: String,
    client: reqwest::Client,
    backoff: Backoff,
}

impl Gemini {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            separator: super::SEPARATOR.to_string(),
            client: reqwest::Client::new(),
            backoff: Backoff::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        let separator = separator.into();
        if !separator.is_empty() {
            self.separator = separator;
        }
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, text: &str, target_language: &str) -> Value {
        json!({
            "systemInstruction": {
                "parts": [{ "text": system_instruction(target_language, &self.separator) }]
            },
            "contents": [
                { "role": "user", "parts": [{ "text": text }] }
            ]
        })
    }

    async fn generate(&self, text: &str, target_language: &str) -> Result<String> {
        let url = format!("{}/{}:generateContent", BASE_URL, self.model);
        let body = self.request_body(text, target_language);

        let mut attempt = 0usize;
        let mut delay = self.backoff.base_delay;
        loop {
            attempt += 1;
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            let retry_after = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                let translated = extract_text(&text)?;
                debug!("Gemini returned {} chars", translated.chars().count());
                return Ok(translated);
            }
            if self.backoff.should_retry(attempt, status, &text) {
                delay = self.backoff.wait(attempt, delay, retry_after).await;
                continue;
            }
            return Err(anyhow!(
                "Gemini API error ({}): {}",
                status,
                extract_gemini_error(&text).unwrap_or(text)
            ));
        }
    }
}

impl TextTranslator for Gemini {
    fn translate<'a>(&'a self, text: &'a str, target_language: &'a str) -> TranslateFuture<'a> {
        Box::pin(self.generate(text, target_language))
    }
}

/// `--key` first, then `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
pub fn resolve_api_key(override_key: Option<&str>) -> Option<String> {
    override_key
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .or_else(|| get_env("GEMINI_API_KEY"))
        .or_else(|| get_env("GOOGLE_API_KEY"))
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn system_instruction(target_language: &str, separator: &str) -> String {
    format!(
        "Translate the user's text into {target}. The text is a list of interface \
         labels and sentences joined by the separator \"{sep}\". Keep every \
         separator exactly as written and return the same number of segments, \
         in the same order. Reply with the translated text only.",
        target = target_language,
        sep = separator
    )
}

fn extract_text(body: &str) -> Result<String> {
    let payload: GeminiResponse = serde_json::from_str(body)
        .map_err(|err| anyhow!("failed to parse Gemini response JSON: {}", err))?;
    let content = payload
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .ok_or_else(|| anyhow!("no candidate returned from Gemini"))?;
    Ok(content
        .parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect::<String>())
}

fn extract_gemini_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GeminiError>,
    }

    #[derive(Deserialize)]
    struct GeminiError {
        message: Option<String>,
        status: Option<String>,
        code: Option<i32>,
    }

    let error = serde_json::from_str::<ErrorBody>(body).ok()?.error?;
    let mut parts = Vec::new();
    if let Some(message) = error.message.filter(|value| !value.trim().is_empty()) {
        parts.push(message);
    }
    if let Some(status) = error.status.filter(|value| !value.trim().is_empty()) {
        parts.push(format!("type: {}", status));
    }
    if let Some(code) = error.code {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}
