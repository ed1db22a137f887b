use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ocr::Line;

mod gemini;
mod retry;

pub use gemini::{Gemini, resolve_api_key};

/// Low-collision separator used to batch all lines into one request.
pub const SEPARATOR: &str = "◆★◆";

pub type TranslateFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// The translation collaborator: maps a separator-joined batch to its
/// translation, keeping the separators. An empty string means failure.
pub trait TextTranslator: Send + Sync {
    fn translate<'a>(&'a self, text: &'a str, target_language: &'a str) -> TranslateFuture<'a>;
}

impl<T: TextTranslator + ?Sized> TextTranslator for Arc<T> {
    fn translate<'a>(&'a self, text: &'a str, target_language: &'a str) -> TranslateFuture<'a> {
        (**self).translate(text, target_language)
    }
}

/// Never translates; the batch adapter then falls back to the original texts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl TextTranslator for Passthrough {
    fn translate<'a>(&'a self, _text: &'a str, _target_language: &'a str) -> TranslateFuture<'a> {
        Box::pin(async { Ok(String::new()) })
    }
}

/// Translates all texts with a single collaborator call.
///
/// The returned vector is in input order. When the call fails or comes back
/// blank, the originals are returned unchanged. A segment-count mismatch is
/// not retried: missing segments simply shorten the result.
pub async fn translate_batch<T: TextTranslator + ?Sized>(
    translator: &T,
    texts: &[String],
    target_language: &str,
    separator: &str,
) -> Vec<String> {
    if texts.is_empty() {
        return Vec::new();
    }
    let combined = texts.join(separator);
    let translated = match translator.translate(&combined, target_language).await {
        Ok(text) => text,
        Err(err) => {
            warn!("translation failed, keeping original text: {:#}", err);
            return texts.to_vec();
        }
    };
    if translated.trim().is_empty() {
        warn!("translation came back empty, keeping original text");
        return texts.to_vec();
    }

    let segments = translated
        .split(separator)
        .map(|segment| segment.trim().to_string())
        .collect::<Vec<_>>();
    if segments.len() != texts.len() {
        warn!(
            "translation returned {} segments for {} lines",
            segments.len(),
            texts.len()
        );
    }
    debug!("translated {} segments", segments.len());
    segments
}

/// Fills `translated_text` on each line from one batched translation.
/// Lines without a matching segment are left untranslated.
pub async fn translate_lines<T: TextTranslator + ?Sized>(
    translator: &T,
    lines: &mut [Line],
    target_language: &str,
    separator: &str,
) {
    let texts = lines
        .iter()
        .map(|line| line.original_text.clone())
        .collect::<Vec<_>>();
    let translated = translate_batch(translator, &texts, target_language, separator).await;
    for (line, text) in lines.iter_mut().zip(translated) {
        line.translated_text = Some(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    /// Replies with a fixed string and records what it was asked.
    struct Scripted {
        reply: Result<String, String>,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl Scripted {
        fn new(reply: Result<&str, &str>) -> Self {
            Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl TextTranslator for Scripted {
        fn translate<'a>(&'a self, text: &'a str, target: &'a str) -> TranslateFuture<'a> {
            self.seen
                .lock()
                .unwrap()
                .push((text.to_string(), target.to_string()));
            let reply = self.reply.clone();
            Box::pin(async move { reply.map_err(|err| anyhow!(err)) })
        }
    }

    fn texts(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn segments_come_back_in_order() {
        let translator = Scripted::new(Ok("你好 ◆★◆ 世界◆★◆  再見 "));
        let out = translate_batch(&translator, &texts(&["Hello", "World", "Bye"]), "繁體中文", SEPARATOR)
            .await;
        assert_eq!(out, texts(&["你好", "世界", "再見"]));

        let seen = translator.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "Hello◆★◆World◆★◆Bye");
        assert_eq!(seen[0].1, "繁體中文");
    }

    #[tokio::test]
    async fn empty_reply_falls_back_to_originals() {
        let originals = texts(&["Hello", "World"]);
        let out = translate_batch(&Scripted::new(Ok("  ")), &originals, "繁體中文", SEPARATOR).await;
        assert_eq!(out, originals);
    }

    #[tokio::test]
    async fn failed_call_falls_back_to_originals() {
        let originals = texts(&["Hello", "World"]);
        let out = translate_batch(&Scripted::new(Err("offline")), &originals, "繁體中文", SEPARATOR)
            .await;
        assert_eq!(out, originals);
    }

    #[tokio::test]
    async fn passthrough_keeps_originals() {
        let originals = texts(&["Save", "Cancel"]);
        let out = translate_batch(&Passthrough, &originals, "繁體中文", SEPARATOR).await;
        assert_eq!(out, originals);
    }

    #[tokio::test]
    async fn no_lines_means_no_call() {
        let translator = Scripted::new(Ok("unused"));
        let out = translate_batch(&translator, &[], "繁體中文", SEPARATOR).await;
        assert!(out.is_empty());
        assert!(translator.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn short_reply_leaves_trailing_lines_untranslated() {
        use crate::ocr::{MergeParams, Token, merge_tokens};

        let tokens = vec![
            Token::new("One", 0, 0, 40, 20, 90.0),
            Token::new("Two", 0, 50, 40, 20, 90.0),
        ];
        let mut lines = merge_tokens(&tokens, &MergeParams::default());
        translate_lines(&Scripted::new(Ok("一")), &mut lines, "繁體中文", SEPARATOR).await;
        assert_eq!(lines[0].translated_text.as_deref(), Some("一"));
        assert_eq!(lines[1].translated_text, None);
    }
}
