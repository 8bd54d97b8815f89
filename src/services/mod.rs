use anyhow::Result;
use std::future::Future;
use std::pin::Pin;

mod google;
mod recognize;
pub(crate) mod retry;
mod tts;

pub use google::GoogleTranslate;
pub use recognize::SpeechRecognize;
pub use tts::SpeechSynthesis;

pub type ServiceFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// One translated utterance. `detected` carries the source language the
/// service inferred, when the response includes one.
#[derive(Debug, Clone)]
pub struct Translation {
    pub text: String,
    pub detected: Option<String>,
}

/// What came back from the recognition service. Transport and service
/// failures are outcomes here, not errors; callers fold them into the
/// fixed reply strings shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionOutcome {
    Transcript(String),
    NoMatch,
    Unreachable(String),
}

pub trait TranslationBackend: Clone + Send + Sync {
    fn translate(&self, text: &str, target: &str) -> ServiceFuture<Translation>;
    fn detect(&self, text: &str) -> ServiceFuture<String>;
}

pub trait SynthesisBackend: Clone + Send + Sync {
    fn synthesize(&self, text: &str, language: &str) -> ServiceFuture<Vec<u8>>;
}

pub trait RecognitionBackend: Clone + Send + Sync {
    fn recognize(
        &self,
        samples: Vec<i16>,
        sample_rate: u32,
        language: &str,
    ) -> ServiceFuture<RecognitionOutcome>;
}

/// The environment variable wins over the configured key.
pub fn resolve_recognize_key(configured: Option<&str>) -> Option<String> {
    get_env("GOOGLE_SPEECH_API_KEY").or_else(|| configured.map(|key| key.to_string()))
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub(crate) fn format_http_error(service: &str, status: reqwest::StatusCode, body: &str) -> String {
    let snippet: String = body.trim().chars().take(200).collect();
    if snippet.is_empty() {
        format!("{} error (status {})", service, status)
    } else {
        format!("{} error (status {}): {}", service, status, snippet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_env_var;

    #[test]
    fn env_key_takes_precedence() {
        with_env_var("GOOGLE_SPEECH_API_KEY", Some("env-key"), || {
            assert_eq!(
                resolve_recognize_key(Some("file-key")).as_deref(),
                Some("env-key")
            );
        });
    }

    #[test]
    fn configured_key_used_when_env_absent() {
        with_env_var("GOOGLE_SPEECH_API_KEY", None, || {
            assert_eq!(
                resolve_recognize_key(Some("file-key")).as_deref(),
                Some("file-key")
            );
            assert_eq!(resolve_recognize_key(None), None);
        });
    }

    #[test]
    fn blank_env_key_is_ignored() {
        with_env_var("GOOGLE_SPEECH_API_KEY", Some("   "), || {
            assert_eq!(resolve_recognize_key(None), None);
        });
    }

    #[test]
    fn http_errors_keep_a_short_snippet() {
        let status = reqwest::StatusCode::FORBIDDEN;
        let long_body = "x".repeat(500);
        let message = format_http_error("translate", status, &long_body);
        assert!(message.contains("status 403"));
        assert!(message.len() < 300);
        assert_eq!(
            format_http_error("translate", status, "  "),
            "translate error (status 403 Forbidden)"
        );
    }
}
