use tracing::debug;

use crate::languages::LanguageRegistry;
use crate::services::TranslationBackend;

/// What the detector reports when the service fails or the text is empty.
pub const UNKNOWN_LANGUAGE: &str = "Unknown";

/// Key that replaces the whole translation mapping when a pass fails.
pub const ERROR_KEY: &str = "Error";

#[derive(Debug, Clone)]
pub struct Translator<T: TranslationBackend> {
    backend: T,
}

impl<T: TranslationBackend> Translator<T> {
    pub fn new(backend: T) -> Self {
        Self { backend }
    }

    /// Translates `text` into every target, keeping the caller's order.
    /// Targets are (label, code) pairs; the label is what the caller
    /// submitted and keys the result. A single failed target collapses
    /// the whole mapping into one (`ERROR_KEY`, message) entry.
    pub async fn translate_all(
        &self,
        text: &str,
        targets: &[(String, String)],
    ) -> Vec<(String, String)> {
        let mut translations = Vec::with_capacity(targets.len());
        for (label, code) in targets {
            match self.backend.translate(text, code).await {
                Ok(translation) => translations.push((label.clone(), translation.text)),
                Err(err) => {
                    debug!("translation to {} failed: {}", code, err);
                    return vec![(ERROR_KEY.to_string(), err.to_string())];
                }
            }
        }
        translations
    }
}

#[derive(Debug, Clone)]
pub struct LanguageDetector<T: TranslationBackend> {
    backend: T,
    registry: LanguageRegistry,
}

impl<T: TranslationBackend> LanguageDetector<T> {
    pub fn new(backend: T, registry: LanguageRegistry) -> Self {
        Self { backend, registry }
    }

    /// Returns the detected language code, or `UNKNOWN_LANGUAGE` when
    /// the text is empty, the service cannot answer, or the answer is
    /// a code the registry does not carry. Empty input never reaches
    /// the service.
    pub async fn detect(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return UNKNOWN_LANGUAGE.to_string();
        }
        match self.backend.detect(text).await {
            Ok(code) if self.registry.is_valid_code(&code) => code,
            Ok(code) => {
                debug!("language detection returned unlisted code {:?}", code);
                UNKNOWN_LANGUAGE.to_string()
            }
            Err(err) => {
                debug!("language detection failed: {}", err);
                UNKNOWN_LANGUAGE.to_string()
            }
        }
    }
}
