use anyhow::{anyhow, Result};
use std::path::Path;

pub mod capture;
pub mod data;
pub mod dispatch;
pub mod extract;
pub mod languages;
pub mod logging;
pub mod normalize;
pub mod ocr;
pub mod server;
pub mod services;
pub mod session;
pub mod settings;
pub mod synth;
mod test_util;
pub mod translate;

use capture::SpeechCapture;
use extract::DocumentExtractor;
use languages::LanguageRegistry;
use services::{GoogleTranslate, SpeechRecognize, SpeechSynthesis};
use synth::{SpeechSynthesizer, SynthesisOutcome};
use translate::Translator;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub languages: Vec<String>,
    pub data: Option<String>,
    pub data_mime: Option<String>,
    pub capture: bool,
    pub speak: bool,
    pub settings_path: Option<String>,
    pub show_languages: bool,
}

/// One-shot mode: takes input from stdin, a file or the microphone,
/// translates it and returns the printable result.
pub async fn run(config: Config, input: Option<String>) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;
    let registry = LanguageRegistry::load()?;

    if config.show_languages {
        return Ok(format_language_table(&registry));
    }

    let text = if config.capture {
        let key = services::resolve_recognize_key(settings.recognize_key.as_deref());
        let recognizer = SpeechRecognize::new(&settings.recognize_url, key);
        SpeechCapture::new(recognizer, &settings).listen().await?
    } else if let Some(path) = config.data.as_deref() {
        let attachment = data::load_attachment(Path::new(path), config.data_mime.as_deref())?;
        DocumentExtractor::new(&settings.ocr_languages).extract(&attachment)?
    } else {
        input.unwrap_or_default()
    };
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(anyhow!(
            "no input text (pipe text on stdin, or use --capture or --data)"
        ));
    }

    let targets = resolve_targets(&config.languages, &registry)?;
    let translator = Translator::new(GoogleTranslate::new(&settings.translate_url));
    let translations = translator.translate_all(&text, &targets).await;
    if let [(label, message)] = translations.as_slice() {
        if label == translate::ERROR_KEY {
            return Err(anyhow!("{}", message));
        }
    }

    if !config.speak {
        let lines: Vec<String> = translations
            .iter()
            .map(|(language, translated)| format!("{}\t{}", language, translated))
            .collect();
        return Ok(lines.join("\n"));
    }

    let synthesizer =
        SpeechSynthesizer::new(SpeechSynthesis::new(&settings.tts_url), &settings);
    let mut lines = Vec::new();
    for (language, translated) in &translations {
        match synthesizer
            .synthesize_clip(&registry, language, translated)
            .await?
        {
            SynthesisOutcome::Clip { path, .. } => {
                lines.push(format!("{}\t{}\t{}", language, translated, path.display()));
            }
            SynthesisOutcome::Unavailable(notice) => {
                lines.push(format!("{}\t{}\t({})", language, translated, notice));
            }
        }
    }
    Ok(lines.join("\n"))
}

fn resolve_targets(languages: &[String], registry: &LanguageRegistry) -> Result<Vec<(String, String)>> {
    let mut targets: Vec<(String, String)> = Vec::new();
    for raw in languages {
        let Some(code) = registry.resolve(raw) else {
            return Err(anyhow!(
                "invalid target language '{}' (see --show-languages)",
                raw
            ));
        };
        if targets.iter().any(|(_, existing)| existing == &code) {
            continue;
        }
        if let Some(name) = registry.display_name(&code) {
            targets.push((name, code));
        }
    }
    if targets.is_empty() {
        return Err(anyhow!("no target languages (use --lang)"));
    }
    Ok(targets)
}

fn format_language_table(registry: &LanguageRegistry) -> String {
    registry
        .entries()
        .into_iter()
        .map(|(code, name)| format!("{}\t{}", code, name))
        .collect::<Vec<_>>()
        .join("\n")
}
