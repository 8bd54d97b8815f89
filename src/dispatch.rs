use anyhow::Result;
use tracing::warn;

use crate::capture::SpeechCapture;
use crate::data::DataAttachment;
use crate::extract::DocumentExtractor;
use crate::languages::LanguageRegistry;
use crate::services::{RecognitionBackend, SynthesisBackend, TranslationBackend};
use crate::session::{SessionContext, TranslationRecord};
use crate::settings::Settings;
use crate::synth::{SpeechSynthesizer, SynthesisOutcome};
use crate::translate::{LanguageDetector, Translator, UNKNOWN_LANGUAGE};

/// Which input path collected the text a translate action carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Speech,
    File,
    Text,
}

impl InputSource {
    /// Warning shown when translate fires without text or without
    /// targets, worded for the path that collected the input.
    pub fn validation_warning(self) -> &'static str {
        match self {
            InputSource::Speech => "Please speak and select at least one language to translate.",
            InputSource::File => {
                "Please upload a file and select at least one language to translate."
            }
            InputSource::Text => "Please enter text or select at least one language to translate.",
        }
    }
}

/// A discrete user action. Each one is consumed by exactly one handler
/// that runs to completion, mutates the session it was given, and
/// returns a render instruction.
#[derive(Debug)]
pub enum Event {
    CaptureSpeech,
    UploadDocument { attachment: DataAttachment },
    EnterText { text: String },
    Translate { source: InputSource, text: String, languages: Vec<String> },
    DownloadTranscript,
}

/// What the UI shows after an event. Handlers fill in only the fields
/// their action produces.
#[derive(Debug, Clone, Default)]
pub struct Render {
    pub source_text: Option<String>,
    pub detected_language: Option<String>,
    pub translations: Vec<RenderedTranslation>,
    pub warnings: Vec<String>,
    pub transcript: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RenderedTranslation {
    pub language: String,
    pub text: String,
    pub audio_id: Option<String>,
}

/// Routes user actions through the translation pipeline. Holds every
/// component once; per-session state lives in the `SessionContext`
/// passed to `handle`, whose fields are written only here.
pub struct Presenter<T, S, R>
where
    T: TranslationBackend,
    S: SynthesisBackend,
    R: RecognitionBackend,
{
    translator: Translator<T>,
    detector: LanguageDetector<T>,
    synthesizer: SpeechSynthesizer<S>,
    capture: SpeechCapture<R>,
    extractor: DocumentExtractor,
    registry: LanguageRegistry,
}

impl<T, S, R> Presenter<T, S, R>
where
    T: TranslationBackend,
    S: SynthesisBackend,
    R: RecognitionBackend,
{
    pub fn new(translation: T, voice: S, recognizer: R, settings: &Settings) -> Result<Self> {
        let registry = LanguageRegistry::load()?;
        Ok(Self {
            translator: Translator::new(translation.clone()),
            detector: LanguageDetector::new(translation, registry.clone()),
            synthesizer: SpeechSynthesizer::new(voice, settings),
            capture: SpeechCapture::new(recognizer, settings),
            extractor: DocumentExtractor::new(&settings.ocr_languages),
            registry,
        })
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub async fn handle(&self, context: &mut SessionContext, event: Event) -> Result<Render> {
        match event {
            Event::CaptureSpeech => Ok(self.capture_speech(context).await),
            Event::UploadDocument { attachment } => {
                self.upload_document(context, &attachment).await
            }
            Event::EnterText { text } => Ok(self.enter_text(context, text).await),
            Event::Translate {
                source,
                text,
                languages,
            } => Ok(self.translate(context, source, &text, &languages).await),
            Event::DownloadTranscript => Ok(Self::transcript(context)),
        }
    }

    async fn capture_speech(&self, context: &mut SessionContext) -> Render {
        let text = match self.capture.listen().await {
            Ok(text) => text,
            // Capture faults are carried as the shown text, the same
            // way recognition faults are.
            Err(err) => err.to_string(),
        };
        context.speech_text = text.clone();
        self.captured(text).await
    }

    async fn upload_document(
        &self,
        context: &mut SessionContext,
        attachment: &DataAttachment,
    ) -> Result<Render> {
        let text = self.extractor.extract(attachment)?;
        context.file_text = text.clone();
        Ok(self.captured(text).await)
    }

    async fn enter_text(&self, context: &mut SessionContext, text: String) -> Render {
        context.manual_text = text.clone();
        self.captured(text).await
    }

    /// Shared tail of the three capture paths: echo the source text and
    /// attach the display-only detection result.
    async fn captured(&self, text: String) -> Render {
        let detected = if text.trim().is_empty() {
            None
        } else {
            Some(self.detect_label(&text).await)
        };
        Render {
            source_text: Some(text),
            detected_language: detected,
            ..Render::default()
        }
    }

    async fn detect_label(&self, text: &str) -> String {
        let code = self.detector.detect(text).await;
        self.registry
            .display_name(&code)
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string())
    }

    async fn translate(
        &self,
        context: &mut SessionContext,
        source: InputSource,
        text: &str,
        languages: &[String],
    ) -> Render {
        let mut render = Render::default();
        let targets = self.resolve_targets(languages, &mut render.warnings);
        if text.trim().is_empty() || targets.is_empty() {
            render.warnings.push(source.validation_warning().to_string());
            return render;
        }

        let translations = self.translator.translate_all(text, &targets).await;
        for (language, translated) in &translations {
            let audio_id = self
                .attach_audio(context, language, translated, &mut render.warnings)
                .await;
            render.translations.push(RenderedTranslation {
                language: language.clone(),
                text: translated.clone(),
                audio_id,
            });
        }
        context
            .history
            .push(TranslationRecord::new(text.trim().to_string(), translations));
        render
    }

    /// Maps submitted selections (display names or bare codes) to
    /// (display name, code) pairs in submission order. Unknown entries
    /// are reported and skipped; duplicates collapse onto the first.
    fn resolve_targets(
        &self,
        languages: &[String],
        warnings: &mut Vec<String>,
    ) -> Vec<(String, String)> {
        let mut targets: Vec<(String, String)> = Vec::new();
        for raw in languages {
            let Some(code) = self.registry.resolve(raw) else {
                warnings.push(format!("Unknown language: {}", raw));
                continue;
            };
            if targets.iter().any(|(_, existing)| existing == &code) {
                continue;
            }
            if let Some(label) = self.registry.display_name(&code) {
                targets.push((label, code));
            }
        }
        targets
    }

    async fn attach_audio(
        &self,
        context: &mut SessionContext,
        language: &str,
        text: &str,
        warnings: &mut Vec<String>,
    ) -> Option<String> {
        match self
            .synthesizer
            .speak_into(&mut context.audio, &self.registry, language, text)
            .await
        {
            Ok(SynthesisOutcome::Clip { id, .. }) => Some(id),
            Ok(SynthesisOutcome::Unavailable(notice)) => {
                warnings.push(notice);
                None
            }
            // Synthesis faults degrade that language to text only.
            Err(err) => {
                warn!("speech synthesis failed for {}: {:#}", language, err);
                warnings.push(format!("Speech synthesis failed for {}", language));
                None
            }
        }
    }

    fn transcript(context: &SessionContext) -> Render {
        let transcript = if context.history.is_empty() {
            None
        } else {
            Some(context.transcript())
        };
        Render {
            transcript,
            ..Render::default()
        }
    }
}
