use crate::data::{self, MP3_MIME};
use crate::languages::LanguageRegistry;
use crate::services::SynthesisBackend;
use crate::session::AudioStore;
use crate::settings::Settings;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// What a synthesis attempt produced: an MP3 clip on disk, or the
/// notice shown when no voice exists for the requested language name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisOutcome {
    Clip { id: String, path: PathBuf },
    Unavailable(String),
}

/// Turns translated text into MP3 clips on disk.
pub struct SpeechSynthesizer<S: SynthesisBackend> {
    backend: S,
    tmp_dir: PathBuf,
}

impl<S: SynthesisBackend> SpeechSynthesizer<S> {
    pub fn new(backend: S, settings: &Settings) -> Self {
        Self {
            backend,
            tmp_dir: resolve_tmp_dir(settings),
        }
    }

    /// Synthesizes `text` in the language called `display_name` and
    /// writes the clip to a fresh file. The name is matched
    /// case-insensitively against the language table; an unmapped name
    /// yields `Unavailable` without touching the service. The caller
    /// owns the returned file.
    pub async fn synthesize_clip(
        &self,
        registry: &LanguageRegistry,
        display_name: &str,
        text: &str,
    ) -> Result<SynthesisOutcome> {
        let Some(code) = registry.code_for_name(display_name) else {
            return Ok(SynthesisOutcome::Unavailable(format!(
                "Text-to-speech not available for {}",
                display_name
            )));
        };
        let id = AudioStore::audio_id(text, &code);
        let bytes = self.backend.synthesize(text, &code).await?;
        let path = write_temp_file(&bytes, MP3_MIME, &self.tmp_dir)?;
        Ok(SynthesisOutcome::Clip { id, path })
    }

    /// Like `synthesize_clip`, but the clip belongs to `audio` and is
    /// reused when the same text comes around again.
    pub async fn speak_into(
        &self,
        audio: &mut AudioStore,
        registry: &LanguageRegistry,
        display_name: &str,
        text: &str,
    ) -> Result<SynthesisOutcome> {
        if let Some(code) = registry.code_for_name(display_name) {
            let id = AudioStore::audio_id(text, &code);
            if let Some(path) = audio.get(&id) {
                return Ok(SynthesisOutcome::Clip {
                    id,
                    path: path.to_path_buf(),
                });
            }
        }
        let outcome = self.synthesize_clip(registry, display_name, text).await?;
        if let SynthesisOutcome::Clip { id, path } = &outcome {
            audio.insert(id.clone(), path.clone());
        }
        Ok(outcome)
    }
}

/// Where synthesized clips and other scratch files land.
pub fn resolve_tmp_dir(settings: &Settings) -> PathBuf {
    settings
        .tmp_dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("polyglot-chat"))
}

/// Writes `bytes` to a fresh file under `dir`, with an extension
/// matching `mime` so players and browsers recognize the content. The
/// file persists until its owning session removes it.
pub fn write_temp_file(bytes: &[u8], mime: &str, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create tmp dir {}", dir.display()))?;

    let suffix = data::extension_from_mime(mime)
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();
    let file = tempfile::Builder::new()
        .prefix("polyglot-chat-")
        .suffix(&suffix)
        .tempfile_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    std::fs::write(file.path(), bytes)
        .with_context(|| format!("failed to write temp file {}", file.path().display()))?;

    let path = file
        .into_temp_path()
        .keep()
        .with_context(|| "failed to persist temp file")?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone)]
    struct CountingVoice {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl CountingVoice {
        fn new(fail: bool) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                fail,
            }
        }
    }

    impl SynthesisBackend for CountingVoice {
        fn synthesize(&self, text: &str, language: &str) -> ServiceFuture<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail;
            let payload = format!("{}:{}", language, text).into_bytes();
            Box::pin(async move {
                if fail {
                    anyhow::bail!("synthesis backend down");
                }
                Ok(payload)
            })
        }
    }

    fn settings_with_tmp(dir: &Path) -> Settings {
        Settings {
            tmp_dir: Some(dir.to_string_lossy().into_owned()),
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn writes_a_clip_and_registers_it() {
        let dir = tempfile::tempdir().unwrap();
        let voice = CountingVoice::new(false);
        let synthesizer = SpeechSynthesizer::new(voice.clone(), &settings_with_tmp(dir.path()));
        let registry = LanguageRegistry::load().unwrap();
        let mut audio = AudioStore::default();

        let outcome = synthesizer
            .speak_into(&mut audio, &registry, "French", "Bonjour")
            .await
            .unwrap();
        let SynthesisOutcome::Clip { id, path } = outcome else {
            panic!("expected a clip");
        };
        assert_eq!(audio.get(&id), Some(path.as_path()));
        assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("mp3"));
        assert_eq!(std::fs::read(&path).unwrap(), b"fr:Bonjour");
        assert_eq!(voice.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn caller_owned_clips_skip_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let voice = CountingVoice::new(false);
        let synthesizer = SpeechSynthesizer::new(voice.clone(), &settings_with_tmp(dir.path()));
        let registry = LanguageRegistry::load().unwrap();

        let outcome = synthesizer
            .synthesize_clip(&registry, "german", "Hallo")
            .await
            .unwrap();
        let SynthesisOutcome::Clip { path, .. } = outcome else {
            panic!("expected a clip");
        };
        assert_eq!(std::fs::read(&path).unwrap(), b"de:Hallo");
        assert_eq!(voice.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_text_reuses_the_clip() {
        let dir = tempfile::tempdir().unwrap();
        let voice = CountingVoice::new(false);
        let synthesizer = SpeechSynthesizer::new(voice.clone(), &settings_with_tmp(dir.path()));
        let registry = LanguageRegistry::load().unwrap();
        let mut audio = AudioStore::default();

        let first = synthesizer
            .speak_into(&mut audio, &registry, "french", "Bonjour")
            .await
            .unwrap();
        let second = synthesizer
            .speak_into(&mut audio, &registry, "FRENCH", "Bonjour")
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(voice.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unmapped_names_get_the_notice() {
        let dir = tempfile::tempdir().unwrap();
        let voice = CountingVoice::new(false);
        let synthesizer = SpeechSynthesizer::new(voice.clone(), &settings_with_tmp(dir.path()));
        let registry = LanguageRegistry::load().unwrap();
        let mut audio = AudioStore::default();

        let outcome = synthesizer
            .speak_into(&mut audio, &registry, "Klingon", "Qapla")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SynthesisOutcome::Unavailable("Text-to-speech not available for Klingon".to_string())
        );
        assert_eq!(voice.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn backend_failures_surface_as_errors() {
        let dir = tempfile::tempdir().unwrap();
        let voice = CountingVoice::new(true);
        let synthesizer = SpeechSynthesizer::new(voice, &settings_with_tmp(dir.path()));
        let registry = LanguageRegistry::load().unwrap();
        let mut audio = AudioStore::default();

        let result = synthesizer
            .speak_into(&mut audio, &registry, "german", "Hallo")
            .await;
        assert!(result.is_err());
        assert!(!audio.contains(&AudioStore::audio_id("Hallo", "de")));
    }

    #[test]
    fn tmp_dir_override_wins() {
        let settings = Settings {
            tmp_dir: Some("/tmp/elsewhere".to_string()),
            ..Settings::default()
        };
        assert_eq!(resolve_tmp_dir(&settings), PathBuf::from("/tmp/elsewhere"));
        assert!(resolve_tmp_dir(&Settings::default()).ends_with("polyglot-chat"));
    }

    #[test]
    fn temp_files_carry_the_mime_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp_file(b"abc", MP3_MIME, dir.path()).unwrap();
        assert!(path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("polyglot-chat-") && name.ends_with(".mp3"))
            .unwrap_or(false));
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }
}
