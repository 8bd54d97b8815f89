use anyhow::Result;

use crate::dispatch::Presenter;
use crate::services::{self, GoogleTranslate, SpeechRecognize, SpeechSynthesis};
use crate::session::SessionStore;
use crate::settings::Settings;

pub(crate) struct ServerState {
    pub(crate) settings: Settings,
    pub(crate) presenter: Presenter<GoogleTranslate, SpeechSynthesis, SpeechRecognize>,
    pub(crate) sessions: SessionStore,
    pub(crate) index_html: String,
}

impl ServerState {
    pub(crate) fn new(settings: Settings) -> Result<Self> {
        let translation = GoogleTranslate::new(&settings.translate_url);
        let voice = SpeechSynthesis::new(&settings.tts_url);
        let key = services::resolve_recognize_key(settings.recognize_key.as_deref());
        let recognizer = SpeechRecognize::new(&settings.recognize_url, key);
        let presenter = Presenter::new(translation, voice, recognizer, &settings)?;
        let index_html = super::handlers::render_index()?;
        Ok(Self {
            settings,
            presenter,
            sessions: SessionStore::new(),
            index_html,
        })
    }
}
