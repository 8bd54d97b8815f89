use serde::{Deserialize, Serialize};

use crate::dispatch::{Render, RenderedTranslation};
use crate::session::TranslationRecord;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct ServerRequest {
    pub(crate) session: Option<String>,
    pub(crate) source: Option<String>,
    pub(crate) text: Option<String>,
    pub(crate) languages: Option<Vec<String>>,
    pub(crate) data_base64: Option<String>,
    pub(crate) data_mime: Option<String>,
    pub(crate) data_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ServerResponse {
    pub(crate) session: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) source_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) detected_language: Option<String>,
    pub(crate) translations: Vec<TranslationContent>,
    pub(crate) warnings: Vec<String>,
}

impl ServerResponse {
    pub(crate) fn from_render(session: String, render: Render) -> Self {
        Self {
            session,
            source_text: render.source_text,
            detected_language: render.detected_language,
            translations: render
                .translations
                .into_iter()
                .map(TranslationContent::from)
                .collect(),
            warnings: render.warnings,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TranslationContent {
    pub(crate) language: String,
    pub(crate) translated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) audio_id: Option<String>,
}

impl From<RenderedTranslation> for TranslationContent {
    fn from(entry: RenderedTranslation) -> Self {
        Self {
            language: entry.language,
            translated: entry.text,
            audio_id: entry.audio_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionResponse {
    pub(crate) session: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct HistoryResponse {
    pub(crate) session: String,
    pub(crate) records: Vec<HistoryRecord>,
}

#[derive(Debug, Serialize)]
pub(crate) struct HistoryRecord {
    pub(crate) original: String,
    pub(crate) translations: Vec<TranslationContent>,
    pub(crate) recorded_at: String,
}

impl From<&TranslationRecord> for HistoryRecord {
    fn from(record: &TranslationRecord) -> Self {
        Self {
            original: record.original.clone(),
            translations: record
                .translations
                .iter()
                .map(|(language, translated)| TranslationContent {
                    language: language.clone(),
                    translated: translated.clone(),
                    audio_id: None,
                })
                .collect(),
            recorded_at: record.recorded_at_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
