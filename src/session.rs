use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::debug;

/// One conversation turn: the cleaned input text and its translations
/// in request order.
#[derive(Debug, Clone)]
pub struct TranslationRecord {
    pub original: String,
    pub translations: Vec<(String, String)>,
    pub recorded_at: OffsetDateTime,
}

impl TranslationRecord {
    pub fn new(original: String, translations: Vec<(String, String)>) -> Self {
        Self {
            original,
            translations,
            recorded_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn recorded_at_rfc3339(&self) -> String {
        self.recorded_at.format(&Rfc3339).unwrap_or_default()
    }
}

/// Renders the downloadable transcript. The format is fixed:
///
/// ```text
/// Original: <text>
/// Translated (<language>): <text>
/// ---
/// ```
pub fn render_transcript(records: &[TranslationRecord]) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str("Original: ");
        out.push_str(&record.original);
        out.push('\n');
        for (language, text) in &record.translations {
            out.push_str("Translated (");
            out.push_str(language);
            out.push_str("): ");
            out.push_str(text);
            out.push('\n');
        }
        out.push_str("---\n");
    }
    out
}

/// Synthesized clips belonging to one session. Ids are content hashes
/// so a repeated phrase reuses the clip already on disk; the files are
/// removed when the session goes away.
#[derive(Debug, Default)]
pub struct AudioStore {
    clips: HashMap<String, PathBuf>,
}

impl AudioStore {
    pub fn audio_id(text: &str, language: &str) -> String {
        format!("{:x}", md5::compute(format!("{}{}", text, language)))
    }

    pub fn insert(&mut self, id: String, path: PathBuf) {
        self.clips.insert(id, path);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clips.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Path> {
        self.clips.get(id).map(PathBuf::as_path)
    }
}

impl Drop for AudioStore {
    fn drop(&mut self) {
        for path in self.clips.values() {
            if let Err(err) = std::fs::remove_file(path) {
                debug!("failed to remove audio clip {}: {}", path.display(), err);
            }
        }
    }
}

/// Everything one conversation owns. Each input path overwrites its own
/// text field wholesale: capture writes `speech_text`, uploads write
/// `file_text`, typed entry writes `manual_text`. Only a translate
/// action appends to `history`; only synthesis inserts into `audio`.
#[derive(Debug, Default)]
pub struct SessionContext {
    pub speech_text: String,
    pub file_text: String,
    pub manual_text: String,
    pub history: Vec<TranslationRecord>,
    pub audio: AudioStore,
}

impl SessionContext {
    pub fn transcript(&self) -> String {
        render_transcript(&self.history)
    }
}

/// Live sessions. The outer lock only guards the map; each session has
/// its own async lock, held across a whole action, so actions on one
/// session serialize while different sessions proceed in parallel.
pub struct SessionStore {
    sessions: StdMutex<HashMap<String, Arc<Mutex<SessionContext>>>>,
    counter: AtomicU64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: StdMutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Creates a fresh session and returns its id.
    pub fn create(&self) -> String {
        let id = self.next_id();
        self.map()
            .insert(id.clone(), Arc::new(Mutex::new(SessionContext::default())));
        id
    }

    /// Returns the session for `id`, creating it on first use so a
    /// client-held id keeps working across restarts.
    pub fn obtain(&self, id: &str) -> Arc<Mutex<SessionContext>> {
        self.map()
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionContext::default())))
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Mutex<SessionContext>>> {
        self.map().get(id).cloned()
    }

    /// Drops the session. Its audio files disappear once the last
    /// in-flight action releases the context.
    pub fn remove(&self, id: &str) -> bool {
        self.map().remove(id).is_some()
    }

    fn next_id(&self) -> String {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{:x}", md5::compute(format!("{}-{}", nanos, count)))
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<SessionContext>>>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
