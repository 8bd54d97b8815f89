use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Language table used everywhere a code or display name crosses a
/// boundary. Codes are the short forms the translation endpoints accept
/// ("fr", "zh-cn"), display names the lowercase English names shown in
/// the client ("french", "chinese (simplified)").
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    codes: HashMap<String, String>,
    by_name: HashMap<String, String>,
}

impl LanguageRegistry {
    pub fn load() -> Result<Self> {
        let raw = include_str!("language_names.json");
        let parsed: LanguageData =
            serde_json::from_str(raw).with_context(|| "failed to parse language name data")?;
        // Aliased codes ("he"/"iw") share a name; sort so the reverse
        // lookup is deterministic.
        let mut ordered: Vec<_> = parsed.codes.iter().collect();
        ordered.sort();
        let mut by_name = HashMap::new();
        for (code, name) in ordered {
            by_name
                .entry(name.to_lowercase())
                .or_insert_with(|| code.clone());
        }
        Ok(LanguageRegistry {
            codes: parsed.codes,
            by_name,
        })
    }

    pub fn is_valid_code(&self, code: &str) -> bool {
        self.codes.contains_key(&normalize(code))
    }

    pub fn display_name(&self, code: &str) -> Option<String> {
        self.codes.get(&normalize(code)).cloned()
    }

    /// Case-insensitive display-name lookup ("French" -> "fr").
    pub fn code_for_name(&self, name: &str) -> Option<String> {
        self.by_name.get(&normalize(name)).cloned()
    }

    /// Accepts either a display name or a bare code.
    pub fn resolve(&self, raw: &str) -> Option<String> {
        if let Some(code) = self.code_for_name(raw) {
            return Some(code);
        }
        let code = normalize(raw);
        if self.codes.contains_key(&code) {
            Some(code)
        } else {
            None
        }
    }

    /// All known languages as (code, name), sorted by name for display.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .codes
            .iter()
            .map(|(code, name)| (code.clone(), name.clone()))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[derive(Debug, Deserialize)]
struct LanguageData {
    codes: HashMap<String, String>,
}
