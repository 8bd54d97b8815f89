use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: String,
    pub tmp_dir: Option<String>,
    pub capture_seconds: u64,
    pub capture_sample_rate: u32,
    pub capture_device: Option<String>,
    pub translate_url: String,
    pub tts_url: String,
    pub recognize_url: String,
    pub recognize_key: Option<String>,
    pub ocr_languages: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8973".to_string(),
            tmp_dir: None,
            capture_seconds: 5,
            capture_sample_rate: 16_000,
            capture_device: None,
            translate_url: "https://translate.googleapis.com/translate_a/single".to_string(),
            tts_url: "https://translate.google.com/translate_tts".to_string(),
            recognize_url: "http://www.google.com/speech-api/v2/recognize".to_string(),
            recognize_key: None,
            ocr_languages: "eng".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    server: Option<ServerSettings>,
    capture: Option<CaptureSettings>,
    services: Option<ServiceSettings>,
    ocr: Option<OcrSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    listen: Option<String>,
    tmp_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CaptureSettings {
    seconds: Option<u64>,
    sample_rate: Option<u32>,
    device: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceSettings {
    translate_url: Option<String>,
    tts_url: Option<String>,
    recognize_url: Option<String>,
    recognize_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    languages: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(server) = incoming.server {
            if let Some(listen) = server.listen {
                if !listen.trim().is_empty() {
                    self.listen = listen;
                }
            }
            if let Some(dir) = server.tmp_dir {
                if !dir.trim().is_empty() {
                    self.tmp_dir = Some(dir);
                }
            }
        }
        if let Some(capture) = incoming.capture {
            if let Some(seconds) = capture.seconds {
                if seconds > 0 {
                    self.capture_seconds = seconds;
                }
            }
            if let Some(rate) = capture.sample_rate {
                if rate > 0 {
                    self.capture_sample_rate = rate;
                }
            }
            if let Some(device) = capture.device {
                if !device.trim().is_empty() {
                    self.capture_device = Some(device);
                }
            }
        }
        if let Some(services) = incoming.services {
            if let Some(url) = services.translate_url {
                if !url.trim().is_empty() {
                    self.translate_url = url;
                }
            }
            if let Some(url) = services.tts_url {
                if !url.trim().is_empty() {
                    self.tts_url = url;
                }
            }
            if let Some(url) = services.recognize_url {
                if !url.trim().is_empty() {
                    self.recognize_url = url;
                }
            }
            if let Some(key) = services.recognize_key {
                if !key.trim().is_empty() {
                    self.recognize_key = Some(key);
                }
            }
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(languages) = ocr.languages {
                if !languages.trim().is_empty() {
                    self.ocr_languages = languages;
                }
            }
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".polyglot-chat"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;

    #[test]
    fn defaults_apply_without_files() {
        with_temp_home(|_| {
            let settings = load_settings(None).unwrap();
            assert_eq!(settings.listen, "127.0.0.1:8973");
            assert_eq!(settings.capture_seconds, 5);
            assert_eq!(settings.capture_sample_rate, 16_000);
            assert_eq!(settings.ocr_languages, "eng");
            assert!(settings.recognize_key.is_none());
        });
    }

    #[test]
    fn home_settings_file_is_seeded() {
        with_temp_home(|home| {
            load_settings(None).unwrap();
            let seeded = home.join(".polyglot-chat").join("settings.toml");
            assert!(seeded.exists());
            let content = fs::read_to_string(seeded).unwrap();
            assert!(content.contains("[server]"));
        });
    }

    #[test]
    fn home_settings_override_defaults() {
        with_temp_home(|home| {
            let dir = home.join(".polyglot-chat");
            fs::create_dir_all(&dir).unwrap();
            fs::write(
                dir.join("settings.toml"),
                "[server]\nlisten = \"0.0.0.0:9000\"\n\n[capture]\nseconds = 8\n",
            )
            .unwrap();
            let settings = load_settings(None).unwrap();
            assert_eq!(settings.listen, "0.0.0.0:9000");
            assert_eq!(settings.capture_seconds, 8);
            // untouched sections keep their defaults
            assert_eq!(settings.capture_sample_rate, 16_000);
        });
    }

    #[test]
    fn blank_values_do_not_override() {
        with_temp_home(|home| {
            let dir = home.join(".polyglot-chat");
            fs::create_dir_all(&dir).unwrap();
            fs::write(
                dir.join("settings.toml"),
                "[services]\ntranslate_url = \"  \"\nrecognize_key = \"\"\n",
            )
            .unwrap();
            let settings = load_settings(None).unwrap();
            assert_eq!(
                settings.translate_url,
                "https://translate.googleapis.com/translate_a/single"
            );
            assert!(settings.recognize_key.is_none());
        });
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        with_temp_home(|home| {
            let missing = home.join("nope.toml");
            let err = load_settings(Some(&missing)).unwrap_err();
            assert!(err.to_string().contains("settings file not found"));
        });
    }

    #[test]
    fn explicit_path_wins_over_home() {
        with_temp_home(|home| {
            let dir = home.join(".polyglot-chat");
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("settings.toml"), "[capture]\nseconds = 8\n").unwrap();
            let extra = home.join("extra.toml");
            fs::write(&extra, "[capture]\nseconds = 2\n").unwrap();
            let settings = load_settings(Some(&extra)).unwrap();
            assert_eq!(settings.capture_seconds, 2);
        });
    }
}
