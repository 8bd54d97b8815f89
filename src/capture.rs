use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;
use tracing::{info, warn};

use crate::services::{RecognitionBackend, RecognitionOutcome};
use crate::settings::Settings;

/// Reply when the recognizer heard audio but found no words in it.
pub const NO_MATCH_REPLY: &str = "Could not understand audio";
/// Reply when the recognition service could not be reached at all.
pub const SERVICE_ERROR_REPLY: &str = "Error with speech recognition service";

const RECOGNIZE_LANGUAGE: &str = "en-US";

/// Records a short clip from the default microphone and turns it into
/// input text. Recognition failures never bubble up as errors; they
/// become the fixed replies above so the conversation can carry them.
#[derive(Debug, Clone)]
pub struct SpeechCapture<R: RecognitionBackend> {
    recognizer: R,
    seconds: u64,
    sample_rate: u32,
    device: Option<String>,
}

impl<R: RecognitionBackend> SpeechCapture<R> {
    pub fn new(recognizer: R, settings: &Settings) -> Self {
        Self {
            recognizer,
            seconds: settings.capture_seconds,
            sample_rate: settings.capture_sample_rate,
            device: settings.capture_device.clone(),
        }
    }

    pub async fn listen(&self) -> Result<String> {
        ensure_command("ffmpeg", "speech capture requires ffmpeg")?;
        info!("capturing {}s from the microphone", self.seconds);

        let dir = tempdir().with_context(|| "failed to create temp dir for capture")?;
        let wav_path = dir.path().join("capture.wav");
        record_clip(
            &wav_path,
            self.seconds,
            self.sample_rate,
            self.device.as_deref(),
        )?;
        let (samples, sample_rate) = read_wav_mono_i16(&wav_path)?;
        Ok(self.transcribe(samples, sample_rate).await)
    }

    pub async fn transcribe(&self, samples: Vec<i16>, sample_rate: u32) -> String {
        match self
            .recognizer
            .recognize(samples, sample_rate, RECOGNIZE_LANGUAGE)
            .await
        {
            Ok(RecognitionOutcome::Transcript(text)) => text,
            Ok(RecognitionOutcome::NoMatch) => NO_MATCH_REPLY.to_string(),
            Ok(RecognitionOutcome::Unreachable(message)) => {
                warn!("recognition service unreachable: {}", message);
                SERVICE_ERROR_REPLY.to_string()
            }
            Err(err) => err.to_string(),
        }
    }
}

fn record_clip(out_wav: &Path, seconds: u64, sample_rate: u32, device: Option<&str>) -> Result<()> {
    let seconds = seconds.to_string();
    let rate = sample_rate.to_string();
    let mut args: Vec<String> = vec!["-y".to_string()];
    if cfg!(target_os = "macos") {
        args.extend([
            "-f".to_string(),
            "avfoundation".to_string(),
            "-i".to_string(),
            device.unwrap_or(":0").to_string(),
        ]);
    } else if cfg!(target_os = "linux") {
        args.extend([
            "-f".to_string(),
            "alsa".to_string(),
            "-i".to_string(),
            device.unwrap_or("default").to_string(),
        ]);
    } else {
        return Err(anyhow!("speech capture is only supported on linux and macos"));
    }
    args.extend([
        "-t".to_string(),
        seconds,
        "-ar".to_string(),
        rate,
        "-ac".to_string(),
        "1".to_string(),
        out_wav.to_string_lossy().into_owned(),
    ]);

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    run_ffmpeg(&arg_refs).with_context(|| "failed to record from microphone")
}

fn run_ffmpeg(args: &[&str]) -> Result<()> {
    let output = Command::new("ffmpeg")
        .args(args)
        .output()
        .with_context(|| "failed to run ffmpeg")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("ffmpeg failed: {}", stderr.trim()));
    }
    Ok(())
}

fn read_wav_mono_i16(path: &Path) -> Result<(Vec<i16>, u32)> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("failed to open wav: {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(anyhow!("wav has no channels"));
    }

    let samples: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| {
                let value = s.unwrap_or(0.0).clamp(-1.0, 1.0);
                (value * i16::MAX as f32) as i16
            })
            .collect(),
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            if bits <= 16 {
                reader.samples::<i16>().map(|s| s.unwrap_or(0)).collect()
            } else {
                let shift = bits - 16;
                reader
                    .samples::<i32>()
                    .map(|s| (s.unwrap_or(0) >> shift) as i16)
                    .collect()
            }
        }
    };

    if channels == 1 {
        return Ok((samples, spec.sample_rate));
    }
    let mut mono = Vec::with_capacity(samples.len() / channels);
    for frame in samples.chunks(channels) {
        let sum: i32 = frame.iter().map(|s| *s as i32).sum();
        mono.push((sum / channels as i32) as i16);
    }
    Ok((mono, spec.sample_rate))
}

pub(crate) fn command_exists(cmd: &str) -> bool {
    let path = Path::new(cmd);
    if path.components().count() > 1 {
        return is_executable(path);
    }

    let path_var = match env::var_os("PATH") {
        Some(value) => value,
        None => return false,
    };
    for dir in env::split_paths(&path_var) {
        if is_executable(&dir.join(cmd)) {
            return true;
        }
    }
    false
}

fn is_executable(path: &Path) -> bool {
    let metadata = match fs::metadata(path) {
        Ok(value) => value,
        Err(_) => return false,
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

fn ensure_command(cmd: &str, message: &str) -> Result<()> {
    if command_exists(cmd) {
        Ok(())
    } else {
        Err(anyhow!("{}", message))
    }
}
