use anyhow::{anyhow, Context, Result};
use reqwest::header::USER_AGENT;

use super::retry::{
    is_rate_limited, retry_after, wait_with_backoff, RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES,
};
use super::{format_http_error, ServiceFuture, SynthesisBackend};

// The endpoint rejects long q values, so text is sent in word-aligned
// chunks and the MP3 frames are concatenated.
const MAX_CHUNK_CHARS: usize = 200;

const BROWSER_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0";

/// Client for the `translate_tts` endpoint; returns raw MP3 bytes.
#[derive(Debug, Clone)]
pub struct SpeechSynthesis {
    url: String,
}

impl SpeechSynthesis {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    async fn fetch_chunk(
        &self,
        client: &reqwest::Client,
        chunk: &str,
        idx: usize,
        total: usize,
        language: &str,
    ) -> Result<Vec<u8>> {
        let textlen = chunk.chars().count().to_string();
        let total = total.to_string();
        let idx = idx.to_string();
        let mut attempt = 0usize;
        let mut delay = RATE_LIMIT_BASE_DELAY;
        loop {
            attempt += 1;
            let response = client
                .get(&self.url)
                .header(USER_AGENT, BROWSER_UA)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", language),
                    ("q", chunk),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .await
                .with_context(|| "failed to reach speech synthesis service")?;

            let status = response.status();
            let retry_after = retry_after(response.headers());
            if status.is_success() {
                let mut bytes = Vec::new();
                let mut stream = response.bytes_stream();
                use futures_util::StreamExt;
                while let Some(part) = stream.next().await {
                    let part = part.with_context(|| "failed to read synthesized audio")?;
                    bytes.extend_from_slice(&part);
                }
                if bytes.is_empty() {
                    return Err(anyhow!("speech synthesis returned no audio"));
                }
                return Ok(bytes);
            }
            let body = response.text().await.unwrap_or_default();
            if is_rate_limited(status, &body) && attempt < RATE_LIMIT_MAX_RETRIES {
                delay = wait_with_backoff("speech synthesis", attempt, delay, retry_after).await;
                continue;
            }
            return Err(anyhow!(
                "{}",
                format_http_error("speech synthesis", status, &body)
            ));
        }
    }
}

impl SynthesisBackend for SpeechSynthesis {
    fn synthesize(&self, text: &str, language: &str) -> ServiceFuture<Vec<u8>> {
        let this = self.clone();
        let text = text.to_string();
        let language = language.to_string();
        Box::pin(async move {
            let chunks = chunk_text(&text, MAX_CHUNK_CHARS);
            if chunks.is_empty() {
                return Err(anyhow!("nothing to synthesize"));
            }
            let client = reqwest::Client::new();
            let total = chunks.len();
            let mut bytes = Vec::new();
            for (idx, chunk) in chunks.iter().enumerate() {
                let part = this
                    .fetch_chunk(&client, chunk, idx, total, &language)
                    .await?;
                bytes.extend_from_slice(&part);
            }
            Ok(bytes)
        })
    }
}

fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if word_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        let sep = if current.is_empty() { 0 } else { 1 };
        if current_len + sep + word_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("hello world", 200), vec!["hello world"]);
    }

    #[test]
    fn long_text_splits_on_word_boundaries() {
        let text = "word ".repeat(100);
        let chunks = chunk_text(&text, 40);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 40);
            assert!(!chunk.starts_with(' ') && !chunk.ends_with(' '));
        }
        assert_eq!(chunks.join(" "), text.trim());
    }

    #[test]
    fn oversized_word_is_hard_split() {
        let word = "a".repeat(95);
        let chunks = chunk_text(&word, 40);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), word);
    }

    #[test]
    fn whitespace_only_text_has_no_chunks() {
        assert!(chunk_text("   \n\t ", 40).is_empty());
    }
}
