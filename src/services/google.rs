use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use super::retry::{
    is_rate_limited, retry_after, wait_with_backoff, RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES,
};
use super::{format_http_error, ServiceFuture, Translation, TranslationBackend};

/// Client for the unauthenticated `translate_a/single` endpoint. The
/// response is positional JSON: `[0]` holds the translated segments,
/// `[2]` the detected source language.
#[derive(Debug, Clone)]
pub struct GoogleTranslate {
    url: String,
}

impl GoogleTranslate {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    async fn request(&self, text: String, target: String) -> Result<String> {
        let client = reqwest::Client::new();
        let mut attempt = 0usize;
        let mut delay = RATE_LIMIT_BASE_DELAY;
        loop {
            attempt += 1;
            let response = client
                .get(&self.url)
                .query(&[
                    ("client", "gtx"),
                    ("sl", "auto"),
                    ("tl", target.as_str()),
                    ("dt", "t"),
                    ("q", text.as_str()),
                ])
                .send()
                .await
                .with_context(|| "failed to reach translation service")?;

            let status = response.status();
            let retry_after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            if status.is_success() {
                return Ok(body);
            }
            if is_rate_limited(status, &body) && attempt < RATE_LIMIT_MAX_RETRIES {
                delay = wait_with_backoff("translate", attempt, delay, retry_after).await;
                continue;
            }
            return Err(anyhow!("{}", format_http_error("translate", status, &body)));
        }
    }
}

impl TranslationBackend for GoogleTranslate {
    fn translate(&self, text: &str, target: &str) -> ServiceFuture<Translation> {
        let this = self.clone();
        let text = text.to_string();
        let target = target.to_string();
        Box::pin(async move {
            let body = this.request(text, target).await?;
            parse_translation(&body)
        })
    }

    fn detect(&self, text: &str) -> ServiceFuture<String> {
        let this = self.clone();
        let text = text.to_string();
        Box::pin(async move {
            // Any target works; only the detected-source field is read.
            let body = this.request(text, "en".to_string()).await?;
            parse_detected(&body)
        })
    }
}

fn parse_translation(body: &str) -> Result<Translation> {
    let value: Value = serde_json::from_str(body)
        .with_context(|| "failed to parse translation response JSON")?;
    let segments = value
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("translation response has no segments"))?;
    let mut text = String::new();
    for segment in segments {
        if let Some(part) = segment.get(0).and_then(Value::as_str) {
            text.push_str(part);
        }
    }
    if text.is_empty() {
        return Err(anyhow!("translation response is empty"));
    }
    let detected = value
        .get(2)
        .and_then(Value::as_str)
        .map(|code| code.to_string());
    Ok(Translation { text, detected })
}

fn parse_detected(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body)
        .with_context(|| "failed to parse translation response JSON")?;
    value
        .get(2)
        .and_then(Value::as_str)
        .filter(|code| !code.trim().is_empty())
        .map(|code| code.to_string())
        .ok_or_else(|| anyhow!("translation response has no detected language"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTI_SEGMENT: &str = r#"[[["Bonjour ","Hello ",null,null,10],["le monde","world",null,null,10]],null,"en",null,null,null,null,[]]"#;

    #[test]
    fn joins_translated_segments() {
        let translation = parse_translation(MULTI_SEGMENT).unwrap();
        assert_eq!(translation.text, "Bonjour le monde");
        assert_eq!(translation.detected.as_deref(), Some("en"));
    }

    #[test]
    fn reads_detected_language() {
        assert_eq!(parse_detected(MULTI_SEGMENT).unwrap(), "en");
    }

    #[test]
    fn missing_segments_are_an_error() {
        let err = parse_translation(r#"[null,null,"en"]"#).unwrap_err();
        assert!(err.to_string().contains("no segments"));
    }

    #[test]
    fn missing_detection_is_an_error() {
        let err = parse_detected(r#"[[["hi","hi",null,null,1]],null,null]"#).unwrap_err();
        assert!(err.to_string().contains("no detected language"));
    }

    #[test]
    fn unparseable_body_is_an_error() {
        assert!(parse_translation("<html>blocked</html>").is_err());
    }
}
