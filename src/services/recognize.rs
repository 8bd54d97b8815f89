use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use super::{format_http_error, RecognitionBackend, RecognitionOutcome, ServiceFuture};

/// Client for the `speech-api/v2/recognize` endpoint. Audio goes up as
/// raw little-endian PCM16 with an `audio/l16` content type; the reply
/// is one JSON object per line.
#[derive(Debug, Clone)]
pub struct SpeechRecognize {
    url: String,
    key: Option<String>,
}

impl SpeechRecognize {
    pub fn new(url: impl Into<String>, key: Option<String>) -> Self {
        Self {
            url: url.into(),
            key,
        }
    }
}

impl RecognitionBackend for SpeechRecognize {
    fn recognize(
        &self,
        samples: Vec<i16>,
        sample_rate: u32,
        language: &str,
    ) -> ServiceFuture<RecognitionOutcome> {
        let this = self.clone();
        let language = language.to_string();
        Box::pin(async move {
            let Some(key) = this.key.clone() else {
                return Ok(RecognitionOutcome::Unreachable(
                    "recognition API key not configured (set GOOGLE_SPEECH_API_KEY)".to_string(),
                ));
            };

            let client = reqwest::Client::new();
            let response = client
                .post(&this.url)
                .query(&[
                    ("client", "chromium"),
                    ("lang", language.as_str()),
                    ("key", key.as_str()),
                ])
                .header(CONTENT_TYPE, format!("audio/l16; rate={}", sample_rate))
                .body(pcm16_bytes(&samples))
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(err) => return Ok(RecognitionOutcome::Unreachable(err.to_string())),
            };
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Ok(RecognitionOutcome::Unreachable(format_http_error(
                    "recognition",
                    status,
                    &body,
                )));
            }
            Ok(parse_recognition(&body))
        })
    }
}

fn pcm16_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// The first line whose result list is non-empty carries the transcript.
fn parse_recognition(body: &str) -> RecognitionOutcome {
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let Some(results) = value.get("result").and_then(Value::as_array) else {
            continue;
        };
        let Some(first) = results.first() else {
            continue;
        };
        let Some(alternatives) = first.get("alternative").and_then(Value::as_array) else {
            continue;
        };
        for alternative in alternatives {
            if let Some(transcript) = alternative.get("transcript").and_then(Value::as_str) {
                let transcript = transcript.trim();
                if !transcript.is_empty() {
                    return RecognitionOutcome::Transcript(transcript.to_string());
                }
            }
        }
    }
    RecognitionOutcome::NoMatch
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_LINE_RESPONSE: &str = concat!(
        "{\"result\":[]}\n",
        "{\"result\":[{\"alternative\":[{\"transcript\":\"hello world\",\"confidence\":0.92},",
        "{\"transcript\":\"hallowed\"}],\"final\":true}],\"result_index\":0}\n",
    );

    #[test]
    fn skips_empty_result_lines() {
        assert_eq!(
            parse_recognition(TWO_LINE_RESPONSE),
            RecognitionOutcome::Transcript("hello world".to_string())
        );
    }

    #[test]
    fn no_usable_result_is_no_match() {
        assert_eq!(parse_recognition(""), RecognitionOutcome::NoMatch);
        assert_eq!(parse_recognition("{\"result\":[]}\n"), RecognitionOutcome::NoMatch);
        assert_eq!(
            parse_recognition("{\"result\":[{\"alternative\":[{\"transcript\":\"  \"}]}]}"),
            RecognitionOutcome::NoMatch
        );
        assert_eq!(parse_recognition("not json"), RecognitionOutcome::NoMatch);
    }

    #[test]
    fn samples_encode_little_endian() {
        assert_eq!(pcm16_bytes(&[1, -2]), vec![0x01, 0x00, 0xfe, 0xff]);
    }

    #[tokio::test]
    async fn missing_key_reports_unreachable() {
        let client = SpeechRecognize::new("http://localhost:1/recognize", None);
        let outcome = client.recognize(vec![0; 16], 16_000, "en-US").await.unwrap();
        match outcome {
            RecognitionOutcome::Unreachable(message) => {
                assert!(message.contains("not configured"));
            }
            other => panic!("expected Unreachable, got {:?}", other),
        }
    }
}
