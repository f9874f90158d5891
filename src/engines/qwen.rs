use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use crate::config::QwenConfig;
use crate::error::{EngineError, EngineResult};
use crate::transcript::{EngineKind, TranscriptResult, TranscriptUtterance, TranscriptWord};

use super::AsrEngine;

/// DashScope Qwen ASR flash engine.
///
/// A byte-payload engine without word timestamps or segmentation: the result
/// carries a single whole-span utterance and a zero duration, since the
/// vendor response includes neither. The hotword list rides along as the
/// system-message text; a response that echoes that text back verbatim means
/// the audio was empty or invalid.
pub struct QwenFlashEngine {
    api_key: String,
    timeout: Duration,
    max_payload_bytes: usize,
    hotwords: RwLock<Vec<String>>,
    client: reqwest::Client,
}

const API_URL: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/multimodal-generation/generation";
const MODEL: &str = "qwen3-asr-flash";

#[derive(Debug, Deserialize)]
struct QwenResponse {
    output: QwenOutput,
}

#[derive(Debug, Deserialize)]
struct QwenOutput {
    choices: Vec<QwenChoice>,
}

#[derive(Debug, Deserialize)]
struct QwenChoice {
    message: QwenMessage,
}

#[derive(Debug, Deserialize)]
struct QwenMessage {
    #[serde(default)]
    content: Vec<QwenContent>,
}

#[derive(Debug, Deserialize)]
struct QwenContent {
    #[serde(default)]
    text: String,
}

impl QwenFlashEngine {
    pub fn new(config: &QwenConfig, hotwords: Vec<String>) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            api_key: config.api_key.clone(),
            timeout,
            max_payload_bytes: config.max_payload_bytes,
            hotwords: RwLock::new(hotwords),
            client,
        })
    }

    /// Hotwords are joined with the Chinese enumeration comma, as the vendor
    /// expects for vocabulary biasing.
    fn bias_text(&self) -> String {
        self.hotwords
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .join("、")
    }
}

#[async_trait]
impl AsrEngine for QwenFlashEngine {
    async fn transcribe(&self, audio: Bytes) -> EngineResult {
        if audio.len() > self.max_payload_bytes {
            return Err(EngineError::PayloadTooLarge {
                size: audio.len(),
                limit: Some(self.max_payload_bytes),
            });
        }

        let audio_base64 = base64::engine::general_purpose::STANDARD.encode(&audio);
        let bias_text = self.bias_text();

        let system_content: Vec<serde_json::Value> = if bias_text.is_empty() {
            vec![]
        } else {
            vec![serde_json::json!({ "text": bias_text })]
        };

        let request_body = serde_json::json!({
            "model": MODEL,
            "input": {
                "messages": [
                    { "role": "system", "content": system_content },
                    {
                        "role": "user",
                        "content": [
                            { "audio": format!("data:audio/wav;base64,{}", audio_base64) }
                        ]
                    }
                ]
            },
            "parameters": {
                "result_format": "message",
                "enable_itn": false,
                "disfluency_removal": true,
                "language": "zh"
            }
        });

        debug!("Sending Qwen ASR request, {} bytes of audio", audio.len());

        let response = self
            .client
            .post(API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| EngineError::from_transport(e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::from_status(status, body, Some(audio.len())));
        }

        let body: QwenResponse = response
            .json()
            .await
            .map_err(|e| EngineError::MalformedResponse(e.to_string()))?;

        let text = body
            .output
            .choices
            .first()
            .and_then(|c| c.message.content.first())
            .map(|c| c.text.clone())
            .ok_or_else(|| EngineError::MalformedResponse("response carries no text".into()))?;

        // A verbatim echo of the bias text means no usable audio reached the
        // recognizer.
        if !bias_text.is_empty() && text == bias_text {
            return Err(EngineError::VendorRejected {
                code: "hotword_echo".to_string(),
                message: "recording empty or invalid (hotword list echoed back)".to_string(),
            });
        }

        // No timestamps from this backend: one word and one utterance span
        // the whole result.
        let words = vec![TranscriptWord::new(text.clone(), 0, 0)];
        let utterances = vec![TranscriptUtterance {
            text: text.clone(),
            start_ms: 0,
            end_ms: 0,
            words: words.clone(),
            speaker: "unknown".to_string(),
        }];

        Ok(TranscriptResult {
            text,
            duration_ms: 0,
            words,
            utterances,
            engine: EngineKind::Qwen,
            log_id: String::new(),
            produced_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        "DashScope Qwen ASR"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Qwen
    }

    fn set_hotwords(&self, hotwords: Vec<String>) {
        *self.hotwords.write().unwrap_or_else(|e| e.into_inner()) = hotwords;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_engine(hotwords: Vec<String>) -> QwenFlashEngine {
        let config = QwenConfig {
            api_key: "key".into(),
            timeout_secs: 5,
            max_retries: 0,
            retry_delay_ms: 0,
            max_payload_bytes: 16,
        };
        QwenFlashEngine::new(&config, hotwords).unwrap()
    }

    #[test]
    fn test_bias_text_joins_hotwords() {
        let engine = test_engine(vec!["豆包".into(), "播客".into()]);
        assert_eq!(engine.bias_text(), "豆包、播客");
    }

    #[test]
    fn test_bias_text_empty_without_hotwords() {
        let engine = test_engine(vec![]);
        assert_eq!(engine.bias_text(), "");
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected_locally() {
        let engine = test_engine(vec![]);
        let err = engine
            .transcribe(Bytes::from(vec![0u8; 32]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::PayloadTooLarge {
                size: 32,
                limit: Some(16)
            }
        ));
    }

    #[tokio::test]
    async fn test_url_call_is_unsupported() {
        let engine = test_engine(vec![]);
        let err = engine
            .transcribe_url("https://example.com/a.mp3")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedOperation(_)));
    }
}
