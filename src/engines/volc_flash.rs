use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::VolcConfig;
use crate::error::{EngineError, EngineResult};
use crate::transcript::{EngineKind, TranscriptResult, TranscriptUtterance, TranscriptWord};

use super::AsrEngine;

pub(crate) const STATUS_OK: &str = "20000000";
pub(crate) const STATUS_PROCESSING: &str = "20000001";
pub(crate) const STATUS_QUEUED: &str = "20000002";

/// Volcengine big-model recognition, flash (single-call) edition.
///
/// Audio travels base64-encoded in the request body; the vendor signals
/// success or failure through the `X-Api-Status-Code` response header rather
/// than the HTTP status line.
pub struct VolcFlashEngine {
    app_id: String,
    access_token: String,
    timeout: Duration,
    max_payload_bytes: usize,
    hotwords: RwLock<Vec<String>>,
    client: reqwest::Client,
}

const API_URL: &str = "https://openspeech.bytedance.com/api/v3/auc/bigmodel/recognize/flash";
const RESOURCE_ID: &str = "volc.bigasr.auc_turbo";

#[derive(Debug, Serialize)]
struct FlashRequest {
    user: VolcUser,
    audio: FlashAudio,
    request: VolcRequestOptions,
}

#[derive(Debug, Serialize)]
pub(crate) struct VolcUser {
    pub uid: String,
}

#[derive(Debug, Serialize)]
struct FlashAudio {
    data: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct VolcRequestOptions {
    pub model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_punc: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_utterances: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_ddc: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_itn: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_speaker_info: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corpus: Option<VolcCorpus>,
}

#[derive(Debug, Serialize)]
pub(crate) struct VolcCorpus {
    pub context: String,
}

impl VolcCorpus {
    /// Hotwords travel as a JSON document inside the `context` string.
    pub(crate) fn from_hotwords(hotwords: &[String]) -> Option<Self> {
        if hotwords.is_empty() {
            return None;
        }
        let entries: Vec<_> = hotwords
            .iter()
            .map(|w| serde_json::json!({ "word": w }))
            .collect();
        let context = serde_json::json!({ "hotwords": entries }).to_string();
        Some(Self { context })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct VolcResponse {
    #[serde(default)]
    pub audio_info: Option<VolcAudioInfo>,
    #[serde(default)]
    pub result: Option<VolcResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VolcAudioInfo {
    #[serde(default)]
    pub duration: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VolcResult {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub utterances: Vec<VolcUtterance>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VolcUtterance {
    pub text: String,
    pub start_time: u64,
    pub end_time: u64,
    #[serde(default)]
    pub words: Vec<VolcWord>,
    #[serde(default)]
    pub speaker: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VolcWord {
    pub text: String,
    pub start_time: u64,
    pub end_time: u64,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Normalizes a Volcengine response body into a [`TranscriptResult`].
///
/// Shared by the flash and standard engines, which return the same shape.
pub(crate) fn parse_volc_response(body: VolcResponse, log_id: String) -> EngineResult {
    let result = body
        .result
        .ok_or_else(|| EngineError::MalformedResponse("response body missing 'result'".into()))?;

    let duration_ms = body.audio_info.map(|a| a.duration).unwrap_or(0);

    let mut words = Vec::new();
    let mut utterances = Vec::new();

    for utt in result.utterances {
        let speaker = utt.speaker.unwrap_or_else(|| "unknown".to_string());

        let mut utt_words = Vec::new();
        for w in utt.words {
            // Vendor reports confidence on a 0-100 scale.
            let confidence = w.confidence.unwrap_or(100.0) / 100.0;
            let word = TranscriptWord {
                text: w.text,
                start_ms: w.start_time,
                end_ms: w.end_time,
                confidence,
                speaker: speaker.clone(),
            };
            utt_words.push(word.clone());
            words.push(word);
        }

        utterances.push(TranscriptUtterance {
            text: utt.text,
            start_ms: utt.start_time,
            end_ms: utt.end_time,
            words: utt_words,
            speaker,
        });
    }

    Ok(TranscriptResult {
        text: result.text,
        duration_ms,
        words,
        utterances,
        engine: EngineKind::Volc,
        log_id,
        produced_at: Utc::now(),
    })
}

/// Reads the vendor's status headers, failing unless the code is accepted.
pub(crate) fn check_status_header(
    response: &reqwest::Response,
    accepted: &[&str],
) -> Result<String, EngineError> {
    let code = header_value(response, "X-Api-Status-Code");
    if accepted.contains(&code.as_str()) {
        return Ok(code);
    }
    let message = header_value(response, "X-Api-Message");
    match response.status().as_u16() {
        401 | 403 => Err(EngineError::Unauthorized(format!(
            "code={}, message={}",
            code, message
        ))),
        _ => Err(EngineError::VendorRejected { code, message }),
    }
}

pub(crate) fn header_value(response: &reqwest::Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

impl VolcFlashEngine {
    pub fn new(config: &VolcConfig, hotwords: Vec<String>) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.flash_timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            app_id: config.app_id.clone(),
            access_token: config.access_token.clone(),
            timeout,
            max_payload_bytes: config.flash_max_payload_bytes,
            hotwords: RwLock::new(hotwords),
            client,
        })
    }

    fn current_hotwords(&self) -> Vec<String> {
        self.hotwords
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl AsrEngine for VolcFlashEngine {
    async fn transcribe(&self, audio: Bytes) -> EngineResult {
        if audio.len() > self.max_payload_bytes {
            return Err(EngineError::PayloadTooLarge {
                size: audio.len(),
                limit: Some(self.max_payload_bytes),
            });
        }

        let audio_base64 = base64::engine::general_purpose::STANDARD.encode(&audio);
        let request_body = FlashRequest {
            user: VolcUser {
                uid: self.app_id.clone(),
            },
            audio: FlashAudio { data: audio_base64 },
            request: VolcRequestOptions {
                model_name: "bigmodel".to_string(),
                // The 400 model version improves ITN over the default.
                model_version: Some("400".to_string()),
                enable_punc: Some(true),
                show_utterances: Some(true),
                enable_ddc: Some(true),
                enable_itn: Some(true),
                enable_speaker_info: Some(true),
                corpus: VolcCorpus::from_hotwords(&self.current_hotwords()),
            },
        };

        let request_id = uuid::Uuid::new_v4().to_string();
        debug!("Sending flash recognition request, id={}", request_id);

        let response = self
            .client
            .post(API_URL)
            .header("X-Api-App-Key", &self.app_id)
            .header("X-Api-Access-Key", &self.access_token)
            .header("X-Api-Resource-Id", RESOURCE_ID)
            .header("X-Api-Request-Id", &request_id)
            .header("X-Api-Sequence", "-1")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| EngineError::from_transport(e, self.timeout))?;

        check_status_header(&response, &[STATUS_OK])?;
        let log_id = header_value(&response, "X-Tt-Logid");

        let body: VolcResponse = response
            .json()
            .await
            .map_err(|e| EngineError::MalformedResponse(e.to_string()))?;

        parse_volc_response(body, log_id)
    }

    fn name(&self) -> &str {
        "Volcengine ASR Flash"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Volc
    }

    fn set_hotwords(&self, hotwords: Vec<String>) {
        *self.hotwords.write().unwrap_or_else(|e| e.into_inner()) = hotwords;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_empty_hotwords_is_none() {
        assert!(VolcCorpus::from_hotwords(&[]).is_none());
    }

    #[test]
    fn test_corpus_encodes_hotwords_as_json() {
        let corpus = VolcCorpus::from_hotwords(&["播客".to_string(), "ASR".to_string()]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&corpus.context).unwrap();
        assert_eq!(parsed["hotwords"][0]["word"], "播客");
        assert_eq!(parsed["hotwords"][1]["word"], "ASR");
    }

    #[test]
    fn test_parse_response_builds_words_and_utterances() {
        let body: VolcResponse = serde_json::from_value(serde_json::json!({
            "audio_info": { "duration": 10000 },
            "result": {
                "text": "测试转录",
                "utterances": [
                    {
                        "text": "测试",
                        "start_time": 0,
                        "end_time": 5000,
                        "speaker": "1",
                        "words": [
                            { "text": "测", "start_time": 0, "end_time": 2500 },
                            { "text": "试", "start_time": 2500, "end_time": 5000, "confidence": 80.0 }
                        ]
                    },
                    {
                        "text": "转录",
                        "start_time": 5000,
                        "end_time": 10000,
                        "words": [
                            { "text": "转", "start_time": 5000, "end_time": 7500 },
                            { "text": "录", "start_time": 7500, "end_time": 10000 }
                        ]
                    }
                ]
            }
        }))
        .unwrap();

        let result = parse_volc_response(body, "log-123".to_string()).unwrap();
        assert_eq!(result.text, "测试转录");
        assert_eq!(result.duration_ms, 10000);
        assert_eq!(result.words.len(), 4);
        assert_eq!(result.utterances.len(), 2);
        assert_eq!(result.words[0].speaker, "1");
        assert_eq!(result.words[1].confidence, 0.8);
        assert_eq!(result.utterances[1].speaker, "unknown");
        assert_eq!(result.log_id, "log-123");
        assert!(result.check_invariants());
    }

    #[test]
    fn test_parse_response_missing_result_is_malformed() {
        let body: VolcResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        let err = parse_volc_response(body, String::new()).unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected_locally() {
        let config = VolcConfig {
            app_id: "app".into(),
            access_token: "token".into(),
            flash_timeout_secs: 5,
            flash_max_retries: 0,
            flash_retry_delay_ms: 0,
            flash_max_payload_bytes: 8,
            standard_poll_interval_secs: 1,
            standard_max_poll_secs: 1,
        };
        let engine = VolcFlashEngine::new(&config, vec![]).unwrap();

        let err = engine
            .transcribe(Bytes::from_static(b"0123456789"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::PayloadTooLarge {
                size: 10,
                limit: Some(8)
            }
        ));
    }
}
