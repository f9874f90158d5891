use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::ParaformerConfig;
use crate::error::{EngineError, EngineResult};
use crate::transcript::{EngineKind, TranscriptResult, TranscriptUtterance, TranscriptWord};

use super::AsrEngine;

/// DashScope asynchronous transcription engine (fun-asr / paraformer models).
///
/// URL-only, three-step flow: submit a task, poll its status, then fetch the
/// finished transcription document from the URL the task reports. Word-level
/// punctuation is merged into the word text during normalization.
pub struct ParaformerEngine {
    api_key: String,
    model: String,
    poll_interval: Duration,
    max_poll_time: Duration,
    hotwords: RwLock<Vec<String>>,
    client: reqwest::Client,
}

const SUBMIT_URL: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/audio/asr/transcription";
const TASK_URL: &str = "https://dashscope.aliyuncs.com/api/v1/tasks";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    output: SubmitOutput,
}

#[derive(Debug, Deserialize)]
struct SubmitOutput {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    output: TaskOutput,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    task_status: String,
    #[serde(default)]
    results: Vec<TaskResultEntry>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskResultEntry {
    #[serde(default)]
    subtask_status: String,
    #[serde(default)]
    transcription_url: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionDocument {
    #[serde(default)]
    transcripts: Vec<TranscriptionEntry>,
    #[serde(default)]
    properties: Option<TranscriptionProperties>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionProperties {
    #[serde(default)]
    original_duration_in_milliseconds: u64,
}

#[derive(Debug, Deserialize)]
struct TranscriptionEntry {
    #[serde(default)]
    text: String,
    #[serde(default)]
    sentences: Vec<SentenceEntry>,
}

#[derive(Debug, Deserialize)]
struct SentenceEntry {
    #[serde(default)]
    begin_time: u64,
    #[serde(default)]
    end_time: u64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    words: Vec<WordEntry>,
}

#[derive(Debug, Deserialize)]
struct WordEntry {
    #[serde(default)]
    begin_time: u64,
    #[serde(default)]
    end_time: u64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    punctuation: String,
}

impl ParaformerEngine {
    pub fn new(config: &ParaformerConfig, hotwords: Vec<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_poll_time: Duration::from_secs(config.max_poll_secs),
            hotwords: RwLock::new(hotwords),
            client,
        })
    }

    async fn submit_task(&self, audio_url: &str) -> Result<String, EngineError> {
        let request_body = serde_json::json!({
            "model": self.model,
            "input": { "file_urls": [audio_url] },
            "parameters": { "language_hints": ["zh", "en"] }
        });

        let response = self
            .client
            .post(SUBMIT_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("X-DashScope-Async", "enable")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| EngineError::from_transport(e, REQUEST_TIMEOUT))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::from_status(status, body, None));
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| EngineError::MalformedResponse(e.to_string()))?;

        Ok(body.output.task_id)
    }

    async fn poll_until_done(&self, task_id: &str) -> Result<String, EngineError> {
        loop {
            let response = self
                .client
                .get(format!("{}/{}", TASK_URL, task_id))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .send()
                .await
                .map_err(|e| EngineError::from_transport(e, REQUEST_TIMEOUT))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(EngineError::from_status(status, body, None));
            }

            let body: TaskResponse = response
                .json()
                .await
                .map_err(|e| EngineError::MalformedResponse(e.to_string()))?;

            match body.output.task_status.as_str() {
                "SUCCEEDED" => {
                    let entry = body.output.results.into_iter().next().ok_or_else(|| {
                        EngineError::MalformedResponse("task succeeded with no results".into())
                    })?;
                    if entry.subtask_status != "SUCCEEDED" {
                        return Err(EngineError::VendorRejected {
                            code: entry.subtask_status,
                            message: entry.message.unwrap_or_default(),
                        });
                    }
                    return entry.transcription_url.ok_or_else(|| {
                        EngineError::MalformedResponse("result entry missing transcription_url".into())
                    });
                }
                "PENDING" | "RUNNING" => {
                    debug!("[Paraformer] task {} still in flight", task_id);
                    tokio::time::sleep(self.poll_interval).await;
                }
                other => {
                    return Err(EngineError::VendorRejected {
                        code: other.to_string(),
                        message: body.output.message.unwrap_or_default(),
                    })
                }
            }
        }
    }

    async fn fetch_transcription(&self, url: &str) -> Result<TranscriptionDocument, EngineError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::from_transport(e, REQUEST_TIMEOUT))?;

        response
            .json()
            .await
            .map_err(|e| EngineError::MalformedResponse(e.to_string()))
    }

    fn normalize(document: TranscriptionDocument) -> EngineResult {
        let entry = document.transcripts.into_iter().next().ok_or_else(|| {
            EngineError::MalformedResponse("transcription document has no transcripts".into())
        })?;

        let duration_ms = document
            .properties
            .map(|p| p.original_duration_in_milliseconds)
            .unwrap_or(0);

        let mut words = Vec::new();
        let mut utterances = Vec::new();

        for sentence in entry.sentences {
            let mut sentence_words = Vec::new();
            for w in sentence.words {
                // Trailing punctuation belongs to the word it closes.
                let text = format!("{}{}", w.text, w.punctuation);
                if text.is_empty() {
                    continue;
                }
                let word = TranscriptWord::new(text, w.begin_time, w.end_time);
                sentence_words.push(word.clone());
                words.push(word);
            }

            utterances.push(TranscriptUtterance {
                text: sentence.text.trim().to_string(),
                start_ms: sentence.begin_time,
                end_ms: sentence.end_time,
                words: sentence_words,
                speaker: "unknown".to_string(),
            });
        }

        Ok(TranscriptResult {
            text: entry.text,
            duration_ms,
            words,
            utterances,
            engine: EngineKind::Paraformer,
            log_id: format!("paraformer_{}", Utc::now().timestamp()),
            produced_at: Utc::now(),
        })
    }
}

#[async_trait]
impl AsrEngine for ParaformerEngine {
    async fn transcribe(&self, _audio: Bytes) -> EngineResult {
        Err(EngineError::UnsupportedOperation(
            "paraformer only accepts audio by URL; use transcribe_url".to_string(),
        ))
    }

    async fn transcribe_url(&self, audio_url: &str) -> EngineResult {
        let task_id = self.submit_task(audio_url).await?;
        info!("[Paraformer] task submitted, task_id={}", task_id);

        let transcription_url =
            match tokio::time::timeout(self.max_poll_time, self.poll_until_done(&task_id)).await {
                Ok(url) => url?,
                Err(_) => return Err(EngineError::Timeout(self.max_poll_time)),
            };

        let document = self.fetch_transcription(&transcription_url).await?;
        Self::normalize(document)
    }

    fn name(&self) -> &str {
        "DashScope Paraformer"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Paraformer
    }

    fn set_hotwords(&self, hotwords: Vec<String>) {
        *self.hotwords.write().unwrap_or_else(|e| e.into_inner()) = hotwords;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_byte_payload_is_unsupported() {
        let config = ParaformerConfig {
            api_key: "key".into(),
            model: "fun-asr".into(),
            poll_interval_secs: 1,
            max_poll_secs: 10,
        };
        let engine = ParaformerEngine::new(&config, vec![]).unwrap();
        let err = engine.transcribe(Bytes::from_static(b"audio")).await.unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_normalize_merges_punctuation_into_words() {
        let document: TranscriptionDocument = serde_json::from_value(serde_json::json!({
            "properties": { "original_duration_in_milliseconds": 9000 },
            "transcripts": [{
                "text": "你好，世界。",
                "sentences": [{
                    "begin_time": 0,
                    "end_time": 9000,
                    "text": "你好，世界。",
                    "words": [
                        { "begin_time": 0, "end_time": 4000, "text": "你好", "punctuation": "，" },
                        { "begin_time": 4000, "end_time": 9000, "text": "世界", "punctuation": "。" }
                    ]
                }]
            }]
        }))
        .unwrap();

        let result = ParaformerEngine::normalize(document).unwrap();
        assert_eq!(result.duration_ms, 9000);
        assert_eq!(result.words.len(), 2);
        assert_eq!(result.words[0].text, "你好，");
        assert_eq!(result.utterances.len(), 1);
        assert_eq!(result.engine, EngineKind::Paraformer);
        assert!(result.log_id.starts_with("paraformer_"));
        assert!(result.check_invariants());
    }

    #[test]
    fn test_normalize_rejects_empty_document() {
        let document: TranscriptionDocument =
            serde_json::from_value(serde_json::json!({ "transcripts": [] })).unwrap();
        let err = ParaformerEngine::normalize(document).unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse(_)));
    }
}
