use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::VolcConfig;
use crate::error::{EngineError, EngineResult};
use crate::transcript::EngineKind;

use super::volc_flash::{
    check_status_header, header_value, parse_volc_response, VolcCorpus, VolcRequestOptions,
    VolcResponse, VolcUser, STATUS_OK, STATUS_PROCESSING, STATUS_QUEUED,
};
use super::AsrEngine;

/// Volcengine big-model recognition, standard (submit + query) edition.
///
/// Built for long audio: the file must be reachable at a public URL, so the
/// byte-payload call shape is rejected. The submitted task is polled at a
/// fixed interval until a terminal status or the wall-clock poll budget runs
/// out; dropping the returned future abandons the poll loop.
pub struct VolcStandardEngine {
    app_id: String,
    access_token: String,
    poll_interval: Duration,
    max_poll_time: Duration,
    hotwords: RwLock<Vec<String>>,
    client: reqwest::Client,
}

const SUBMIT_URL: &str = "https://openspeech.bytedance.com/api/v3/auc/bigmodel/submit";
const QUERY_URL: &str = "https://openspeech.bytedance.com/api/v3/auc/bigmodel/query";
const RESOURCE_ID: &str = "volc.bigasr.auc";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct SubmitRequest {
    user: VolcUser,
    audio: SubmitAudio,
    request: VolcRequestOptions,
}

#[derive(Debug, Serialize)]
struct SubmitAudio {
    url: String,
    format: String,
}

impl VolcStandardEngine {
    pub fn new(config: &VolcConfig, hotwords: Vec<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            app_id: config.app_id.clone(),
            access_token: config.access_token.clone(),
            poll_interval: Duration::from_secs(config.standard_poll_interval_secs),
            max_poll_time: Duration::from_secs(config.standard_max_poll_secs),
            hotwords: RwLock::new(hotwords),
            client,
        })
    }

    fn auth_headers(&self, request_id: &str) -> [(&'static str, String); 5] {
        [
            ("X-Api-App-Key", self.app_id.clone()),
            ("X-Api-Access-Key", self.access_token.clone()),
            ("X-Api-Resource-Id", RESOURCE_ID.to_string()),
            ("X-Api-Request-Id", request_id.to_string()),
            ("X-Api-Sequence", "-1".to_string()),
        ]
    }

    /// Submits the transcription task; the request id doubles as the task id.
    async fn submit_task(&self, audio_url: &str) -> Result<String, EngineError> {
        let request_id = uuid::Uuid::new_v4().to_string();

        let hotwords = self
            .hotwords
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let request_body = SubmitRequest {
            user: VolcUser {
                uid: self.app_id.clone(),
            },
            audio: SubmitAudio {
                url: audio_url.to_string(),
                format: "mp3".to_string(),
            },
            request: VolcRequestOptions {
                model_name: "bigmodel".to_string(),
                model_version: None,
                enable_punc: None,
                show_utterances: None,
                enable_ddc: None,
                enable_itn: None,
                enable_speaker_info: None,
                corpus: VolcCorpus::from_hotwords(&hotwords),
            },
        };

        let mut request = self.client.post(SUBMIT_URL).json(&request_body);
        for (name, value) in self.auth_headers(&request_id) {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::from_transport(e, REQUEST_TIMEOUT))?;

        check_status_header(&response, &[STATUS_OK])?;

        Ok(request_id)
    }

    /// One poll round trip; returns the vendor status code and body.
    async fn query_task(&self, task_id: &str) -> Result<(String, reqwest::Response), EngineError> {
        let mut request = self.client.post(QUERY_URL).json(&serde_json::json!({}));
        for (name, value) in self.auth_headers(task_id) {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::from_transport(e, REQUEST_TIMEOUT))?;

        let code = check_status_header(&response, &[STATUS_OK, STATUS_PROCESSING, STATUS_QUEUED])?;
        Ok((code, response))
    }

    async fn poll_until_done(&self, task_id: &str) -> EngineResult {
        loop {
            let (code, response) = self.query_task(task_id).await?;
            match code.as_str() {
                STATUS_OK => {
                    let log_id = {
                        let header = header_value(&response, "X-Tt-Logid");
                        if header.is_empty() {
                            task_id.to_string()
                        } else {
                            header
                        }
                    };
                    let body: VolcResponse = response
                        .json()
                        .await
                        .map_err(|e| EngineError::MalformedResponse(e.to_string()))?;
                    return parse_volc_response(body, log_id);
                }
                STATUS_PROCESSING | STATUS_QUEUED => {
                    debug!("[VolcStandard] task {} still in flight", task_id);
                    tokio::time::sleep(self.poll_interval).await;
                }
                other => {
                    return Err(EngineError::VendorRejected {
                        code: other.to_string(),
                        message: "unexpected poll status".to_string(),
                    })
                }
            }
        }
    }
}

#[async_trait]
impl AsrEngine for VolcStandardEngine {
    async fn transcribe(&self, _audio: Bytes) -> EngineResult {
        Err(EngineError::UnsupportedOperation(
            "standard edition requires an audio URL; upload the file first or use transcribe_url"
                .to_string(),
        ))
    }

    async fn transcribe_url(&self, audio_url: &str) -> EngineResult {
        let task_id = self.submit_task(audio_url).await?;
        info!("[VolcStandard] task submitted, task_id={}", task_id);

        match tokio::time::timeout(self.max_poll_time, self.poll_until_done(&task_id)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(self.max_poll_time)),
        }
    }

    fn name(&self) -> &str {
        "Volcengine ASR Standard"
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

    fn test_config() -> VolcConfig {
        VolcConfig {
            app_id: "app".into(),
            access_token: "token".into(),
            flash_timeout_secs: 5,
            flash_max_retries: 0,
            flash_retry_delay_ms: 0,
            flash_max_payload_bytes: 1024,
            standard_poll_interval_secs: 1,
            standard_max_poll_secs: 10,
        }
    }

    #[tokio::test]
    async fn test_byte_payload_is_unsupported() {
        let engine = VolcStandardEngine::new(&test_config(), vec![]).unwrap();
        let err = engine.transcribe(Bytes::from_static(b"audio")).await.unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedOperation(_)));
    }

    #[tokio::test]
    async fn test_hotword_hot_reload() {
        let engine = VolcStandardEngine::new(&test_config(), vec!["old".into()]).unwrap();
        engine.set_hotwords(vec!["new".into()]);
        let current = engine.hotwords.read().unwrap().clone();
        assert_eq!(current, vec!["new".to_string()]);
    }
}
