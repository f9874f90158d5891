use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::transcript::EngineKind;

use super::AsrEngine;

/// Bounded fixed-delay retry wrapper around any engine.
///
/// An engine with `max_retries = N` is attempted at most `N + 1` times.
/// Only transient failures (timeouts, transport drops, malformed bodies)
/// trigger another attempt; auth, payload, and vendor rejections fail
/// immediately. The error surfaced after exhaustion is the one from the
/// final attempt.
pub struct RetryEngine {
    inner: Arc<dyn AsrEngine>,
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryEngine {
    pub fn new(inner: Arc<dyn AsrEngine>, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            retry_delay,
        }
    }

    async fn run_attempts<F, Fut>(&self, mut attempt: F) -> EngineResult
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = EngineResult>,
    {
        let total_attempts = self.max_retries + 1;
        let mut last_error = None;

        for attempt_no in 1..=total_attempts {
            match attempt().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !err.is_retryable() || attempt_no == total_attempts {
                        return Err(err);
                    }
                    warn!(
                        "{} attempt {}/{} failed: {}, retrying in {:?}",
                        self.inner.name(),
                        attempt_no,
                        total_attempts,
                        err,
                        self.retry_delay
                    );
                    last_error = Some(err);
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }

        // Unreachable: the loop always returns on the final attempt.
        Err(last_error
            .unwrap_or_else(|| EngineError::TransientTransport("no attempts were made".into())))
    }
}

#[async_trait]
impl AsrEngine for RetryEngine {
    async fn transcribe(&self, audio: Bytes) -> EngineResult {
        self.run_attempts(|| {
            let audio = audio.clone();
            async move { self.inner.transcribe(audio).await }
        })
        .await
    }

    async fn transcribe_url(&self, audio_url: &str) -> EngineResult {
        self.run_attempts(|| self.inner.transcribe_url(audio_url)).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> EngineKind {
        self.inner.kind()
    }

    fn set_hotwords(&self, hotwords: Vec<String>) {
        self.inner.set_hotwords(hotwords);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::TranscriptResult;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedEngine {
        calls: AtomicU32,
        script: Vec<Result<(), EngineError>>,
    }

    impl ScriptedEngine {
        fn new(script: Vec<Result<(), EngineError>>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                script,
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn ok_result() -> TranscriptResult {
            TranscriptResult {
                text: "ok".into(),
                duration_ms: 1000,
                words: vec![],
                utterances: vec![],
                engine: EngineKind::Volc,
                log_id: "test".into(),
                produced_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl AsrEngine for ScriptedEngine {
        async fn transcribe(&self, _audio: Bytes) -> EngineResult {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.script.get(idx) {
                Some(Ok(())) => Ok(Self::ok_result()),
                Some(Err(e)) => Err(clone_error(e)),
                None => panic!("more calls than scripted outcomes"),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn kind(&self) -> EngineKind {
            EngineKind::Volc
        }

        fn set_hotwords(&self, _hotwords: Vec<String>) {}
    }

    fn clone_error(e: &EngineError) -> EngineError {
        match e {
            EngineError::Timeout(d) => EngineError::Timeout(*d),
            EngineError::TransientTransport(m) => EngineError::TransientTransport(m.clone()),
            EngineError::Unauthorized(m) => EngineError::Unauthorized(m.clone()),
            EngineError::PayloadTooLarge { size, limit } => EngineError::PayloadTooLarge {
                size: *size,
                limit: *limit,
            },
            EngineError::MalformedResponse(m) => EngineError::MalformedResponse(m.clone()),
            EngineError::UnsupportedOperation(m) => EngineError::UnsupportedOperation(m.clone()),
            EngineError::VendorRejected { code, message } => EngineError::VendorRejected {
                code: code.clone(),
                message: message.clone(),
            },
        }
    }

    fn transient(msg: &str) -> Result<(), EngineError> {
        Err(EngineError::TransientTransport(msg.into()))
    }

    #[tokio::test]
    async fn test_succeeds_without_retrying() {
        let inner = Arc::new(ScriptedEngine::new(vec![Ok(())]));
        let engine = RetryEngine::new(inner.clone(), 3, Duration::from_millis(1));
        assert!(engine.transcribe(Bytes::from_static(b"a")).await.is_ok());
        assert_eq!(inner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let inner = Arc::new(ScriptedEngine::new(vec![
            transient("first"),
            transient("second"),
            Ok(()),
        ]));
        let engine = RetryEngine::new(inner.clone(), 2, Duration::from_millis(1));
        assert!(engine.transcribe(Bytes::from_static(b"a")).await.is_ok());
        assert_eq!(inner.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_makes_exactly_max_plus_one_calls() {
        let inner = Arc::new(ScriptedEngine::new(vec![
            transient("1"),
            transient("2"),
            transient("3"),
        ]));
        let engine = RetryEngine::new(inner.clone(), 2, Duration::from_millis(1));
        assert!(engine.transcribe(Bytes::from_static(b"a")).await.is_err());
        assert_eq!(inner.call_count(), 3);
    }

    #[tokio::test]
    async fn test_surfaces_last_error_on_exhaustion() {
        let inner = Arc::new(ScriptedEngine::new(vec![
            transient("first failure"),
            transient("final failure"),
        ]));
        let engine = RetryEngine::new(inner, 1, Duration::from_millis(1));
        let err = engine.transcribe(Bytes::from_static(b"a")).await.unwrap_err();
        match err {
            EngineError::TransientTransport(msg) => assert_eq!(msg, "final failure"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let inner = Arc::new(ScriptedEngine::new(vec![Err(EngineError::Unauthorized(
            "bad token".into(),
        ))]));
        let engine = RetryEngine::new(inner.clone(), 5, Duration::from_millis(1));
        let err = engine.transcribe(Bytes::from_static(b"a")).await.unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));
        assert_eq!(inner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_url_path_retries_too() {
        struct UrlEngine {
            calls: AtomicU32,
        }

        #[async_trait]
        impl AsrEngine for UrlEngine {
            async fn transcribe(&self, _audio: Bytes) -> EngineResult {
                Err(EngineError::UnsupportedOperation("bytes".into()))
            }

            async fn transcribe_url(&self, _audio_url: &str) -> EngineResult {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(EngineError::Timeout(Duration::from_secs(1)))
                } else {
                    Ok(ScriptedEngine::ok_result())
                }
            }

            fn name(&self) -> &str {
                "url-engine"
            }

            fn kind(&self) -> EngineKind {
                EngineKind::Volc
            }

            fn set_hotwords(&self, _hotwords: Vec<String>) {}
        }

        let inner = Arc::new(UrlEngine {
            calls: AtomicU32::new(0),
        });
        let engine = RetryEngine::new(inner.clone(), 1, Duration::from_millis(1));
        assert!(engine.transcribe_url("https://example.com/a.wav").await.is_ok());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
