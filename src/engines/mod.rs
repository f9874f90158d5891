pub mod volc_flash;
pub mod volc_standard;
pub mod qwen;
pub mod paraformer;
pub mod retry;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{EngineError, EngineResult};
use crate::transcript::EngineKind;

pub use paraformer::ParaformerEngine;
pub use qwen::QwenFlashEngine;
pub use retry::RetryEngine;
pub use volc_flash::VolcFlashEngine;
pub use volc_standard::VolcStandardEngine;

/// One interchangeable speech-recognition backend.
///
/// Engines are stateless per call: configuration is fixed at construction,
/// except the hotword list which can be hot-reloaded through
/// [`set_hotwords`](AsrEngine::set_hotwords). Each call performs exactly one
/// network round trip (or one submit plus repeated polls) and surfaces every
/// failure as a typed [`EngineError`].
#[async_trait]
pub trait AsrEngine: Send + Sync {
    /// Transcribe a raw audio payload.
    ///
    /// Engines that only accept audio by URL must fail with
    /// `EngineError::UnsupportedOperation` instead of attempting a
    /// best-effort call.
    async fn transcribe(&self, audio: Bytes) -> EngineResult;

    /// Transcribe audio reachable at a public URL.
    ///
    /// Byte-payload-only engines keep this default, which rejects the call.
    async fn transcribe_url(&self, _audio_url: &str) -> EngineResult {
        Err(EngineError::UnsupportedOperation(format!(
            "{} does not accept audio by URL",
            self.name()
        )))
    }

    /// Human-readable engine name for logs
    fn name(&self) -> &str;

    /// Backend identity recorded in results
    fn kind(&self) -> EngineKind;

    /// Swap the hotword list without reconstructing the engine
    fn set_hotwords(&self, hotwords: Vec<String>);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BytesOnlyEngine;

    #[async_trait]
    impl AsrEngine for BytesOnlyEngine {
        async fn transcribe(&self, _audio: Bytes) -> EngineResult {
            Err(EngineError::TransientTransport("not under test".into()))
        }

        fn name(&self) -> &str {
            "bytes-only"
        }

        fn kind(&self) -> EngineKind {
            EngineKind::Qwen
        }

        fn set_hotwords(&self, _hotwords: Vec<String>) {}
    }

    #[test]
    fn test_default_url_call_is_rejected_with_engine_name() {
        let engine = BytesOnlyEngine;
        let err = tokio_test::block_on(engine.transcribe_url("https://example.com/a.mp3"))
            .unwrap_err();
        match err {
            EngineError::UnsupportedOperation(msg) => assert!(msg.contains("bytes-only")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
