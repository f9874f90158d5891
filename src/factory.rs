use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::AsrConfig;
use crate::engines::{
    AsrEngine, ParaformerEngine, QwenFlashEngine, RetryEngine, VolcFlashEngine, VolcStandardEngine,
};
use crate::orchestrator::Orchestrator;

/// Builds a single engine by its config name.
///
/// Byte-payload engines come back wrapped in the retry decorator with their
/// configured retry budget; submit-and-poll engines already carry a poll
/// ceiling and are returned bare.
pub fn build_engine(name: &str, config: &AsrConfig) -> Result<Arc<dyn AsrEngine>> {
    let hotwords = config.hotwords.clone();

    let engine: Arc<dyn AsrEngine> = match name {
        "volc-flash" => {
            let inner = Arc::new(
                VolcFlashEngine::new(&config.volc, hotwords)
                    .context("failed to build volc-flash engine")?,
            );
            Arc::new(RetryEngine::new(
                inner,
                config.volc.flash_max_retries,
                Duration::from_millis(config.volc.flash_retry_delay_ms),
            ))
        }
        "volc-standard" => Arc::new(
            VolcStandardEngine::new(&config.volc, hotwords)
                .context("failed to build volc-standard engine")?,
        ),
        "qwen" => {
            let inner = Arc::new(
                QwenFlashEngine::new(&config.qwen, hotwords)
                    .context("failed to build qwen engine")?,
            );
            Arc::new(RetryEngine::new(
                inner,
                config.qwen.max_retries,
                Duration::from_millis(config.qwen.retry_delay_ms),
            ))
        }
        "paraformer" => Arc::new(
            ParaformerEngine::new(&config.paraformer, hotwords)
                .context("failed to build paraformer engine")?,
        ),
        other => bail!("unknown engine name: {}", other),
    };

    Ok(engine)
}

/// Builds the orchestrator from config: primary and backup engines by name
/// plus the mixed-strategy foreground retry delay.
pub fn build_orchestrator(config: &AsrConfig) -> Result<Orchestrator> {
    config.validate().context("invalid configuration")?;

    let primary = build_engine(&config.orchestrator.primary, config)?;
    let backup = build_engine(&config.orchestrator.backup, config)?;

    info!(
        "🎙️ orchestrator ready: primary={}, backup={}",
        primary.name(),
        backup.name()
    );

    Ok(Orchestrator::new(
        primary,
        backup,
        Duration::from_millis(config.orchestrator.retry_delay_ms),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AsrConfigBuilder;

    fn full_config() -> AsrConfig {
        AsrConfigBuilder::new()
            .with_volc_credentials("app".into(), "token".into())
            .with_qwen_api_key("qwen-key".into())
            .with_paraformer_api_key("dash-key".into())
            .build()
    }

    #[test]
    fn test_builds_every_known_engine() {
        let config = full_config();
        for name in ["volc-flash", "volc-standard", "qwen", "paraformer"] {
            let engine = build_engine(name, &config).unwrap();
            assert!(!engine.name().is_empty());
        }
    }

    #[test]
    fn test_unknown_engine_name_is_rejected() {
        let config = full_config();
        assert!(build_engine("whisper", &config).is_err());
    }

    #[test]
    fn test_builds_orchestrator_from_defaults() {
        let config = full_config();
        assert!(build_orchestrator(&config).is_ok());
    }
}
