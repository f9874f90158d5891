/// pod-asr - Multi-Engine Speech Transcription Orchestrator
///
/// Submits audio to interchangeable speech-recognition engines and returns a
/// single normalized transcript, tolerating per-engine failure, slowness, and
/// quota exhaustion through fallback, race, and mixed dispatch strategies.

pub mod config;
pub mod engines;
pub mod error;
pub mod factory;
pub mod orchestrator;
pub mod transcript;

// Re-export main types for easy access
pub use crate::config::{AsrConfig, AsrConfigBuilder};
pub use crate::engines::{
    AsrEngine, ParaformerEngine, QwenFlashEngine, RetryEngine, VolcFlashEngine, VolcStandardEngine,
};
pub use crate::error::{EngineError, EngineResult, OrchestratorError};
pub use crate::factory::{build_engine, build_orchestrator};
pub use crate::orchestrator::Orchestrator;
pub use crate::transcript::{
    EngineKind, TranscriptResult, TranscriptUtterance, TranscriptWord,
};
