use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of the recognition backend that produced a result.
///
/// Both Volcengine engines (flash and standard) report `Volc`, the same way
/// the vendor groups them under one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Volc,
    Qwen,
    Paraformer,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Volc => "volc",
            EngineKind::Qwen => "qwen",
            EngineKind::Paraformer => "paraformer",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Word-level transcription result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptWord {
    /// Recognized text for this word
    pub text: String,
    /// Start offset in milliseconds
    #[serde(rename = "start")]
    pub start_ms: u64,
    /// End offset in milliseconds
    #[serde(rename = "end")]
    pub end_ms: u64,
    /// Recognition confidence, 0.0–1.0
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// Speaker label assigned by the backend
    #[serde(default = "default_speaker")]
    pub speaker: String,
}

fn default_confidence() -> f32 {
    1.0
}

fn default_speaker() -> String {
    "unknown".to_string()
}

impl TranscriptWord {
    pub fn new(text: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            text: text.into(),
            start_ms,
            end_ms,
            confidence: default_confidence(),
            speaker: default_speaker(),
        }
    }
}

/// Sentence-level transcription segment, as delimited by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptUtterance {
    /// Segment text
    pub text: String,
    /// Start offset in milliseconds
    #[serde(rename = "start")]
    pub start_ms: u64,
    /// End offset in milliseconds
    #[serde(rename = "end")]
    pub end_ms: u64,
    /// Word-level detail covering exactly this segment
    pub words: Vec<TranscriptWord>,
    /// Speaker label assigned by the backend
    #[serde(default = "default_speaker")]
    pub speaker: String,
}

/// Complete normalized transcription result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// Full recognized text
    pub text: String,
    /// Audio duration in milliseconds (0 when the backend does not report it)
    pub duration_ms: u64,
    /// Word-level timestamps across the whole audio
    pub words: Vec<TranscriptWord>,
    /// Sentence-level segments; may be empty or a single whole-span segment
    /// for backends without segmentation
    pub utterances: Vec<TranscriptUtterance>,
    /// Which backend produced this result
    pub engine: EngineKind,
    /// Vendor request/log id for operational diagnosis; may be empty
    pub log_id: String,
    /// When this result was produced
    pub produced_at: DateTime<Utc>,
}

impl TranscriptResult {
    /// Checks the word-count invariant: when utterances are populated, their
    /// word lists together account for every entry of the global word list.
    pub fn check_invariants(&self) -> bool {
        if self.utterances.is_empty() {
            return true;
        }
        let per_utterance: usize = self.utterances.iter().map(|u| u.words.len()).sum();
        per_utterance == self.words.len()
    }
}
