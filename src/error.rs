use std::time::Duration;

/// Result type for single-engine operations
pub type EngineResult = std::result::Result<crate::transcript::TranscriptResult, EngineError>;

/// Error raised by a single recognition engine call.
///
/// Every failure an engine can observe is funneled into one of these kinds;
/// no engine call swallows an error.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    TransientTransport(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// `limit` is the locally configured ceiling; vendor-side rejections
    /// arrive without one.
    #[error("audio payload too large: {size} bytes{}", limit_note(.limit))]
    PayloadTooLarge { size: usize, limit: Option<usize> },

    #[error("malformed engine response: {0}")]
    MalformedResponse(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("vendor rejected request: code={code}, message={message}")]
    VendorRejected { code: String, message: String },
}

impl EngineError {
    /// Whether the retry wrapper may locally retry this failure.
    ///
    /// Authorization and payload-validation failures are deterministic and
    /// never retried; vendor rejections carry a terminal status code.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Timeout(_)
                | EngineError::TransientTransport(_)
                | EngineError::MalformedResponse(_)
        )
    }

    /// Maps a reqwest transport error onto the taxonomy.
    pub fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            EngineError::Timeout(timeout)
        } else if err.is_decode() {
            EngineError::MalformedResponse(err.to_string())
        } else {
            EngineError::TransientTransport(err.to_string())
        }
    }

    /// Maps a non-success HTTP status onto the taxonomy.
    ///
    /// `payload_size` is the byte count the call actually sent; URL-mode
    /// calls carry no audio payload and pass `None`, so a 413 from them is
    /// reported as a vendor rejection rather than a payload-size failure.
    pub fn from_status(
        status: reqwest::StatusCode,
        body: String,
        payload_size: Option<usize>,
    ) -> Self {
        match (status.as_u16(), payload_size) {
            (401 | 403, _) => EngineError::Unauthorized(format!("{}: {}", status, body)),
            (413, Some(size)) => EngineError::PayloadTooLarge { size, limit: None },
            _ => EngineError::VendorRejected {
                code: status.as_u16().to_string(),
                message: body,
            },
        }
    }
}

fn limit_note(limit: &Option<usize>) -> String {
    match limit {
        Some(limit) => format!(" (limit {})", limit),
        None => String::new(),
    }
}

/// Error raised by an orchestrator strategy once every engine is exhausted
#[derive(thiserror::Error, Debug)]
pub enum OrchestratorError {
    /// Both engines failed; carries the underlying errors in
    /// primary-then-backup order.
    #[error("all engines exhausted (primary: {primary}, backup: {backup})")]
    AllEnginesExhausted {
        primary: EngineError,
        backup: EngineError,
    },
}
