use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{info, warn};

use crate::engines::AsrEngine;
use crate::error::{EngineError, EngineResult, OrchestratorError};
use crate::transcript::TranscriptResult;

/// Foreground primary attempts made by the mixed strategy.
const MIXED_PRIMARY_ATTEMPTS: u32 = 3;

/// Coordinates one primary and one backup engine over the same audio.
///
/// Three strategies are offered: strict sequential fallback, a concurrent
/// race, and a mixed mode that starts the backup in the background while the
/// primary is retried in the foreground. Each call is self-contained; the
/// orchestrator holds no per-call state and is safe to share across tasks.
pub struct Orchestrator {
    primary: Arc<dyn AsrEngine>,
    backup: Arc<dyn AsrEngine>,
    retry_delay: Duration,
}

impl Orchestrator {
    pub fn new(
        primary: Arc<dyn AsrEngine>,
        backup: Arc<dyn AsrEngine>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            primary,
            backup,
            retry_delay,
        }
    }

    /// Primary first; on any failure the backup is tried. Strictly
    /// sequential: the backup is never invoked while the primary runs.
    pub async fn transcribe_with_fallback(
        &self,
        audio: Bytes,
    ) -> Result<TranscriptResult, OrchestratorError> {
        info!("[Fallback] trying primary engine: {}", self.primary.name());
        let primary_err = match self.primary.transcribe(audio.clone()).await {
            Ok(result) => {
                info!("[Fallback] primary engine succeeded");
                return Ok(result);
            }
            Err(err) => {
                warn!("[Fallback] primary engine failed: {}", err);
                err
            }
        };

        info!("[Fallback] trying backup engine: {}", self.backup.name());
        match self.backup.transcribe(audio).await {
            Ok(result) => {
                info!("[Fallback] backup engine succeeded");
                Ok(result)
            }
            Err(backup_err) => {
                warn!("[Fallback] backup engine failed: {}", backup_err);
                Err(OrchestratorError::AllEnginesExhausted {
                    primary: primary_err,
                    backup: backup_err,
                })
            }
        }
    }

    /// Runs both engines concurrently over the same payload. The first
    /// terminal success wins and the other task is aborted; a first terminal
    /// failure means waiting on the remaining task. Neither engine has
    /// priority when both finish in the same scheduling tick.
    pub async fn transcribe_with_race(
        &self,
        audio: Bytes,
    ) -> Result<TranscriptResult, OrchestratorError> {
        info!(
            "[Race] starting {} and {} concurrently",
            self.primary.name(),
            self.backup.name()
        );

        let mut primary_task = tokio::spawn({
            let engine = self.primary.clone();
            let audio = audio.clone();
            async move { engine.transcribe(audio).await }
        });
        let mut backup_task = tokio::spawn({
            let engine = self.backup.clone();
            async move { engine.transcribe(audio).await }
        });

        tokio::select! {
            joined = &mut primary_task => {
                match flatten_join(joined) {
                    Ok(result) => {
                        info!("[Race] primary engine won");
                        backup_task.abort();
                        Ok(result)
                    }
                    Err(primary_err) => {
                        warn!("[Race] primary engine failed: {}, awaiting backup", primary_err);
                        match flatten_join(backup_task.await) {
                            Ok(result) => Ok(result),
                            Err(backup_err) => Err(OrchestratorError::AllEnginesExhausted {
                                primary: primary_err,
                                backup: backup_err,
                            }),
                        }
                    }
                }
            }
            joined = &mut backup_task => {
                match flatten_join(joined) {
                    Ok(result) => {
                        info!("[Race] backup engine won");
                        primary_task.abort();
                        Ok(result)
                    }
                    Err(backup_err) => {
                        warn!("[Race] backup engine failed: {}, awaiting primary", backup_err);
                        match flatten_join(primary_task.await) {
                            Ok(result) => Ok(result),
                            Err(primary_err) => Err(OrchestratorError::AllEnginesExhausted {
                                primary: primary_err,
                                backup: backup_err,
                            }),
                        }
                    }
                }
            }
        }
    }

    /// Starts the backup detached, then retries the primary in the
    /// foreground up to three attempts. Before each retry the backup's
    /// completion flag is checked: a finished successful backup
    /// short-circuits, a finished failed backup lets the retry proceed
    /// immediately, and a still-running backup buys the primary
    /// `retry_delay` of breathing room. A primary success returns at once;
    /// the background backup is left running and its result discarded.
    pub async fn transcribe_with_mixed(
        &self,
        audio: Bytes,
    ) -> Result<TranscriptResult, OrchestratorError> {
        let slot: Arc<Mutex<Option<EngineResult>>> = Arc::new(Mutex::new(None));
        let (done_tx, mut done_rx) = watch::channel(false);

        info!("[Mixed] starting backup engine in background: {}", self.backup.name());
        tokio::spawn({
            let engine = self.backup.clone();
            let audio = audio.clone();
            let slot = slot.clone();
            async move {
                let outcome = engine.transcribe(audio).await;
                match &outcome {
                    Ok(_) => info!("[Mixed] background backup succeeded"),
                    Err(err) => warn!("[Mixed] background backup failed: {}", err),
                }
                *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(outcome);
                let _ = done_tx.send(true);
            }
        });

        let mut last_primary_err = None;
        let mut backup_err = None;
        for attempt in 1..=MIXED_PRIMARY_ATTEMPTS {
            if attempt > 1 {
                // Pre-retry checkpoint: prefer a backup result that already
                // landed over another primary attempt. A backup failure
                // taken here is kept for the final aggregation.
                if *done_rx.borrow() {
                    match take_slot(&slot) {
                        Some(Ok(result)) => {
                            info!("[Mixed] backup finished first, short-circuiting");
                            return Ok(result);
                        }
                        Some(Err(err)) => {
                            warn!("[Mixed] backup already failed, continuing primary retries");
                            backup_err = Some(err);
                        }
                        // Slot drained at an earlier checkpoint.
                        None => {}
                    }
                } else {
                    tokio::time::sleep(self.retry_delay).await;
                }
            }

            info!(
                "[Mixed] primary attempt {}/{}: {}",
                attempt,
                MIXED_PRIMARY_ATTEMPTS,
                self.primary.name()
            );
            match self.primary.transcribe(audio.clone()).await {
                Ok(result) => {
                    info!("[Mixed] primary engine succeeded on attempt {}", attempt);
                    return Ok(result);
                }
                Err(err) => {
                    warn!("[Mixed] primary attempt {} failed: {}", attempt, err);
                    last_primary_err = Some(err);
                }
            }
        }

        let backup_outcome = match backup_err {
            // Backup failure already observed at a checkpoint.
            Some(err) => Some(Err(err)),
            None => {
                info!("[Mixed] primary exhausted, waiting for background backup");
                match done_rx.wait_for(|done| *done).await {
                    Ok(_) => take_slot(&slot),
                    // Sender dropped without publishing: the background task died.
                    Err(_) => None,
                }
            }
        };

        let primary_err = last_primary_err.unwrap_or_else(|| {
            EngineError::TransientTransport("primary made no attempts".into())
        });

        match backup_outcome {
            Some(Ok(result)) => Ok(result),
            Some(Err(backup_err)) => Err(OrchestratorError::AllEnginesExhausted {
                primary: primary_err,
                backup: backup_err,
            }),
            None => Err(OrchestratorError::AllEnginesExhausted {
                primary: primary_err,
                backup: EngineError::TransientTransport(
                    "background backup task terminated without a result".into(),
                ),
            }),
        }
    }
}

fn flatten_join(joined: Result<EngineResult, JoinError>) -> EngineResult {
    match joined {
        Ok(outcome) => outcome,
        Err(join_err) => Err(EngineError::TransientTransport(format!(
            "engine task did not complete: {}",
            join_err
        ))),
    }
}

fn take_slot(slot: &Arc<Mutex<Option<EngineResult>>>) -> Option<EngineResult> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).take()
}
