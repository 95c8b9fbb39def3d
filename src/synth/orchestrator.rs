//! Fan-out/fan-in dispatch of segment synthesis tasks.
//!
//! One task per segment runs against the backend under a semaphore-bounded
//! worker pool. Completion order is unspecified; results are buffered by
//! segment index and the batch is terminal only when every index has either
//! audio or an exhausted failure. A fatal failure cancels the tasks that are
//! still pending, since their work can no longer contribute to a usable
//! result.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::SegmentAudio;
use crate::chunk::TextSegment;
use crate::config::SynthesisConfig;
use crate::error::{SegmentFailure, SynthesisError, SynthesisResult};
use crate::synth::client::{BackendError, SynthesisBackend};
use crate::synth::retry::RetryPolicy;

/// Terminal state of one segment's task.
#[derive(Debug)]
enum TaskOutcome {
    Success(Vec<u8>),
    Failed {
        fatal: bool,
        attempts: u32,
        message: String,
    },
    Cancelled,
}

/// Dispatches one synthesis task per segment and collects results in
/// segment-index order.
pub struct SynthesisOrchestrator<B> {
    backend: Arc<B>,
    retry: RetryPolicy,
    min_workers: usize,
    max_workers: usize,
    request_timeout: Duration,
}

impl<B: SynthesisBackend + 'static> SynthesisOrchestrator<B> {
    /// Builds an orchestrator from a validated configuration.
    pub fn new(backend: Arc<B>, config: &SynthesisConfig) -> Self {
        Self {
            backend,
            retry: RetryPolicy::from_config(config),
            min_workers: config.min_workers,
            max_workers: config.max_workers,
            request_timeout: config.request_timeout(),
        }
    }

    /// Replaces the retry policy (tests shrink the backoff to milliseconds).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Pool size for a batch: enough workers to keep I/O-bound calls moving,
    /// bounded to avoid hammering the peer.
    fn worker_count(&self, segment_count: usize) -> usize {
        segment_count.clamp(self.min_workers, self.max_workers)
    }

    /// Runs every segment to a terminal result.
    ///
    /// Returns payloads ordered by segment index. Any segment that exhausts
    /// its retries fails the whole batch with the failing indices named; no
    /// partial audio is ever returned.
    pub async fn run(&self, segments: Vec<TextSegment>) -> SynthesisResult<Vec<SegmentAudio>> {
        let total = segments.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let workers = self.worker_count(total);
        info!(segments = total, workers, "dispatching synthesis batch");

        let semaphore = Arc::new(Semaphore::new(workers));
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<(usize, TaskOutcome)>(total);

        for segment in segments {
            let backend = Arc::clone(&self.backend);
            let semaphore = Arc::clone(&semaphore);
            let retry = self.retry.clone();
            let timeout = self.request_timeout;
            let cancel = cancel.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let index = segment.index;
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => TaskOutcome::Cancelled,
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(_permit) => {
                            execute_segment(&*backend, &segment, &retry, timeout, &cancel).await
                        }
                        Err(_) => TaskOutcome::Failed {
                            fatal: false,
                            attempts: 0,
                            message: "worker pool shut down".to_string(),
                        },
                    },
                };
                let _ = tx.send((index, outcome)).await;
            });
        }
        drop(tx);

        let mut slots: Vec<Option<TaskOutcome>> = (0..total).map(|_| None).collect();
        while let Some((index, outcome)) = rx.recv().await {
            if matches!(outcome, TaskOutcome::Failed { fatal: true, .. }) {
                // Pending work can no longer produce a usable batch.
                cancel.cancel();
            }
            debug!(index, outcome = ?outcome_kind(&outcome), "segment task finished");
            slots[index] = Some(outcome);
        }

        let mut audio = Vec::with_capacity(total);
        let mut failures: Vec<SegmentFailure> = Vec::new();
        let mut fatal: Option<(usize, String)> = None;

        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(TaskOutcome::Success(bytes)) => audio.push(SegmentAudio { index, bytes }),
                Some(TaskOutcome::Failed {
                    fatal: true,
                    message,
                    ..
                }) => {
                    if fatal.is_none() {
                        fatal = Some((index, message));
                    }
                }
                Some(TaskOutcome::Failed {
                    fatal: false,
                    attempts,
                    message,
                }) => failures.push(SegmentFailure {
                    index,
                    attempts,
                    message,
                }),
                Some(TaskOutcome::Cancelled) => {}
                None => failures.push(SegmentFailure {
                    index,
                    attempts: 0,
                    message: "segment task terminated without a result".to_string(),
                }),
            }
        }

        if let Some((index, message)) = fatal {
            error!(index, %message, "batch aborted by fatal segment failure");
            return Err(SynthesisError::FatalFailure { index, message });
        }
        if !failures.is_empty() {
            error!(failed = failures.len(), "batch incomplete after retries");
            return Err(SynthesisError::IncompleteBatch { failures });
        }

        debug!(segments = audio.len(), "synthesis batch complete");
        Ok(audio)
    }
}

fn outcome_kind(outcome: &TaskOutcome) -> &'static str {
    match outcome {
        TaskOutcome::Success(_) => "success",
        TaskOutcome::Failed { fatal: true, .. } => "fatal",
        TaskOutcome::Failed { fatal: false, .. } => "failed",
        TaskOutcome::Cancelled => "cancelled",
    }
}

/// Runs one segment through timeout, retry, and credential refresh until a
/// terminal outcome.
async fn execute_segment<B: SynthesisBackend>(
    backend: &B,
    segment: &TextSegment,
    retry: &RetryPolicy,
    timeout: Duration,
    cancel: &CancellationToken,
) -> TaskOutcome {
    let mut attempt = 0u32;
    loop {
        attempt += 1;

        let call = tokio::time::timeout(timeout, backend.synthesize(segment));
        let result = tokio::select! {
            _ = cancel.cancelled() => return TaskOutcome::Cancelled,
            result = call => result,
        };

        let backend_error = match result {
            Ok(Ok(bytes)) => return TaskOutcome::Success(bytes),
            Ok(Err(e)) => e,
            Err(_) => BackendError::Transient(format!(
                "request timed out after {}s",
                timeout.as_secs()
            )),
        };

        if !retry.should_retry(&backend_error, attempt) {
            let fatal = !backend_error.is_retryable();
            return TaskOutcome::Failed {
                fatal,
                attempts: attempt,
                message: backend_error.to_string(),
            };
        }

        // A stale token fails every subsequent attempt too unless someone
        // refreshes it; a failed refresh is logged and the retry proceeds,
        // since the expiry diagnosis may have been wrong.
        if matches!(backend_error, BackendError::AuthExpired(_)) {
            if let Err(refresh_error) = backend.refresh_credentials().await {
                warn!(
                    index = segment.index,
                    error = %refresh_error,
                    "credential refresh failed before retry"
                );
            }
        }

        let delay = retry.backoff_delay(attempt);
        warn!(
            index = segment.index,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %backend_error,
            "retrying segment synthesis"
        );
        tokio::select! {
            _ = cancel.cancelled() => return TaskOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
