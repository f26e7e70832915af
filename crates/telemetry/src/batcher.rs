//! Batching recorder with a background writer that uploads telemetry.
//! Uses a channel-based architecture for non-blocking record submission.

use crate::record::{TelemetryBatch, TelemetryRecord};
use crate::recorder::Recorder;
use crate::upload::{DropReason, TelemetryFailure, TelemetryFailureCallback, Uploader};
use decision_core::config::{BatchConfig, RetryExhaustedPolicy};
use decision_core::{Decision, DecisionError, DecisionResult};
use serde::Serialize;
use std::marker::PhantomData;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Start the background writer and return the producer side plus the handle
/// that drains it on shutdown. Must be called from within a tokio runtime.
pub fn spawn_batching<C, U>(
    uploader: U,
    config: BatchConfig,
    on_failure: Option<TelemetryFailureCallback>,
) -> DecisionResult<(BatchingRecorder<C>, TelemetryPipeline)>
where
    C: Serialize,
    U: Uploader,
{
    config.validate()?;
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
        DecisionError::Config("the batching recorder requires a tokio runtime".to_string())
    })?;

    let (sender, receiver) = mpsc::channel::<TelemetryRecord>(config.max_buffered_records);
    let (shutdown, shutdown_rx) = watch::channel(false);
    let drain_timeout = config.drain_timeout();

    let writer = BatchWriter {
        uploader,
        config,
        on_failure: on_failure.clone(),
    };
    let handle = runtime.spawn(writer.run(receiver, shutdown_rx));

    info!("Telemetry batching recorder started");

    Ok((
        BatchingRecorder {
            sender,
            on_failure: on_failure.clone(),
            _context: PhantomData,
        },
        TelemetryPipeline {
            shutdown,
            handle: Some(handle),
            drain_timeout,
            on_failure,
        },
    ))
}

/// Producer side: enqueues records without ever waiting.
pub struct BatchingRecorder<C> {
    sender: mpsc::Sender<TelemetryRecord>,
    on_failure: Option<TelemetryFailureCallback>,
    _context: PhantomData<fn(&C)>,
}

impl<C> BatchingRecorder<C> {
    fn enqueue(&self, record: TelemetryRecord) {
        let kind = record.kind();
        if let Err(e) = self.sender.try_send(record) {
            let (reason, record) = match e {
                mpsc::error::TrySendError::Full(r) => (DropReason::BufferFull, r),
                mpsc::error::TrySendError::Closed(r) => (DropReason::Closed, r),
            };
            metrics::counter!("telemetry.dropped").increment(1);
            warn!(unique_key = %record.unique_key(), kind, ?reason, "Telemetry record dropped");
            self.report(TelemetryFailure::Dropped {
                unique_key: record.unique_key().to_string(),
                kind,
                reason,
            });
        } else {
            metrics::counter!("telemetry.queued").increment(1);
        }
    }

    fn report(&self, failure: TelemetryFailure) {
        if let Some(callback) = &self.on_failure {
            callback(&failure);
        }
    }
}

impl<C: Serialize> Recorder<C> for BatchingRecorder<C> {
    fn record(&self, context: &C, decision: &Decision, unique_key: &str) {
        match serde_json::to_value(context) {
            Ok(context) => {
                self.enqueue(TelemetryRecord::decision(unique_key, context, decision.clone()))
            }
            Err(e) => {
                metrics::counter!("telemetry.dropped").increment(1);
                warn!(unique_key, error = %e, "Failed to serialize decision context");
                self.report(TelemetryFailure::Dropped {
                    unique_key: unique_key.to_string(),
                    kind: "decision",
                    reason: DropReason::Serialization,
                });
            }
        }
    }

    fn report_reward(&self, reward: f32, unique_key: &str) {
        self.enqueue(TelemetryRecord::reward(unique_key, reward));
    }

    fn report_outcome(&self, outcome: &serde_json::Value, unique_key: &str) {
        self.enqueue(TelemetryRecord::outcome(unique_key, outcome.clone()));
    }
}

/// Owner of the background writer. Dropping it still asks the writer to
/// drain; [`shutdown`](Self::shutdown) additionally waits for it.
pub struct TelemetryPipeline {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
    drain_timeout: Duration,
    on_failure: Option<TelemetryFailureCallback>,
}

impl TelemetryPipeline {
    /// Flush everything buffered and stop the writer. A drain that overruns
    /// its timeout is reported, and the writer is aborted.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        let Some(mut handle) = self.handle.take() else {
            return;
        };

        match tokio::time::timeout(self.drain_timeout, &mut handle).await {
            Ok(Ok(())) => info!("Telemetry pipeline drained"),
            Ok(Err(e)) => error!(error = %e, "Telemetry writer task panicked"),
            Err(_) => {
                handle.abort();
                warn!(timeout = ?self.drain_timeout, "Telemetry drain timed out");
                if let Some(callback) = &self.on_failure {
                    callback(&TelemetryFailure::DrainTimeout {
                        timeout: self.drain_timeout,
                    });
                }
            }
        }
    }
}

impl Drop for TelemetryPipeline {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Background writer that batches records and flushes them to the uploader.
struct BatchWriter<U> {
    uploader: U,
    config: BatchConfig,
    on_failure: Option<TelemetryFailureCallback>,
}

impl<U: Uploader> BatchWriter<U> {
    async fn run(
        self,
        mut receiver: mpsc::Receiver<TelemetryRecord>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let batch_size = self.config.max_records_per_batch;
        let mut buffer: Vec<TelemetryRecord> = Vec::with_capacity(batch_size);
        let mut interval = tokio::time::interval(self.config.max_flush_latency());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                maybe = receiver.recv() => match maybe {
                    Some(record) => {
                        buffer.push(record);
                        if buffer.len() >= batch_size {
                            self.flush(&mut buffer, true).await;
                            interval.reset();
                        }
                    }
                    None => break,
                },
                _ = interval.tick() => {
                    if !buffer.is_empty() {
                        self.flush(&mut buffer, true).await;
                    }
                }
            }
        }

        // Final drain: whatever is still queued goes out before we exit.
        receiver.close();
        while let Some(record) = receiver.recv().await {
            buffer.push(record);
        }
        debug!(count = buffer.len(), "Draining telemetry buffer");
        while !buffer.is_empty() {
            self.flush(&mut buffer, false).await;
        }
    }

    /// Upload up to one batch from the head of the buffer.
    async fn flush(&self, buffer: &mut Vec<TelemetryRecord>, allow_requeue: bool) {
        let take = buffer.len().min(self.config.max_records_per_batch);
        let batch = TelemetryBatch::new(buffer.drain(..take).collect());
        let count = batch.len();
        debug!(count, batch_id = %batch.batch_id, "Flushing telemetry batch");

        let attempts = self.config.max_upload_retries + 1;
        let mut last_error = None;
        for attempt in 0..attempts {
            match self.uploader.upload(&batch).await {
                Ok(()) => {
                    metrics::counter!("telemetry.flushed").increment(count as u64);
                    debug!(count, "Telemetry batch uploaded");
                    return;
                }
                Err(e) => {
                    metrics::counter!("telemetry.upload_errors").increment(1);
                    warn!(error = %e, attempt = attempt + 1, count, "Telemetry upload failed");
                    last_error = Some(e);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.backoff(attempt)).await;
                    }
                }
            }
        }

        let requeue = allow_requeue
            && self.config.on_retry_exhausted == RetryExhaustedPolicy::Requeue
            && buffer.len() + count <= self.config.max_buffered_records;
        if requeue {
            warn!(count, "Requeueing telemetry batch after exhausted retries");
            buffer.splice(0..0, batch.records);
            return;
        }

        error!(count, batch_id = %batch.batch_id, "Dropping telemetry batch after exhausted retries");
        if let (Some(callback), Some(error)) = (&self.on_failure, last_error) {
            callback(&TelemetryFailure::UploadFailed {
                batch_id: batch.batch_id,
                records: count,
                attempts,
                error,
            });
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config.retry_backoff() * 2u32.saturating_pow(attempt.min(16))
    }
}
