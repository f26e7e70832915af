use crate::record::TelemetryBatch;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Upload capability for the join/telemetry backend.
///
/// Called from the background writer only; an implementation may take as
/// long as it needs without affecting decision calls.
pub trait Uploader: Send + Sync + 'static {
    fn upload(&self, batch: &TelemetryBatch) -> impl Future<Output = Result<(), UploadError>> + Send;
}

/// Errors that can occur while uploading a batch.
#[derive(Debug, Clone)]
pub enum UploadError {
    /// The backend could not be reached or timed out.
    Unavailable(String),
    /// The backend refused the batch.
    Rejected(String),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::Unavailable(msg) => write!(f, "telemetry backend unavailable: {msg}"),
            UploadError::Rejected(msg) => write!(f, "telemetry batch rejected: {msg}"),
        }
    }
}

impl std::error::Error for UploadError {}

/// Why a single record never made it into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    BufferFull,
    Closed,
    Serialization,
}

/// Best-effort telemetry failures, reported through the failure callback.
#[derive(Debug, Clone)]
pub enum TelemetryFailure {
    /// A record was dropped before reaching the buffer.
    Dropped {
        unique_key: String,
        kind: &'static str,
        reason: DropReason,
    },
    /// A batch was given up on after all retries.
    UploadFailed {
        batch_id: Uuid,
        records: usize,
        attempts: u32,
        error: UploadError,
    },
    /// The shutdown drain did not finish in time.
    DrainTimeout { timeout: Duration },
}

impl fmt::Display for TelemetryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryFailure::Dropped {
                unique_key,
                kind,
                reason,
            } => write!(f, "{kind} record for key {unique_key} dropped: {reason:?}"),
            TelemetryFailure::UploadFailed {
                batch_id,
                records,
                attempts,
                error,
            } => write!(
                f,
                "batch {batch_id} ({records} records) failed after {attempts} attempts: {error}"
            ),
            TelemetryFailure::DrainTimeout { timeout } => {
                write!(f, "telemetry drain did not finish within {timeout:?}")
            }
        }
    }
}

pub type TelemetryFailureCallback = Arc<dyn Fn(&TelemetryFailure) + Send + Sync>;
