//! Telemetry for decisions, rewards and outcomes.
//!
//! [`Recorder`] is the producer-side contract used by the decision path. The
//! built-in [`BatchingRecorder`] pushes records onto a bounded channel that a
//! background writer drains into an [`Uploader`], flushing by size, by age
//! and once more on shutdown.

pub mod batcher;
pub mod record;
pub mod recorder;
pub mod upload;

pub use batcher::{spawn_batching, BatchingRecorder, TelemetryPipeline};
pub use record::{TelemetryBatch, TelemetryRecord};
pub use recorder::{NoopRecorder, Recorder};
pub use upload::{DropReason, TelemetryFailure, TelemetryFailureCallback, UploadError, Uploader};
