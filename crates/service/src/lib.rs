//! Decision service: wires an exploration strategy, the background
//! refresher and a telemetry recorder behind `choose_action`,
//! `report_reward` and `report_outcome`.

pub mod builder;
pub mod service;

pub use builder::DecisionServiceBuilder;
pub use service::DecisionService;

pub use decision_core::{
    Action, ConstantPolicy, Decision, DecisionError, DecisionResult, ExplorerState, Policy,
    PolicySlot, Scorer, ServiceConfig,
};
pub use decision_explore::Explorer;
pub use decision_refresh::{ApplicationSettings, BlobFetcher, BlobKind, FetchError, RefreshFailure};
pub use decision_telemetry::{
    NoopRecorder, Recorder, TelemetryBatch, TelemetryFailure, TelemetryRecord, UploadError,
    Uploader,
};
