use decision_core::Decision;

/// Producer-side telemetry contract used on the decision path.
///
/// Implementations must not block and must not fail the caller: anything
/// that goes wrong is theirs to report.
pub trait Recorder<C>: Send + Sync {
    fn record(&self, context: &C, decision: &Decision, unique_key: &str);

    fn report_reward(&self, reward: f32, unique_key: &str);

    fn report_outcome(&self, outcome: &serde_json::Value, unique_key: &str);

    /// Called once when the owning service stops.
    fn close(&self) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl<C> Recorder<C> for NoopRecorder {
    fn record(&self, _context: &C, _decision: &Decision, _unique_key: &str) {}

    fn report_reward(&self, _reward: f32, _unique_key: &str) {}

    fn report_outcome(&self, _outcome: &serde_json::Value, _unique_key: &str) {}
}
