use decision_core::{Action, Decision, DecisionResult, ServiceConfig};
use decision_explore::{salted_seed, Explorer};
use decision_refresh::{RefreshHandle, RefreshState};
use decision_telemetry::{Recorder, TelemetryPipeline};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A running decision service. Built by
/// [`DecisionServiceBuilder`](crate::DecisionServiceBuilder); immutable once
/// started.
///
/// Decision calls are synchronous and safe to issue from any number of
/// threads. Background polling and uploads run on the tokio runtime the
/// service was started in.
pub struct DecisionService<C> {
    config: ServiceConfig,
    explorer: Arc<dyn Explorer<C>>,
    recorder: Arc<dyn Recorder<C>>,
    state: Arc<RefreshState<C>>,
    refresher: Option<RefreshHandle>,
    pipeline: Option<TelemetryPipeline>,
}

impl<C> DecisionService<C> {
    pub(crate) fn new(
        config: ServiceConfig,
        explorer: Arc<dyn Explorer<C>>,
        recorder: Arc<dyn Recorder<C>>,
        state: Arc<RefreshState<C>>,
        refresher: Option<RefreshHandle>,
        pipeline: Option<TelemetryPipeline>,
    ) -> Self {
        Self {
            config,
            explorer,
            recorder,
            state,
            refresher,
            pipeline,
        }
    }

    /// Pick an action among `default_num_actions` for this context.
    pub fn choose_action(&self, unique_key: &str, context: &C) -> DecisionResult<Action> {
        self.choose_action_with(unique_key, context, self.config.default_num_actions)
    }

    /// Like [`choose_action`](Self::choose_action) with an explicit action count.
    pub fn choose_action_with(
        &self,
        unique_key: &str,
        context: &C,
        num_actions: u32,
    ) -> DecisionResult<Action> {
        self.decide(unique_key, context, num_actions)
            .map(|decision| decision.action())
    }

    /// Full decision, including probability and strategy state.
    pub fn decide(
        &self,
        unique_key: &str,
        context: &C,
        num_actions: u32,
    ) -> DecisionResult<Decision> {
        let seed = salted_seed(self.config.application_key(), unique_key);
        let decision = self.explorer.map_context(seed, context, num_actions)?;

        if decision.is_explore() {
            metrics::counter!("decision.explore").increment(1);
        } else {
            metrics::counter!("decision.exploit").increment(1);
        }
        debug!(
            unique_key,
            action = decision.action(),
            probability = decision.probability(),
            explore = decision.is_explore(),
            "Decision made"
        );

        if decision.should_record() || self.config.record_all_decisions {
            self.recorder.record(context, &decision, unique_key);
        }
        Ok(decision)
    }

    pub fn report_reward(&self, reward: f32, unique_key: &str) {
        self.recorder.report_reward(reward, unique_key);
    }

    /// Forward an arbitrary outcome payload. An outcome that cannot be
    /// serialized is logged and dropped.
    pub fn report_outcome<O: Serialize>(&self, outcome: &O, unique_key: &str) {
        match serde_json::to_value(outcome) {
            Ok(value) => self.recorder.report_outcome(&value, unique_key),
            Err(e) => warn!(unique_key, error = %e, "Dropping unserializable outcome"),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Live policy, settings and polling health.
    pub fn refresh_state(&self) -> &Arc<RefreshState<C>> {
        &self.state
    }

    /// Stop polling, drain telemetry, then close the recorder.
    ///
    /// Never fails: a drain or stop timeout is logged and reported through
    /// the failure callbacks.
    pub async fn stop(mut self) {
        info!("Decision service stopping");
        if let Some(refresher) = self.refresher.take() {
            refresher.stop(self.config.stop_timeout()).await;
        }
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.shutdown().await;
        }
        self.recorder.close();
        info!("Decision service stopped");
    }
}
