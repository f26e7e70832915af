//! Builder that validates configuration and wires the component graph.

use crate::service::DecisionService;
use decision_core::{
    BatchConfig, DecisionError, DecisionResult, JoinServerType, Policy, PolicySlot, Scorer,
    ServiceConfig, SwappablePolicy,
};
use decision_explore::{
    EpsilonGreedyExplorer, ExploitUntilReady, Explorer, SoftmaxExplorer, TauFirstExplorer,
};
use decision_refresh::{
    spawn_refresher, ApplicationSettings, BlobFetcher, PolicyLoader, RefreshCallbacks,
    RefreshFailure, RefreshFailureCallback, RefreshHandle, RefreshState, RefresherConfig,
};
use decision_telemetry::{
    spawn_batching, Recorder, TelemetryFailure, TelemetryFailureCallback,
    TelemetryPipeline, Uploader,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

type RefresherFactory<C> = Box<
    dyn FnOnce(Arc<RefreshState<C>>, RefresherConfig, RefreshCallbacks) -> DecisionResult<RefreshHandle>
        + Send,
>;

type PipelineFactory<C> = Box<
    dyn FnOnce(
            BatchConfig,
            Option<TelemetryFailureCallback>,
        ) -> DecisionResult<(Arc<dyn Recorder<C>>, TelemetryPipeline)>
        + Send,
>;

enum Strategy<C> {
    EpsilonGreedy(f32),
    TauFirst(u32),
    Softmax(Arc<dyn Scorer<C>>, f32),
    Custom(Arc<dyn Explorer<C>>),
}

/// Collects configuration, strategy and capabilities, then starts a
/// [`DecisionService`]. Nothing can be changed after [`start`](Self::start).
pub struct DecisionServiceBuilder<C> {
    config: ServiceConfig,
    strategy: Strategy<C>,
    fallback: Option<Arc<dyn Policy<C>>>,
    initial_policy: Option<Arc<dyn Policy<C>>>,
    slot: Arc<PolicySlot<C>>,
    recorder: Option<Arc<dyn Recorder<C>>>,
    pipeline: Option<PipelineFactory<C>>,
    refresher: Option<RefresherFactory<C>>,
    on_model_failure: Option<RefreshFailureCallback>,
    on_settings_failure: Option<RefreshFailureCallback>,
    on_telemetry_failure: Option<TelemetryFailureCallback>,
}

impl<C: Send + Sync + 'static> DecisionServiceBuilder<C> {
    /// Defaults to epsilon-greedy with `epsilon = 0.2`.
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            strategy: Strategy::EpsilonGreedy(0.2),
            fallback: None,
            initial_policy: None,
            slot: Arc::new(PolicySlot::empty()),
            recorder: None,
            pipeline: None,
            refresher: None,
            on_model_failure: None,
            on_settings_failure: None,
            on_telemetry_failure: None,
        }
    }

    pub fn with_epsilon_greedy(mut self, epsilon: f32) -> Self {
        self.strategy = Strategy::EpsilonGreedy(epsilon);
        self
    }

    pub fn with_tau_first(mut self, tau: u32) -> Self {
        self.strategy = Strategy::TauFirst(tau);
        self
    }

    /// Softmax over scores from `scorer`; the scorer is responsible for its
    /// own model, the policy slot is not consulted.
    pub fn with_softmax(mut self, scorer: Arc<dyn Scorer<C>>, lambda: f32) -> Self {
        self.strategy = Strategy::Softmax(scorer, lambda);
        self
    }

    /// Bring your own strategy. It should read the policy through
    /// [`policy_slot`](Self::policy_slot) to see hot swaps.
    pub fn with_explorer(mut self, explorer: Arc<dyn Explorer<C>>) -> Self {
        self.strategy = Strategy::Custom(explorer);
        self
    }

    /// Exploit `fallback` at probability 1 until a trained policy is installed.
    pub fn exploit_until_model_ready(mut self, fallback: Arc<dyn Policy<C>>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Install an already-trained policy before the first decision.
    pub fn with_initial_policy(mut self, policy: Arc<dyn Policy<C>>) -> Self {
        self.initial_policy = Some(policy);
        self
    }

    /// Replace the built-in batching recorder.
    pub fn with_recorder(mut self, recorder: Arc<dyn Recorder<C>>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Upload telemetry in batches through `uploader`.
    pub fn with_uploader<U: Uploader>(mut self, uploader: U) -> Self
    where
        C: Serialize,
    {
        self.pipeline = Some(Box::new(move |config, on_failure| {
            let (recorder, pipeline) = spawn_batching::<C, U>(uploader, config, on_failure)?;
            let recorder: Arc<dyn Recorder<C>> = Arc::new(recorder);
            Ok((recorder, pipeline))
        }));
        self
    }

    /// Poll settings and model blobs through `fetcher`, turning model bytes
    /// into policies with `loader`.
    pub fn with_fetcher<F, L>(mut self, fetcher: F, loader: L) -> Self
    where
        F: BlobFetcher,
        L: PolicyLoader<C>,
    {
        self.refresher = Some(Box::new(move |state, config, callbacks| {
            spawn_refresher(fetcher, loader, state, config, callbacks)
        }));
        self
    }

    pub fn on_model_poll_failure(
        mut self,
        callback: impl Fn(&RefreshFailure) + Send + Sync + 'static,
    ) -> Self {
        self.on_model_failure = Some(Arc::new(callback));
        self
    }

    pub fn on_settings_poll_failure(
        mut self,
        callback: impl Fn(&RefreshFailure) + Send + Sync + 'static,
    ) -> Self {
        self.on_settings_failure = Some(Arc::new(callback));
        self
    }

    pub fn on_telemetry_failure(
        mut self,
        callback: impl Fn(&TelemetryFailure) + Send + Sync + 'static,
    ) -> Self {
        self.on_telemetry_failure = Some(Arc::new(callback));
        self
    }

    /// The slot the refresher publishes into.
    pub fn policy_slot(&self) -> Arc<PolicySlot<C>> {
        self.slot.clone()
    }

    /// Validate everything and start background work. Must be called from
    /// within a tokio runtime when polling or uploading is enabled.
    pub fn start(self) -> DecisionResult<DecisionService<C>> {
        self.config.validate()?;

        if let Some(policy) = self.initial_policy {
            self.slot.install(policy);
        }
        let policy: Arc<dyn Policy<C>> = Arc::new(SwappablePolicy::new(self.slot.clone()));

        let mut explorer: Arc<dyn Explorer<C>> = match self.strategy {
            Strategy::EpsilonGreedy(epsilon) => {
                Arc::new(EpsilonGreedyExplorer::new(policy, epsilon)?)
            }
            Strategy::TauFirst(tau) => Arc::new(TauFirstExplorer::new(policy, tau)),
            Strategy::Softmax(scorer, lambda) => Arc::new(SoftmaxExplorer::new(scorer, lambda)?),
            Strategy::Custom(explorer) => explorer,
        };
        if let Some(fallback) = self.fallback {
            explorer = Arc::new(ExploitUntilReady::new(explorer, self.slot.clone(), fallback));
        }

        let state = Arc::new(RefreshState::new(self.slot.clone()));

        // Offline: no network, the caller's recorder is the only sink.
        if self.config.offline_mode {
            let recorder = self.recorder.ok_or(DecisionError::MissingRecorder)?;
            if self.pipeline.is_some() || self.refresher.is_some() {
                warn!("Offline mode ignores the configured uploader and fetcher");
            }
            info!("Decision service started in offline mode");
            return Ok(DecisionService::new(
                self.config,
                explorer,
                recorder,
                state,
                None,
                None,
            ));
        }

        let settings_period = self.config.settings_poll_period()?;
        let model_period = self.config.model_poll_period()?;
        let polling = settings_period.is_enabled() || model_period.is_enabled();
        let refresher_factory = match self.refresher {
            Some(factory) if polling => Some(factory),
            None if polling => return Err(DecisionError::MissingCapability("fetcher")),
            _ => None,
        };

        let (recorder, pipeline): (Arc<dyn Recorder<C>>, Option<TelemetryPipeline>) =
            match (self.recorder, self.config.join_server) {
                (Some(recorder), _) => (recorder, None),
                (None, JoinServerType::CustomSolution) => {
                    return Err(DecisionError::MissingCapability("recorder"))
                }
                (None, JoinServerType::DecisionService) => {
                    let factory = self
                        .pipeline
                        .ok_or(DecisionError::MissingCapability("uploader"))?;
                    let (recorder, pipeline) =
                        factory(self.config.batching.clone(), self.on_telemetry_failure)?;
                    (recorder, Some(pipeline))
                }
            };

        let refresher = match refresher_factory {
            Some(factory) => {
                let target = explorer.clone();
                let callbacks = RefreshCallbacks {
                    on_settings_failure: self.on_settings_failure,
                    on_model_failure: self.on_model_failure,
                    on_settings_update: Some(Arc::new(move |settings: &ApplicationSettings| {
                        target.enable_explore(settings.explore_enabled);
                    })),
                };
                let config = RefresherConfig {
                    settings_period,
                    model_period,
                    blob_output_dir: self.config.blob_output_dir.clone(),
                };
                Some(factory(state.clone(), config, callbacks)?)
            }
            None => None,
        };

        info!(
            num_actions = self.config.default_num_actions,
            polling = refresher.is_some(),
            batching = pipeline.is_some(),
            "Decision service started"
        );
        Ok(DecisionService::new(
            self.config,
            explorer,
            recorder,
            state,
            refresher,
            pipeline,
        ))
    }
}
