//! Settings and model polling loops.

use crate::fetch::{BlobFetcher, BlobKind, PolicyLoader};
use crate::settings::ApplicationSettings;
use crate::state::RefreshState;
use decision_core::{DecisionError, DecisionResult, PollPeriod};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// A polling failure handed to the user callback.
#[derive(Debug)]
pub struct RefreshFailure {
    pub kind: BlobKind,
    pub error: DecisionError,
}

pub type RefreshFailureCallback = Arc<dyn Fn(&RefreshFailure) + Send + Sync>;
pub type SettingsListener = Arc<dyn Fn(&ApplicationSettings) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RefresherConfig {
    pub settings_period: PollPeriod,
    pub model_period: PollPeriod,
    pub blob_output_dir: Option<PathBuf>,
}

#[derive(Default, Clone)]
pub struct RefreshCallbacks {
    pub on_settings_failure: Option<RefreshFailureCallback>,
    pub on_model_failure: Option<RefreshFailureCallback>,
    /// Invoked after new settings are published.
    pub on_settings_update: Option<SettingsListener>,
}

/// Start the enabled polling loops. Must be called within a tokio runtime.
pub fn spawn_refresher<C, F, L>(
    fetcher: F,
    loader: L,
    state: Arc<RefreshState<C>>,
    config: RefresherConfig,
    callbacks: RefreshCallbacks,
) -> DecisionResult<RefreshHandle>
where
    C: 'static,
    F: BlobFetcher,
    L: PolicyLoader<C>,
{
    let (shutdown, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    let enabled = config.settings_period.is_enabled() || config.model_period.is_enabled();
    if !enabled {
        info!("Settings and model polling both disabled");
        return Ok(RefreshHandle { shutdown, handles });
    }

    let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
        DecisionError::Config("the refresher requires a tokio runtime".to_string())
    })?;
    let fetcher = Arc::new(fetcher);

    if let PollPeriod::Every(period) = config.settings_period {
        let poll = PollLoop {
            kind: BlobKind::Settings,
            period,
            fetcher: fetcher.clone(),
            output_dir: config.blob_output_dir.clone(),
            on_failure: callbacks.on_settings_failure.clone(),
            last_digest: None,
        };
        let target = state.clone();
        let listener = callbacks.on_settings_update.clone();
        let apply = move |bytes: &[u8]| -> DecisionResult<()> {
            let settings = ApplicationSettings::parse(bytes)
                .map_err(|e| DecisionError::Parse(format!("settings: {e}")))?;
            info!(
                model_id = settings.model_id.as_deref().unwrap_or("-"),
                explore_enabled = settings.explore_enabled,
                "Publishing new application settings"
            );
            // Listener first, so readers of the new settings also see their effect.
            if let Some(listener) = &listener {
                listener(&settings);
            }
            target.publish_settings(Arc::new(settings));
            Ok(())
        };
        handles.push(runtime.spawn(poll.run(state.clone(), shutdown_rx.clone(), apply)));
    }

    if let PollPeriod::Every(period) = config.model_period {
        let poll = PollLoop {
            kind: BlobKind::Model,
            period,
            fetcher,
            output_dir: config.blob_output_dir,
            on_failure: callbacks.on_model_failure,
            last_digest: None,
        };
        let target = state.clone();
        let apply = move |bytes: &[u8]| -> DecisionResult<()> {
            let policy = loader
                .load(bytes)
                .map_err(|e| DecisionError::Parse(format!("model: {e}")))?;
            target.publish_policy(policy);
            metrics::counter!("refresh.model_swaps").increment(1);
            info!(bytes = bytes.len(), "Hot-swapped scoring policy");
            Ok(())
        };
        handles.push(runtime.spawn(poll.run(state, shutdown_rx, apply)));
    }

    Ok(RefreshHandle { shutdown, handles })
}

/// Owner of the polling tasks.
pub struct RefreshHandle {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl RefreshHandle {
    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    /// Cancel both loops and wait for an in-flight fetch to finish. Loops
    /// still running after `timeout` are aborted.
    pub async fn stop(mut self, timeout: Duration) {
        let _ = self.shutdown.send(true);
        let mut handles = std::mem::take(&mut self.handles);

        let joined = tokio::time::timeout(timeout, async {
            for handle in handles.iter_mut() {
                if let Err(e) = handle.await {
                    error!(error = %e, "Polling task panicked");
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(timeout = ?timeout, "Polling loops did not stop in time, aborting");
            for handle in &handles {
                handle.abort();
            }
        } else {
            info!("Polling loops stopped");
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

struct PollLoop<F> {
    kind: BlobKind,
    period: Duration,
    fetcher: Arc<F>,
    output_dir: Option<PathBuf>,
    on_failure: Option<RefreshFailureCallback>,
    last_digest: Option<[u8; 32]>,
}

impl<F: BlobFetcher> PollLoop<F> {
    async fn run<C, H>(
        mut self,
        state: Arc<RefreshState<C>>,
        mut shutdown: watch::Receiver<bool>,
        mut apply: H,
    ) where
        H: FnMut(&[u8]) -> DecisionResult<()> + Send,
    {
        info!(kind = %self.kind, period = ?self.period, "Polling loop started");
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }
            // No new tick once stop has been requested.
            if *shutdown.borrow() {
                break;
            }
            self.tick(&state, &mut apply).await;
        }

        info!(kind = %self.kind, "Polling loop stopped");
    }

    async fn tick<C, H>(&mut self, state: &RefreshState<C>, apply: &mut H)
    where
        H: FnMut(&[u8]) -> DecisionResult<()> + Send,
    {
        let bytes = match self.fetcher.fetch(self.kind).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fail(state, DecisionError::Fetch(e.to_string()));
                return;
            }
        };

        let digest: [u8; 32] = Sha256::digest(&bytes).into();
        if self.last_digest == Some(digest) {
            debug!(kind = %self.kind, "Blob unchanged, skipping");
            state.record_success(self.kind, None);
            return;
        }

        if let Err(e) = apply(&bytes) {
            self.fail(state, e);
            return;
        }

        self.last_digest = Some(digest);
        state.record_success(self.kind, Some(hex::encode(digest)));
        self.persist(&bytes).await;
    }

    async fn persist(&self, bytes: &[u8]) {
        let Some(dir) = &self.output_dir else {
            return;
        };
        let path = dir.join(self.kind.file_name());
        let written = match tokio::fs::create_dir_all(dir).await {
            Ok(()) => tokio::fs::write(&path, bytes).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(kind = %self.kind, path = %path.display(), error = %e, "Failed to persist blob");
        }
    }

    fn fail<C>(&self, state: &RefreshState<C>, error: DecisionError) {
        metrics::counter!("refresh.poll_errors").increment(1);
        warn!(kind = %self.kind, error = %error, "Polling tick failed");
        state.record_failure(self.kind, error.to_string());
        if let Some(callback) = &self.on_failure {
            callback(&RefreshFailure {
                kind: self.kind,
                error,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use bytes::Bytes;
    use decision_core::{ConstantPolicy, Policy, PolicySlot};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves scripted responses per kind, repeating the last one.
    #[derive(Clone, Default)]
    struct ScriptedFetcher {
        settings: Arc<Mutex<VecDeque<Result<Bytes, FetchError>>>>,
        model: Arc<Mutex<VecDeque<Result<Bytes, FetchError>>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedFetcher {
        fn push(&self, kind: BlobKind, response: Result<Bytes, FetchError>) {
            match kind {
                BlobKind::Settings => self.settings.lock().push_back(response),
                BlobKind::Model => self.model.lock().push_back(response),
            }
        }
    }

    impl BlobFetcher for ScriptedFetcher {
        async fn fetch(&self, kind: BlobKind) -> Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let queue = match kind {
                BlobKind::Settings => &self.settings,
                BlobKind::Model => &self.model,
            };
            let mut queue = queue.lock();
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue
                    .front()
                    .cloned()
                    .unwrap_or_else(|| Err(FetchError::NotFound(kind.to_string())))
            }
        }
    }

    /// Model bytes are a single ASCII digit naming the constant action.
    fn digit_loader(bytes: &[u8]) -> anyhow::Result<Arc<dyn Policy<()>>> {
        let text = std::str::from_utf8(bytes)?;
        let action: u32 = text.trim().parse()?;
        Ok(Arc::new(ConstantPolicy::new(action)))
    }

    fn config(settings_ms: u64, model_ms: u64) -> RefresherConfig {
        RefresherConfig {
            settings_period: PollPeriod::Every(Duration::from_millis(settings_ms)),
            model_period: PollPeriod::Every(Duration::from_millis(model_ms)),
            blob_output_dir: None,
        }
    }

    async fn eventually(check: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_model_loop_installs_policy() {
        let fetcher = ScriptedFetcher::default();
        fetcher.push(BlobKind::Model, Ok(Bytes::from_static(b"3")));
        let state = Arc::new(RefreshState::new(Arc::new(PolicySlot::<()>::empty())));

        let handle = spawn_refresher(
            fetcher,
            digit_loader,
            state.clone(),
            RefresherConfig {
                settings_period: PollPeriod::Disabled,
                ..config(10, 10)
            },
            RefreshCallbacks::default(),
        )
        .unwrap();

        eventually(|| state.policy().is_some()).await;
        assert_eq!(state.policy().unwrap().evaluate(&()), Some(3));
        assert!(state.status(BlobKind::Model).digest.is_some());

        handle.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_failures_reported_and_loop_continues() {
        let fetcher = ScriptedFetcher::default();
        fetcher.push(BlobKind::Model, Err(FetchError::Unavailable("down".into())));
        fetcher.push(BlobKind::Model, Ok(Bytes::from_static(b"not a number")));
        fetcher.push(BlobKind::Model, Ok(Bytes::from_static(b"2")));
        let state = Arc::new(RefreshState::new(Arc::new(PolicySlot::<()>::empty())));

        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        let callbacks = RefreshCallbacks {
            on_model_failure: Some(Arc::new(move |f: &RefreshFailure| {
                sink.lock().push(f.error.to_string());
            })),
            ..Default::default()
        };

        let handle = spawn_refresher(
            fetcher,
            digit_loader,
            state.clone(),
            RefresherConfig {
                settings_period: PollPeriod::Disabled,
                ..config(10, 10)
            },
            callbacks,
        )
        .unwrap();

        eventually(|| state.policy().is_some()).await;
        let failures = failures.lock().clone();
        assert_eq!(failures.len(), 2);
        assert!(failures[0].contains("unavailable"));
        assert!(failures[1].contains("parse"));
        assert!(state.status(BlobKind::Model).last_error.is_none());

        handle.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_settings_published_and_listener_called() {
        let fetcher = ScriptedFetcher::default();
        fetcher.push(
            BlobKind::Settings,
            Ok(Bytes::from_static(br#"{"model_id":"m1","explore_enabled":false}"#)),
        );
        let state = Arc::new(RefreshState::new(Arc::new(PolicySlot::<()>::empty())));
        let updates = Arc::new(AtomicUsize::new(0));
        let counter = updates.clone();

        let handle = spawn_refresher(
            fetcher,
            digit_loader,
            state.clone(),
            RefresherConfig {
                model_period: PollPeriod::Disabled,
                ..config(10, 10)
            },
            RefreshCallbacks {
                on_settings_update: Some(Arc::new(move |s: &ApplicationSettings| {
                    assert!(!s.explore_enabled);
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
                ..Default::default()
            },
        )
        .unwrap();

        eventually(|| state.settings().is_some()).await;
        assert_eq!(state.settings().unwrap().model_id.as_deref(), Some("m1"));

        // Identical blobs on later ticks are not re-published.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(updates.load(Ordering::SeqCst), 1);

        handle.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_stop_halts_polling() {
        let fetcher = ScriptedFetcher::default();
        let calls = fetcher.calls.clone();
        let state = Arc::new(RefreshState::new(Arc::new(PolicySlot::<()>::empty())));

        let handle = spawn_refresher(
            fetcher,
            digit_loader,
            state,
            config(5, 5),
            RefreshCallbacks::default(),
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(handle.is_running());
        handle.stop(Duration::from_secs(1)).await;

        let after_stop = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);
    }

    /// Counts calls, then never answers.
    #[derive(Clone, Default)]
    struct StalledFetcher {
        calls: Arc<AtomicUsize>,
    }

    impl BlobFetcher for StalledFetcher {
        async fn fetch(&self, _kind: BlobKind) -> Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stop_aborts_stalled_fetch() {
        let fetcher = StalledFetcher::default();
        let calls = fetcher.calls.clone();
        let state = Arc::new(RefreshState::new(Arc::new(PolicySlot::<()>::empty())));

        let handle = spawn_refresher(
            fetcher,
            digit_loader,
            state.clone(),
            RefresherConfig {
                settings_period: PollPeriod::Disabled,
                ..config(10, 10)
            },
            RefreshCallbacks::default(),
        )
        .unwrap();

        eventually(|| calls.load(Ordering::SeqCst) > 0).await;
        tokio::time::timeout(
            Duration::from_secs(1),
            handle.stop(Duration::from_millis(50)),
        )
        .await
        .expect("stop did not return after its timeout");

        assert!(state.policy().is_none());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blob_persisted_to_output_dir() {
        let dir = std::env::temp_dir().join(format!("refresh-test-{}", std::process::id()));
        let fetcher = ScriptedFetcher::default();
        fetcher.push(BlobKind::Model, Ok(Bytes::from_static(b"1")));
        let state = Arc::new(RefreshState::new(Arc::new(PolicySlot::<()>::empty())));

        let handle = spawn_refresher(
            fetcher,
            digit_loader,
            state.clone(),
            RefresherConfig {
                settings_period: PollPeriod::Disabled,
                model_period: PollPeriod::Every(Duration::from_millis(10)),
                blob_output_dir: Some(dir.clone()),
            },
            RefreshCallbacks::default(),
        )
        .unwrap();

        let path = dir.join("model.bin");
        eventually(|| path.exists()).await;
        handle.stop(Duration::from_secs(1)).await;
        assert_eq!(std::fs::read(&path).unwrap(), b"1");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_disabled_loops_need_no_runtime() {
        let state = Arc::new(RefreshState::new(Arc::new(PolicySlot::<()>::empty())));
        let handle = spawn_refresher(
            ScriptedFetcher::default(),
            digit_loader,
            state,
            RefresherConfig {
                settings_period: PollPeriod::Disabled,
                model_period: PollPeriod::Disabled,
                blob_output_dir: None,
            },
            RefreshCallbacks::default(),
        )
        .unwrap();
        assert!(!handle.is_running());
    }
}
