use crate::fetch::BlobKind;
use crate::settings::ApplicationSettings;
use chrono::{DateTime, Utc};
use decision_core::{Policy, PolicySlot};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Health of one polling loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BlobStatus {
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Hex SHA-256 of the blob currently published.
    pub digest: Option<String>,
}

/// Everything the refresher publishes for decision calls to read.
///
/// One instance per decision service; the refresher is the only writer.
pub struct RefreshState<C> {
    policy: Arc<PolicySlot<C>>,
    settings: RwLock<Option<Arc<ApplicationSettings>>>,
    settings_status: RwLock<BlobStatus>,
    model_status: RwLock<BlobStatus>,
}

impl<C> RefreshState<C> {
    pub fn new(policy: Arc<PolicySlot<C>>) -> Self {
        Self {
            policy,
            settings: RwLock::new(None),
            settings_status: RwLock::new(BlobStatus::default()),
            model_status: RwLock::new(BlobStatus::default()),
        }
    }

    pub fn policy_slot(&self) -> &Arc<PolicySlot<C>> {
        &self.policy
    }

    pub fn policy(&self) -> Option<Arc<dyn Policy<C>>> {
        self.policy.current()
    }

    pub fn settings(&self) -> Option<Arc<ApplicationSettings>> {
        self.settings.read().clone()
    }

    pub fn status(&self, kind: BlobKind) -> BlobStatus {
        self.status_lock(kind).read().clone()
    }

    pub(crate) fn publish_settings(&self, settings: Arc<ApplicationSettings>) {
        *self.settings.write() = Some(settings);
    }

    pub(crate) fn publish_policy(&self, policy: Arc<dyn Policy<C>>) {
        self.policy.install(policy);
    }

    pub(crate) fn record_success(&self, kind: BlobKind, digest: Option<String>) {
        let mut status = self.status_lock(kind).write();
        status.last_success = Some(Utc::now());
        status.last_error = None;
        if digest.is_some() {
            status.digest = digest;
        }
    }

    pub(crate) fn record_failure(&self, kind: BlobKind, error: String) {
        self.status_lock(kind).write().last_error = Some(error);
    }

    fn status_lock(&self, kind: BlobKind) -> &RwLock<BlobStatus> {
        match kind {
            BlobKind::Settings => &self.settings_status,
            BlobKind::Model => &self.model_status,
        }
    }
}
