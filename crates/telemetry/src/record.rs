use chrono::{DateTime, Utc};
use decision_core::Decision;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One queued telemetry entry. All variants carry the caller's unique key,
/// which is what the join service uses to match rewards and outcomes to the
/// decision they belong to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryRecord {
    Decision {
        unique_key: String,
        context: serde_json::Value,
        decision: Decision,
        timestamp: DateTime<Utc>,
    },
    Reward {
        unique_key: String,
        reward: f32,
        timestamp: DateTime<Utc>,
    },
    Outcome {
        unique_key: String,
        outcome: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
}

impl TelemetryRecord {
    pub fn decision(unique_key: &str, context: serde_json::Value, decision: Decision) -> Self {
        Self::Decision {
            unique_key: unique_key.to_string(),
            context,
            decision,
            timestamp: Utc::now(),
        }
    }

    pub fn reward(unique_key: &str, reward: f32) -> Self {
        Self::Reward {
            unique_key: unique_key.to_string(),
            reward,
            timestamp: Utc::now(),
        }
    }

    pub fn outcome(unique_key: &str, outcome: serde_json::Value) -> Self {
        Self::Outcome {
            unique_key: unique_key.to_string(),
            outcome,
            timestamp: Utc::now(),
        }
    }

    pub fn unique_key(&self) -> &str {
        match self {
            Self::Decision { unique_key, .. }
            | Self::Reward { unique_key, .. }
            | Self::Outcome { unique_key, .. } => unique_key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decision { .. } => "decision",
            Self::Reward { .. } => "reward",
            Self::Outcome { .. } => "outcome",
        }
    }
}

/// A batch handed to the uploader. The id is stable across retries so the
/// receiving side can de-duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryBatch {
    pub batch_id: Uuid,
    pub records: Vec<TelemetryRecord>,
}

impl TelemetryBatch {
    pub fn new(records: Vec<TelemetryRecord>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
