use serde::{Deserialize, Serialize};

/// 1-based action identifier.
pub type Action = u32;

/// Algorithm-specific diagnostics attached to every decision.
///
/// The `kind` tag is the stable discriminator used when the state is
/// serialized next to the logged decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExplorerState {
    EpsilonGreedy {
        epsilon: f32,
        is_explore: bool,
    },
    TauFirst {
        tau_remaining: u32,
        is_explore: bool,
    },
    Softmax {
        lambda: f32,
        is_explore: bool,
    },
    /// Constant fallback used while no trained policy is installed.
    Fallback,
}

impl ExplorerState {
    pub fn is_explore(&self) -> bool {
        match self {
            Self::EpsilonGreedy { is_explore, .. }
            | Self::TauFirst { is_explore, .. }
            | Self::Softmax { is_explore, .. } => *is_explore,
            Self::Fallback => false,
        }
    }
}

/// Immutable result of one exploration call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    action: Action,
    probability: f32,
    state: ExplorerState,
    policy_action: Option<Action>,
    should_record: bool,
}

impl Decision {
    pub fn new(
        action: Action,
        probability: f32,
        state: ExplorerState,
        policy_action: Option<Action>,
        should_record: bool,
    ) -> Self {
        debug_assert!(action >= 1, "actions are 1-based");
        debug_assert!(
            probability > 0.0 && probability <= 1.0,
            "probability {probability} outside (0, 1]"
        );
        Self {
            action,
            probability,
            state,
            policy_action,
            should_record,
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Marginal probability that `action` is selected under the full strategy.
    pub fn probability(&self) -> f32 {
        self.probability
    }

    pub fn state(&self) -> &ExplorerState {
        &self.state
    }

    /// Action the underlying policy proposed, if one was consulted and ready.
    pub fn policy_action(&self) -> Option<Action> {
        self.policy_action
    }

    pub fn should_record(&self) -> bool {
        self.should_record
    }

    pub fn is_explore(&self) -> bool {
        self.state.is_explore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_with_discriminator() {
        let state = ExplorerState::TauFirst {
            tau_remaining: 3,
            is_explore: true,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["kind"], "tau_first");
        assert_eq!(json["tau_remaining"], 3);

        let back: ExplorerState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_fallback_is_not_explore() {
        let decision = Decision::new(1, 1.0, ExplorerState::Fallback, Some(1), true);
        assert!(!decision.is_explore());
        assert!(decision.should_record());
    }
}
