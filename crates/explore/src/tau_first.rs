//! Tau-first exploration: exactly `tau` uniform decisions, then the policy.

use crate::sampler::Prg;
use crate::{check_action, check_num_actions, Explorer};
use decision_core::{Decision, DecisionResult, ExplorerState, Policy};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Spends a fixed budget of `tau` uniform-random decisions, then defers to
/// the policy for good.
///
/// Only the budget counter is locked. The draw and the policy call run
/// outside the critical section, so concurrent decisions never wait on each
/// other's policy evaluation.
pub struct TauFirstExplorer<C> {
    policy: Arc<dyn Policy<C>>,
    remaining: Mutex<u32>,
    explore: AtomicBool,
}

impl<C> TauFirstExplorer<C> {
    pub fn new(policy: Arc<dyn Policy<C>>, tau: u32) -> Self {
        Self {
            policy,
            remaining: Mutex::new(tau),
            explore: AtomicBool::new(true),
        }
    }

    /// Exploration budget left.
    pub fn remaining(&self) -> u32 {
        *self.remaining.lock()
    }

    /// Claim one unit of budget. Returns what is left after the claim, or
    /// `None` once the budget is exhausted.
    fn claim(&self) -> Option<u32> {
        let mut remaining = self.remaining.lock();
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        if *remaining == 0 {
            info!("Tau-first exploration budget exhausted, switching to policy");
        }
        Some(*remaining)
    }
}

impl<C> Explorer<C> for TauFirstExplorer<C> {
    fn map_context(&self, seed: u64, context: &C, num_actions: u32) -> DecisionResult<Decision> {
        check_num_actions(num_actions)?;
        let mut random = Prg::new(seed);
        let uniform_probability = 1.0 / num_actions as f32;

        let claimed = if self.explore.load(Ordering::Relaxed) {
            self.claim()
        } else {
            None
        };

        if let Some(tau_remaining) = claimed {
            return Ok(Decision::new(
                random.uniform_int(1, num_actions),
                uniform_probability,
                ExplorerState::TauFirst {
                    tau_remaining,
                    is_explore: true,
                },
                None,
                true,
            ));
        }

        let tau_remaining = self.remaining();
        match self.policy.evaluate(context) {
            // Pure exploit: probability 1 needs no propensity correction.
            Some(action) => Ok(Decision::new(
                check_action(action, num_actions)?,
                1.0,
                ExplorerState::TauFirst {
                    tau_remaining,
                    is_explore: false,
                },
                Some(action),
                false,
            )),
            None => Ok(Decision::new(
                random.uniform_int(1, num_actions),
                uniform_probability,
                ExplorerState::TauFirst {
                    tau_remaining,
                    is_explore: true,
                },
                None,
                true,
            )),
        }
    }

    fn enable_explore(&self, explore: bool) {
        self.explore.store(explore, Ordering::Relaxed);
    }
}
