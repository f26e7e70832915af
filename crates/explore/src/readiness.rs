//! Exploit-until-ready wrapper.

use crate::sampler::Prg;
use crate::{check_action, check_num_actions, Explorer};
use decision_core::{Decision, DecisionResult, ExplorerState, Policy, PolicySlot};
use std::sync::Arc;
use tracing::debug;

/// Serves a constant fallback policy at probability 1 until the refresher
/// installs a trained policy, then routes every call through `inner`.
///
/// The slot only ever goes from empty to filled, so once a call sees it
/// ready the inner strategy sees a policy as well.
pub struct ExploitUntilReady<C> {
    inner: Arc<dyn Explorer<C>>,
    slot: Arc<PolicySlot<C>>,
    fallback: Arc<dyn Policy<C>>,
}

impl<C> ExploitUntilReady<C> {
    pub fn new(
        inner: Arc<dyn Explorer<C>>,
        slot: Arc<PolicySlot<C>>,
        fallback: Arc<dyn Policy<C>>,
    ) -> Self {
        Self {
            inner,
            slot,
            fallback,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.slot.is_ready()
    }
}

impl<C> Explorer<C> for ExploitUntilReady<C> {
    fn map_context(&self, seed: u64, context: &C, num_actions: u32) -> DecisionResult<Decision> {
        if self.slot.is_ready() {
            return self.inner.map_context(seed, context, num_actions);
        }

        check_num_actions(num_actions)?;
        match self.fallback.evaluate(context) {
            Some(action) => {
                let action = check_action(action, num_actions)?;
                debug!(action, "No trained policy yet, exploiting fallback");
                Ok(Decision::new(
                    action,
                    1.0,
                    ExplorerState::Fallback,
                    Some(action),
                    true,
                ))
            }
            // A fallback with nothing to say degrades to uniform.
            None => Ok(Decision::new(
                Prg::new(seed).uniform_int(1, num_actions),
                1.0 / num_actions as f32,
                ExplorerState::Fallback,
                None,
                true,
            )),
        }
    }

    fn enable_explore(&self, explore: bool) {
        self.inner.enable_explore(explore);
    }
}
