//! Scoring-policy capability and the hot-swappable slot that holds it.
//!
//! Strategies never own a trained model directly. They read it through a
//! [`PolicySlot`], which the background refresher replaces wholesale. A
//! reader clones the current `Arc` under a short read lock, so a decision
//! always works against one fully-formed policy, old or new.

use crate::types::Action;
use parking_lot::RwLock;
use std::sync::Arc;

/// Opaque scoring policy: context in, optional action out.
///
/// `None` means "no trained model yet", which is distinct from an error.
pub trait Policy<C>: Send + Sync {
    fn evaluate(&self, context: &C) -> Option<Action>;
}

/// Per-action scores for score-driven strategies (e.g. softmax).
pub trait Scorer<C>: Send + Sync {
    /// One score per action, index 0 being action 1. `None` while not ready.
    fn scores(&self, context: &C, num_actions: u32) -> Option<Vec<f32>>;
}

impl<C, F> Policy<C> for F
where
    F: Fn(&C) -> Option<Action> + Send + Sync,
{
    fn evaluate(&self, context: &C) -> Option<Action> {
        self(context)
    }
}

/// Always proposes the same action. Used as the exploit-until-ready fallback.
#[derive(Debug, Clone, Copy)]
pub struct ConstantPolicy {
    action: Action,
}

impl ConstantPolicy {
    pub fn new(action: Action) -> Self {
        Self { action }
    }
}

impl Default for ConstantPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

impl<C> Policy<C> for ConstantPolicy {
    fn evaluate(&self, _context: &C) -> Option<Action> {
        Some(self.action)
    }
}

/// Single-writer, multi-reader holder of the live policy.
pub struct PolicySlot<C> {
    current: RwLock<Option<Arc<dyn Policy<C>>>>,
}

impl<C> PolicySlot<C> {
    pub fn empty() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    pub fn with_policy(policy: Arc<dyn Policy<C>>) -> Self {
        Self {
            current: RwLock::new(Some(policy)),
        }
    }

    /// Snapshot of the live policy, if any.
    pub fn current(&self) -> Option<Arc<dyn Policy<C>>> {
        self.current.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.current.read().is_some()
    }

    /// Publish a new policy. Readers holding the previous `Arc` finish with it.
    pub fn install(&self, policy: Arc<dyn Policy<C>>) {
        *self.current.write() = Some(policy);
    }
}

impl<C> Default for PolicySlot<C> {
    fn default() -> Self {
        Self::empty()
    }
}

/// [`Policy`] view over a [`PolicySlot`]; not ready until something is installed.
pub struct SwappablePolicy<C> {
    slot: Arc<PolicySlot<C>>,
}

impl<C> SwappablePolicy<C> {
    pub fn new(slot: Arc<PolicySlot<C>>) -> Self {
        Self { slot }
    }

    pub fn slot(&self) -> &Arc<PolicySlot<C>> {
        &self.slot
    }
}

impl<C> Clone for SwappablePolicy<C> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<C> Policy<C> for SwappablePolicy<C> {
    fn evaluate(&self, context: &C) -> Option<Action> {
        let policy = self.slot.current()?;
        policy.evaluate(context)
    }
}
