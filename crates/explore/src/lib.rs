//! Exploration strategies: epsilon-greedy, tau-first and softmax behind one
//! [`Explorer`] contract, plus the exploit-until-ready wrapper and the
//! deterministic sampler they all draw from.

pub mod epsilon_greedy;
pub mod readiness;
pub mod sampler;
pub mod softmax;
pub mod tau_first;

pub use epsilon_greedy::EpsilonGreedyExplorer;
pub use readiness::ExploitUntilReady;
pub use sampler::{salted_seed, Prg};
pub use softmax::SoftmaxExplorer;
pub use tau_first::TauFirstExplorer;

use decision_core::{Action, Decision, DecisionError, DecisionResult};

/// Shared contract for every exploration algorithm.
///
/// The returned [`Decision`] carries the true marginal probability of its
/// action under the whole strategy, fallback paths included.
pub trait Explorer<C>: Send + Sync {
    fn map_context(&self, seed: u64, context: &C, num_actions: u32) -> DecisionResult<Decision>;

    /// Turn exploration on or off at runtime. Strategies without an explore
    /// phase ignore it.
    fn enable_explore(&self, _explore: bool) {}
}

impl<C, E> Explorer<C> for std::sync::Arc<E>
where
    E: Explorer<C> + ?Sized,
{
    fn map_context(&self, seed: u64, context: &C, num_actions: u32) -> DecisionResult<Decision> {
        (**self).map_context(seed, context, num_actions)
    }

    fn enable_explore(&self, explore: bool) {
        (**self).enable_explore(explore)
    }
}

pub(crate) fn check_num_actions(num_actions: u32) -> DecisionResult<()> {
    if num_actions == 0 {
        return Err(DecisionError::InvalidArgument(
            "num_actions must be positive".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_action(action: Action, num_actions: u32) -> DecisionResult<Action> {
    if action == 0 || action > num_actions {
        return Err(DecisionError::action_out_of_range(action, num_actions));
    }
    Ok(action)
}
