//! Epsilon-greedy exploration over a scoring policy.

use crate::sampler::Prg;
use crate::{check_action, check_num_actions, Explorer};
use decision_core::{Decision, DecisionError, DecisionResult, ExplorerState, Policy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Follows the policy with probability `1 - epsilon`, otherwise picks an
/// action uniformly at random.
pub struct EpsilonGreedyExplorer<C> {
    policy: Arc<dyn Policy<C>>,
    epsilon: f32,
    explore: AtomicBool,
}

impl<C> EpsilonGreedyExplorer<C> {
    pub fn new(policy: Arc<dyn Policy<C>>, epsilon: f32) -> DecisionResult<Self> {
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(DecisionError::Config(format!(
                "epsilon must be between 0 and 1, got {epsilon}"
            )));
        }
        Ok(Self {
            policy,
            epsilon,
            explore: AtomicBool::new(true),
        })
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }
}

impl<C> Explorer<C> for EpsilonGreedyExplorer<C> {
    fn map_context(&self, seed: u64, context: &C, num_actions: u32) -> DecisionResult<Decision> {
        check_num_actions(num_actions)?;
        let mut random = Prg::new(seed);

        // No trained model yet: fully uniform.
        let Some(policy_action) = self.policy.evaluate(context) else {
            return Ok(Decision::new(
                random.uniform_int(1, num_actions),
                1.0,
                ExplorerState::EpsilonGreedy {
                    epsilon: 1.0,
                    is_explore: true,
                },
                None,
                true,
            ));
        };
        let greedy = check_action(policy_action, num_actions)?;

        let epsilon = if self.explore.load(Ordering::Relaxed) {
            self.epsilon
        } else {
            0.0
        };
        let base = epsilon / num_actions as f32;
        let greedy_probability = 1.0 - epsilon + base;

        let (action, probability, is_explore) = if random.uniform_unit_interval() < 1.0 - epsilon {
            (greedy, greedy_probability, false)
        } else {
            let action = random.uniform_int(1, num_actions);
            // The uniform draw can land on the greedy action too.
            let probability = if action == greedy {
                greedy_probability
            } else {
                base
            };
            (action, probability, true)
        };

        Ok(Decision::new(
            action,
            probability,
            ExplorerState::EpsilonGreedy {
                epsilon,
                is_explore,
            },
            Some(greedy),
            true,
        ))
    }

    fn enable_explore(&self, explore: bool) {
        self.explore.store(explore, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::salted_seed;
    use decision_core::ConstantPolicy;

    fn explorer(epsilon: f32, greedy: u32) -> EpsilonGreedyExplorer<()> {
        EpsilonGreedyExplorer::new(Arc::new(ConstantPolicy::new(greedy)), epsilon).unwrap()
    }

    #[test]
    fn test_epsilon_out_of_range_rejected_at_construction() {
        let policy: Arc<dyn Policy<()>> = Arc::new(ConstantPolicy::default());
        assert!(EpsilonGreedyExplorer::new(policy.clone(), -0.1).is_err());
        assert!(EpsilonGreedyExplorer::new(policy.clone(), 1.5).is_err());
        assert!(EpsilonGreedyExplorer::new(policy, f32::NAN).is_err());
    }

    #[test]
    fn test_deterministic_for_same_seed() {
        let explorer = explorer(0.5, 2);
        let seed = salted_seed("app", "user-17");
        let first = explorer.map_context(seed, &(), 7).unwrap();
        for _ in 0..10 {
            assert_eq!(explorer.map_context(seed, &(), 7).unwrap(), first);
        }
    }

    #[test]
    fn test_probability_law() {
        for &(epsilon, n) in &[(0.0f32, 1u32), (0.0, 4), (0.2, 4), (0.5, 10), (1.0, 5), (1.0, 1)] {
            let greedy = 1;
            let explorer = explorer(epsilon, greedy);
            let greedy_p = 1.0 - epsilon + epsilon / n as f32;
            let other_p = epsilon / n as f32;

            for i in 0..2000 {
                let d = explorer
                    .map_context(salted_seed("law", &i.to_string()), &(), n)
                    .unwrap();
                let expected = if d.action() == greedy { greedy_p } else { other_p };
                assert!(
                    (d.probability() - expected).abs() < 1e-6,
                    "e={epsilon} n={n} action={} p={}",
                    d.action(),
                    d.probability()
                );
            }

            let total = greedy_p + other_p * (n - 1) as f32;
            assert!((total - 1.0).abs() < 1e-5, "e={epsilon} n={n} sums to {total}");
        }
    }

    #[test]
    fn test_epsilon_zero_always_exploits() {
        let explorer = explorer(0.0, 3);
        for i in 0..200 {
            let d = explorer
                .map_context(salted_seed("app", &i.to_string()), &(), 5)
                .unwrap();
            assert_eq!(d.action(), 3);
            assert_eq!(d.probability(), 1.0);
            assert!(!d.is_explore());
            assert_eq!(d.policy_action(), Some(3));
        }
    }

    #[test]
    fn test_epsilon_one_uniform_and_all_explore() {
        let explorer = explorer(1.0, 1);
        let mut counts = [0u32; 5];
        for i in 0..1000 {
            let d = explorer
                .map_context(salted_seed("app", &format!("k{i}")), &(), 5)
                .unwrap();
            assert!(d.is_explore());
            assert!((d.probability() - 0.2).abs() < 1e-6);
            counts[(d.action() - 1) as usize] += 1;
        }
        for count in counts {
            assert!((140..=260).contains(&count), "counts {counts:?}");
        }
    }

    #[test]
    fn test_not_ready_policy_is_uniform_with_probability_one() {
        let policy: Arc<dyn Policy<()>> = Arc::new(|_: &()| None::<u32>);
        let explorer = EpsilonGreedyExplorer::new(policy, 0.1).unwrap();
        let d = explorer.map_context(11, &(), 4).unwrap();
        assert!((1..=4).contains(&d.action()));
        assert_eq!(d.probability(), 1.0);
        assert!(d.is_explore());
        assert!(d.should_record());
        assert_eq!(d.policy_action(), None);
    }

    #[test]
    fn test_out_of_range_policy_action_fails_call() {
        let err = explorer(0.1, 0).map_context(1, &(), 3).unwrap_err();
        assert!(matches!(err, DecisionError::InvalidArgument(_)));
        let err = explorer(0.1, 4).map_context(1, &(), 3).unwrap_err();
        assert!(matches!(err, DecisionError::InvalidArgument(_)));
    }

    #[test]
    fn test_disabled_exploration_exploits() {
        let explorer = explorer(1.0, 2);
        explorer.enable_explore(false);
        let d = explorer.map_context(5, &(), 4).unwrap();
        assert_eq!(d.action(), 2);
        assert_eq!(d.probability(), 1.0);
        assert_eq!(
            d.state(),
            &ExplorerState::EpsilonGreedy {
                epsilon: 0.0,
                is_explore: false
            }
        );
    }
}
