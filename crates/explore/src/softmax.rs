//! Softmax (Boltzmann) exploration over per-action scores.

use crate::sampler::Prg;
use crate::{check_num_actions, Explorer};
use decision_core::{Decision, DecisionError, DecisionResult, ExplorerState, Scorer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Samples action `i` with probability proportional to `exp(lambda * score_i)`.
///
/// `lambda = 0` is uniform; large values approach greedy.
pub struct SoftmaxExplorer<C> {
    scorer: Arc<dyn Scorer<C>>,
    lambda: f32,
    explore: AtomicBool,
}

impl<C> SoftmaxExplorer<C> {
    pub fn new(scorer: Arc<dyn Scorer<C>>, lambda: f32) -> DecisionResult<Self> {
        if !lambda.is_finite() || lambda < 0.0 {
            return Err(DecisionError::Config(format!(
                "lambda must be finite and non-negative, got {lambda}"
            )));
        }
        Ok(Self {
            scorer,
            lambda,
            explore: AtomicBool::new(true),
        })
    }
}

/// Normalized softmax weights, stable against large scores.
///
/// `None` when some `lambda * score` is not finite.
fn softmax(scores: &[f32], lambda: f32) -> Option<Vec<f32>> {
    let scaled: Vec<f32> = scores.iter().map(|s| lambda * s).collect();
    if scaled.iter().any(|s| !s.is_finite()) {
        return None;
    }
    let max = scaled.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let weights: Vec<f32> = scaled.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    Some(weights.into_iter().map(|w| w / total).collect())
}

fn argmax(scores: &[f32]) -> usize {
    scores
        .iter()
        .enumerate()
        .fold(0, |best, (i, s)| if *s > scores[best] { i } else { best })
}

impl<C> Explorer<C> for SoftmaxExplorer<C> {
    fn map_context(&self, seed: u64, context: &C, num_actions: u32) -> DecisionResult<Decision> {
        check_num_actions(num_actions)?;
        let mut random = Prg::new(seed);

        let Some(scores) = self.scorer.scores(context, num_actions) else {
            return Ok(Decision::new(
                random.uniform_int(1, num_actions),
                1.0 / num_actions as f32,
                ExplorerState::Softmax {
                    lambda: self.lambda,
                    is_explore: true,
                },
                None,
                true,
            ));
        };
        if scores.len() != num_actions as usize || scores.iter().any(|s| !s.is_finite()) {
            return Err(DecisionError::InvalidArgument(format!(
                "scorer returned {} scores for {num_actions} actions",
                scores.len()
            )));
        }

        let best = argmax(&scores);
        if !self.explore.load(Ordering::Relaxed) {
            let action = best as u32 + 1;
            return Ok(Decision::new(
                action,
                1.0,
                ExplorerState::Softmax {
                    lambda: self.lambda,
                    is_explore: false,
                },
                Some(action),
                true,
            ));
        }

        let probabilities = softmax(&scores, self.lambda).ok_or_else(|| {
            DecisionError::InvalidArgument(format!(
                "scores scaled by lambda {} overflow",
                self.lambda
            ))
        })?;
        let draw = random.uniform_unit_interval();
        let mut cumulative = 0.0f32;
        // Rounding can leave the cumulative sum just under 1; the last
        // action with non-zero weight absorbs that remainder.
        let mut chosen = probabilities
            .iter()
            .rposition(|p| *p > 0.0)
            .unwrap_or(best);
        for (i, p) in probabilities.iter().enumerate() {
            cumulative += *p;
            if *p > 0.0 && draw < cumulative {
                chosen = i;
                break;
            }
        }

        Ok(Decision::new(
            chosen as u32 + 1,
            probabilities[chosen],
            ExplorerState::Softmax {
                lambda: self.lambda,
                is_explore: chosen != best,
            },
            Some(best as u32 + 1),
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

    struct FixedScores(Option<Vec<f32>>);

    impl Scorer<()> for FixedScores {
        fn scores(&self, _context: &(), _num_actions: u32) -> Option<Vec<f32>> {
            self.0.clone()
        }
    }

    fn explorer(scores: Option<Vec<f32>>, lambda: f32) -> SoftmaxExplorer<()> {
        SoftmaxExplorer::new(Arc::new(FixedScores(scores)), lambda).unwrap()
    }

    #[test]
    fn test_invalid_lambda_rejected() {
        let scorer: Arc<dyn Scorer<()>> = Arc::new(FixedScores(None));
        assert!(SoftmaxExplorer::new(scorer.clone(), -1.0).is_err());
        assert!(SoftmaxExplorer::new(scorer, f32::INFINITY).is_err());
    }

    #[test]
    fn test_reported_probability_matches_softmax() {
        let scores = vec![1.0, 2.0, 0.5];
        let expected = softmax(&scores, 1.5).unwrap();
        assert!((expected.iter().sum::<f32>() - 1.0).abs() < 1e-5);

        let explorer = explorer(Some(scores), 1.5);
        for i in 0..300 {
            let d = explorer
                .map_context(salted_seed("app", &i.to_string()), &(), 3)
                .unwrap();
            let p = expected[(d.action() - 1) as usize];
            assert!((d.probability() - p).abs() < 1e-6);
            assert_eq!(d.policy_action(), Some(2));
            assert_eq!(d.is_explore(), d.action() != 2);
        }
    }

    #[test]
    fn test_lambda_zero_is_uniform() {
        let explorer = explorer(Some(vec![5.0, -3.0, 0.0, 1.0]), 0.0);
        let d = explorer.map_context(9, &(), 4).unwrap();
        assert!((d.probability() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_not_ready_scorer_is_uniform() {
        let d = explorer(None, 1.0).map_context(9, &(), 5).unwrap();
        assert!((d.probability() - 0.2).abs() < 1e-6);
        assert!(d.should_record());
    }

    #[test]
    fn test_score_count_mismatch_fails() {
        let err = explorer(Some(vec![1.0, 2.0]), 1.0)
            .map_context(9, &(), 3)
            .unwrap_err();
        assert!(matches!(err, DecisionError::InvalidArgument(_)));
    }

    #[test]
    fn test_overflowing_scaled_scores_fail() {
        let err = explorer(Some(vec![1e30, 0.0]), 1e10)
            .map_context(9, &(), 2)
            .unwrap_err();
        assert!(matches!(err, DecisionError::InvalidArgument(_)));
    }

    #[test]
    fn test_overflow_ignored_when_exploration_disabled() {
        let explorer = explorer(Some(vec![1e30, 0.0]), 1e10);
        explorer.enable_explore(false);
        let d = explorer.map_context(9, &(), 2).unwrap();
        assert_eq!(d.action(), 1);
        assert_eq!(d.probability(), 1.0);
    }
}
