//! decision-sim: drives an offline decision service with synthetic traffic
//! and logs the resulting action distribution and average reward.

use clap::{Parser, ValueEnum};
use decision_service::{
    Action, ConstantPolicy, Decision, DecisionServiceBuilder, Policy, Recorder, Scorer,
    ServiceConfig,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    EpsilonGreedy,
    TauFirst,
    Softmax,
}

#[derive(Parser, Debug)]
#[command(name = "decision-sim")]
#[command(about = "Run synthetic traffic through an offline decision service")]
#[command(version)]
struct Cli {
    /// Exploration strategy
    #[arg(long, value_enum, default_value_t = Strategy::EpsilonGreedy)]
    strategy: Strategy,

    /// Number of decisions to make
    #[arg(long, default_value_t = 10_000)]
    decisions: u32,

    /// Number of actions per decision (overrides config)
    #[arg(long, env = "DECISION_SERVICE__DEFAULT_NUM_ACTIONS")]
    actions: Option<u32>,

    #[arg(long, default_value_t = 0.2)]
    epsilon: f32,

    #[arg(long, default_value_t = 500)]
    tau: u32,

    #[arg(long, default_value_t = 2.0)]
    lambda: f32,

    /// Serve a constant fallback until this many decisions have been made,
    /// then install the trained policy.
    #[arg(long)]
    model_after: Option<u32>,

    /// Seed for the synthetic users and rewards
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

#[derive(Debug, Clone, Serialize)]
struct SimContext {
    user_id: u32,
    segment: u32,
}

/// The action users of a segment respond to.
fn preferred_action(segment: u32, num_actions: u32) -> Action {
    segment % num_actions + 1
}

struct SegmentScorer;

impl Scorer<SimContext> for SegmentScorer {
    fn scores(&self, context: &SimContext, num_actions: u32) -> Option<Vec<f32>> {
        let best = preferred_action(context.segment, num_actions);
        Some(
            (1..=num_actions)
                .map(|a| if a == best { 1.0 } else { 0.0 })
                .collect(),
        )
    }
}

/// Tallies everything it is handed.
struct TallyRecorder {
    chosen: Mutex<Vec<u64>>,
    explored: Mutex<u64>,
    rewards: Mutex<(f64, u64)>,
}

impl TallyRecorder {
    fn new(num_actions: u32) -> Self {
        Self {
            chosen: Mutex::new(vec![0; num_actions as usize]),
            explored: Mutex::new(0),
            rewards: Mutex::new((0.0, 0)),
        }
    }
}

impl Recorder<SimContext> for TallyRecorder {
    fn record(&self, _context: &SimContext, decision: &Decision, _unique_key: &str) {
        if let Some(slot) = self.chosen.lock().get_mut(decision.action() as usize - 1) {
            *slot += 1;
        }
        if decision.is_explore() {
            *self.explored.lock() += 1;
        }
    }

    fn report_reward(&self, reward: f32, _unique_key: &str) {
        let mut rewards = self.rewards.lock();
        rewards.0 += reward as f64;
        rewards.1 += 1;
    }

    fn report_outcome(&self, _outcome: &serde_json::Value, _unique_key: &str) {}

    fn close(&self) {
        let (total, count) = *self.rewards.lock();
        let chosen = self.chosen.lock().clone();
        let explored = *self.explored.lock();
        info!(
            recorded = ?chosen,
            explored,
            average_reward = if count == 0 { 0.0 } else { total / count as f64 },
            "Simulation summary"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "decision_sim=info,decision_service=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = ServiceConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        ServiceConfig::new("decision-sim")
    });
    config.offline_mode = true;
    if config.authorization_token.trim().is_empty() {
        config.authorization_token = "decision-sim".to_string();
    }
    if let Some(actions) = cli.actions {
        config.default_num_actions = actions;
    }
    if config.application_key.is_none() {
        config.application_key = Some(format!("decision-sim-{}", cli.seed));
    }
    let num_actions = config.default_num_actions;

    info!(
        strategy = ?cli.strategy,
        decisions = cli.decisions,
        num_actions,
        "Starting simulation"
    );

    let recorder = Arc::new(TallyRecorder::new(num_actions));
    let trained: Arc<dyn Policy<SimContext>> =
        Arc::new(move |ctx: &SimContext| Some(preferred_action(ctx.segment, num_actions)));

    let mut builder =
        DecisionServiceBuilder::<SimContext>::new(config).with_recorder(recorder.clone());
    builder = match cli.strategy {
        Strategy::EpsilonGreedy => builder.with_epsilon_greedy(cli.epsilon),
        Strategy::TauFirst => builder.with_tau_first(cli.tau),
        Strategy::Softmax => builder.with_softmax(Arc::new(SegmentScorer), cli.lambda),
    };
    builder = match cli.model_after {
        Some(_) => builder.exploit_until_model_ready(Arc::new(ConstantPolicy::default())),
        None => builder.with_initial_policy(trained.clone()),
    };
    let slot = builder.policy_slot();
    let service = builder.start()?;

    let mut rng = StdRng::seed_from_u64(cli.seed);
    let mut matched = 0u64;
    for i in 0..cli.decisions {
        if cli.model_after == Some(i) {
            slot.install(trained.clone());
            info!(after = i, "Installed trained policy");
        }

        let context = SimContext {
            user_id: i,
            segment: rng.gen_range(0..8),
        };
        let key = format!("sim-{i}");
        let action = service.choose_action(&key, &context)?;

        let hit = action == preferred_action(context.segment, num_actions);
        if hit {
            matched += 1;
        }
        let p = if hit { 0.8 } else { 0.1 };
        let reward = if rng.gen_bool(p) { 1.0 } else { 0.0 };
        service.report_reward(reward, &key);
    }

    info!(matched, decisions = cli.decisions, "Traffic complete");
    service.stop().await;
    Ok(())
}
