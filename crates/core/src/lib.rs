pub mod config;
pub mod error;
pub mod policy;
pub mod types;

pub use config::{BatchConfig, JoinServerType, PollPeriod, RetryExhaustedPolicy, ServiceConfig};
pub use error::{DecisionError, DecisionResult};
pub use policy::{ConstantPolicy, Policy, PolicySlot, Scorer, SwappablePolicy};
pub use types::{Action, Decision, ExplorerState};
