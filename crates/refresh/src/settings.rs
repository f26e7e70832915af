use serde::{Deserialize, Serialize};

/// Application settings blob published alongside the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSettings {
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub train_arguments: Option<String>,
    #[serde(default)]
    pub initial_exploration_epsilon: Option<f32>,
    #[serde(default = "default_explore_enabled")]
    pub explore_enabled: bool,
}

fn default_explore_enabled() -> bool {
    true
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            model_id: None,
            train_arguments: None,
            initial_exploration_epsilon: None,
            explore_enabled: default_explore_enabled(),
        }
    }
}

impl ApplicationSettings {
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
