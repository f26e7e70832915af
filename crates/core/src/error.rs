use thiserror::Error;

pub type DecisionResult<T> = Result<T, DecisionError>;

#[derive(Error, Debug)]
pub enum DecisionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Recorder is required in offline mode: supply a custom recorder")]
    MissingRecorder,

    #[error("Missing capability: {0}")]
    MissingCapability(&'static str),

    #[error("Blob fetch error: {0}")]
    Fetch(String),

    #[error("Blob parse error: {0}")]
    Parse(String),

    #[error("Telemetry upload error: {0}")]
    Upload(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl DecisionError {
    /// The policy (or a fallback) produced an action outside `[1, num_actions]`.
    pub fn action_out_of_range(action: u32, num_actions: u32) -> Self {
        Self::InvalidArgument(format!(
            "action {action} chosen by policy is not within valid range [1, {num_actions}]"
        ))
    }
}
