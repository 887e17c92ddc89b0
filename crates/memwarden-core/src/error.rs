use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemwardenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Cleanup action {action} failed: {message}")]
    Action { action: String, message: String },

    #[error("Platform error: {0}")]
    Platform(String),
}

impl MemwardenError {
    pub fn action(action: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Action {
            action: action.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MemwardenError>;
