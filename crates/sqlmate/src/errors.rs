use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failures of a single tool invocation. These never abort a conversation: the
/// tool executor folds them into the text fed back to the model.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// The failure description without the variant prefix
    pub fn detail(&self) -> &str {
        match self {
            AgentError::ToolNotFound(detail)
            | AgentError::ExecutionError(detail)
            | AgentError::Internal(detail) => detail,
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Failures of the process boundary to the tool provider. Fatal to the current run.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Handshake with the tool provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to start the tool provider `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Handshake with the tool provider failed: {0}")]
    Handshake(String),

    #[error("Tool provider transport failed: {0}")]
    Transport(String),

    #[error("Tool provider returned error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("Tool provider session is closed")]
    Closed,
}

impl SessionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Timeout(_))
    }
}

/// Required configuration is missing or malformed. Raised before any session work.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// A message role arrived as a string nobody recognizes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unrecognized message role: {role}")]
pub struct MappingError {
    pub role: String,
}

/// Convert a dotted configuration key into the environment variable that sets it
pub fn to_env_var(field: &str) -> String {
    format!("SQLMATE_{}", field.replace('.', "__").to_uppercase())
}
