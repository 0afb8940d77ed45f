//! Error types for the SchemaForge core.

use thiserror::Error;

/// Failures talking to the schema agent backend.
///
/// The controller never distinguishes sub-causes of a failed chat call: a
/// refused connection, a 500 and an unparseable body all surface the same way.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("Agent unreachable: {0}")]
    Unreachable(String),

    #[error("Reset failed: {0}")]
    ResetFailed(String),
}

/// Failures saving an artifact to disk.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures loading the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}
