pub mod agent;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod state;

// Re-export main types for convenience
pub use agent::{AgentClient, AgentReply, HttpAgentClient, DEFAULT_SERVER_URL};
pub use config::Config;
pub use controller::{Conversation, OptionOutcome, PendingTurn};
pub use error::{AgentError, ConfigError, ExportError};
pub use export::{ExportedFile, Exporter};
pub use state::{
    ArtifactSnapshot, ChatMessage, ChatRole, DiagramArtifact, MermaidArtifact, SchemaArtifact,
    SchemaSummary,
};
