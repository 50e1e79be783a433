//! Error types for npcraft.

use thiserror::Error;

use crate::ids::AgentId;

/// Top-level error type for npcraft operations.
#[derive(Debug, Error)]
pub enum NpcraftError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(String),

    /// The host has no entity for this id
    #[error("No host entity for agent {0}")]
    EntityMissing(AgentId),

    /// An NPC is already registered under this id
    #[error("Agent already tracked: {0}")]
    AlreadyTracked(AgentId),
}

/// Result type alias for npcraft operations.
pub type NpcraftResult<T> = Result<T, NpcraftError>;
