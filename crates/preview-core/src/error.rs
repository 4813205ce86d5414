//! Error types for the preview control protocol.

use thiserror::Error;

/// Boxed error returned by remote collaborators (same shape as skill errors).
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("config: {0}")]
    Config(#[from] config::ConfigError),

    #[error("render surface is closed")]
    SurfaceClosed,

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("invalid element patch: {0}")]
    InvalidPatch(String),

    #[error("unknown intent: {0}")]
    UnknownIntent(String),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

/// Page synthesis failure. Cloneable so every coalesced waiter receives the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("page generation failed: {0}")]
    Generator(String),

    #[error("page generator returned no content for '{0}'")]
    EmptyContent(String),
}

pub type Result<T> = std::result::Result<T, PreviewError>;
