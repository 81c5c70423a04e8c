//! Error handling for framechain
//!
//! This module defines the crate error type and a Result alias for use
//! throughout the library. Absence of data is never an error: it travels
//! through tapes as [`Artifact::Absent`](crate::pipeline::Artifact::Absent).
//! Everything here is either a configuration error surfaced at `start()`
//! time or an I/O failure at an isolation boundary.

use thiserror::Error;

/// Main error type for framechain operations
#[derive(Error, Debug)]
pub enum FrameChainError {
    /// Invalid constructor or file configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stage that requires a predecessor was started without one
    #[error("Stage '{stage}' requires a previous stage")]
    MissingPredecessor { stage: String },

    /// A tape position that does not exist
    #[error("Invalid tape index {index} for tape of length {len}")]
    InvalidIndex { index: isize, len: usize },

    /// Failure to launch or talk to an isolated worker process
    #[error("Isolation error: {0}")]
    Isolation(String),

    /// Malformed or unexpected frame on the worker protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Image decoding/encoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Lifecycle misuse, e.g. starting a stage twice
    #[error("Already started: {0}")]
    AlreadyStarted(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FrameChainError>,
    },
}

impl FrameChainError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FrameChainError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True for errors that indicate a wiring/configuration mistake rather
    /// than a runtime failure.
    pub fn is_config(&self) -> bool {
        match self {
            FrameChainError::Config(_)
            | FrameChainError::MissingPredecessor { .. }
            | FrameChainError::InvalidIndex { .. } => true,
            FrameChainError::WithContext { source, .. } => source.is_config(),
            _ => false,
        }
    }
}

impl From<postcard::Error> for FrameChainError {
    fn from(err: postcard::Error) -> Self {
        FrameChainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for FrameChainError {
    fn from(err: serde_json::Error) -> Self {
        FrameChainError::Serialization(err.to_string())
    }
}

/// Result type alias for framechain operations
pub type Result<T> = std::result::Result<T, FrameChainError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
