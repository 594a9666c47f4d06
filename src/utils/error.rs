//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use crate::handlers::HandlerName;
use thiserror::Error;

/// Errors that can occur while loading a trace file
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("JSON deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to read trace: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid trace format: {0}")]
    InvalidFormat(String),
}

/// Lifecycle violations raised by a single handler.
///
/// These always indicate a caller bug, never bad trace data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("Handler {0} is not initialized")]
    NotInitialized(HandlerName),

    #[error("Handler {0} was already finalized")]
    AlreadyFinalized(HandlerName),

    #[error("Handler {0} is not finalized")]
    NotFinalized(HandlerName),

    #[error("Handler {handler} read {dependency} without declaring it in deps()")]
    UndeclaredDependency {
        handler: HandlerName,
        dependency: HandlerName,
    },

    #[error("Handler {handler} expected data from {dependency} but none was published")]
    MissingData {
        handler: HandlerName,
        dependency: HandlerName,
    },
}

/// Errors raised while building or running the handler pipeline
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Cyclic handler dependency involving: {}", format_names(.0))]
    CyclicDependency(Vec<HandlerName>),

    #[error("Handler {handler} depends on {dependency}, which is not registered")]
    MissingDependency {
        handler: HandlerName,
        dependency: HandlerName,
    },

    #[error("Handler {0} registered more than once")]
    DuplicateHandler(HandlerName),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Errors that can occur while mapping or persisting annotations
#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("Invalid event key: {0}")]
    InvalidKey(String),

    #[error("Failed to read annotations: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid annotations JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Errors that can occur while loading engine configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config TOML parse error: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

fn format_names(names: &[HandlerName]) -> String {
    names
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
