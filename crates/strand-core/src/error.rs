use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrandError {
    // Coercion errors
    #[error("Expected a runnable, callable or map; got unsupported type: {type_name}")]
    UnsupportedInvocableType { type_name: String },

    // Invocation errors
    #[error(
        "No synchronous function provided to \"{name}\". \
         Either initialize with a synchronous function or invoke via the async API"
    )]
    NoSynchronousImplementation { name: String },

    #[error("Invocation failed: {name}: {message}")]
    Invocation { name: String, message: String },

    #[error("Recursion limit reached while resolving the output of {name}")]
    RecursionLimit { name: String },

    #[error("Task failed to complete: {0}")]
    TaskJoin(String),

    #[error("Output is not a plain value: {0}")]
    UnresolvedOutput(String),

    // Graph errors
    #[error("Edge references a missing node: {from} -> {to}")]
    DanglingEdge { from: String, to: String },

    #[error("Node already exists: {0}")]
    DuplicateNode(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StrandError {
    /// Build an invocation failure for the implementation called `name`.
    pub fn invocation(name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Invocation {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StrandError>;
