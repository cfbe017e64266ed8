//! Error Types

/// Core loader error
#[derive(Debug, thiserror::Error)]
pub enum ElemError {
    /// `Bootstrap::start` was called a second time.
    #[error("elem start called twice")]
    AlreadyStarted,

    /// A nested `require` inside an executing script found nothing.
    #[error("failed to require {reference} from {from}")]
    RequireFailed { reference: String, from: String },

    /// Malformed JSON content.
    #[error("malformed JSON in {path}: {message}")]
    Parse { path: String, message: String },

    /// The resource is still being fetched and cannot be completed in place.
    #[error("{path} is not loaded yet")]
    Pending { path: String },

    /// The build index could not be fetched.
    #[error("build index not found: {0}")]
    Index(#[source] TransportError),

    /// The manifest could not be decoded.
    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// Script execution failed.
    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// Transport failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("HTTP error: {status}")]
    Http { status: u16 },

    #[error("Network error: {0}")]
    Network(String),
}

/// Script host failure
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The script threw while running.
    #[error("{path}: {message}")]
    Thrown { path: String, message: String },

    /// The host was entered while it was already executing.
    #[error("script host entered re-entrantly while running {path}")]
    Reentrant { path: String },

    /// Host-level failure unrelated to a specific script.
    #[error("script host error: {0}")]
    Host(String),
}
