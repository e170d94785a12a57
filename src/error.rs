use std::sync::Arc;

/// Represents a result type for operations in the Split SDK core.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// crate-wide [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the SDK core.
///
/// "Not found" conditions are never errors: storage returns `None` and evaluation returns the
/// CONTROL treatment.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The shared backend (Redis) failed to execute a command.
    #[error(transparent)]
    // redis::RedisError is not clonable, so we're wrapping it in an Arc.
    Redis(Arc<redis::RedisError>),

    /// A key in the shared backend holds a value of an unexpected type.
    #[error("key {key:?} holds a value of the wrong type")]
    WrongType {
        /// Full (prefixed) key name.
        key: String,
    },

    /// A stored definition or queued record could not be (de)serialized.
    #[error(transparent)]
    Serialization(Arc<serde_json::Error>),

    /// An I/O error.
    #[error(transparent)]
    Io(Arc<std::io::Error>),

    /// Configuration passed to the SDK is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Caller-supplied key cannot be used for evaluation.
    #[error("invalid key: {0}")]
    InvalidKey(&'static str),

    /// A fetch or record collaborator failed to talk to the control plane.
    #[error("transport error: {0}")]
    Transport(String),

    /// The control plane rejected our credentials. This is not recoverable.
    #[error("unauthorized, api key is likely invalid")]
    Unauthorized,

    /// Worker pool backlog is full and the job was rejected.
    #[error("worker pool backlog is full")]
    BacklogFull,

    /// Worker pool has been shut down.
    #[error("worker pool is stopped")]
    WorkerPoolStopped,

    /// A background task thread panicked. This should normally never happen.
    #[error("background task panicked")]
    TaskPanicked,

    /// The SDK did not become ready within the requested time.
    #[error("timed out waiting for the SDK to become ready")]
    ReadyTimeout,
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<redis::RedisError> for Error {
    fn from(value: redis::RedisError) -> Self {
        Self::Redis(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(value))
    }
}
