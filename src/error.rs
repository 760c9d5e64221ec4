use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Errors produced by the tree store, the filesystem port and the explorer.
#[derive(Debug, Error)]
pub enum TreeError {
    /// I/O errors from filesystem enumeration or terminal handling.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the filesystem watcher backend.
    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// A root or directory path that does not exist or is not a directory.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Terminal initialization or rendering errors.
    #[error("Terminal error: {0}")]
    Terminal(String),

    /// A blocking filesystem task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),

    /// The tracing subscriber could not be installed.
    #[error("Logging error: {0}")]
    Logging(String),
}

impl From<tokio::task::JoinError> for TreeError {
    fn from(err: tokio::task::JoinError) -> Self {
        TreeError::Task(err.to_string())
    }
}
