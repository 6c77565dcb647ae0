/// Stackline error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid arguments or out-of-range positions
    #[error("{0}")]
    Usage(String),

    /// Repository or stack state prevents the operation
    #[error("{0}")]
    State(String),

    /// Stack, branch, or pull request not found
    #[error("{0}")]
    NotFound(String),

    /// Duplicate branch or stack
    #[error("{0}")]
    Conflict(String),

    /// A git invocation exited non-zero
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    /// The forge API answered with a non-success status
    #[error("forge API error ({status}): {message}")]
    Forge { status: u16, message: String },

    /// Snapshot capture or restore failed
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Forge authentication errors
    #[error("authentication error: {0}")]
    Auth(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn usage<S: Into<String>>(msg: S) -> Self {
        Error::Usage(msg.into())
    }

    pub fn state<S: Into<String>>(msg: S) -> Self {
        Error::State(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Error::Conflict(msg.into())
    }

    pub fn git<C: Into<String>, E: Into<String>>(command: C, stderr: E) -> Self {
        Error::Git {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    pub fn forge<S: Into<String>>(status: u16, message: S) -> Self {
        Error::Forge {
            status,
            message: message.into(),
        }
    }

    pub fn snapshot<S: Into<String>>(msg: S) -> Self {
        Error::Snapshot(msg.into())
    }

    pub fn auth<S: Into<String>>(msg: S) -> Self {
        Error::Auth(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
