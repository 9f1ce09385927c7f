//! Error types for searchctl

/// Result type alias for searchctl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for searchctl
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Metadata store (etcd) errors
    #[error("store error: {0}")]
    Store(#[from] etcd_client::Error),
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),
    /// Invalid request from a caller (empty cluster id, empty index name, ...)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Index not found
    #[error("index not found: {0}")]
    IndexNotFound(String),
    /// Operation attempted while not holding leadership
    #[error("not the leader for this cluster")]
    NotLeader,
    /// Store operation exceeded its per-call timeout
    #[error("store operation timed out")]
    Timeout,
    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short kind label carried on user-visible failures. Internal store
    /// details never leak past this.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Store(_) => "store_unavailable",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::InvalidRequest(_) => "invalid_request",
            Error::IndexNotFound(_) => "index_not_found",
            Error::NotLeader => "not_leader",
            Error::Timeout => "timeout",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
