//! Error types for the sandbox sync engine.

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for the sandbox sync engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// No remote session is attached
    #[error("Not connected to a sandbox session")]
    NotConnected,

    /// Remote filesystem errors
    #[error("Remote error: {0}")]
    Remote(String),

    /// Not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Identifier mapping errors
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Change-stream errors
    #[error("Watch error: {0}")]
    Watch(String),

    /// Operation the remote store does not provide
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Wrapped anyhow errors for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Create a new remote error
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new mapping error
    pub fn mapping(msg: impl Into<String>) -> Self {
        Self::Mapping(msg.into())
    }

    /// Create a new watch error
    pub fn watch(msg: impl Into<String>) -> Self {
        Self::Watch(msg.into())
    }

    /// Create a new unsupported-operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error means no session was attached
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::not_found("File", "app/page.tsx");
        assert_eq!(err.to_string(), "Not found: File with id app/page.tsx");
        assert!(err.is_not_found());

        let err = SyncError::remote("connection reset");
        assert_eq!(err.to_string(), "Remote error: connection reset");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_connected() {
        assert!(SyncError::NotConnected.is_not_connected());
        assert!(!SyncError::internal("x").is_not_connected());
    }

    #[test]
    fn test_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SyncError = io.into();
        assert!(matches!(err, SyncError::Io(_)));
    }
}
