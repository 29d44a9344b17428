//! Error types for Git and registry clients

use std::sync::Arc;

/// Errors returned by [`GitClient`](crate::GitClient) and
/// [`RegistryClient`](crate::RegistryClient) implementations
///
/// Cloneable so a single failed fetch can be handed to every caller that
/// was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The ref, tag, image, pull request or path does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Network or backend failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Backend answered with something unusable
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Arguments could not be turned into a request
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Create not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Whether this is a [`ClientError::NotFound`]
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<Arc<ClientError>> for ClientError {
    fn from(err: Arc<ClientError>) -> Self {
        Arc::try_unwrap(err).unwrap_or_else(|shared| (*shared).clone())
    }
}

/// Result type alias for client calls
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            ClientError::not_found("ref main").to_string(),
            "not found: ref main"
        );
        assert_eq!(
            ClientError::transport("timeout").to_string(),
            "transport error: timeout"
        );
    }

    #[test]
    fn shared_errors_unwrap() {
        let shared = Arc::new(ClientError::not_found("x"));
        let other = Arc::clone(&shared);
        let err: ClientError = shared.into();
        assert!(err.is_not_found());
        assert_eq!(ClientError::from(other), ClientError::not_found("x"));
    }
}
