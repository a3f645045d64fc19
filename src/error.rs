use thiserror::Error;
use std::io;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MemberlistError {
    /// The node watch subscription could not be established
    #[error("Watch init error: {0}")]
    WatchInit(String),

    #[error("Memberlist not found: {0}")]
    NotFound(String),

    #[error("Transient read error: {0}")]
    TransientRead(String),

    /// The stored version moved between our read and our write
    #[error("Version conflict: {0}")]
    Conflict(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Kubernetes error: {0}")]
    Kube(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("YAML error: {0}")]
    Yaml(String),
}

pub type Result<T> = std::result::Result<T, MemberlistError>;

impl MemberlistError {
    pub fn watch_init(msg: impl Into<String>) -> Self {
        MemberlistError::WatchInit(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        MemberlistError::Decode(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        MemberlistError::State(msg.into())
    }

    /// Whether a failed reconciliation cycle should be retried with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MemberlistError::NotFound(_)
                | MemberlistError::TransientRead(_)
                | MemberlistError::Conflict(_)
                | MemberlistError::Write(_)
                | MemberlistError::Kube(_)
        )
    }
}

impl From<io::Error> for MemberlistError {
    fn from(e: io::Error) -> Self {
        MemberlistError::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for MemberlistError {
    fn from(e: serde_yaml::Error) -> Self {
        MemberlistError::Yaml(e.to_string())
    }
}

impl From<kube::Error> for MemberlistError {
    fn from(e: kube::Error) -> Self {
        MemberlistError::Kube(e.to_string())
    }
}

impl From<ctrlc::Error> for MemberlistError {
    fn from(e: ctrlc::Error) -> Self {
        MemberlistError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(MemberlistError::Conflict("v1".into()).is_retryable());
        assert!(MemberlistError::TransientRead("timeout".into()).is_retryable());
        assert!(MemberlistError::NotFound("worker-memberlist".into()).is_retryable());
        assert!(!MemberlistError::watch_init("forbidden").is_retryable());
        assert!(!MemberlistError::decode("missing url").is_retryable());
    }
}
