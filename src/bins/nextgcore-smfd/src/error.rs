//! SMF Error types

use ogs_ipfw::IpfwError;
use thiserror::Error;

use crate::context::SessId;

/// How a failure affects the rest of the current operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A precondition the caller must uphold was broken
    ContractViolation,
    /// The current rule and every later rule in the batch are abandoned
    AbortBatch,
    /// Failures outside rule processing (config, I/O, lookups)
    Other,
}

/// SMF Error type
#[derive(Error, Debug)]
pub enum SmfError {
    /// Broken invariant between the policy layer and the session store
    #[error("Invariant violated: {0}")]
    InvariantViolated(String),

    /// Flow description did not compile
    #[error("Packet filter compile failed: {0}")]
    PacketFilter(#[from] IpfwError),

    /// Message payload could not be built
    #[error("Build failed: {0}")]
    Build(String),

    /// Transaction create/update/commit failed
    #[error("Transaction failed: {0}")]
    Xact(String),

    /// No free EBI, bearer slot or packet filter identifier
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Session id did not resolve
    #[error("Session not found: {0}")]
    SessionNotFound(SessId),

    /// Incoming message could not be parsed
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SmfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SmfError::InvariantViolated(_) => ErrorKind::ContractViolation,
            SmfError::PacketFilter(_)
            | SmfError::Build(_)
            | SmfError::Xact(_)
            | SmfError::ResourceExhausted(_) => ErrorKind::AbortBatch,
            SmfError::SessionNotFound(_)
            | SmfError::Malformed(_)
            | SmfError::Config(_)
            | SmfError::Io(_) => ErrorKind::Other,
        }
    }

    pub fn is_contract_violation(&self) -> bool {
        self.kind() == ErrorKind::ContractViolation
    }
}

/// Result type for SMF operations
pub type SmfResult<T> = Result<T, SmfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        assert_eq!(
            SmfError::InvariantViolated("x".into()).kind(),
            ErrorKind::ContractViolation
        );
        assert_eq!(
            SmfError::from(IpfwError::InvalidPort("x".into())).kind(),
            ErrorKind::AbortBatch
        );
        assert_eq!(SmfError::Build("x".into()).kind(), ErrorKind::AbortBatch);
        assert_eq!(SmfError::SessionNotFound(SessId(7)).kind(), ErrorKind::Other);
    }

    #[test]
    fn test_error_display() {
        let err = SmfError::SessionNotFound(SessId(7));
        assert_eq!(err.to_string(), "Session not found: sess#7");
    }
}
