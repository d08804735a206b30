//! Registry error types

use thiserror::Error;

/// Error type for roster operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A live session already uses the supplied id
    #[error("session id {0} is already registered")]
    DuplicateIdentity(String),

    /// The referenced session is not in the roster
    #[error("session {0} not found")]
    SessionNotFound(String),
}
