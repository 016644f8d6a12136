//! Error taxonomy of the relay.
//!
//! Handshake errors ([`AuthError`], [`AccessError`]) end the connection with a
//! close code. [`ProtocolError`] only drops the offending frame.
//! [`StorageError`] is retried by the persistence scheduler and never reaches
//! clients.

use thiserror::Error;

use super::close_code::CloseReason;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token is not a user token")]
    NotAUser,

    #[error("authentication is not configured")]
    NotConfigured,
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("document not found")]
    NotFound,

    #[error("access forbidden")]
    Forbidden,

    #[error("access check unavailable: {0}")]
    Unavailable(String),
}

/// Failure of the CRDT capability to decode or encode state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CrdtError {
    #[error("failed to apply update: {0}")]
    Apply(String),

    #[error("failed to encode state: {0}")]
    Encode(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("could not encode document state: {0}")]
    Encode(#[from] CrdtError),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// A frame that could not be relayed. The connection stays open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] CrdtError),

    #[error("connection has read-only access")]
    ReadOnly,

    #[error("connection is not a member of the room")]
    NotMember,
}

/// Errors that end a connection during the handshake or join.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Crdt(#[from] CrdtError),

    #[error("room is shutting down")]
    RoomClosed,

    #[error("connection closed before it joined")]
    ConnectionGone,
}

impl RelayError {
    pub fn close_reason(&self) -> CloseReason {
        match self {
            RelayError::Auth(AuthError::Missing) => CloseReason::MissingCredentials,
            RelayError::Auth(AuthError::NotConfigured) => CloseReason::ServerError,
            RelayError::Auth(_) => CloseReason::InvalidToken,
            RelayError::Access(AccessError::NotFound) => CloseReason::NotFound,
            RelayError::Access(AccessError::Forbidden) => CloseReason::Forbidden,
            RelayError::Access(AccessError::Unavailable(_)) => CloseReason::ServerError,
            RelayError::Storage(_)
            | RelayError::Crdt(_)
            | RelayError::RoomClosed
            | RelayError::ConnectionGone => CloseReason::ServerError,
        }
    }
}
