use axum::extract::ws::CloseFrame;
use std::borrow::Cow;

/// Application close codes sent to live-editing clients.
///
/// The numeric values are part of the wire contract: clients branch on them
/// to decide between giving up (forbidden, not found) and reconnecting with
/// backoff (server error, liveness timeout).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseReason {
    MissingCredentials = 4400,
    InvalidToken = 4401,
    Forbidden = 4403,
    NotFound = 4404,
    LivenessTimeout = 4408,
    ServerError = 4500,
}

impl CloseReason {
    pub const ALL: [CloseReason; 6] = [
        CloseReason::MissingCredentials,
        CloseReason::InvalidToken,
        CloseReason::Forbidden,
        CloseReason::NotFound,
        CloseReason::LivenessTimeout,
        CloseReason::ServerError,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn reason(self) -> &'static str {
        match self {
            CloseReason::MissingCredentials => "missing credentials",
            CloseReason::InvalidToken => "invalid token",
            CloseReason::Forbidden => "access forbidden",
            CloseReason::NotFound => "document not found",
            CloseReason::LivenessTimeout => "liveness timeout",
            CloseReason::ServerError => "server error",
        }
    }

    /// Whether a client should try to reconnect after this close.
    pub fn is_retryable(self) -> bool {
        matches!(self, CloseReason::LivenessTimeout | CloseReason::ServerError)
    }

    pub fn frame(self) -> CloseFrame<'static> {
        CloseFrame {
            code: self.code(),
            reason: Cow::Borrowed(self.reason()),
        }
    }
}
