//! Typed rejections returned by the engine.
//!
//! Rejections are only ever sent to the connection that caused them.

use shared::{ActionType, ErrorReason, Phase, RoomCode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("invalid payload: {0}")]
    Validation(String),
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("{action} is not allowed during {phase}")]
    InvalidPhase { action: ActionType, phase: Phase },
    #[error("{action} already submitted in this phase")]
    AlreadyActed { action: ActionType },
    #[error("session {0} not found")]
    SessionNotFound(RoomCode),
    #[error("session {0} expired")]
    Expired(RoomCode),
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
    #[error("session {0} already started")]
    AlreadyStarted(RoomCode),
    #[error("session {0} is paused until the host returns")]
    Paused(RoomCode),
    #[error("internal error: {0}")]
    Internal(String),
}

impl GameError {
    pub fn validation(msg: impl Into<String>) -> Self {
        GameError::Validation(msg.into())
    }

    pub fn not_authorized(msg: impl Into<String>) -> Self {
        GameError::NotAuthorized(msg.into())
    }

    /// Wire-level reason for this rejection.
    pub fn reason(&self) -> ErrorReason {
        match self {
            GameError::Validation(_) => ErrorReason::ValidationError,
            GameError::NotAuthorized(_) => ErrorReason::NotAuthorized,
            GameError::InvalidPhase { .. } => ErrorReason::InvalidPhase,
            GameError::AlreadyActed { .. } => ErrorReason::AlreadyActed,
            GameError::SessionNotFound(_) => ErrorReason::SessionNotFound,
            GameError::Expired(_) => ErrorReason::Expired,
            GameError::CapacityExceeded(_) => ErrorReason::CapacityExceeded,
            GameError::AlreadyStarted(_) => ErrorReason::AlreadyStarted,
            GameError::Paused(_) => ErrorReason::Paused,
            GameError::Internal(_) => ErrorReason::Internal,
        }
    }
}

pub type GameResult<T> = Result<T, GameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_mapping() {
        assert_eq!(
            GameError::validation("bad wager").reason(),
            ErrorReason::ValidationError
        );
        assert_eq!(
            GameError::AlreadyActed {
                action: ActionType::Vote
            }
            .reason(),
            ErrorReason::AlreadyActed
        );
        assert_eq!(
            GameError::SessionNotFound("AB12CD".into()).reason(),
            ErrorReason::SessionNotFound
        );
    }

    #[test]
    fn test_error_message_formatting() {
        let err = GameError::InvalidPhase {
            action: ActionType::Buzz,
            phase: Phase::Board,
        };
        assert_eq!(err.to_string(), "buzz is not allowed during board");
        let err = GameError::CapacityExceeded("room is full".into());
        assert_eq!(err.to_string(), "capacity exceeded: room is full");
    }
}
