//! Message envelope exchanged over a persistent bidirectional connection.

use crate::action::ActionKind;
use crate::snapshot::{Delta, Snapshot, Standing};
use crate::{GameType, PlayerId, RoomCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ClientMessage {
    CreateSession {
        game_type: GameType,
        player_id: PlayerId,
        name: String,
        avatar_url: Option<String>,
    },
    JoinSession {
        room_code: RoomCode,
        player_id: PlayerId,
        name: String,
        avatar_url: Option<String>,
    },
    Reconnect {
        room_code: RoomCode,
        player_id: PlayerId,
    },
    Action {
        room_code: RoomCode,
        action: ActionKind,
    },
    /// Sent after a sequence gap; answered with a fresh `State`.
    RequestSnapshot {
        room_code: RoomCode,
    },
    Leave {
        room_code: RoomCode,
    },
    Heartbeat,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ServerMessage {
    Created { room_code: RoomCode },
    /// Full replacement; the snapshot carries its own sequence number.
    State { snapshot: Snapshot },
    Delta(Delta),
    RoundStart(Delta),
    RoundEnd(Delta),
    Ended { delta: Delta, standings: Vec<Standing> },
    Error { reason: ErrorReason, message: String },
}

impl ServerMessage {
    /// Sequence number carried by the message, if any.
    pub fn sequence(&self) -> Option<u64> {
        match self {
            ServerMessage::State { snapshot } => Some(snapshot.sequence),
            ServerMessage::Delta(delta)
            | ServerMessage::RoundStart(delta)
            | ServerMessage::RoundEnd(delta)
            | ServerMessage::Ended { delta, .. } => Some(delta.sequence),
            ServerMessage::Created { .. } | ServerMessage::Error { .. } => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorReason {
    ValidationError,
    NotAuthorized,
    InvalidPhase,
    AlreadyActed,
    SessionNotFound,
    Expired,
    CapacityExceeded,
    AlreadyStarted,
    Paused,
    /// This connection's binding was replaced by a newer one.
    Superseded,
    Malformed,
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, encode};

    #[test]
    fn test_client_action_serialization() {
        let msg = ClientMessage::Action {
            room_code: "AB12CD".to_string(),
            action: ActionKind::Vote {
                target: "p3".to_string(),
            },
        };
        let bytes = encode(&msg).unwrap();
        let decoded: ClientMessage = decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_error_message_has_no_sequence() {
        let msg = ServerMessage::Error {
            reason: ErrorReason::AlreadyActed,
            message: "vote already submitted".to_string(),
        };
        assert_eq!(msg.sequence(), None);
    }

    #[test]
    fn test_delta_sequence_exposed() {
        let delta = Delta {
            room_code: "AB12CD".to_string(),
            sequence: 12,
            changes: vec![],
            timestamp: 99,
        };
        assert_eq!(ServerMessage::RoundEnd(delta.clone()).sequence(), Some(12));
        assert_eq!(
            ServerMessage::Ended {
                delta,
                standings: vec![]
            }
            .sequence(),
            Some(12)
        );
    }

    #[test]
    fn test_truncated_message_fails_to_decode() {
        let msg = ClientMessage::JoinSession {
            room_code: "AB12CD".to_string(),
            player_id: "p1".to_string(),
            name: "Ada".to_string(),
            avatar_url: None,
        };
        let bytes = encode(&msg).unwrap();
        let result: Result<ClientMessage, _> = decode(&bytes[..bytes.len() / 2]);
        assert!(result.is_err());
    }
}
