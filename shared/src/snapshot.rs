//! Full snapshots, top-level deltas and the shared client reducer.

use crate::action::ActionType;
use crate::game_data::GameData;
use crate::{GameType, Phase, Player, PlayerId, RoomCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Complete, authoritative state of a session as seen by one viewer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Snapshot {
    pub room_code: RoomCode,
    pub game_type: GameType,
    pub phase: Phase,
    /// Join order.
    pub players: Vec<Player>,
    pub host_id: PlayerId,
    pub round_index: u32,
    pub total_rounds: u32,
    pub game_data: GameData,
    pub paused: bool,
    /// Milliseconds since the unix epoch, `None` for unbounded phases.
    pub phase_deadline: Option<u64>,
    /// What this viewer may submit right now.
    pub legal_actions: Vec<ActionType>,
    pub sequence: u64,
}

impl Snapshot {
    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }
}

/// One replaced top-level field. Nested payloads are always replaced whole.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum SessionField {
    Phase(Phase),
    Players(Vec<Player>),
    HostId(PlayerId),
    RoundIndex(u32),
    TotalRounds(u32),
    GameData(GameData),
    Paused(bool),
    PhaseDeadline(Option<u64>),
    LegalActions(Vec<ActionType>),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Delta {
    pub room_code: RoomCode,
    pub sequence: u64,
    pub changes: Vec<SessionField>,
    pub timestamp: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Standing {
    pub rank: u32,
    pub player_id: PlayerId,
    pub name: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The delta skipped at least one sequence number; a fresh snapshot is needed.
    #[error("sequence gap: expected {expected}, received {received}")]
    SequenceGap { expected: u64, received: u64 },
    /// The delta is older than (or equal to) what is already applied.
    #[error("stale delta {received} (at {current})")]
    Stale { current: u64, received: u64 },
    #[error("delta for room {received} applied to {expected}")]
    WrongSession { expected: RoomCode, received: RoomCode },
}

/// Minimal set of changed top-level fields between two views of a session.
pub fn diff(prev: &Snapshot, next: &Snapshot) -> Vec<SessionField> {
    let mut changes = Vec::new();

    if prev.phase != next.phase {
        changes.push(SessionField::Phase(next.phase));
    }
    if prev.players != next.players {
        changes.push(SessionField::Players(next.players.clone()));
    }
    if prev.host_id != next.host_id {
        changes.push(SessionField::HostId(next.host_id.clone()));
    }
    if prev.round_index != next.round_index {
        changes.push(SessionField::RoundIndex(next.round_index));
    }
    if prev.total_rounds != next.total_rounds {
        changes.push(SessionField::TotalRounds(next.total_rounds));
    }
    if prev.game_data != next.game_data {
        changes.push(SessionField::GameData(next.game_data.clone()));
    }
    if prev.paused != next.paused {
        changes.push(SessionField::Paused(next.paused));
    }
    if prev.phase_deadline != next.phase_deadline {
        changes.push(SessionField::PhaseDeadline(next.phase_deadline));
    }
    if prev.legal_actions != next.legal_actions {
        changes.push(SessionField::LegalActions(next.legal_actions.clone()));
    }

    changes
}

/// The one reducer every client runs: `(state, delta) -> state'`.
///
/// Only `sequence + 1` is accepted. Anything further ahead is a gap and the
/// caller must fetch a fresh snapshot instead of guessing.
pub fn apply_delta(snapshot: &Snapshot, delta: &Delta) -> Result<Snapshot, SyncError> {
    if snapshot.room_code != delta.room_code {
        return Err(SyncError::WrongSession {
            expected: snapshot.room_code.clone(),
            received: delta.room_code.clone(),
        });
    }
    if delta.sequence <= snapshot.sequence {
        return Err(SyncError::Stale {
            current: snapshot.sequence,
            received: delta.sequence,
        });
    }
    if delta.sequence != snapshot.sequence + 1 {
        return Err(SyncError::SequenceGap {
            expected: snapshot.sequence + 1,
            received: delta.sequence,
        });
    }

    let mut next = snapshot.clone();
    for change in &delta.changes {
        match change {
            SessionField::Phase(phase) => next.phase = *phase,
            SessionField::Players(players) => next.players = players.clone(),
            SessionField::HostId(id) => next.host_id = id.clone(),
            SessionField::RoundIndex(i) => next.round_index = *i,
            SessionField::TotalRounds(n) => next.total_rounds = *n,
            SessionField::GameData(data) => next.game_data = data.clone(),
            SessionField::Paused(paused) => next.paused = *paused,
            SessionField::PhaseDeadline(deadline) => next.phase_deadline = *deadline,
            SessionField::LegalActions(actions) => next.legal_actions = actions.clone(),
        }
    }
    next.sequence = delta.sequence;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    fn base() -> Snapshot {
        Snapshot {
            room_code: "AB12CD".to_string(),
            game_type: GameType::Predict,
            phase: Phase::Lobby,
            players: vec![Player::new("host", "Host", Role::Host, 1)],
            host_id: "host".to_string(),
            round_index: 0,
            total_rounds: 3,
            game_data: GameData::Lobby,
            paused: false,
            phase_deadline: None,
            legal_actions: vec![ActionType::StartGame, ActionType::EndGame],
            sequence: 4,
        }
    }

    #[test]
    fn test_diff_of_identical_views_is_empty() {
        let a = base();
        assert!(diff(&a, &a.clone()).is_empty());
    }

    #[test]
    fn test_diff_reports_only_changed_fields() {
        let a = base();
        let mut b = a.clone();
        b.phase = Phase::Predicting;
        b.round_index = 1;
        let changes = diff(&a, &b);
        assert_eq!(
            changes,
            vec![SessionField::Phase(Phase::Predicting), SessionField::RoundIndex(1)]
        );
    }

    #[test]
    fn test_apply_next_delta() {
        let a = base();
        let mut b = a.clone();
        b.players
            .push(Player::new("p1", "Ada", Role::Player, 2));
        b.sequence = 5;
        let delta = Delta {
            room_code: a.room_code.clone(),
            sequence: 5,
            changes: diff(&a, &b),
            timestamp: 0,
        };
        assert_eq!(apply_delta(&a, &delta).unwrap(), b);
    }

    #[test]
    fn test_gap_is_rejected() {
        let a = base();
        let delta = Delta {
            room_code: a.room_code.clone(),
            sequence: 7,
            changes: vec![SessionField::Paused(true)],
            timestamp: 0,
        };
        let error = apply_delta(&a, &delta).unwrap_err();
        assert_eq!(
            error,
            SyncError::SequenceGap {
                expected: 5,
                received: 7
            }
        );
        let boxed: Box<dyn std::error::Error> = Box::new(error);
        assert_eq!(boxed.to_string(), "sequence gap: expected 5, received 7");
    }

    #[test]
    fn test_stale_and_duplicate_are_rejected() {
        let a = base();
        for seq in [3, 4] {
            let delta = Delta {
                room_code: a.room_code.clone(),
                sequence: seq,
                changes: vec![],
                timestamp: 0,
            };
            assert!(matches!(
                apply_delta(&a, &delta),
                Err(SyncError::Stale { .. })
            ));
        }
    }

    #[test]
    fn test_wrong_room_is_rejected() {
        let a = base();
        let delta = Delta {
            room_code: "ZZZZZZ".to_string(),
            sequence: 5,
            changes: vec![],
            timestamp: 0,
        };
        assert!(matches!(
            apply_delta(&a, &delta),
            Err(SyncError::WrongSession { .. })
        ));
    }

    #[test]
    fn test_empty_delta_still_advances_sequence() {
        let a = base();
        let delta = Delta {
            room_code: a.room_code.clone(),
            sequence: 5,
            changes: vec![],
            timestamp: 0,
        };
        let next = apply_delta(&a, &delta).unwrap();
        assert_eq!(next.sequence, 5);
        assert_eq!(next.phase, a.phase);
    }
}
