//! Wire-level types shared by the game server and its clients.
//!
//! Everything a client needs to render a session lives here: identifiers,
//! the strongly typed [`Phase`] and [`GameType`], the per-game payload union
//! ([`GameData`]), full [`Snapshot`]s, incremental [`Delta`]s and the single
//! [`apply_delta`] reducer every client uses to stay in sync.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod action;
pub mod game_data;
pub mod protocol;
pub mod snapshot;

pub use action::{ActionKind, ActionType};
pub use game_data::{
    Category, Clue, ClueRef, FinalClue, GameData, InfiltratorData, InfiltratorOutcome,
    JeopardyData, PendingQuestion, PredictData, PredictionResult, QaExchange, SpeedMatchData,
    TimedAnswer, TriviaResult,
};
pub use protocol::{ClientMessage, ErrorReason, ServerMessage};
pub use snapshot::{apply_delta, diff, Delta, SessionField, Snapshot, Standing, SyncError};

/// Opaque identity handed to us by the identity collaborator.
pub type PlayerId = String;
/// Short human-typable session identifier.
pub type RoomCode = String;
/// Transport-level connection handle.
pub type ConnectionId = u64;

pub const ROOM_CODE_LEN: usize = 6;

/// Alphabet used when generating room codes (no 0/O or 1/I look-alikes).
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Upper bound for a single encoded datagram.
pub const MAX_DATAGRAM_SIZE: usize = 16 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GameType {
    Infiltrator,
    Jeopardy,
    Predict,
    SpeedMatch,
}

impl GameType {
    pub const ALL: [GameType; 4] = [
        GameType::Infiltrator,
        GameType::Jeopardy,
        GameType::Predict,
        GameType::SpeedMatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Infiltrator => "infiltrator",
            GameType::Jeopardy => "jeopardy",
            GameType::Predict => "predict",
            GameType::SpeedMatch => "speed_match",
        }
    }

    pub fn parse(s: &str) -> Option<GameType> {
        GameType::ALL
            .into_iter()
            .find(|g| g.as_str() == s.trim().to_ascii_lowercase())
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named state of a session. Which phases a game type may visit is decided by
/// the server's transition table.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Lobby,
    // Infiltrator
    RoleReveal,
    Questioning,
    Voting,
    Reveal,
    // Jeopardy
    Board,
    Clue,
    Buzzer,
    Answer,
    FinalWager,
    FinalAnswer,
    FinalJudging,
    // Predict
    Predicting,
    Results,
    // Speed Match
    Question,
    RoundEnd,
    Ended,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Lobby => "lobby",
            Phase::RoleReveal => "role_reveal",
            Phase::Questioning => "questioning",
            Phase::Voting => "voting",
            Phase::Reveal => "reveal",
            Phase::Board => "board",
            Phase::Clue => "clue",
            Phase::Buzzer => "buzzer",
            Phase::Answer => "answer",
            Phase::FinalWager => "final_wager",
            Phase::FinalAnswer => "final_answer",
            Phase::FinalJudging => "final_judging",
            Phase::Predicting => "predicting",
            Phase::Results => "results",
            Phase::Question => "question",
            Phase::RoundEnd => "round_end",
            Phase::Ended => "ended",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Host,
    Player,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub connection_id: Option<ConnectionId>,
    pub name: String,
    pub avatar_url: Option<String>,
    pub score: i64,
    pub role: Role,
    pub is_connected: bool,
    /// Milliseconds since the unix epoch.
    pub joined_at: u64,
    /// Sequence number of the mutation that last changed the score; the
    /// earlier a player reached their final score the better they rank.
    pub score_reached_at: u64,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>, role: Role, joined_at: u64) -> Self {
        Self {
            id: id.into(),
            connection_id: None,
            name: name.into(),
            avatar_url: None,
            score: 0,
            role,
            is_connected: true,
            joined_at,
            score_reached_at: 0,
        }
    }

    pub fn is_participant(&self) -> bool {
        self.role == Role::Player
    }
}

/// Current wall clock in milliseconds since the unix epoch.
pub fn now_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    millis.min(u64::MAX as u128) as u64
}

/// Upper-cases and trims user input; returns `None` unless the result is a
/// six character alphanumeric code.
pub fn normalize_room_code(input: &str) -> Option<RoomCode> {
    let code = input.trim().to_ascii_uppercase();
    if code.len() == ROOM_CODE_LEN && code.bytes().all(|b| b.is_ascii_alphanumeric()) {
        Some(code)
    } else {
        None
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(value)
}

pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}
