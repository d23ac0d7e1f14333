//! Phase-scoped payloads, one variant per game type.
//!
//! Ephemeral fields (votes, answers, history) are reset wholesale at every
//! round start, so clients must treat a new `GameData` as a replacement and
//! never merge it with what they had.

use crate::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub enum GameData {
    #[default]
    Lobby,
    Infiltrator(InfiltratorData),
    Jeopardy(JeopardyData),
    Predict(PredictData),
    SpeedMatch(SpeedMatchData),
}

// ---------------------------------------------------------------------------
// Infiltrator
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct InfiltratorData {
    /// Hidden from the infiltrator until the reveal.
    pub secret_word: Option<String>,
    /// Known to the host and to the infiltrator until the reveal.
    pub infiltrator_id: Option<PlayerId>,
    pub question_round: u32,
    pub total_question_rounds: u32,
    pub acks: Vec<PlayerId>,
    pub pending_question: Option<PendingQuestion>,
    pub qa_history: Vec<QaExchange>,
    /// voter -> target
    pub votes: BTreeMap<PlayerId, PlayerId>,
    pub outcome: Option<InfiltratorOutcome>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PendingQuestion {
    pub asker: PlayerId,
    pub target: PlayerId,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QaExchange {
    pub asker: PlayerId,
    pub target: Option<PlayerId>,
    pub question: String,
    pub answer: String,
    pub answered: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InfiltratorOutcome {
    pub infiltrator_id: PlayerId,
    pub plurality_target: Option<PlayerId>,
    pub infiltrator_caught: bool,
    /// The infiltrator left before the vote closed; nobody scores.
    pub infiltrator_left: bool,
    pub tally: BTreeMap<PlayerId, u32>,
}

// ---------------------------------------------------------------------------
// Jeopardy
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct JeopardyData {
    pub board: Vec<Category>,
    pub current_clue: Option<ClueRef>,
    pub buzzed_player_id: Option<PlayerId>,
    /// Players who already buzzed on the current clue.
    pub locked_out: Vec<PlayerId>,
    pub final_clue: Option<FinalClue>,
    pub wagers: BTreeMap<PlayerId, i64>,
    pub final_answers: BTreeMap<PlayerId, String>,
    /// player -> judged correct
    pub judged: BTreeMap<PlayerId, bool>,
}

impl JeopardyData {
    pub fn clue(&self, category: usize, clue: usize) -> Option<&Clue> {
        self.board.get(category).and_then(|c| c.clues.get(clue))
    }

    pub fn is_board_cleared(&self) -> bool {
        self.board
            .iter()
            .all(|category| category.clues.iter().all(|clue| clue.played))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Category {
    pub title: String,
    pub clues: Vec<Clue>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Clue {
    pub value: i64,
    pub prompt: String,
    /// Only the host sees the expected answer.
    pub answer: Option<String>,
    pub played: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ClueRef {
    pub category: usize,
    pub clue: usize,
    pub value: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FinalClue {
    pub category: String,
    pub prompt: String,
    pub answer: Option<String>,
}

// ---------------------------------------------------------------------------
// Predict
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct PredictData {
    pub prompt: String,
    pub unit: Option<String>,
    /// Hidden until results.
    pub answer: Option<f64>,
    pub predictions: BTreeMap<PlayerId, f64>,
    pub results: Vec<PredictionResult>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictionResult {
    pub player_id: PlayerId,
    pub value: f64,
    pub error: f64,
    pub points: i64,
}

// ---------------------------------------------------------------------------
// Speed Match
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SpeedMatchData {
    pub question: String,
    pub choices: Vec<String>,
    /// Hidden until the round ends.
    pub correct: Option<String>,
    pub answers: BTreeMap<PlayerId, TimedAnswer>,
    pub results: Vec<TriviaResult>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TimedAnswer {
    pub text: String,
    pub remaining_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TriviaResult {
    pub player_id: PlayerId,
    pub answer: String,
    pub correct: bool,
    pub points: i64,
}
