//! Inbound player and host actions.

use crate::PlayerId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An action type together with its payload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ActionKind {
    // Host authority
    StartGame,
    SelectClue { category: usize, clue: usize },
    OpenBuzzer,
    /// `player_id` is only needed while judging Final answers.
    JudgeAnswer { player_id: Option<PlayerId>, correct: bool },
    Advance,
    EndGame,

    // Participants
    Ack,
    Buzz,
    Vote { target: PlayerId },
    Question { target: PlayerId, text: String },
    Answer { text: String },
    Predict { value: f64 },
    FinalWager { amount: i64 },
    FinalAnswer { text: String },
}

impl ActionKind {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionKind::StartGame => ActionType::StartGame,
            ActionKind::SelectClue { .. } => ActionType::SelectClue,
            ActionKind::OpenBuzzer => ActionType::OpenBuzzer,
            ActionKind::JudgeAnswer { .. } => ActionType::JudgeAnswer,
            ActionKind::Advance => ActionType::Advance,
            ActionKind::EndGame => ActionType::EndGame,
            ActionKind::Ack => ActionType::Ack,
            ActionKind::Buzz => ActionType::Buzz,
            ActionKind::Vote { .. } => ActionType::Vote,
            ActionKind::Question { .. } => ActionType::Question,
            ActionKind::Answer { .. } => ActionType::Answer,
            ActionKind::Predict { .. } => ActionType::Predict,
            ActionKind::FinalWager { .. } => ActionType::FinalWager,
            ActionKind::FinalAnswer { .. } => ActionType::FinalAnswer,
        }
    }
}

/// Payload-free discriminant of [`ActionKind`], used for whitelists and dedup.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionType {
    StartGame,
    SelectClue,
    OpenBuzzer,
    JudgeAnswer,
    Advance,
    EndGame,
    Ack,
    Buzz,
    Vote,
    Question,
    Answer,
    Predict,
    FinalWager,
    FinalAnswer,
}

impl ActionType {
    pub const ALL: [ActionType; 14] = [
        ActionType::StartGame,
        ActionType::SelectClue,
        ActionType::OpenBuzzer,
        ActionType::JudgeAnswer,
        ActionType::Advance,
        ActionType::EndGame,
        ActionType::Ack,
        ActionType::Buzz,
        ActionType::Vote,
        ActionType::Question,
        ActionType::Answer,
        ActionType::Predict,
        ActionType::FinalWager,
        ActionType::FinalAnswer,
    ];

    /// Actions only the session's host authority may submit.
    pub fn is_host_only(&self) -> bool {
        matches!(
            self,
            ActionType::StartGame
                | ActionType::SelectClue
                | ActionType::OpenBuzzer
                | ActionType::JudgeAnswer
                | ActionType::Advance
                | ActionType::EndGame
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::StartGame => "start_game",
            ActionType::SelectClue => "select_clue",
            ActionType::OpenBuzzer => "open_buzzer",
            ActionType::JudgeAnswer => "judge_answer",
            ActionType::Advance => "advance",
            ActionType::EndGame => "end_game",
            ActionType::Ack => "ack",
            ActionType::Buzz => "buzz",
            ActionType::Vote => "vote",
            ActionType::Question => "question",
            ActionType::Answer => "answer",
            ActionType::Predict => "predict",
            ActionType::FinalWager => "final_wager",
            ActionType::FinalAnswer => "final_answer",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
