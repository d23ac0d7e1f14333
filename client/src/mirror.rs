//! Client-side mirror of one session
//!
//! The mirror holds the last snapshot the server sent and folds every
//! following delta into it with the shared reducer. It never guesses: a
//! delta that skips a sequence number puts the mirror into a waiting state
//! until a fresh snapshot arrives.

use log::{debug, warn};
use shared::{
    apply_delta, Delta, ErrorReason, GameData, Phase, RoomCode, ServerMessage, Snapshot,
    Standing, SyncError,
};
use std::fmt::Write;

/// What a server message did to the mirror
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorEvent {
    Created(RoomCode),
    Updated,
    RoundStarted,
    RoundEnded,
    GameOver(Vec<Standing>),
    /// A sequence gap was detected; the caller should request a snapshot.
    NeedsSnapshot(RoomCode),
    Rejected { reason: ErrorReason, message: String },
    Ignored,
}

#[derive(Debug, Default)]
pub struct SessionMirror {
    snapshot: Option<Snapshot>,
    room_code: Option<RoomCode>,
    standings: Vec<Standing>,
    awaiting_snapshot: bool,
}

impl SessionMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn room_code(&self) -> Option<&str> {
        self.room_code.as_deref()
    }

    pub fn standings(&self) -> &[Standing] {
        &self.standings
    }

    pub fn is_awaiting_snapshot(&self) -> bool {
        self.awaiting_snapshot
    }

    /// Forgets the session, e.g. after leaving it.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn apply(&mut self, message: ServerMessage) -> MirrorEvent {
        match message {
            ServerMessage::Created { room_code } => {
                self.clear();
                self.room_code = Some(room_code.clone());
                MirrorEvent::Created(room_code)
            }
            ServerMessage::State { snapshot } => self.replace(snapshot),
            ServerMessage::Delta(delta) => self.fold(delta, MirrorEvent::Updated),
            ServerMessage::RoundStart(delta) => self.fold(delta, MirrorEvent::RoundStarted),
            ServerMessage::RoundEnd(delta) => self.fold(delta, MirrorEvent::RoundEnded),
            ServerMessage::Ended { delta, standings } => {
                let event = self.fold(delta, MirrorEvent::GameOver(standings.clone()));
                if matches!(event, MirrorEvent::GameOver(_)) {
                    self.standings = standings;
                }
                event
            }
            ServerMessage::Error { reason, message } => MirrorEvent::Rejected { reason, message },
        }
    }

    fn replace(&mut self, snapshot: Snapshot) -> MirrorEvent {
        if let Some(current) = &self.snapshot {
            if current.room_code == snapshot.room_code && current.sequence > snapshot.sequence {
                debug!(
                    "Ignoring snapshot {} older than {}",
                    snapshot.sequence, current.sequence
                );
                return MirrorEvent::Ignored;
            }
        }
        self.room_code = Some(snapshot.room_code.clone());
        self.snapshot = Some(snapshot);
        self.awaiting_snapshot = false;
        MirrorEvent::Updated
    }

    fn fold(&mut self, delta: Delta, event: MirrorEvent) -> MirrorEvent {
        let Some(current) = &self.snapshot else {
            return self.request_snapshot(delta.room_code);
        };
        if self.awaiting_snapshot {
            return MirrorEvent::Ignored;
        }

        match apply_delta(current, &delta) {
            Ok(next) => {
                self.snapshot = Some(next);
                event
            }
            Err(SyncError::SequenceGap { expected, received }) => {
                warn!("Sequence gap (expected {}, got {})", expected, received);
                self.request_snapshot(delta.room_code)
            }
            Err(e) => {
                debug!("Dropping delta: {}", e);
                MirrorEvent::Ignored
            }
        }
    }

    fn request_snapshot(&mut self, room_code: RoomCode) -> MirrorEvent {
        if self.awaiting_snapshot {
            return MirrorEvent::Ignored;
        }
        self.awaiting_snapshot = true;
        MirrorEvent::NeedsSnapshot(room_code)
    }

    /// Plain-text rendering of the mirrored session for a terminal.
    pub fn describe(&self, me: Option<&str>) -> String {
        let Some(s) = &self.snapshot else {
            return "not in a session".to_string();
        };
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Room {} | {} | {} | round {}/{}{}",
            s.room_code,
            s.game_type,
            s.phase,
            s.round_index,
            s.total_rounds,
            if s.paused { " | PAUSED" } else { "" }
        );

        for player in &s.players {
            let mut tags = Vec::new();
            if player.id == s.host_id {
                tags.push("host");
            }
            if Some(player.id.as_str()) == me {
                tags.push("you");
            }
            if !player.is_connected {
                tags.push("away");
            }
            let _ = writeln!(
                out,
                "  {:<16} {:>6}  {}",
                player.name,
                player.score,
                tags.join(", ")
            );
        }

        describe_game(&mut out, &s.game_data, s.phase);
        if !s.legal_actions.is_empty() {
            let actions: Vec<&str> = s.legal_actions.iter().map(|a| a.as_str()).collect();
            let _ = writeln!(out, "You can: {}", actions.join(", "));
        }
        if !self.standings.is_empty() {
            let _ = writeln!(out, "Final standings:");
            for standing in &self.standings {
                let _ = writeln!(out, "  {}. {} ({})", standing.rank, standing.name, standing.score);
            }
        }
        out
    }
}

fn describe_game(out: &mut String, data: &GameData, phase: Phase) {
    match data {
        GameData::Lobby => {}
        GameData::Infiltrator(d) => {
            match (&d.secret_word, &d.infiltrator_id) {
                (Some(word), _) => {
                    let _ = writeln!(out, "Secret word: {}", word);
                }
                (None, Some(_)) => {
                    let _ = writeln!(out, "You are the infiltrator. Blend in.");
                }
                (None, None) => {}
            }
            if let Some(q) = &d.pending_question {
                let _ = writeln!(out, "{} asks {}: {}", q.asker, q.target, q.text);
            }
            for exchange in d.qa_history.iter().rev().take(3) {
                let _ = writeln!(out, "  {}: {} -> {}", exchange.asker, exchange.question, exchange.answer);
            }
            if let Some(outcome) = &d.outcome {
                let verdict = if outcome.infiltrator_left {
                    "left the game"
                } else if outcome.infiltrator_caught {
                    "caught"
                } else {
                    "escaped"
                };
                let _ = writeln!(out, "Infiltrator was {} ({})", outcome.infiltrator_id, verdict);
            }
        }
        GameData::Jeopardy(d) => {
            if phase == Phase::Board {
                for (c, category) in d.board.iter().enumerate() {
                    let cells: Vec<String> = category
                        .clues
                        .iter()
                        .map(|clue| {
                            if clue.played {
                                "----".to_string()
                            } else {
                                format!("{:>4}", clue.value)
                            }
                        })
                        .collect();
                    let _ = writeln!(out, "  [{}] {:<20} {}", c, category.title, cells.join(" "));
                }
            }
            if let Some(clue) = d.current_clue {
                if let Some(cell) = d.clue(clue.category, clue.clue) {
                    let _ = writeln!(out, "Clue for {}: {}", clue.value, cell.prompt);
                    if let Some(answer) = &cell.answer {
                        let _ = writeln!(out, "  (answer: {})", answer);
                    }
                }
            }
            if let Some(buzzed) = &d.buzzed_player_id {
                let _ = writeln!(out, "{} buzzed in", buzzed);
            }
            if let Some(final_clue) = &d.final_clue {
                let _ = writeln!(out, "Final: {} - {}", final_clue.category, final_clue.prompt);
            }
        }
        GameData::Predict(d) => {
            let unit = d.unit.as_deref().unwrap_or("");
            let _ = writeln!(out, "Predict: {} {}", d.prompt, unit);
            if let Some(answer) = d.answer {
                let _ = writeln!(out, "Answer: {} {}", answer, unit);
            }
            for result in &d.results {
                let _ = writeln!(out, "  {} guessed {} (+{})", result.player_id, result.value, result.points);
            }
        }
        GameData::SpeedMatch(d) => {
            let _ = writeln!(out, "Q: {}", d.question);
            for choice in &d.choices {
                let _ = writeln!(out, "  - {}", choice);
            }
            if let Some(correct) = &d.correct {
                let _ = writeln!(out, "Correct: {}", correct);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{GameType, Player, Role, SessionField};

    fn snapshot(sequence: u64) -> Snapshot {
        Snapshot {
            room_code: "AB12CD".to_string(),
            game_type: GameType::Predict,
            phase: Phase::Lobby,
            players: vec![Player::new("host", "Host", Role::Host, 0)],
            host_id: "host".to_string(),
            round_index: 0,
            total_rounds: 3,
            game_data: GameData::Lobby,
            paused: false,
            phase_deadline: None,
            legal_actions: vec![],
            sequence,
        }
    }

    fn delta(sequence: u64, changes: Vec<SessionField>) -> Delta {
        Delta {
            room_code: "AB12CD".to_string(),
            sequence,
            changes,
            timestamp: 0,
        }
    }

    #[test]
    fn test_snapshot_then_delta() {
        let mut mirror = SessionMirror::new();
        assert_eq!(
            mirror.apply(ServerMessage::State { snapshot: snapshot(4) }),
            MirrorEvent::Updated
        );
        let event = mirror.apply(ServerMessage::RoundStart(delta(
            5,
            vec![SessionField::Phase(Phase::Predicting)],
        )));
        assert_eq!(event, MirrorEvent::RoundStarted);
        assert_eq!(mirror.snapshot().unwrap().phase, Phase::Predicting);
        assert_eq!(mirror.snapshot().unwrap().sequence, 5);
    }

    #[test]
    fn test_gap_requests_snapshot_once() {
        let mut mirror = SessionMirror::new();
        mirror.apply(ServerMessage::State { snapshot: snapshot(4) });

        let event = mirror.apply(ServerMessage::Delta(delta(7, vec![])));
        assert_eq!(event, MirrorEvent::NeedsSnapshot("AB12CD".to_string()));
        assert!(mirror.is_awaiting_snapshot());
        assert_eq!(mirror.apply(ServerMessage::Delta(delta(8, vec![]))), MirrorEvent::Ignored);

        mirror.apply(ServerMessage::State { snapshot: snapshot(8) });
        assert!(!mirror.is_awaiting_snapshot());
        assert_eq!(mirror.apply(ServerMessage::Delta(delta(9, vec![]))), MirrorEvent::Updated);
    }

    #[test]
    fn test_stale_delta_ignored() {
        let mut mirror = SessionMirror::new();
        mirror.apply(ServerMessage::State { snapshot: snapshot(4) });
        assert_eq!(mirror.apply(ServerMessage::Delta(delta(4, vec![]))), MirrorEvent::Ignored);
        assert_eq!(mirror.snapshot().unwrap().sequence, 4);
    }

    #[test]
    fn test_ended_keeps_standings() {
        let mut mirror = SessionMirror::new();
        mirror.apply(ServerMessage::State { snapshot: snapshot(1) });
        let standings = vec![Standing {
            rank: 1,
            player_id: "a".into(),
            name: "Ada".into(),
            score: 300,
        }];
        let event = mirror.apply(ServerMessage::Ended {
            delta: delta(2, vec![SessionField::Phase(Phase::Ended)]),
            standings: standings.clone(),
        });
        assert_eq!(event, MirrorEvent::GameOver(standings.clone()));
        assert_eq!(mirror.standings(), standings.as_slice());
        assert!(mirror.describe(Some("host")).contains("Final standings"));
    }

    #[test]
    fn test_describe_marks_host_and_self() {
        let mut mirror = SessionMirror::new();
        assert_eq!(mirror.describe(None), "not in a session");
        mirror.apply(ServerMessage::State { snapshot: snapshot(1) });
        let text = mirror.describe(Some("host"));
        assert!(text.contains("Room AB12CD"));
        assert!(text.contains("host, you"));
    }
}
