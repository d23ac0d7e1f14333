//! Synchronization channel: per-viewer snapshots, delta wrapping and the
//! outbound queue drained by the transport.

use crate::machine;
use crate::session::SessionState;
use log::warn;
use shared::{
    ConnectionId, Delta, GameData, InfiltratorData, JeopardyData, Phase, PlayerId, PredictData,
    Role, ServerMessage, Snapshot, SpeedMatchData, Standing,
};
use tokio::sync::mpsc;

/// One message addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub connection: ConnectionId,
    pub message: ServerMessage,
}

impl Outbound {
    pub fn new(connection: ConnectionId, message: ServerMessage) -> Self {
        Self {
            connection,
            message,
        }
    }
}

/// Phase boundary crossed by a mutation; picks the wrapper message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    RoundStart,
    RoundEnd,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Member(PlayerId),
    /// Read-only binding for an id that is no longer in the session.
    Observer,
}

impl Viewer {
    pub fn member(id: impl Into<PlayerId>) -> Self {
        Viewer::Member(id.into())
    }

    fn id(&self) -> Option<&str> {
        match self {
            Viewer::Member(id) => Some(id),
            Viewer::Observer => None,
        }
    }
}

pub fn wrap(delta: Delta, boundary: Option<Boundary>, standings: &[Standing]) -> ServerMessage {
    match boundary {
        None => ServerMessage::Delta(delta),
        Some(Boundary::RoundStart) => ServerMessage::RoundStart(delta),
        Some(Boundary::RoundEnd) => ServerMessage::RoundEnd(delta),
        Some(Boundary::Ended) => ServerMessage::Ended {
            delta,
            standings: standings.to_vec(),
        },
    }
}

/// The session as `viewer` is allowed to see it.
pub fn view(state: &SessionState, viewer: &Viewer, sequence: u64) -> Snapshot {
    let legal_actions = match viewer {
        Viewer::Member(id) => machine::legal_actions(state, id),
        Viewer::Observer => Vec::new(),
    };

    Snapshot {
        room_code: state.room_code.clone(),
        game_type: state.game_type,
        phase: state.phase,
        players: state.players.clone(),
        host_id: state.host_id.clone(),
        round_index: state.round_index,
        total_rounds: state.total_rounds,
        game_data: redact(state, viewer),
        paused: state.paused,
        phase_deadline: if state.paused {
            None
        } else {
            state.timer.map(|t| t.deadline)
        },
        legal_actions,
        sequence,
    }
}

fn redact(state: &SessionState, viewer: &Viewer) -> GameData {
    let seat = viewer
        .id()
        .and_then(|id| state.player(id))
        .map(|p| p.role);
    let lens = Lens {
        viewer: viewer.id(),
        is_host_seat: seat == Some(Role::Host),
        is_authority: viewer.id().map(|id| state.is_host(id)).unwrap_or(false),
        phase: state.phase,
    };

    match &state.game_data {
        GameData::Lobby => GameData::Lobby,
        GameData::Infiltrator(data) => GameData::Infiltrator(lens.infiltrator(data)),
        GameData::Jeopardy(data) => GameData::Jeopardy(lens.jeopardy(data)),
        GameData::Predict(data) => GameData::Predict(lens.predict(data)),
        GameData::SpeedMatch(data) => GameData::SpeedMatch(lens.speed_match(data)),
    }
}

struct Lens<'a> {
    viewer: Option<&'a str>,
    is_host_seat: bool,
    is_authority: bool,
    phase: Phase,
}

impl Lens<'_> {
    fn is(&self, id: &str) -> bool {
        self.viewer == Some(id)
    }

    fn infiltrator(&self, data: &InfiltratorData) -> InfiltratorData {
        let revealed = matches!(self.phase, Phase::Reveal | Phase::Ended);
        let mut out = data.clone();
        let is_infiltrator = data.infiltrator_id.as_deref().map(|id| self.is(id)).unwrap_or(false);

        if !revealed && !self.is_host_seat && !is_infiltrator {
            out.infiltrator_id = None;
        }
        if !revealed && (is_infiltrator || self.viewer.is_none()) {
            out.secret_word = None;
        }
        out
    }

    fn jeopardy(&self, data: &JeopardyData) -> JeopardyData {
        let mut out = data.clone();
        if !self.is_authority && self.phase != Phase::Ended {
            for category in &mut out.board {
                for clue in &mut category.clues {
                    clue.answer = None;
                }
            }
            if let Some(final_clue) = &mut out.final_clue {
                final_clue.answer = None;
            }
        }

        let open = self.is_authority || matches!(self.phase, Phase::FinalJudging | Phase::Ended);
        if !open {
            out.wagers.retain(|id, _| self.is(id));
            out.final_answers.retain(|id, _| self.is(id));
        }
        out
    }

    fn predict(&self, data: &PredictData) -> PredictData {
        let mut out = data.clone();
        let revealed = matches!(self.phase, Phase::Results | Phase::Ended);
        if !revealed {
            out.answer = None;
            if !self.is_authority {
                out.predictions.retain(|id, _| self.is(id));
            }
        }
        out
    }

    fn speed_match(&self, data: &SpeedMatchData) -> SpeedMatchData {
        let mut out = data.clone();
        let revealed = matches!(self.phase, Phase::RoundEnd | Phase::Ended);
        if !revealed {
            out.correct = None;
            if !self.is_authority {
                out.answers.retain(|id, _| self.is(id));
            }
        }
        out
    }
}

/// Hands committed messages to whatever transport drains the receiver.
#[derive(Debug, Clone)]
pub struct SyncChannel {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SyncChannel {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }

    pub fn deliver(&self, outbound: Vec<Outbound>) {
        for message in outbound {
            if let Err(e) = self.tx.send(message) {
                warn!(
                    "Dropping message for connection {}: outbound channel closed",
                    e.0.connection
                );
            }
        }
    }
}
