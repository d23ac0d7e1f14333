//! Authoritative per-session state and the transactional commit path.
//!
//! Every mutation runs against a cloned draft of [`SessionState`]. Only when
//! the closure succeeds is the draft committed: the sequence is bumped by one
//! and each connected member receives a delta computed from their own redacted
//! view. A failed closure leaves the session untouched.

use crate::config::SessionSettings;
use crate::content::ContentProvider;
use crate::error::GameResult;
use crate::scoring;
use crate::sync::{self, Boundary, Outbound, Viewer};
use log::debug;
use rand::rngs::StdRng;
use shared::{
    diff, ActionType, ConnectionId, Delta, GameData, GameType, Phase, Player, PlayerId, RoomCode,
    ServerMessage, Snapshot,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Bounded deadline for the current phase (or the current questioning
/// exchange). `epoch` ties the timer to one specific arming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimer {
    pub phase: Phase,
    pub epoch: u64,
    pub armed_at: u64,
    pub deadline: u64,
}

impl PhaseTimer {
    pub fn duration_ms(&self) -> u64 {
        self.deadline.saturating_sub(self.armed_at)
    }

    pub fn remaining_ms(&self, now: u64) -> u64 {
        self.deadline.saturating_sub(now)
    }
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub room_code: RoomCode,
    pub game_type: GameType,
    pub phase: Phase,
    /// Join order.
    pub players: Vec<Player>,
    /// Whoever currently holds host authority.
    pub host_id: PlayerId,
    pub round_index: u32,
    pub total_rounds: u32,
    pub game_data: GameData,
    pub paused: bool,
    /// Incremented on every phase entry and every timer re-arm.
    pub phase_epoch: u64,
    pub timer: Option<PhaseTimer>,
    /// Single-shot actions already taken since the last phase entry.
    pub acted: HashSet<(PlayerId, ActionType)>,
    pub disconnected_at: BTreeMap<PlayerId, u64>,
    /// Set by phase-entry effects, consumed by the commit.
    pub boundary: Option<Boundary>,
    pub rng: StdRng,
}

impl SessionState {
    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn is_host(&self, id: &str) -> bool {
        self.host_id == id
    }

    pub fn participant_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_participant()).count()
    }

    pub fn has_acted(&self, id: &str, action: ActionType) -> bool {
        self.acted.contains(&(id.to_string(), action))
    }

    pub fn mark_acted(&mut self, id: &str, action: ActionType) {
        self.acted.insert((id.to_string(), action));
    }
}

/// Read-only inputs for one mutation.
pub struct Ctx<'a> {
    pub settings: &'a SessionSettings,
    pub content: &'a dyn ContentProvider,
    pub now: u64,
    /// Sequence number this mutation will commit as.
    pub stamp: u64,
}

pub struct GameSession {
    state: SessionState,
    sequence: u64,
    settings: SessionSettings,
    content: Arc<dyn ContentProvider>,
    last_activity: u64,
    observers: Vec<ConnectionId>,
    outbox: Vec<Outbound>,
    closed: bool,
}

impl GameSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        room_code: RoomCode,
        game_type: GameType,
        host: Player,
        total_rounds: u32,
        settings: SessionSettings,
        content: Arc<dyn ContentProvider>,
        rng: StdRng,
        now: u64,
    ) -> Self {
        let state = SessionState {
            room_code,
            game_type,
            phase: Phase::Lobby,
            host_id: host.id.clone(),
            players: vec![host],
            round_index: 0,
            total_rounds,
            game_data: GameData::Lobby,
            paused: false,
            phase_epoch: 0,
            timer: None,
            acted: HashSet::new(),
            disconnected_at: BTreeMap::new(),
            boundary: None,
            rng,
        };

        Self {
            state,
            sequence: 0,
            settings,
            content,
            last_activity: now,
            observers: Vec::new(),
            outbox: Vec::new(),
            closed: false,
        }
    }

    pub fn room_code(&self) -> &str {
        &self.state.room_code
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn last_activity(&self) -> u64 {
        self.last_activity
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Marks the session destroyed; every later request sees it as gone.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Timer the scheduler should be running for this session, if any.
    pub fn timer(&self) -> Option<PhaseTimer> {
        if self.closed || self.state.paused {
            None
        } else {
            self.state.timer
        }
    }

    pub fn view(&self, viewer: &Viewer) -> Snapshot {
        sync::view(&self.state, viewer, self.sequence)
    }

    pub fn observers(&self) -> &[ConnectionId] {
        &self.observers
    }

    pub fn add_observer(&mut self, connection: ConnectionId) {
        if !self.observers.contains(&connection) {
            self.observers.push(connection);
        }
    }

    pub fn remove_observer(&mut self, connection: ConnectionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|c| *c != connection);
        before != self.observers.len()
    }

    /// Queues a message for one connection without touching the sequence.
    pub fn send(&mut self, connection: ConnectionId, message: ServerMessage) {
        self.outbox.push(Outbound::new(connection, message));
    }

    pub fn send_snapshot(&mut self, connection: ConnectionId, viewer: &Viewer) -> Snapshot {
        let snapshot = self.view(viewer);
        self.send(
            connection,
            ServerMessage::State {
                snapshot: snapshot.clone(),
            },
        );
        snapshot
    }

    /// Every connection that should hear about a commit.
    pub fn recipients(&self) -> Vec<(ConnectionId, Viewer)> {
        recipients(&self.state, &self.observers)
    }

    pub fn take_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    /// Runs `mutate` against a draft and commits it on success. `fresh` names
    /// a connection that gets a full snapshot instead of a delta.
    pub fn transact<T, F>(&mut self, now: u64, fresh: Option<ConnectionId>, mutate: F) -> GameResult<T>
    where
        F: FnOnce(&mut SessionState, &Ctx<'_>) -> GameResult<T>,
    {
        let ctx = Ctx {
            settings: &self.settings,
            content: self.content.as_ref(),
            now,
            stamp: self.sequence + 1,
        };
        let mut draft = self.state.clone();
        let value = mutate(&mut draft, &ctx)?;
        self.commit(draft, now, fresh);
        Ok(value)
    }

    fn commit(&mut self, mut next: SessionState, now: u64, fresh: Option<ConnectionId>) {
        let boundary = next.boundary.take();
        let sequence = self.sequence + 1;
        let standings = match boundary {
            Some(Boundary::Ended) => scoring::standings(&next.players),
            _ => Vec::new(),
        };

        for (connection, viewer) in recipients(&next, &self.observers) {
            let after = sync::view(&next, &viewer, sequence);
            if fresh == Some(connection) {
                self.outbox
                    .push(Outbound::new(connection, ServerMessage::State { snapshot: after }));
                continue;
            }

            let before = sync::view(&self.state, &viewer, self.sequence);
            let delta = Delta {
                room_code: next.room_code.clone(),
                sequence,
                changes: diff(&before, &after),
                timestamp: now,
            };
            let message = sync::wrap(delta, boundary, &standings);
            self.outbox.push(Outbound::new(connection, message));
        }

        debug!(
            "Room {} committed sequence {} in phase {}",
            next.room_code, sequence, next.phase
        );
        self.state = next;
        self.sequence = sequence;
        self.last_activity = now;
    }
}

fn recipients(state: &SessionState, observers: &[ConnectionId]) -> Vec<(ConnectionId, Viewer)> {
    let members = state
        .players
        .iter()
        .filter(|p| p.is_connected)
        .filter_map(|p| p.connection_id.map(|c| (c, Viewer::Member(p.id.clone()))));
    let watchers = observers.iter().map(|c| (*c, Viewer::Observer));
    members.chain(watchers).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::content::BuiltinContent;
    use crate::error::GameError;
    use rand::SeedableRng;
    use shared::{Role, SessionField};

    fn session() -> GameSession {
        let mut host = Player::new("host", "Host", Role::Host, 0);
        host.connection_id = Some(1);
        GameSession::new(
            "AB12CD".to_string(),
            GameType::Predict,
            host,
            3,
            EngineConfig::default().session_settings(),
            Arc::new(BuiltinContent),
            StdRng::seed_from_u64(1),
            0,
        )
    }

    #[test]
    fn test_new_session_starts_in_lobby() {
        let s = session();
        assert_eq!(s.phase(), Phase::Lobby);
        assert_eq!(s.sequence(), 0);
        assert_eq!(s.state().host_id, "host");
        assert!(s.timer().is_none());
    }

    #[test]
    fn test_successful_transaction_bumps_sequence_and_fans_out() {
        let mut s = session();
        s.transact(10, None, |state, _| {
            state.round_index = 1;
            Ok(())
        })
        .unwrap();

        assert_eq!(s.sequence(), 1);
        assert_eq!(s.last_activity(), 10);
        let out = s.take_outbox();
        assert_eq!(out.len(), 1);
        match &out[0].message {
            ServerMessage::Delta(delta) => {
                assert_eq!(delta.sequence, 1);
                assert!(delta.changes.contains(&SessionField::RoundIndex(1)));
            }
            other => panic!("expected delta, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_transaction_leaves_state_untouched() {
        let mut s = session();
        let result: GameResult<()> = s.transact(10, None, |state, _| {
            state.round_index = 9;
            Err(GameError::validation("nope"))
        });

        assert!(result.is_err());
        assert_eq!(s.sequence(), 0);
        assert_eq!(s.state().round_index, 0);
        assert!(s.take_outbox().is_empty());
    }

    #[test]
    fn test_fresh_connection_gets_full_state() {
        let mut s = session();
        s.transact(5, Some(1), |state, _| {
            state.paused = true;
            Ok(())
        })
        .unwrap();

        let out = s.take_outbox();
        assert!(matches!(
            &out[0].message,
            ServerMessage::State { snapshot } if snapshot.sequence == 1 && snapshot.paused
        ));
    }

    #[test]
    fn test_observers_receive_deltas() {
        let mut s = session();
        s.add_observer(99);
        s.transact(1, None, |_, _| Ok(())).unwrap();
        let connections: Vec<_> = s.take_outbox().into_iter().map(|o| o.connection).collect();
        assert_eq!(connections, vec![1, 99]);
    }

    #[test]
    fn test_ctx_stamp_is_next_sequence() {
        let mut s = session();
        let stamp = s.transact(0, None, |_, ctx| Ok(ctx.stamp)).unwrap();
        assert_eq!(stamp, 1);
    }
}
