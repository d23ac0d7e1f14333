//! Session engine: the public surface the transport talks to.
//!
//! Every request resolves its session, locks it, runs one mutation and then
//! settles: queued messages go out, the phase timer is re-synced, and a
//! finished or empty session is destroyed.

use crate::config::EngineConfig;
use crate::content::ContentProvider;
use crate::dispatcher;
use crate::error::{GameError, GameResult};
use crate::machine::{self, Trigger};
use crate::membership::{self, Profile};
use crate::registry::{Binding, SessionRegistry};
use crate::scheduler::{Scheduler, TimerFired};
use crate::session::{GameSession, PhaseTimer};
use crate::sync::{Outbound, SyncChannel, Viewer};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    normalize_room_code, now_millis, ActionKind, ClientMessage, ConnectionId, ErrorReason,
    GameType, Phase, Player, Role, RoomCode, ServerMessage, Snapshot,
};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

struct EngineInner {
    config: EngineConfig,
    content: Arc<dyn ContentProvider>,
    registry: SessionRegistry,
    scheduler: Scheduler,
    sync: SyncChannel,
}

/// Cheap to clone; every clone drives the same set of sessions.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

fn superseded() -> ServerMessage {
    ServerMessage::Error {
        reason: ErrorReason::Superseded,
        message: "this seat was claimed by a newer connection".to_string(),
    }
}

fn error_message(error: &GameError) -> ServerMessage {
    ServerMessage::Error {
        reason: error.reason(),
        message: error.to_string(),
    }
}

fn parse_code(input: &str) -> GameResult<RoomCode> {
    normalize_room_code(input).ok_or_else(|| GameError::SessionNotFound(input.trim().to_string()))
}

impl Engine {
    /// Must be called inside a Tokio runtime: spawns the task that turns
    /// expired timers into timeout mutations.
    pub fn new(
        config: EngineConfig,
        content: Arc<dyn ContentProvider>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        let (scheduler, fired) = Scheduler::new();
        let inner = Arc::new(EngineInner {
            config,
            content,
            registry: SessionRegistry::new(),
            scheduler,
            sync: SyncChannel::new(outbound),
        });
        tokio::spawn(timer_pump(Arc::downgrade(&inner), fired));
        Engine { inner }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub async fn session_count(&self) -> usize {
        self.inner.registry.len().await
    }

    /// Whether `connection` is seated in or watching some session.
    pub async fn is_attached(&self, connection: ConnectionId) -> bool {
        self.inner.registry.binding(connection).await.is_some()
    }

    fn build_session(
        &self,
        room_code: RoomCode,
        game_type: GameType,
        host: Player,
        now: u64,
    ) -> GameSession {
        let config = &self.inner.config;
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        GameSession::new(
            room_code,
            game_type,
            host,
            config.total_rounds(game_type),
            config.session_settings(),
            Arc::clone(&self.inner.content),
            rng,
            now,
        )
    }

    /// Creates a session with a generated room code; `connection` becomes
    /// the host seat.
    pub async fn create_session(
        &self,
        connection: ConnectionId,
        game_type: GameType,
        profile: Profile,
        now: u64,
    ) -> GameResult<RoomCode> {
        let profile = profile.validated()?;
        let host = profile.clone().into_player(Role::Host, connection, now);
        let (room_code, _) = self
            .inner
            .registry
            .insert_with(|code| self.build_session(code, game_type, host, now))
            .await?;
        self.announce(connection, &room_code, &profile.id, now).await?;
        Ok(room_code)
    }

    /// Same as [`Engine::create_session`] with a caller-chosen room code.
    pub async fn create_session_with_code(
        &self,
        connection: ConnectionId,
        room_code: &str,
        game_type: GameType,
        profile: Profile,
        now: u64,
    ) -> GameResult<RoomCode> {
        let room_code = normalize_room_code(room_code)
            .ok_or_else(|| GameError::validation(format!("{:?} is not a valid room code", room_code)))?;
        let profile = profile.validated()?;
        let host = profile.clone().into_player(Role::Host, connection, now);
        let session = self.build_session(room_code.clone(), game_type, host, now);
        self.inner.registry.insert(room_code.clone(), session).await?;
        self.announce(connection, &room_code, &profile.id, now).await?;
        Ok(room_code)
    }

    async fn announce(
        &self,
        connection: ConnectionId,
        room_code: &str,
        host_id: &str,
        now: u64,
    ) -> GameResult<()> {
        info!("Room {}: {} hosts on connection {}", room_code, host_id, connection);
        self.with_session(room_code, |session| {
            session.send(
                connection,
                ServerMessage::Created {
                    room_code: room_code.to_string(),
                },
            );
            session.send_snapshot(connection, &Viewer::member(host_id));
            Ok(())
        })
        .await?;
        self.attach(
            connection,
            Binding::Member {
                room_code: room_code.to_string(),
                player_id: host_id.to_string(),
            },
            now,
        )
        .await;
        Ok(())
    }

    /// Joins as a new participant. A player id that is already seated is
    /// treated as a reconnect.
    pub async fn join_session(
        &self,
        connection: ConnectionId,
        room_code: &str,
        profile: Profile,
        now: u64,
    ) -> GameResult<()> {
        let room_code = parse_code(room_code)?;
        let profile = profile.validated()?;
        let player_id = profile.id.clone();

        let replaced = self
            .with_session(&room_code, |session| {
                if session.state().player(&player_id).is_some() {
                    rebind_seat(session, &player_id, connection, now)
                } else {
                    membership::add_player(session, profile, connection, now)?;
                    Ok(None)
                }
            })
            .await?;

        self.retire(replaced).await;
        self.attach(connection, Binding::Member { room_code, player_id }, now)
            .await;
        Ok(())
    }

    /// Re-attaches `connection` to a seat. Ids without a seat get a read-only
    /// observer view.
    pub async fn reconnect(
        &self,
        connection: ConnectionId,
        room_code: &str,
        player_id: &str,
        now: u64,
    ) -> GameResult<()> {
        let room_code = parse_code(room_code)?;

        let seated = self
            .with_session(&room_code, |session| {
                if session.state().player(player_id).is_some() {
                    rebind_seat(session, player_id, connection, now).map(Some)
                } else {
                    info!(
                        "Room {}: unknown id {} attaches as observer",
                        room_code, player_id
                    );
                    session.add_observer(connection);
                    session.send_snapshot(connection, &Viewer::Observer);
                    Ok(None)
                }
            })
            .await?;

        let binding = match seated {
            Some(replaced) => {
                self.retire(replaced).await;
                Binding::Member {
                    room_code,
                    player_id: player_id.to_string(),
                }
            }
            None => Binding::Observer { room_code },
        };
        self.attach(connection, binding, now).await;
        Ok(())
    }

    /// The transport lost `connection`.
    pub async fn disconnect(&self, connection: ConnectionId, now: u64) -> GameResult<()> {
        let Some(binding) = self.inner.registry.unbind(connection).await else {
            return Ok(());
        };
        self.release(connection, binding, now).await
    }

    async fn release(&self, connection: ConnectionId, binding: Binding, now: u64) -> GameResult<()> {
        match binding {
            Binding::Member {
                room_code,
                player_id,
            } => {
                self.with_session(&room_code, |session| {
                    let bound = session
                        .state()
                        .player(&player_id)
                        .and_then(|p| p.connection_id);
                    if bound != Some(connection) {
                        return Ok(false);
                    }
                    membership::mark_disconnected(session, &player_id, now)
                })
                .await?;
            }
            Binding::Observer { room_code } => {
                self.with_session(&room_code, |session| Ok(session.remove_observer(connection)))
                    .await?;
            }
        }
        Ok(())
    }

    /// Removes `player_id` from the session for good.
    pub async fn leave(&self, room_code: &str, player_id: &str, now: u64) -> GameResult<()> {
        let room_code = parse_code(room_code)?;
        let connection = self
            .with_session(&room_code, |session| {
                let connection = session
                    .state()
                    .player(player_id)
                    .and_then(|p| p.connection_id);
                membership::remove_player(session, player_id, now)?;
                Ok(connection)
            })
            .await?;
        if let Some(connection) = connection {
            self.inner.registry.unbind(connection).await;
        }
        Ok(())
    }

    /// Leave request arriving on `connection`.
    pub async fn leave_from(&self, connection: ConnectionId, room_code: &str, now: u64) -> GameResult<()> {
        let room_code = parse_code(room_code)?;
        match self.bound_to(connection, &room_code).await? {
            Binding::Member { player_id, .. } => self.leave(&room_code, &player_id, now).await,
            Binding::Observer { .. } => {
                self.inner.registry.unbind(connection).await;
                self.with_session(&room_code, |session| Ok(session.remove_observer(connection)))
                    .await
                    .map(|_| ())
            }
        }
    }

    /// Submits an action on behalf of `player_id`.
    pub async fn submit(
        &self,
        room_code: &str,
        player_id: &str,
        action: ActionKind,
        now: u64,
    ) -> GameResult<()> {
        let room_code = parse_code(room_code)?;
        self.with_session(&room_code, |session| {
            dispatcher::submit(session, player_id, action, now)
        })
        .await
    }

    /// Submits an action arriving on `connection`, acting as whoever the
    /// connection is bound to.
    pub async fn submit_from(
        &self,
        connection: ConnectionId,
        room_code: &str,
        action: ActionKind,
        now: u64,
    ) -> GameResult<()> {
        let room_code = parse_code(room_code)?;
        match self.bound_to(connection, &room_code).await? {
            Binding::Member { player_id, .. } => {
                self.submit(&room_code, &player_id, action, now).await
            }
            Binding::Observer { .. } => Err(GameError::not_authorized("observers cannot act")),
        }
    }

    /// Sends `connection` a fresh snapshot, e.g. after a sequence gap.
    pub async fn resync(&self, connection: ConnectionId, room_code: &str) -> GameResult<()> {
        let room_code = parse_code(room_code)?;
        let viewer = match self.bound_to(connection, &room_code).await? {
            Binding::Member { player_id, .. } => Viewer::Member(player_id),
            Binding::Observer { .. } => Viewer::Observer,
        };
        self.with_session(&room_code, |session| {
            session.send_snapshot(connection, &viewer);
            Ok(())
        })
        .await
    }

    /// Current view for `player_id`, or the observer view.
    pub async fn snapshot(&self, room_code: &str, player_id: Option<&str>) -> GameResult<Snapshot> {
        let room_code = parse_code(room_code)?;
        let shared = self.inner.registry.get(&room_code).await?;
        let session = shared.lock().await;
        if session.is_closed() {
            return Err(GameError::SessionNotFound(room_code));
        }
        let viewer = match player_id {
            Some(id) => Viewer::member(id),
            None => Viewer::Observer,
        };
        Ok(session.view(&viewer))
    }

    /// The deadline currently running for the room, if any.
    pub async fn phase_timer(&self, room_code: &str) -> GameResult<Option<PhaseTimer>> {
        let room_code = parse_code(room_code)?;
        let shared = self.inner.registry.get(&room_code).await?;
        let session = shared.lock().await;
        Ok(session.timer())
    }

    /// Ends the game immediately; the final standings go out and the session
    /// is destroyed.
    pub async fn end_session(&self, room_code: &str, now: u64) -> GameResult<()> {
        let room_code = parse_code(room_code)?;
        self.with_session(&room_code, |session| {
            session.transact(now, None, |state, ctx| {
                machine::advance(state, ctx, Trigger::EndGame)
            })
        })
        .await
    }

    /// Applies the current phase's default if `epoch` is still current.
    pub async fn fire_timeout(&self, room_code: &str, epoch: u64, now: u64) -> GameResult<bool> {
        self.with_session(room_code, |session| {
            dispatcher::fire_timeout(session, epoch, now)
        })
        .await
    }

    /// Periodic sweep: idle sessions expire, disconnected players past their
    /// grace period are removed. Returns the destroyed room codes.
    pub async fn expire(&self, now: u64) -> Vec<RoomCode> {
        let idle_ttl = self.inner.config.idle_ttl.as_millis() as u64;
        let grace = self.inner.config.grace_period.as_millis() as u64;
        let mut destroyed = Vec::new();

        for (room_code, shared) in self.inner.registry.all().await {
            let mut session = shared.lock().await;
            if !session.is_closed() {
                if now.saturating_sub(session.last_activity()) >= idle_ttl {
                    info!("Room {}: idle for too long, expiring", room_code);
                    let expired = error_message(&GameError::Expired(room_code.clone()));
                    for (connection, _) in session.recipients() {
                        session.send(connection, expired.clone());
                    }
                    session.close();
                } else if let Err(e) = membership::expire_disconnected(&mut *session, now, grace) {
                    warn!("Room {}: grace sweep failed: {}", room_code, e);
                }
            }

            let closed = self.settle(&mut session).await;
            drop(session);
            if closed {
                self.discard(&room_code).await;
                destroyed.push(room_code);
            }
        }
        destroyed
    }

    /// Entry point for decoded client messages. Rejections go back to the
    /// sending connection only.
    pub async fn handle_message(&self, connection: ConnectionId, message: ClientMessage, now: u64) {
        let result = match message {
            ClientMessage::CreateSession {
                game_type,
                player_id,
                name,
                avatar_url,
            } => {
                let profile = Profile {
                    id: player_id,
                    name,
                    avatar_url,
                };
                self.create_session(connection, game_type, profile, now)
                    .await
                    .map(|_| ())
            }
            ClientMessage::JoinSession {
                room_code,
                player_id,
                name,
                avatar_url,
            } => {
                let profile = Profile {
                    id: player_id,
                    name,
                    avatar_url,
                };
                self.join_session(connection, &room_code, profile, now).await
            }
            ClientMessage::Reconnect {
                room_code,
                player_id,
            } => self.reconnect(connection, &room_code, &player_id, now).await,
            ClientMessage::Action { room_code, action } => {
                self.submit_from(connection, &room_code, action, now).await
            }
            ClientMessage::RequestSnapshot { room_code } => self.resync(connection, &room_code).await,
            ClientMessage::Leave { room_code } => self.leave_from(connection, &room_code, now).await,
            ClientMessage::Heartbeat => Ok(()),
        };

        if let Err(e) = result {
            debug!("Rejected request from connection {}: {}", connection, e);
            self.reject(connection, &e);
        }
    }

    /// Sends a rejection to one connection.
    pub fn reject(&self, connection: ConnectionId, error: &GameError) {
        self.inner
            .sync
            .deliver(vec![Outbound::new(connection, error_message(error))]);
    }

    async fn bound_to(&self, connection: ConnectionId, room_code: &str) -> GameResult<Binding> {
        match self.inner.registry.binding(connection).await {
            Some(binding) if binding.room_code() == room_code => Ok(binding),
            Some(_) => Err(GameError::not_authorized(format!(
                "this connection is not attached to room {}",
                room_code
            ))),
            None => Err(GameError::not_authorized(
                "this connection has not joined a session",
            )),
        }
    }

    /// Binds `connection`, releasing whatever it was attached to elsewhere.
    async fn attach(&self, connection: ConnectionId, binding: Binding, now: u64) {
        let seated = matches!(binding, Binding::Member { .. });
        let room_code = binding.room_code().to_string();
        if let Some(previous) = self.inner.registry.bind(connection, binding).await {
            let watching_here =
                seated && matches!(&previous, Binding::Observer { room_code: r } if *r == room_code);
            if watching_here || previous.room_code() != room_code {
                if let Err(e) = self.release(connection, previous, now).await {
                    debug!("Connection {}: previous session already gone: {}", connection, e);
                }
            }
        }
    }

    /// Unbinds a connection whose seat was claimed by a newer one.
    async fn retire(&self, replaced: Option<ConnectionId>) {
        if let Some(old) = replaced {
            info!("Connection {} superseded", old);
            self.inner.registry.unbind(old).await;
        }
    }

    async fn with_session<T, F>(&self, room_code: &str, mutate: F) -> GameResult<T>
    where
        F: FnOnce(&mut GameSession) -> GameResult<T>,
    {
        let shared = self.inner.registry.get(room_code).await?;
        let mut session = shared.lock().await;
        if session.is_closed() {
            return Err(GameError::SessionNotFound(room_code.to_string()));
        }

        let result = mutate(&mut *session);
        let closed = self.settle(&mut session).await;
        drop(session);
        if closed {
            self.discard(room_code).await;
        }
        result
    }

    /// Flushes queued messages and re-syncs the timer. Returns whether the
    /// session is now destroyed.
    async fn settle(&self, session: &mut GameSession) -> bool {
        self.inner.sync.deliver(session.take_outbox());

        let finished =
            session.phase() == Phase::Ended || session.state().players.is_empty();
        if finished && !session.is_closed() {
            info!(
                "Room {}: {} after {} updates",
                session.room_code(),
                if session.phase() == Phase::Ended {
                    "game over"
                } else {
                    "everyone left"
                },
                session.sequence()
            );
            session.close();
        }

        if session.is_closed() {
            self.inner.scheduler.cancel(session.room_code()).await;
        } else {
            self.inner
                .scheduler
                .sync(session.room_code(), session.timer())
                .await;
        }
        session.is_closed()
    }

    async fn discard(&self, room_code: &str) {
        self.inner.registry.remove(room_code).await;
        let dropped = self.inner.registry.unbind_room(room_code).await;
        debug!("Room {}: released {} connections", room_code, dropped.len());
    }
}

/// Rebinds a seat and tells the connection it replaced.
fn rebind_seat(
    session: &mut GameSession,
    player_id: &str,
    connection: ConnectionId,
    now: u64,
) -> GameResult<Option<ConnectionId>> {
    let replaced = membership::rebind(session, player_id, connection, now)?;
    if let Some(old) = replaced {
        session.send(old, superseded());
    }
    Ok(replaced)
}

async fn timer_pump(inner: Weak<EngineInner>, mut fired: mpsc::UnboundedReceiver<TimerFired>) {
    while let Some(TimerFired { room_code, epoch }) = fired.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let engine = Engine { inner };
        match engine.fire_timeout(&room_code, epoch, now_millis()).await {
            Ok(true) => {}
            Ok(false) => debug!("Room {}: timer epoch {} was stale", room_code, epoch),
            Err(e) => debug!("Room {}: timer dropped: {}", room_code, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::FixedContent;

    fn engine() -> (Engine, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = EngineConfig {
            rng_seed: Some(5),
            ..Default::default()
        };
        (Engine::new(config, Arc::new(FixedContent::default()), tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    #[tokio::test]
    async fn test_create_sends_created_then_state() {
        let (engine, mut rx) = engine();
        let code = engine
            .create_session(1, GameType::Predict, Profile::new("host", "Host"), 0)
            .await
            .unwrap();

        let out = drain(&mut rx);
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0].message,
            ServerMessage::Created {
                room_code: code.clone()
            }
        );
        assert!(matches!(out[1].message, ServerMessage::State { .. }));
    }

    #[tokio::test]
    async fn test_unknown_room() {
        let (engine, _rx) = engine();
        let result = engine
            .join_session(2, "ZZZZZZ", Profile::new("a", "A"), 0)
            .await;
        assert!(matches!(result, Err(GameError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_reconnect_supersedes_old_connection() {
        let (engine, mut rx) = engine();
        let code = engine
            .create_session(1, GameType::Predict, Profile::new("host", "Host"), 0)
            .await
            .unwrap();
        engine
            .join_session(2, &code, Profile::new("a", "A"), 1)
            .await
            .unwrap();
        drain(&mut rx);

        engine.reconnect(3, &code, "a", 2).await.unwrap();
        let out = drain(&mut rx);
        assert!(out.iter().any(|o| o.connection == 2
            && matches!(
                o.message,
                ServerMessage::Error {
                    reason: ErrorReason::Superseded,
                    ..
                }
            )));
        assert!(out
            .iter()
            .any(|o| o.connection == 3 && matches!(o.message, ServerMessage::State { .. })));

        let stale = engine
            .submit_from(2, &code, ActionKind::Predict { value: 1.0 }, 3)
            .await;
        assert!(matches!(stale, Err(GameError::NotAuthorized(_))));
    }

    #[tokio::test]
    async fn test_unknown_id_becomes_observer() {
        let (engine, mut rx) = engine();
        let code = engine
            .create_session(1, GameType::Predict, Profile::new("host", "Host"), 0)
            .await
            .unwrap();
        drain(&mut rx);

        engine.reconnect(9, &code, "stranger", 1).await.unwrap();
        let out = drain(&mut rx);
        match &out[0].message {
            ServerMessage::State { snapshot } => assert!(snapshot.legal_actions.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
        let act = engine
            .submit_from(9, &code, ActionKind::StartGame, 2)
            .await;
        assert!(matches!(act, Err(GameError::NotAuthorized(_))));
    }

    #[tokio::test]
    async fn test_end_session_destroys_it() {
        let (engine, mut rx) = engine();
        let code = engine
            .create_session(1, GameType::SpeedMatch, Profile::new("host", "Host"), 0)
            .await
            .unwrap();
        engine.end_session(&code, 5).await.unwrap();

        let out = drain(&mut rx);
        assert!(matches!(out.last().unwrap().message, ServerMessage::Ended { .. }));
        assert_eq!(engine.session_count().await, 0);
        assert!(matches!(
            engine.snapshot(&code, None).await,
            Err(GameError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_idle_session_expires() {
        let (engine, mut rx) = engine();
        let code = engine
            .create_session(1, GameType::Predict, Profile::new("host", "Host"), 0)
            .await
            .unwrap();
        drain(&mut rx);

        assert!(engine.expire(1_000).await.is_empty());
        let ttl = engine.config().idle_ttl.as_millis() as u64;
        assert_eq!(engine.expire(ttl + 1).await, vec![code.clone()]);

        let out = drain(&mut rx);
        assert!(matches!(
            out[0].message,
            ServerMessage::Error {
                reason: ErrorReason::Expired,
                ..
            }
        ));
        assert_eq!(engine.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_errors_go_only_to_sender() {
        let (engine, mut rx) = engine();
        let code = engine
            .create_session(1, GameType::Predict, Profile::new("host", "Host"), 0)
            .await
            .unwrap();
        engine
            .join_session(2, &code, Profile::new("a", "A"), 1)
            .await
            .unwrap();
        drain(&mut rx);

        engine
            .handle_message(
                2,
                ClientMessage::Action {
                    room_code: code.clone(),
                    action: ActionKind::StartGame,
                },
                2,
            )
            .await;
        let out = drain(&mut rx);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].connection, 2);
        assert!(matches!(
            out[0].message,
            ServerMessage::Error {
                reason: ErrorReason::NotAuthorized,
                ..
            }
        ));
    }
}
