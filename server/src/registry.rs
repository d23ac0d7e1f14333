//! Live sessions by room code and connection bindings.
//!
//! Lock order is map, then session, then bindings. The map lock is never
//! held while waiting on a session lock for longer than a lookup.

use crate::error::{GameError, GameResult};
use crate::session::GameSession;
use log::info;
use rand::Rng;
use shared::{ConnectionId, PlayerId, RoomCode, ROOM_CODE_ALPHABET, ROOM_CODE_LEN};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

const CODE_ATTEMPTS: usize = 32;

pub type SharedSession = Arc<Mutex<GameSession>>;

/// What a connection is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Member {
        room_code: RoomCode,
        player_id: PlayerId,
    },
    Observer {
        room_code: RoomCode,
    },
}

impl Binding {
    pub fn room_code(&self) -> &str {
        match self {
            Binding::Member { room_code, .. } | Binding::Observer { room_code } => room_code,
        }
    }
}

pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R) -> RoomCode {
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<RoomCode, SharedSession>>,
    bindings: Mutex<HashMap<ConnectionId, Binding>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks an unused room code and stores the session `build` returns for it.
    pub async fn insert_with<F>(&self, build: F) -> GameResult<(RoomCode, SharedSession)>
    where
        F: FnOnce(RoomCode) -> GameSession,
    {
        let mut sessions = self.sessions.write().await;
        for _ in 0..CODE_ATTEMPTS {
            let code = generate_room_code(&mut rand::thread_rng());
            if sessions.contains_key(&code) {
                continue;
            }
            let session = Arc::new(Mutex::new(build(code.clone())));
            sessions.insert(code.clone(), Arc::clone(&session));
            info!("Room {} created ({} live)", code, sessions.len());
            return Ok((code, session));
        }
        Err(GameError::CapacityExceeded(
            "could not allocate a free room code".to_string(),
        ))
    }

    /// Stores a session under a caller-chosen code.
    pub async fn insert(&self, room_code: RoomCode, session: GameSession) -> GameResult<SharedSession> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&room_code) {
            return Err(GameError::validation(format!(
                "room code {} is already in use",
                room_code
            )));
        }
        let session = Arc::new(Mutex::new(session));
        sessions.insert(room_code.clone(), Arc::clone(&session));
        info!("Room {} created ({} live)", room_code, sessions.len());
        Ok(session)
    }

    pub async fn get(&self, room_code: &str) -> GameResult<SharedSession> {
        self.sessions
            .read()
            .await
            .get(room_code)
            .cloned()
            .ok_or_else(|| GameError::SessionNotFound(room_code.to_string()))
    }

    pub async fn remove(&self, room_code: &str) -> Option<SharedSession> {
        let removed = self.sessions.write().await.remove(room_code);
        if removed.is_some() {
            info!("Room {} destroyed", room_code);
        }
        removed
    }

    pub async fn all(&self) -> Vec<(RoomCode, SharedSession)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(code, session)| (code.clone(), Arc::clone(session)))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Returns the binding the connection had before, if any.
    pub async fn bind(&self, connection: ConnectionId, binding: Binding) -> Option<Binding> {
        self.bindings.lock().await.insert(connection, binding)
    }

    pub async fn unbind(&self, connection: ConnectionId) -> Option<Binding> {
        self.bindings.lock().await.remove(&connection)
    }

    /// Drops every binding into `room_code`; returns the affected connections.
    pub async fn unbind_room(&self, room_code: &str) -> Vec<ConnectionId> {
        let mut bindings = self.bindings.lock().await;
        let connections: Vec<ConnectionId> = bindings
            .iter()
            .filter(|(_, b)| b.room_code() == room_code)
            .map(|(c, _)| *c)
            .collect();
        for connection in &connections {
            bindings.remove(connection);
        }
        connections
    }

    pub async fn binding(&self, connection: ConnectionId) -> Option<Binding> {
        self.bindings.lock().await.get(&connection).cloned()
    }
}
