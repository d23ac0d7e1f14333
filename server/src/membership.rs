//! Roster changes: joining, connection rebinding, disconnects, removal and
//! host handover.
//!
//! A dropped connection only flags the player as disconnected; the seat and
//! score survive until the grace period runs out. Losing the host authority
//! pauses a Jeopardy session (the host runs the board), every other game
//! promotes the earliest-joined connected participant.

use crate::config::allows_late_join;
use crate::error::{GameError, GameResult};
use crate::games::{self, required_text};
use crate::machine;
use crate::session::{Ctx, GameSession, SessionState};
use log::{info, warn};
use shared::{ConnectionId, GameType, Phase, Player, PlayerId, Role};

/// Identity a client presents when creating or joining a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: PlayerId,
    pub name: String,
    pub avatar_url: Option<String>,
}

impl Profile {
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar_url: None,
        }
    }

    /// Trimmed copy; empty ids or names are rejected.
    pub fn validated(&self) -> GameResult<Profile> {
        Ok(Profile {
            id: required_text(&self.id, "player id")?,
            name: required_text(&self.name, "player name")?,
            avatar_url: self.avatar_url.clone(),
        })
    }

    pub fn into_player(self, role: Role, connection: ConnectionId, now: u64) -> Player {
        let mut player = Player::new(self.id, self.name, role, now);
        player.avatar_url = self.avatar_url;
        player.connection_id = Some(connection);
        player
    }
}

/// Adds a new participant bound to `connection`, which receives a full
/// snapshot while everyone else gets the delta.
pub fn add_player(
    session: &mut GameSession,
    profile: Profile,
    connection: ConnectionId,
    now: u64,
) -> GameResult<()> {
    let profile = profile.validated()?;
    session.transact(now, Some(connection), |state, ctx| {
        let open = state.phase == Phase::Lobby
            || (allows_late_join(state.game_type) && state.phase != Phase::Ended);
        if !open {
            return Err(GameError::AlreadyStarted(state.room_code.clone()));
        }
        if state.player(&profile.id).is_some() {
            return Err(GameError::validation(format!(
                "{} is already in this session",
                profile.id
            )));
        }
        if state.participant_count() >= ctx.settings.max_players {
            return Err(GameError::CapacityExceeded(format!(
                "room {} is full ({} players)",
                state.room_code, ctx.settings.max_players
            )));
        }

        info!(
            "Room {}: {} joined as {}",
            state.room_code, profile.id, profile.name
        );
        state
            .players
            .push(profile.into_player(Role::Player, connection, ctx.now));
        settle_roster(state, ctx)
    })
}

/// Points an existing player at a new connection. Returns the connection it
/// replaced, if it was a different one.
pub fn rebind(
    session: &mut GameSession,
    player_id: &str,
    connection: ConnectionId,
    now: u64,
) -> GameResult<Option<ConnectionId>> {
    session.transact(now, Some(connection), |state, ctx| {
        let player = state.player_mut(player_id).ok_or_else(|| {
            GameError::not_authorized(format!("{} is not in this session", player_id))
        })?;
        let superseded = player.connection_id.filter(|c| *c != connection);
        player.connection_id = Some(connection);
        player.is_connected = true;
        let host_seat = player.role == Role::Host;
        state.disconnected_at.remove(player_id);

        if host_seat && state.host_id != player_id {
            info!(
                "Room {}: {} takes the host seat back from {}",
                state.room_code, player_id, state.host_id
            );
            state.host_id = player_id.to_string();
        }
        if state.paused && state.is_host(player_id) {
            info!("Room {}: host is back, resuming", state.room_code);
            state.paused = false;
            machine::arm_timer(state, ctx);
        }
        info!("Room {}: {} reconnected", state.room_code, player_id);
        Ok(superseded)
    })
}

/// Flags a player as disconnected and starts their grace period. Returns
/// `false` if the player was not connected.
pub fn mark_disconnected(session: &mut GameSession, player_id: &str, now: u64) -> GameResult<bool> {
    let connected = session
        .state()
        .player(player_id)
        .map(|p| p.is_connected)
        .unwrap_or(false);
    if !connected {
        return Ok(false);
    }

    session.transact(now, None, |state, ctx| {
        if let Some(player) = state.player_mut(player_id) {
            player.is_connected = false;
            player.connection_id = None;
        }
        state.disconnected_at.insert(player_id.to_string(), ctx.now);
        info!("Room {}: {} disconnected", state.room_code, player_id);

        if state.is_host(player_id) && state.phase != Phase::Ended {
            if state.game_type == GameType::Jeopardy {
                warn!("Room {}: host disconnected, pausing", state.room_code);
                state.paused = true;
                machine::suspend_timer(state);
            } else {
                promote(state);
            }
        }
        settle_roster(state, ctx)?;
        Ok(true)
    })
}

/// Removes a player for good (explicit leave or grace expiry).
pub fn remove_player(session: &mut GameSession, player_id: &str, now: u64) -> GameResult<()> {
    session.transact(now, None, |state, ctx| remove_from(state, ctx, player_id))
}

/// Removes every player whose grace period ran out. Returns their ids.
pub fn expire_disconnected(
    session: &mut GameSession,
    now: u64,
    grace_ms: u64,
) -> GameResult<Vec<PlayerId>> {
    let expired: Vec<PlayerId> = session
        .state()
        .disconnected_at
        .iter()
        .filter(|(_, at)| now.saturating_sub(**at) >= grace_ms)
        .map(|(id, _)| id.clone())
        .collect();
    if expired.is_empty() {
        return Ok(expired);
    }

    session.transact(now, None, |state, ctx| {
        for id in &expired {
            info!("Room {}: grace period over for {}", state.room_code, id);
            remove_from(state, ctx, id)?;
        }
        Ok(())
    })?;
    Ok(expired)
}

fn remove_from(state: &mut SessionState, ctx: &Ctx<'_>, player_id: &str) -> GameResult<()> {
    let index = state
        .players
        .iter()
        .position(|p| p.id == player_id)
        .ok_or_else(|| GameError::not_authorized(format!("{} is not in this session", player_id)))?;
    state.players.remove(index);
    state.disconnected_at.remove(player_id);
    info!("Room {}: {} left", state.room_code, player_id);

    if state.is_host(player_id) {
        promote(state);
        if state.paused {
            state.paused = false;
            machine::arm_timer(state, ctx);
        }
    }
    settle_roster(state, ctx)
}

/// Hands host authority to the earliest-joined connected participant. The
/// promoted player keeps their seat and role.
fn promote(state: &mut SessionState) {
    let successor = state
        .players
        .iter()
        .filter(|p| p.is_participant() && p.is_connected && p.id != state.host_id)
        .min_by_key(|p| p.joined_at)
        .map(|p| p.id.clone());

    match successor {
        Some(id) => {
            info!(
                "Room {}: host authority passes from {} to {}",
                state.room_code, state.host_id, id
            );
            state.host_id = id;
        }
        None => warn!("Room {}: nobody left to take over as host", state.room_code),
    }
}

/// Roster changes can complete an "everyone has acted" condition.
fn settle_roster(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<()> {
    if state.paused || matches!(state.phase, Phase::Lobby | Phase::Ended) {
        return Ok(());
    }
    if let Some(trigger) = games::reevaluate(state, ctx)? {
        machine::advance(state, ctx, trigger)?;
    }
    Ok(())
}
