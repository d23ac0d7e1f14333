//! Action dispatcher and timeout entry point.
//!
//! Every accepted action runs as one transaction on the session: validate,
//! apply the game reducer, follow the resulting trigger through the state
//! machine, then commit. A rejected action leaves the session untouched.

use crate::config::min_players;
use crate::error::{GameError, GameResult};
use crate::games;
use crate::machine::{self, Trigger};
use crate::session::{Ctx, GameSession, SessionState};
use log::{debug, info};
use shared::{ActionKind, ActionType};

pub fn submit(
    session: &mut GameSession,
    player_id: &str,
    action: ActionKind,
    now: u64,
) -> GameResult<()> {
    if session.is_closed() {
        return Err(GameError::SessionNotFound(session.room_code().to_string()));
    }
    session.transact(now, None, |state, ctx| apply_action(state, ctx, player_id, &action))
}

fn validate(state: &SessionState, player_id: &str, action: ActionType) -> GameResult<()> {
    let player = state
        .player(player_id)
        .filter(|p| p.is_connected)
        .ok_or_else(|| {
            GameError::not_authorized(format!("{} is not connected to this session", player_id))
        })?;

    if action.is_host_only() {
        if !state.is_host(player_id) {
            return Err(GameError::not_authorized(format!(
                "only the host may {}",
                action
            )));
        }
    } else if !player.is_participant() {
        return Err(GameError::not_authorized(format!(
            "the host cannot {}",
            action
        )));
    }

    if !machine::allowed_actions(state.game_type, state.phase).contains(&action) {
        return Err(GameError::InvalidPhase {
            action,
            phase: state.phase,
        });
    }
    if state.paused {
        return Err(GameError::Paused(state.room_code.clone()));
    }
    if machine::is_single_shot(state.game_type, action) && state.has_acted(player_id, action) {
        return Err(GameError::AlreadyActed { action });
    }
    Ok(())
}

fn apply_action(
    state: &mut SessionState,
    ctx: &Ctx<'_>,
    player_id: &str,
    action: &ActionKind,
) -> GameResult<()> {
    let kind = action.action_type();
    validate(state, player_id, kind)?;

    let trigger = match action {
        ActionKind::StartGame => {
            let needed = min_players(state.game_type);
            if state.participant_count() < needed {
                return Err(GameError::validation(format!(
                    "{} needs at least {} players",
                    state.game_type, needed
                )));
            }
            Some(Trigger::Start)
        }
        ActionKind::EndGame => Some(Trigger::EndGame),
        ActionKind::Advance => Some(games::on_host_advance(state, ctx)?),
        other => games::apply(state, ctx, player_id, other)?,
    };

    if machine::is_single_shot(state.game_type, kind) {
        state.mark_acted(player_id, kind);
    }
    debug!(
        "Room {}: {} applied {} in {}",
        state.room_code, player_id, kind, state.phase
    );

    if let Some(trigger) = trigger {
        machine::advance(state, ctx, trigger)?;
    }
    Ok(())
}

/// Applies the phase default for an expired timer. Returns `false` for a
/// stale epoch, a paused session or a destroyed one.
pub fn fire_timeout(session: &mut GameSession, epoch: u64, now: u64) -> GameResult<bool> {
    let Some(timer) = session.timer() else {
        return Ok(false);
    };
    if timer.epoch != epoch {
        debug!(
            "Room {}: ignoring stale timer epoch {} (current {})",
            session.room_code(),
            epoch,
            timer.epoch
        );
        return Ok(false);
    }

    session.transact(now, None, |state, ctx| {
        info!("Room {}: {} timed out", state.room_code, state.phase);
        match games::on_timeout(state, ctx)? {
            Some(trigger) => machine::advance(state, ctx, trigger)?,
            None => machine::arm_timer(state, ctx),
        }
        Ok(true)
    })
}
