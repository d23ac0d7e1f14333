//! Per-game-type reducers.
//!
//! The state machine owns *when* a phase changes; these modules own *what*
//! each game does on round start, on every accepted action, on timeouts and
//! at round end. Reducers return the trigger (if any) the machine should
//! apply next.

pub mod infiltrator;
pub mod jeopardy;
pub mod predict;
pub mod speed_match;

use crate::error::{GameError, GameResult};
use crate::machine::{self, Trigger};
use crate::session::{Ctx, SessionState};
use shared::{ActionKind, ActionType, GameType, Player, PlayerId};

pub fn start_round(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<()> {
    match state.game_type {
        GameType::Infiltrator => infiltrator::start_round(state, ctx),
        GameType::Jeopardy => jeopardy::start_round(state, ctx),
        GameType::Predict => predict::start_round(state, ctx),
        GameType::SpeedMatch => speed_match::start_round(state, ctx),
    }
}

pub fn finish_round(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<()> {
    match state.game_type {
        GameType::Infiltrator => infiltrator::finish_round(state, ctx),
        GameType::Jeopardy => Ok(()),
        GameType::Predict => predict::finish_round(state, ctx),
        GameType::SpeedMatch => speed_match::finish_round(state, ctx),
    }
}

/// Game-specific actions. Generic host actions never reach this point.
pub fn apply(
    state: &mut SessionState,
    ctx: &Ctx<'_>,
    player_id: &str,
    action: &ActionKind,
) -> GameResult<Option<Trigger>> {
    match state.game_type {
        GameType::Infiltrator => infiltrator::apply(state, ctx, player_id, action),
        GameType::Jeopardy => jeopardy::apply(state, ctx, player_id, action),
        GameType::Predict => predict::apply(state, player_id, action),
        GameType::SpeedMatch => speed_match::apply(state, ctx, player_id, action),
    }
}

/// Default applied when the phase timer expires.
pub fn on_timeout(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<Option<Trigger>> {
    if machine::is_round_end(state.game_type, state.phase) {
        return machine::round_over(state, ctx).map(Some);
    }
    match state.game_type {
        GameType::Infiltrator => infiltrator::on_timeout(state, ctx),
        GameType::Jeopardy => jeopardy::on_timeout(state, ctx),
        GameType::Predict | GameType::SpeedMatch => Ok(Some(Trigger::Timeout)),
    }
}

/// Host `advance`: round-end phases move to the next round, other phases
/// close early with the same defaults a timeout would apply.
pub fn on_host_advance(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<Trigger> {
    if machine::is_round_end(state.game_type, state.phase) {
        return machine::round_over(state, ctx);
    }
    match state.game_type {
        GameType::Infiltrator => infiltrator::on_host_advance(state),
        GameType::Jeopardy => jeopardy::on_host_advance(state),
        GameType::Predict | GameType::SpeedMatch => Ok(Trigger::HostAdvance),
    }
}

/// Follow-up trigger that applies immediately after entering a phase.
pub fn on_enter(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<Option<Trigger>> {
    match state.game_type {
        GameType::Jeopardy => jeopardy::on_enter(state, ctx),
        _ => Ok(None),
    }
}

/// What happens after the last round's round-end.
pub fn final_step(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<Trigger> {
    match state.game_type {
        GameType::Jeopardy => jeopardy::final_step(state, ctx),
        _ => Ok(Trigger::GameOver),
    }
}

/// Re-checks "everyone has acted" conditions after the roster changed.
pub fn reevaluate(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<Option<Trigger>> {
    match state.game_type {
        GameType::Infiltrator => infiltrator::reevaluate(state),
        GameType::Jeopardy => jeopardy::reevaluate(state, ctx),
        GameType::Predict => predict::reevaluate(state),
        GameType::SpeedMatch => speed_match::reevaluate(state),
    }
}

/// Turn- and state-dependent refinements of the phase whitelist.
pub fn may_act(state: &SessionState, player_id: &str, action: ActionType) -> bool {
    match state.game_type {
        GameType::Infiltrator => infiltrator::may_act(state, player_id, action),
        GameType::Jeopardy => jeopardy::may_act(state, player_id, action),
        GameType::Predict | GameType::SpeedMatch => true,
    }
}

pub(crate) fn participant_ids(players: &[Player]) -> Vec<PlayerId> {
    players
        .iter()
        .filter(|p| p.is_participant())
        .map(|p| p.id.clone())
        .collect()
}

pub(crate) fn connected_participant_ids(players: &[Player]) -> Vec<PlayerId> {
    players
        .iter()
        .filter(|p| p.is_participant() && p.is_connected)
        .map(|p| p.id.clone())
        .collect()
}

/// True when at least one participant is connected and every connected
/// participant satisfies `done`.
pub(crate) fn all_connected_done<F>(players: &[Player], done: F) -> bool
where
    F: Fn(&str) -> bool,
{
    let mut any = false;
    for player in players.iter().filter(|p| p.is_participant() && p.is_connected) {
        any = true;
        if !done(&player.id) {
            return false;
        }
    }
    any
}

pub(crate) fn mismatched(state: &SessionState) -> GameError {
    GameError::Internal(format!(
        "room {} carries no {} payload",
        state.room_code, state.game_type
    ))
}

pub(crate) fn unsupported(state: &SessionState, action: &ActionKind) -> GameError {
    GameError::InvalidPhase {
        action: action.action_type(),
        phase: state.phase,
    }
}

pub(crate) fn required_text(text: &str, what: &str) -> GameResult<String> {
    let text = text.trim();
    if text.is_empty() {
        Err(GameError::validation(format!("{} must not be empty", what)))
    } else {
        Ok(text.to_string())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Builders shared by the per-game reducer tests.

    use crate::config::{EngineConfig, SessionSettings};
    use crate::content::FixedContent;
    use crate::session::{Ctx, SessionState};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::{GameData, GameType, Phase, Player, Role};
    use std::collections::{BTreeMap, HashSet};

    pub fn state(game_type: GameType, participants: &[&str]) -> SessionState {
        let mut players = vec![Player::new("host", "Host", Role::Host, 0)];
        for (i, id) in participants.iter().enumerate() {
            players.push(Player::new(*id, id.to_uppercase(), Role::Player, i as u64 + 1));
        }
        SessionState {
            room_code: "AB12CD".to_string(),
            game_type,
            phase: Phase::Lobby,
            players,
            host_id: "host".to_string(),
            round_index: 0,
            total_rounds: 2,
            game_data: GameData::Lobby,
            paused: false,
            phase_epoch: 0,
            timer: None,
            acted: HashSet::new(),
            disconnected_at: BTreeMap::new(),
            boundary: None,
            rng: StdRng::seed_from_u64(7),
        }
    }

    pub fn settings() -> SessionSettings {
        EngineConfig::default().session_settings()
    }

    pub fn ctx<'a>(settings: &'a SessionSettings, content: &'a FixedContent, now: u64) -> Ctx<'a> {
        Ctx {
            settings,
            content,
            now,
            stamp: now,
        }
    }
}
