//! Game state machine: transition tables, phase entry effects and the
//! per-phase action whitelist.

use crate::error::{GameError, GameResult};
use crate::games;
use crate::session::{Ctx, PhaseTimer, SessionState};
use crate::sync::Boundary;
use log::{debug, error};
use shared::{ActionType, GameType, Phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Start,
    AllAcked,
    QuestionRoundsDone,
    AllVoted,
    ClueSelected,
    BuzzerOpened,
    Buzzed,
    /// The current clue is closed; back to the board.
    Judged,
    /// Wrong answer with eligible players left; the buzzer reopens.
    Reopen,
    AllWagered,
    AllAnswered,
    AllJudged,
    AllPredicted,
    /// The round cannot go on because a player it hinges on left.
    Forfeit,
    Timeout,
    HostAdvance,
    NextRound,
    FinalRound,
    GameOver,
    EndGame,
}

/// Phase every round of `game_type` begins in.
pub fn round_start_phase(game_type: GameType) -> Phase {
    match game_type {
        GameType::Infiltrator => Phase::RoleReveal,
        GameType::Jeopardy => Phase::Board,
        GameType::Predict => Phase::Predicting,
        GameType::SpeedMatch => Phase::Question,
    }
}

/// Phases whose entry closes a round and aggregates its outcome.
pub fn is_round_end(game_type: GameType, phase: Phase) -> bool {
    matches!(
        (game_type, phase),
        (GameType::Infiltrator, Phase::Reveal)
            | (GameType::Predict, Phase::Results)
            | (GameType::SpeedMatch, Phase::RoundEnd)
    )
}

/// A Jeopardy round has no round-end phase of its own: it ends when the
/// cleared board gives way to the Final round or the end of the game.
pub fn closes_board(game_type: GameType, from: Phase, to: Phase) -> bool {
    game_type == GameType::Jeopardy
        && from == Phase::Board
        && matches!(to, Phase::FinalWager | Phase::Ended)
}

pub fn transition(game_type: GameType, phase: Phase, trigger: Trigger) -> Option<Phase> {
    use GameType::*;
    use Phase::*;
    use Trigger as T;

    if trigger == T::EndGame {
        return (phase != Ended).then_some(Ended);
    }

    let next = match (game_type, phase, trigger) {
        (_, Lobby, T::Start) => round_start_phase(game_type),

        (Infiltrator, RoleReveal, T::AllAcked | T::Timeout | T::HostAdvance) => Questioning,
        (Infiltrator, Questioning, T::QuestionRoundsDone | T::HostAdvance) => Voting,
        (Infiltrator, Voting, T::AllVoted | T::Timeout | T::HostAdvance) => Reveal,
        (Infiltrator, RoleReveal | Questioning | Voting, T::Forfeit) => Reveal,
        (Infiltrator, Reveal, T::NextRound) => RoleReveal,
        (Infiltrator, Reveal, T::GameOver) => Ended,

        (Jeopardy, Board, T::ClueSelected) => Clue,
        (Jeopardy, Board, T::NextRound) => Board,
        (Jeopardy, Board, T::FinalRound) => FinalWager,
        (Jeopardy, Board, T::GameOver) => Ended,
        (Jeopardy, Clue, T::BuzzerOpened) => Buzzer,
        (Jeopardy, Clue | Buzzer, T::HostAdvance) => Board,
        (Jeopardy, Buzzer, T::Buzzed) => Answer,
        (Jeopardy, Answer, T::Judged) => Board,
        (Jeopardy, Answer, T::Reopen) => Buzzer,
        (Jeopardy, FinalWager, T::AllWagered | T::Timeout | T::HostAdvance) => FinalAnswer,
        (Jeopardy, FinalAnswer, T::AllAnswered | T::Timeout | T::HostAdvance) => FinalJudging,
        (Jeopardy, FinalJudging, T::AllJudged) => Ended,

        (Predict, Predicting, T::AllPredicted | T::Timeout | T::HostAdvance) => Results,
        (Predict, Results, T::NextRound) => Predicting,
        (Predict, Results, T::GameOver) => Ended,

        (SpeedMatch, Question, T::AllAnswered | T::Timeout | T::HostAdvance) => RoundEnd,
        (SpeedMatch, RoundEnd, T::NextRound) => Question,
        (SpeedMatch, RoundEnd, T::GameOver) => Ended,

        _ => return None,
    };
    Some(next)
}

/// Moves the session along the transition table and runs entry effects.
/// A missing entry is an engine bug: logged and rejected, draft discarded.
pub fn advance(state: &mut SessionState, ctx: &Ctx<'_>, trigger: Trigger) -> GameResult<()> {
    let next = transition(state.game_type, state.phase, trigger).ok_or_else(|| {
        error!(
            "Room {}: no {} transition from {} on {:?}",
            state.room_code, state.game_type, state.phase, trigger
        );
        GameError::Internal(format!("no transition from {} on {:?}", state.phase, trigger))
    })?;

    debug!(
        "Room {}: {} -> {} ({:?})",
        state.room_code, state.phase, next, trigger
    );
    let round_start = matches!(trigger, Trigger::Start | Trigger::NextRound);
    enter(state, ctx, next, round_start)?;

    if let Some(chained) = games::on_enter(state, ctx)? {
        advance(state, ctx, chained)?;
    }
    Ok(())
}

fn enter(state: &mut SessionState, ctx: &Ctx<'_>, phase: Phase, round_start: bool) -> GameResult<()> {
    let from = state.phase;
    state.phase = phase;
    state.acted.clear();

    if round_start {
        state.round_index += 1;
        games::start_round(state, ctx)?;
        state.boundary = Some(Boundary::RoundStart);
    }
    if is_round_end(state.game_type, phase) {
        games::finish_round(state, ctx)?;
        state.boundary = Some(Boundary::RoundEnd);
    }
    if closes_board(state.game_type, from, phase) {
        state.boundary = Some(Boundary::RoundEnd);
    }
    if phase == Phase::Ended {
        state.boundary = Some(Boundary::Ended);
    }

    arm_timer(state, ctx);
    Ok(())
}

/// Starts a fresh deadline for the current phase. The epoch bump makes any
/// timer armed earlier stale.
pub fn arm_timer(state: &mut SessionState, ctx: &Ctx<'_>) {
    state.phase_epoch += 1;
    state.timer = if state.paused || state.phase == Phase::Ended {
        None
    } else {
        ctx.settings
            .durations
            .for_phase(state.phase)
            .map(|duration| PhaseTimer {
                phase: state.phase,
                epoch: state.phase_epoch,
                armed_at: ctx.now,
                deadline: ctx.now + duration.as_millis() as u64,
            })
    };
}

/// Suspends the current deadline while the host authority is away.
pub fn suspend_timer(state: &mut SessionState) {
    state.phase_epoch += 1;
    state.timer = None;
}

/// `NextRound` while rounds remain, then the game's final step.
pub fn round_over(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<Trigger> {
    if state.round_index < state.total_rounds {
        return Ok(Trigger::NextRound);
    }
    games::final_step(state, ctx)
}

pub fn allowed_actions(game_type: GameType, phase: Phase) -> &'static [ActionType] {
    use ActionType as A;
    use GameType::*;
    use Phase::*;

    match (game_type, phase) {
        (_, Lobby) => &[A::StartGame, A::EndGame],
        (_, Ended) => &[],

        (Infiltrator, RoleReveal) => &[A::Ack, A::Advance, A::EndGame],
        (Infiltrator, Questioning) => &[A::Question, A::Answer, A::Advance, A::EndGame],
        (Infiltrator, Voting) => &[A::Vote, A::Advance, A::EndGame],
        (Infiltrator, Reveal) => &[A::Advance, A::EndGame],

        (Jeopardy, Board) => &[A::SelectClue, A::EndGame],
        (Jeopardy, Clue) => &[A::OpenBuzzer, A::Advance, A::EndGame],
        (Jeopardy, Buzzer) => &[A::Buzz, A::Advance, A::EndGame],
        (Jeopardy, Answer) => &[A::JudgeAnswer, A::EndGame],
        (Jeopardy, FinalWager) => &[A::FinalWager, A::Advance, A::EndGame],
        (Jeopardy, FinalAnswer) => &[A::FinalAnswer, A::Advance, A::EndGame],
        (Jeopardy, FinalJudging) => &[A::JudgeAnswer, A::EndGame],

        (Predict, Predicting) => &[A::Predict, A::Advance, A::EndGame],
        (Predict, Results) => &[A::Advance, A::EndGame],

        (SpeedMatch, Question) => &[A::Answer, A::Advance, A::EndGame],
        (SpeedMatch, RoundEnd) => &[A::Advance, A::EndGame],

        _ => &[],
    }
}

/// At most once per player per phase entry.
pub fn is_single_shot(game_type: GameType, action: ActionType) -> bool {
    match action {
        ActionType::Ack
        | ActionType::Buzz
        | ActionType::Vote
        | ActionType::Predict
        | ActionType::FinalWager
        | ActionType::FinalAnswer => true,
        ActionType::Answer => game_type == GameType::SpeedMatch,
        _ => false,
    }
}

/// What `player_id` may submit right now, as rendered in their snapshot.
pub fn legal_actions(state: &SessionState, player_id: &str) -> Vec<ActionType> {
    if state.paused {
        return Vec::new();
    }
    let Some(player) = state.player(player_id) else {
        return Vec::new();
    };
    if !player.is_connected {
        return Vec::new();
    }

    allowed_actions(state.game_type, state.phase)
        .iter()
        .copied()
        .filter(|action| {
            if action.is_host_only() {
                state.is_host(player_id)
            } else {
                player.is_participant()
            }
        })
        .filter(|action| {
            !(is_single_shot(state.game_type, *action) && state.has_acted(player_id, *action))
        })
        .filter(|action| games::may_act(state, player_id, *action))
        .collect()
}
