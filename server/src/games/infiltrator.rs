//! Infiltrator: one hidden player does not know the secret word; everyone
//! else tries to find them through rounds of questions and a vote.

use super::{all_connected_done, mismatched, participant_ids, required_text, unsupported};
use crate::error::{GameError, GameResult};
use crate::machine::{self, Trigger};
use crate::scoring::{self, INFILTRATOR_CATCH_POINTS, INFILTRATOR_ESCAPE_POINTS};
use crate::session::{Ctx, SessionState};
use log::info;
use rand::seq::SliceRandom;
use shared::{
    ActionKind, ActionType, GameData, InfiltratorData, InfiltratorOutcome, PendingQuestion,
    Phase, PlayerId, QaExchange,
};

fn data_mut(game_data: &mut GameData) -> Option<&mut InfiltratorData> {
    match game_data {
        GameData::Infiltrator(data) => Some(data),
        _ => None,
    }
}

fn data(game_data: &GameData) -> Option<&InfiltratorData> {
    match game_data {
        GameData::Infiltrator(data) => Some(data),
        _ => None,
    }
}

/// Asker of exchange `q` is participant `q mod n` in join order.
pub fn current_asker(participants: &[PlayerId], question_round: u32) -> Option<&PlayerId> {
    if participants.is_empty() {
        return None;
    }
    participants.get(question_round as usize % participants.len())
}

pub fn start_round(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<()> {
    let participants = participant_ids(&state.players);
    let infiltrator_id = participants.choose(&mut state.rng).cloned();
    let secret_word = ctx.content.secret_word(state.round_index, &mut state.rng);

    info!(
        "Room {}: infiltrator round {} begins with {} participants",
        state.room_code,
        state.round_index,
        participants.len()
    );
    state.game_data = GameData::Infiltrator(InfiltratorData {
        secret_word: Some(secret_word),
        infiltrator_id,
        question_round: 0,
        total_question_rounds: ctx.settings.question_rounds,
        ..Default::default()
    });
    Ok(())
}

pub fn apply(
    state: &mut SessionState,
    ctx: &Ctx<'_>,
    player_id: &str,
    action: &ActionKind,
) -> GameResult<Option<Trigger>> {
    match action {
        ActionKind::Ack => ack(state, player_id),
        ActionKind::Question { target, text } => question(state, player_id, target, text),
        ActionKind::Answer { text } => answer(state, ctx, player_id, text),
        ActionKind::Vote { target } => vote(state, player_id, target),
        other => Err(unsupported(state, other)),
    }
}

fn ack(state: &mut SessionState, player_id: &str) -> GameResult<Option<Trigger>> {
    let GameData::Infiltrator(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    if !data.acks.iter().any(|id| id == player_id) {
        data.acks.push(player_id.to_string());
    }
    let done = all_connected_done(&state.players, |id| data.acks.iter().any(|a| a == id));
    Ok(done.then_some(Trigger::AllAcked))
}

fn question(
    state: &mut SessionState,
    player_id: &str,
    target: &str,
    text: &str,
) -> GameResult<Option<Trigger>> {
    let participants = participant_ids(&state.players);
    let GameData::Infiltrator(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };

    let asker = current_asker(&participants, data.question_round)
        .ok_or_else(|| GameError::validation("there is nobody to ask"))?;
    if asker != player_id {
        return Err(GameError::not_authorized(format!(
            "it is {}'s turn to ask",
            asker
        )));
    }
    if data.pending_question.is_some() {
        return Err(GameError::validation("a question is already waiting for an answer"));
    }
    if target == player_id {
        return Err(GameError::validation("you cannot question yourself"));
    }
    if !participants.iter().any(|id| id == target) {
        return Err(GameError::validation(format!("{} is not a participant", target)));
    }
    let text = required_text(text, "question")?;

    data.pending_question = Some(PendingQuestion {
        asker: player_id.to_string(),
        target: target.to_string(),
        text,
    });
    Ok(None)
}

fn answer(
    state: &mut SessionState,
    ctx: &Ctx<'_>,
    player_id: &str,
    text: &str,
) -> GameResult<Option<Trigger>> {
    let GameData::Infiltrator(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };

    let pending = data
        .pending_question
        .as_ref()
        .ok_or_else(|| GameError::validation("no question is waiting for an answer"))?;
    if pending.target != player_id {
        return Err(GameError::not_authorized(format!(
            "only {} may answer this question",
            pending.target
        )));
    }
    let text = required_text(text, "answer")?;

    if let Some(pending) = data.pending_question.take() {
        data.qa_history.push(QaExchange {
            asker: pending.asker,
            target: Some(pending.target),
            question: pending.text,
            answer: text,
            answered: true,
        });
    }
    complete_exchange(state, ctx)
}

/// Records the current exchange as unanswered and moves on exactly once.
fn expire_exchange(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<Option<Trigger>> {
    let participants = participant_ids(&state.players);
    let GameData::Infiltrator(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };

    let exchange = match data.pending_question.take() {
        Some(pending) => QaExchange {
            asker: pending.asker,
            target: Some(pending.target),
            question: pending.text,
            answer: String::new(),
            answered: false,
        },
        None => QaExchange {
            asker: current_asker(&participants, data.question_round)
                .cloned()
                .unwrap_or_default(),
            target: None,
            question: String::new(),
            answer: String::new(),
            answered: false,
        },
    };
    data.qa_history.push(exchange);
    complete_exchange(state, ctx)
}

fn complete_exchange(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<Option<Trigger>> {
    let GameData::Infiltrator(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    data.question_round += 1;
    if data.question_round >= data.total_question_rounds {
        return Ok(Some(Trigger::QuestionRoundsDone));
    }
    machine::arm_timer(state, ctx);
    Ok(None)
}

fn vote(state: &mut SessionState, player_id: &str, target: &str) -> GameResult<Option<Trigger>> {
    let participants = participant_ids(&state.players);
    if target == player_id {
        return Err(GameError::validation("you cannot vote for yourself"));
    }
    if !participants.iter().any(|id| id == target) {
        return Err(GameError::validation(format!("{} is not a participant", target)));
    }

    let GameData::Infiltrator(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    data.votes.insert(player_id.to_string(), target.to_string());
    let done = all_connected_done(&state.players, |id| data.votes.contains_key(id));
    Ok(done.then_some(Trigger::AllVoted))
}

/// Reveal: tally the votes and score the round.
pub fn finish_round(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<()> {
    let left = infiltrator_left(state);
    let GameData::Infiltrator(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    let Some(infiltrator_id) = data.infiltrator_id.clone() else {
        return Ok(());
    };

    let tally = scoring::tally(&data.votes);
    if left {
        info!(
            "Room {}: infiltrator {} left, round scores nothing",
            state.room_code, infiltrator_id
        );
        data.outcome = Some(InfiltratorOutcome {
            infiltrator_id,
            plurality_target: None,
            infiltrator_caught: false,
            infiltrator_left: true,
            tally,
        });
        return Ok(());
    }

    let plurality_target = scoring::plurality(&tally);
    let caught = plurality_target.as_deref() == Some(infiltrator_id.as_str());
    let catchers: Vec<PlayerId> = data
        .votes
        .iter()
        .filter(|(_, target)| **target == infiltrator_id)
        .map(|(voter, _)| voter.clone())
        .collect();

    data.outcome = Some(InfiltratorOutcome {
        infiltrator_id: infiltrator_id.clone(),
        plurality_target,
        infiltrator_caught: caught,
        infiltrator_left: false,
        tally,
    });

    info!(
        "Room {}: infiltrator {} {}",
        state.room_code,
        infiltrator_id,
        if caught { "caught" } else { "escaped" }
    );
    if caught {
        for voter in catchers {
            scoring::award(&mut state.players, &voter, INFILTRATOR_CATCH_POINTS, ctx.stamp);
        }
    } else {
        scoring::award(
            &mut state.players,
            &infiltrator_id,
            INFILTRATOR_ESCAPE_POINTS,
            ctx.stamp,
        );
    }
    Ok(())
}

pub fn on_timeout(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<Option<Trigger>> {
    match state.phase {
        Phase::RoleReveal | Phase::Voting => Ok(Some(Trigger::Timeout)),
        Phase::Questioning => expire_exchange(state, ctx),
        _ => Ok(None),
    }
}

pub fn on_host_advance(state: &mut SessionState) -> GameResult<Trigger> {
    if state.phase == Phase::Questioning {
        if let Some(data) = data_mut(&mut state.game_data) {
            if let Some(pending) = data.pending_question.take() {
                data.qa_history.push(QaExchange {
                    asker: pending.asker,
                    target: Some(pending.target),
                    question: pending.text,
                    answer: String::new(),
                    answered: false,
                });
            }
        }
    }
    Ok(Trigger::HostAdvance)
}

/// True once the round's infiltrator no longer holds a seat.
fn infiltrator_left(state: &SessionState) -> bool {
    data(&state.game_data)
        .and_then(|d| d.infiltrator_id.as_deref())
        .map(|id| state.player(id).is_none())
        .unwrap_or(false)
}

pub fn reevaluate(state: &mut SessionState) -> GameResult<Option<Trigger>> {
    let Some(data) = data(&state.game_data) else {
        return Ok(None);
    };
    let in_play = matches!(
        state.phase,
        Phase::RoleReveal | Phase::Questioning | Phase::Voting
    );
    if in_play && infiltrator_left(state) {
        return Ok(Some(Trigger::Forfeit));
    }
    let trigger = match state.phase {
        Phase::RoleReveal => all_connected_done(&state.players, |id| {
            data.acks.iter().any(|a| a == id)
        })
        .then_some(Trigger::AllAcked),
        Phase::Voting => all_connected_done(&state.players, |id| data.votes.contains_key(id))
            .then_some(Trigger::AllVoted),
        _ => None,
    };
    Ok(trigger)
}

pub fn may_act(state: &SessionState, player_id: &str, action: ActionType) -> bool {
    let Some(data) = data(&state.game_data) else {
        return true;
    };
    match action {
        ActionType::Question => {
            let participants = participant_ids(&state.players);
            data.pending_question.is_none()
                && current_asker(&participants, data.question_round).map(String::as_str)
                    == Some(player_id)
        }
        ActionType::Answer => data
            .pending_question
            .as_ref()
            .map(|p| p.target == player_id)
            .unwrap_or(false),
        _ => true,
    }
}
