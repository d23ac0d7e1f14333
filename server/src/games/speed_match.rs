//! Speed Match: multiple-choice trivia where faster correct answers earn
//! a bonus.

use super::{all_connected_done, mismatched, required_text, unsupported};
use crate::error::{GameError, GameResult};
use crate::machine::Trigger;
use crate::scoring;
use crate::session::{Ctx, SessionState};
use log::debug;
use shared::{ActionKind, GameData, Phase, SpeedMatchData, TimedAnswer, TriviaResult};

pub fn start_round(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<()> {
    let question = ctx.content.trivia_question(state.round_index, &mut state.rng);
    let correct = question.choices.get(question.correct).cloned().ok_or_else(|| {
        GameError::Internal(format!(
            "trivia question has no choice at index {}",
            question.correct
        ))
    })?;
    state.game_data = GameData::SpeedMatch(SpeedMatchData {
        question: question.question,
        choices: question.choices,
        correct: Some(correct),
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
    let ActionKind::Answer { text } = action else {
        return Err(unsupported(state, action));
    };
    let text = required_text(text, "answer")?;
    let remaining_ms = state.timer.map(|t| t.remaining_ms(ctx.now)).unwrap_or(0);

    let GameData::SpeedMatch(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    let choice = data
        .choices
        .iter()
        .find(|c| c.eq_ignore_ascii_case(&text))
        .cloned()
        .ok_or_else(|| GameError::validation(format!("{:?} is not one of the choices", text)))?;

    debug!("{} answered {} with {}ms left", player_id, choice, remaining_ms);
    data.answers.insert(
        player_id.to_string(),
        TimedAnswer {
            text: choice,
            remaining_ms,
        },
    );
    let done = all_connected_done(&state.players, |id| data.answers.contains_key(id));
    Ok(done.then_some(Trigger::AllAnswered))
}

pub fn finish_round(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<()> {
    let total_ms = ctx
        .settings
        .durations
        .for_phase(Phase::Question)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let GameData::SpeedMatch(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    let correct = data.correct.clone().unwrap_or_default();

    let results: Vec<TriviaResult> = data
        .answers
        .iter()
        .map(|(id, answer)| {
            let is_correct = answer.text == correct;
            TriviaResult {
                player_id: id.clone(),
                answer: answer.text.clone(),
                correct: is_correct,
                points: if is_correct {
                    scoring::speed_points(answer.remaining_ms, total_ms)
                } else {
                    0
                },
            }
        })
        .collect();

    for result in &results {
        scoring::award(&mut state.players, &result.player_id, result.points, ctx.stamp);
    }
    data.results = results;
    Ok(())
}

pub fn reevaluate(state: &mut SessionState) -> GameResult<Option<Trigger>> {
    if state.phase != Phase::Question {
        return Ok(None);
    }
    let GameData::SpeedMatch(data) = &state.game_data else {
        return Ok(None);
    };
    let done = all_connected_done(&state.players, |id| data.answers.contains_key(id));
    Ok(done.then_some(Trigger::AllAnswered))
}
