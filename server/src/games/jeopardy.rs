//! Jeopardy: host-paced board, buzzer race, host judging and a wagered
//! Final round.

use super::{
    all_connected_done, connected_participant_ids, mismatched, participant_ids, required_text,
    unsupported,
};
use crate::error::{GameError, GameResult};
use crate::machine::{self, Trigger};
use crate::scoring;
use crate::session::{Ctx, SessionState};
use log::{debug, info};
use shared::{ActionKind, ActionType, ClueRef, GameData, JeopardyData, Phase, PlayerId};

fn data(game_data: &GameData) -> Option<&JeopardyData> {
    match game_data {
        GameData::Jeopardy(data) => Some(data),
        _ => None,
    }
}

pub fn start_round(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<()> {
    let board = ctx.content.jeopardy_board(state.round_index, &mut state.rng);
    info!(
        "Room {}: board {} with {} categories",
        state.room_code,
        state.round_index,
        board.len()
    );
    state.game_data = GameData::Jeopardy(JeopardyData {
        board,
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
        ActionKind::SelectClue { category, clue } => select_clue(state, *category, *clue),
        ActionKind::OpenBuzzer => Ok(Some(Trigger::BuzzerOpened)),
        ActionKind::Buzz => buzz(state, player_id),
        ActionKind::JudgeAnswer {
            player_id: target,
            correct,
        } => match state.phase {
            Phase::Answer => {
                judge_buzzed(state, ctx, player_id, target.as_deref(), *correct).map(Some)
            }
            Phase::FinalJudging => judge_final(state, ctx, player_id, target.as_deref(), *correct),
            _ => Err(unsupported(state, action)),
        },
        ActionKind::FinalWager { amount } => wager(state, player_id, *amount),
        ActionKind::FinalAnswer { text } => final_answer(state, player_id, text),
        other => Err(unsupported(state, other)),
    }
}

fn select_clue(state: &mut SessionState, category: usize, clue: usize) -> GameResult<Option<Trigger>> {
    let GameData::Jeopardy(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    let cell = data.clue(category, clue).ok_or_else(|| {
        GameError::validation(format!("no clue at category {}, row {}", category, clue))
    })?;
    if cell.played {
        return Err(GameError::validation("that clue has already been played"));
    }

    data.current_clue = Some(ClueRef {
        category,
        clue,
        value: cell.value,
    });
    data.buzzed_player_id = None;
    data.locked_out.clear();
    Ok(Some(Trigger::ClueSelected))
}

fn buzz(state: &mut SessionState, player_id: &str) -> GameResult<Option<Trigger>> {
    let GameData::Jeopardy(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    if data.locked_out.iter().any(|id| id == player_id) {
        return Err(GameError::AlreadyActed {
            action: ActionType::Buzz,
        });
    }
    data.buzzed_player_id = Some(player_id.to_string());
    Ok(Some(Trigger::Buzzed))
}

fn own_answer(judge: &str) -> GameError {
    GameError::not_authorized(format!("{} cannot judge their own answer", judge))
}

/// A promoted participant holds host authority but never rules on their own
/// answer; the phase timer settles it instead.
fn judge_buzzed(
    state: &mut SessionState,
    ctx: &Ctx<'_>,
    judge: &str,
    target: Option<&str>,
    correct: bool,
) -> GameResult<Trigger> {
    let buzzed = data(&state.game_data)
        .and_then(|d| d.buzzed_player_id.clone())
        .ok_or_else(|| GameError::Internal("answer phase without a buzzed player".into()))?;
    if buzzed == judge {
        return Err(own_answer(judge));
    }
    if let Some(target) = target {
        if target != buzzed {
            return Err(GameError::validation(format!("{} did not buzz in", target)));
        }
    }
    resolve_clue(state, ctx, &buzzed, Some(correct))
}

/// Applies a verdict (`None` = ran out of time) for the buzzed player.
/// Wrong or missing answers lock the player out; the clue reopens while
/// anyone eligible is left.
fn resolve_clue(
    state: &mut SessionState,
    ctx: &Ctx<'_>,
    player_id: &str,
    verdict: Option<bool>,
) -> GameResult<Trigger> {
    let eligible = connected_participant_ids(&state.players);
    let GameData::Jeopardy(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    let clue = data
        .current_clue
        .ok_or_else(|| GameError::Internal("no clue in play".into()))?;
    data.buzzed_player_id = None;

    let (points, trigger) = if verdict == Some(true) {
        close_clue(data, clue);
        (clue.value, Trigger::Judged)
    } else {
        if !data.locked_out.iter().any(|id| id == player_id) {
            data.locked_out.push(player_id.to_string());
        }
        let reopen = eligible
            .iter()
            .any(|id| !data.locked_out.iter().any(|l| l == id));
        if !reopen {
            close_clue(data, clue);
        }
        let points = if verdict == Some(false) { -clue.value } else { 0 };
        (points, if reopen { Trigger::Reopen } else { Trigger::Judged })
    };

    scoring::award(&mut state.players, player_id, points, ctx.stamp);
    Ok(trigger)
}

fn close_clue(data: &mut JeopardyData, clue: ClueRef) {
    if let Some(cell) = data
        .board
        .get_mut(clue.category)
        .and_then(|c| c.clues.get_mut(clue.clue))
    {
        cell.played = true;
    }
    data.current_clue = None;
    data.buzzed_player_id = None;
    data.locked_out.clear();
}

fn wager(state: &mut SessionState, player_id: &str, amount: i64) -> GameResult<Option<Trigger>> {
    let max = state.player(player_id).map(|p| p.score.max(0)).unwrap_or(0);
    if !(0..=max).contains(&amount) {
        return Err(GameError::validation(format!(
            "wager must be between 0 and {}",
            max
        )));
    }

    let GameData::Jeopardy(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    data.wagers.insert(player_id.to_string(), amount);
    let done = all_connected_done(&state.players, |id| data.wagers.contains_key(id));
    Ok(done.then_some(Trigger::AllWagered))
}

fn final_answer(state: &mut SessionState, player_id: &str, text: &str) -> GameResult<Option<Trigger>> {
    let text = required_text(text, "final answer")?;
    let GameData::Jeopardy(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    data.final_answers.insert(player_id.to_string(), text);
    let done = all_connected_done(&state.players, |id| data.final_answers.contains_key(id));
    Ok(done.then_some(Trigger::AllAnswered))
}

fn judge_final(
    state: &mut SessionState,
    ctx: &Ctx<'_>,
    judge: &str,
    target: Option<&str>,
    correct: bool,
) -> GameResult<Option<Trigger>> {
    let target =
        target.ok_or_else(|| GameError::validation("final judging needs a player_id"))?;
    if target == judge {
        return Err(own_answer(judge));
    }
    let GameData::Jeopardy(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    if !data.final_answers.contains_key(target) {
        return Err(GameError::validation(format!("{} has no final answer", target)));
    }
    if data.judged.contains_key(target) {
        return Err(GameError::AlreadyActed {
            action: ActionType::JudgeAnswer,
        });
    }

    let wager = data.wagers.get(target).copied().unwrap_or(0);
    data.judged.insert(target.to_string(), correct);
    let done = all_judged(data);

    scoring::award(
        &mut state.players,
        target,
        if correct { wager } else { -wager },
        ctx.stamp,
    );
    Ok(done.then_some(Trigger::AllJudged))
}

fn all_judged(data: &JeopardyData) -> bool {
    data.final_answers.keys().all(|id| data.judged.contains_key(id))
}

/// Remaining final answers are compared with the expected answer.
fn auto_judge(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<Trigger> {
    let GameData::Jeopardy(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    let expected = data.final_clue.as_ref().and_then(|c| c.answer.clone());
    let verdicts: Vec<(PlayerId, bool, i64)> = data
        .final_answers
        .iter()
        .filter(|(id, _)| !data.judged.contains_key(*id))
        .map(|(id, text)| {
            let correct = expected
                .as_deref()
                .map(|e| scoring::answers_match(text, e))
                .unwrap_or(false);
            (id.clone(), correct, data.wagers.get(id).copied().unwrap_or(0))
        })
        .collect();

    for (id, correct, _) in &verdicts {
        data.judged.insert(id.clone(), *correct);
    }
    debug!("Auto-judged {} final answers", verdicts.len());
    for (id, correct, wager) in verdicts {
        let points = if correct { wager } else { -wager };
        scoring::award(&mut state.players, &id, points, ctx.stamp);
    }
    Ok(Trigger::AllJudged)
}

/// Missing wagers default to 0, missing answers to an empty string.
fn fill_defaults(state: &mut SessionState) -> GameResult<()> {
    let participants = participant_ids(&state.players);
    let phase = state.phase;
    let GameData::Jeopardy(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    for id in participants {
        match phase {
            Phase::FinalWager => {
                data.wagers.entry(id).or_insert(0);
            }
            Phase::FinalAnswer => {
                data.final_answers.entry(id).or_default();
            }
            _ => {}
        }
    }
    Ok(())
}

fn skip_clue(state: &mut SessionState) -> GameResult<()> {
    let GameData::Jeopardy(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    if let Some(clue) = data.current_clue {
        close_clue(data, clue);
    }
    Ok(())
}

pub fn on_timeout(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<Option<Trigger>> {
    match state.phase {
        Phase::Answer => {
            let buzzed = data(&state.game_data).and_then(|d| d.buzzed_player_id.clone());
            match buzzed {
                Some(player_id) => resolve_clue(state, ctx, &player_id, None).map(Some),
                None => {
                    skip_clue(state)?;
                    Ok(Some(Trigger::Judged))
                }
            }
        }
        Phase::FinalWager | Phase::FinalAnswer => {
            fill_defaults(state)?;
            Ok(Some(Trigger::Timeout))
        }
        Phase::FinalJudging => auto_judge(state, ctx).map(Some),
        _ => Ok(None),
    }
}

pub fn on_host_advance(state: &mut SessionState) -> GameResult<Trigger> {
    match state.phase {
        Phase::Clue | Phase::Buzzer => skip_clue(state)?,
        Phase::FinalWager | Phase::FinalAnswer => fill_defaults(state)?,
        _ => {}
    }
    Ok(Trigger::HostAdvance)
}

pub fn on_enter(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<Option<Trigger>> {
    let Some(data) = data(&state.game_data) else {
        return Ok(None);
    };
    match state.phase {
        Phase::Board if data.is_board_cleared() => machine::round_over(state, ctx).map(Some),
        Phase::FinalJudging if all_judged(data) => Ok(Some(Trigger::AllJudged)),
        _ => Ok(None),
    }
}

/// After the last board: the Final round if content provides a clue.
pub fn final_step(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<Trigger> {
    let final_clue = ctx.content.final_clue(&mut state.rng);
    let GameData::Jeopardy(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    match final_clue {
        Some(clue) => {
            data.final_clue = Some(clue);
            Ok(Trigger::FinalRound)
        }
        None => Ok(Trigger::GameOver),
    }
}

pub fn reevaluate(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<Option<Trigger>> {
    let Some(data) = data(&state.game_data) else {
        return Ok(None);
    };
    match state.phase {
        Phase::Answer => {
            let absent = data.buzzed_player_id.clone().filter(|id| {
                !state.player(id).map(|p| p.is_connected).unwrap_or(false)
            });
            match absent {
                Some(player_id) => resolve_clue(state, ctx, &player_id, None).map(Some),
                None => Ok(None),
            }
        }
        Phase::FinalWager => Ok(all_connected_done(&state.players, |id| {
            data.wagers.contains_key(id)
        })
        .then_some(Trigger::AllWagered)),
        Phase::FinalAnswer => Ok(all_connected_done(&state.players, |id| {
            data.final_answers.contains_key(id)
        })
        .then_some(Trigger::AllAnswered)),
        _ => Ok(None),
    }
}

pub fn may_act(state: &SessionState, player_id: &str, action: ActionType) -> bool {
    let Some(data) = data(&state.game_data) else {
        return true;
    };
    match action {
        ActionType::Buzz => !data.locked_out.iter().any(|id| id == player_id),
        ActionType::SelectClue => !data.is_board_cleared(),
        ActionType::JudgeAnswer if state.phase == Phase::Answer => {
            data.buzzed_player_id.as_deref() != Some(player_id)
        }
        ActionType::JudgeAnswer if state.phase == Phase::FinalJudging => data
            .final_answers
            .keys()
            .any(|id| id != player_id && !data.judged.contains_key(id)),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::FixedContent;
    use crate::games::testing;
    use shared::{Category, Clue, FinalClue, GameType};

    fn board() -> Vec<Category> {
        (0..3)
            .map(|c| Category {
                title: format!("Category {}", c),
                clues: vec![
                    Clue {
                        value: 200,
                        prompt: format!("Prompt {}-0", c),
                        answer: Some("the Nile".into()),
                        played: false,
                    },
                    Clue {
                        value: 400,
                        prompt: format!("Prompt {}-1", c),
                        answer: Some("the Danube".into()),
                        played: false,
                    },
                ],
            })
            .collect()
    }

    fn content() -> FixedContent {
        FixedContent {
            boards: vec![board()],
            final_clue: Some(FinalClue {
                category: "World Cities".into(),
                prompt: "Formerly Constantinople".into(),
                answer: Some("Istanbul".into()),
            }),
            ..Default::default()
        }
    }

    fn started(content: &FixedContent) -> SessionState {
        let mut state = testing::state(GameType::Jeopardy, &["a", "b"]);
        state.total_rounds = 1;
        let settings = testing::settings();
        let ctx = testing::ctx(&settings, content, 0);
        machine::advance(&mut state, &ctx, Trigger::Start).unwrap();
        state
    }

    fn payload(state: &SessionState) -> &JeopardyData {
        data(&state.game_data).unwrap()
    }

    #[test]
    fn test_select_clue_validates_cell() {
        let content = content();
        let mut state = started(&content);
        let settings = testing::settings();
        let ctx = testing::ctx(&settings, &content, 1);

        let missing = apply(
            &mut state,
            &ctx,
            "host",
            &ActionKind::SelectClue {
                category: 9,
                clue: 0,
            },
        );
        assert!(matches!(missing, Err(GameError::Validation(_))));

        let trigger = apply(
            &mut state,
            &ctx,
            "host",
            &ActionKind::SelectClue {
                category: 2,
                clue: 0,
            },
        )
        .unwrap();
        assert_eq!(trigger, Some(Trigger::ClueSelected));
        assert_eq!(payload(&state).current_clue.unwrap().value, 200);
    }

    #[test]
    fn test_wrong_answer_locks_out_and_reopens() {
        let content = content();
        let mut state = started(&content);
        let settings = testing::settings();
        let ctx = testing::ctx(&settings, &content, 1);

        for (action, player) in [
            (ActionKind::SelectClue { category: 0, clue: 1 }, "host"),
            (ActionKind::OpenBuzzer, "host"),
            (ActionKind::Buzz, "a"),
        ] {
            let trigger = apply(&mut state, &ctx, player, &action).unwrap().unwrap();
            machine::advance(&mut state, &ctx, trigger).unwrap();
        }
        assert_eq!(state.phase, Phase::Answer);

        let trigger = judge_buzzed(&mut state, &ctx, "host", None, false).unwrap();
        assert_eq!(trigger, Trigger::Reopen);
        assert_eq!(state.player("a").unwrap().score, -400);
        assert_eq!(payload(&state).locked_out, vec!["a".to_string()]);
        assert!(!may_act(&state, "a", ActionType::Buzz));

        let again = buzz(&mut state, "a");
        assert!(matches!(again, Err(GameError::AlreadyActed { .. })));
    }

    #[test]
    fn test_promoted_host_cannot_judge_own_answer() {
        let content = content();
        let mut state = started(&content);
        let settings = testing::settings();
        let ctx = testing::ctx(&settings, &content, 1);

        for (action, player) in [
            (ActionKind::SelectClue { category: 1, clue: 0 }, "host"),
            (ActionKind::OpenBuzzer, "host"),
            (ActionKind::Buzz, "a"),
        ] {
            let trigger = apply(&mut state, &ctx, player, &action).unwrap().unwrap();
            machine::advance(&mut state, &ctx, trigger).unwrap();
        }
        state.host_id = "a".to_string();
        assert!(!may_act(&state, "a", ActionType::JudgeAnswer));

        let judged = apply(
            &mut state,
            &ctx,
            "a",
            &ActionKind::JudgeAnswer {
                player_id: None,
                correct: true,
            },
        );
        assert!(matches!(judged, Err(GameError::NotAuthorized(_))));
        assert_eq!(state.phase, Phase::Answer);
        assert_eq!(state.player("a").unwrap().score, 0);

        let data = match &mut state.game_data {
            GameData::Jeopardy(data) => data,
            _ => unreachable!(),
        };
        data.final_answers.insert("a".into(), "Istanbul".into());
        data.final_answers.insert("b".into(), "Ankara".into());
        state.phase = Phase::FinalJudging;
        assert!(may_act(&state, "a", ActionType::JudgeAnswer));

        let own = judge_final(&mut state, &ctx, "a", Some("a"), true);
        assert!(matches!(own, Err(GameError::NotAuthorized(_))));
        judge_final(&mut state, &ctx, "a", Some("b"), false).unwrap();
        assert!(!may_act(&state, "a", ActionType::JudgeAnswer));
    }

    #[test]
    fn test_answer_timeout_locks_out_without_deduction() {
        let content = content();
        let mut state = started(&content);
        let settings = testing::settings();
        let ctx = testing::ctx(&settings, &content, 1);

        if let GameData::Jeopardy(data) = &mut state.game_data {
            data.current_clue = Some(ClueRef {
                category: 1,
                clue: 0,
                value: 200,
            });
            data.buzzed_player_id = Some("b".into());
        }
        state.phase = Phase::Answer;

        let trigger = on_timeout(&mut state, &ctx).unwrap();
        assert_eq!(trigger, Some(Trigger::Reopen));
        assert_eq!(state.player("b").unwrap().score, 0);
    }

    #[test]
    fn test_cleared_board_moves_to_final() {
        let content = content();
        let mut state = started(&content);
        let settings = testing::settings();
        let ctx = testing::ctx(&settings, &content, 1);

        if let GameData::Jeopardy(data) = &mut state.game_data {
            for category in &mut data.board {
                for clue in &mut category.clues {
                    clue.played = true;
                }
            }
            data.board[0].clues[0].played = false;
            data.current_clue = Some(ClueRef {
                category: 0,
                clue: 0,
                value: 200,
            });
        }
        state.phase = Phase::Clue;

        let trigger = on_host_advance(&mut state).unwrap();
        machine::advance(&mut state, &ctx, trigger).unwrap();
        assert_eq!(state.phase, Phase::FinalWager);
        assert!(payload(&state).final_clue.is_some());
    }

    #[test]
    fn test_wager_bounds() {
        let content = content();
        let mut state = started(&content);
        state.phase = Phase::FinalWager;
        state.player_mut("a").unwrap().score = 600;

        assert!(matches!(wager(&mut state, "a", 601), Err(GameError::Validation(_))));
        assert!(matches!(wager(&mut state, "a", -1), Err(GameError::Validation(_))));
        assert!(matches!(wager(&mut state, "b", 1), Err(GameError::Validation(_))));
        assert_eq!(wager(&mut state, "a", 600).unwrap(), None);
        assert_eq!(wager(&mut state, "b", 0).unwrap(), Some(Trigger::AllWagered));
    }

    #[test]
    fn test_final_judging_timeout_auto_judges() {
        let content = content();
        let mut state = started(&content);
        let settings = testing::settings();
        let ctx = testing::ctx(&settings, &content, 1);
        state.player_mut("a").unwrap().score = 500;
        state.player_mut("b").unwrap().score = 500;

        if let GameData::Jeopardy(data) = &mut state.game_data {
            data.final_clue = content.final_clue.clone();
            data.wagers.insert("a".into(), 300);
            data.wagers.insert("b".into(), 100);
            data.final_answers.insert("a".into(), "what is istanbul".into());
            data.final_answers.insert("b".into(), "Ankara".into());
        }
        state.phase = Phase::FinalJudging;

        let trigger = on_timeout(&mut state, &ctx).unwrap();
        assert_eq!(trigger, Some(Trigger::AllJudged));
        assert_eq!(state.player("a").unwrap().score, 800);
        assert_eq!(state.player("b").unwrap().score, 400);
    }
}
