//! Predict: everyone guesses a number, closest guesses score.

use super::{all_connected_done, mismatched, unsupported};
use crate::error::{GameError, GameResult};
use crate::machine::Trigger;
use crate::scoring;
use crate::session::{Ctx, SessionState};
use shared::{ActionKind, GameData, Phase, PredictData, PredictionResult};

pub fn start_round(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<()> {
    let prompt = ctx.content.prediction_prompt(state.round_index, &mut state.rng);
    state.game_data = GameData::Predict(PredictData {
        prompt: prompt.prompt,
        unit: prompt.unit,
        answer: Some(prompt.answer),
        ..Default::default()
    });
    Ok(())
}

pub fn apply(
    state: &mut SessionState,
    player_id: &str,
    action: &ActionKind,
) -> GameResult<Option<Trigger>> {
    let ActionKind::Predict { value } = action else {
        return Err(unsupported(state, action));
    };
    if !value.is_finite() {
        return Err(GameError::validation("prediction must be a finite number"));
    }

    let GameData::Predict(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    data.predictions.insert(player_id.to_string(), *value);
    let done = all_connected_done(&state.players, |id| data.predictions.contains_key(id));
    Ok(done.then_some(Trigger::AllPredicted))
}

/// Ranks predictions by distance from the answer and awards points.
pub fn finish_round(state: &mut SessionState, ctx: &Ctx<'_>) -> GameResult<()> {
    let GameData::Predict(data) = &mut state.game_data else {
        return Err(mismatched(state));
    };
    let Some(answer) = data.answer else {
        return Err(GameError::Internal("prediction round without an answer".into()));
    };

    let mut results: Vec<PredictionResult> = data
        .predictions
        .iter()
        .map(|(id, value)| {
            let (error, points) = scoring::prediction_points(*value, answer);
            PredictionResult {
                player_id: id.clone(),
                value: *value,
                error,
                points,
            }
        })
        .collect();
    results.sort_by(|a, b| a.error.total_cmp(&b.error));

    for result in &results {
        scoring::award(&mut state.players, &result.player_id, result.points, ctx.stamp);
    }
    data.results = results;
    Ok(())
}

pub fn reevaluate(state: &mut SessionState) -> GameResult<Option<Trigger>> {
    if state.phase != Phase::Predicting {
        return Ok(None);
    }
    let GameData::Predict(data) = &state.game_data else {
        return Ok(None);
    };
    let done = all_connected_done(&state.players, |id| data.predictions.contains_key(id));
    Ok(done.then_some(Trigger::AllPredicted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{FixedContent, PredictionPrompt};
    use crate::games::testing;
    use crate::machine;
    use shared::GameType;

    fn content() -> FixedContent {
        FixedContent {
            prompts: vec![PredictionPrompt {
                prompt: "Bridges in Pittsburgh".into(),
                unit: Some("bridges".into()),
                answer: 446.0,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_non_finite() {
        let content = content();
        let settings = testing::settings();
        let ctx = testing::ctx(&settings, &content, 0);
        let mut state = testing::state(GameType::Predict, &["a"]);
        machine::advance(&mut state, &ctx, Trigger::Start).unwrap();

        let result = apply(&mut state, "a", &ActionKind::Predict { value: f64::NAN });
        assert!(matches!(result, Err(GameError::Validation(_))));
    }

    #[test]
    fn test_results_sorted_and_scored() {
        let content = content();
        let settings = testing::settings();
        let ctx = testing::ctx(&settings, &content, 0);
        let mut state = testing::state(GameType::Predict, &["a", "b", "c"]);
        machine::advance(&mut state, &ctx, Trigger::Start).unwrap();

        let ctx = testing::ctx(&settings, &content, 500);
        assert_eq!(apply(&mut state, "a", &ActionKind::Predict { value: 300.0 }).unwrap(), None);
        assert_eq!(apply(&mut state, "b", &ActionKind::Predict { value: 446.0 }).unwrap(), None);
        let trigger = apply(&mut state, "c", &ActionKind::Predict { value: 1000.0 }).unwrap();
        assert_eq!(trigger, Some(Trigger::AllPredicted));

        machine::advance(&mut state, &ctx, Trigger::AllPredicted).unwrap();
        assert_eq!(state.phase, Phase::Results);

        let GameData::Predict(data) = &state.game_data else {
            panic!("expected predict payload");
        };
        let order: Vec<&str> = data.results.iter().map(|r| r.player_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert_eq!(state.player("b").unwrap().score, scoring::PREDICTION_EXACT_POINTS);
        assert_eq!(state.player("c").unwrap().score, 0);
        assert!(state.player("a").unwrap().score > 0);
    }

    #[test]
    fn test_disconnect_completes_round() {
        let content = content();
        let settings = testing::settings();
        let ctx = testing::ctx(&settings, &content, 0);
        let mut state = testing::state(GameType::Predict, &["a", "b"]);
        machine::advance(&mut state, &ctx, Trigger::Start).unwrap();

        apply(&mut state, "a", &ActionKind::Predict { value: 10.0 }).unwrap();
        assert_eq!(reevaluate(&mut state).unwrap(), None);
        state.player_mut("b").unwrap().is_connected = false;
        assert_eq!(reevaluate(&mut state).unwrap(), Some(Trigger::AllPredicted));
    }
}
