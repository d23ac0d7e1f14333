//! Pure scoring reducers and final standings.
//!
//! Nothing in here touches the session directly except [`award`]; every call
//! site sits inside a dispatcher or timeout mutation so score changes always
//! travel through the delta stream.

use shared::{Player, PlayerId, Standing};
use std::collections::BTreeMap;

pub const INFILTRATOR_CATCH_POINTS: i64 = 100;
pub const INFILTRATOR_ESCAPE_POINTS: i64 = 200;
pub const PREDICTION_EXACT_POINTS: i64 = 300;
pub const PREDICTION_MAX_POINTS: f64 = 200.0;
pub const TRIVIA_BASE_POINTS: i64 = 100;
pub const TRIVIA_MAX_BONUS: f64 = 100.0;

const EXACT_EPSILON: f64 = 1e-9;

/// Adds `points` (possibly negative) to a player's score and stamps when the
/// new score was reached. Returns `false` if the player is gone.
pub fn award(players: &mut [Player], player_id: &str, points: i64, stamp: u64) -> bool {
    match players.iter_mut().find(|p| p.id == player_id) {
        Some(player) => {
            if points != 0 {
                player.score += points;
                player.score_reached_at = stamp;
            }
            true
        }
        None => false,
    }
}

/// Exact-match bonus, otherwise points fall off linearly with relative error.
pub fn prediction_points(value: f64, answer: f64) -> (f64, i64) {
    let error = (value - answer).abs();
    if error < EXACT_EPSILON {
        return (0.0, PREDICTION_EXACT_POINTS);
    }
    let scale = answer.abs().max(1.0);
    let points = (PREDICTION_MAX_POINTS * (1.0 - error / scale)).max(0.0).round() as i64;
    (error, points)
}

/// Base points plus a bonus proportional to the time left on the clock.
pub fn speed_points(remaining_ms: u64, total_ms: u64) -> i64 {
    if total_ms == 0 {
        return TRIVIA_BASE_POINTS;
    }
    let fraction = (remaining_ms.min(total_ms) as f64) / (total_ms as f64);
    TRIVIA_BASE_POINTS + (TRIVIA_MAX_BONUS * fraction).round() as i64
}

pub fn tally(votes: &BTreeMap<PlayerId, PlayerId>) -> BTreeMap<PlayerId, u32> {
    let mut counts = BTreeMap::new();
    for target in votes.values() {
        *counts.entry(target.clone()).or_insert(0) += 1;
    }
    counts
}

/// Target with strictly more votes than anyone else; ties produce `None`.
pub fn plurality(tally: &BTreeMap<PlayerId, u32>) -> Option<PlayerId> {
    let max = tally.values().copied().max()?;
    let mut leaders = tally.iter().filter(|(_, count)| **count == max);
    let (leader, _) = leaders.next()?;
    if leaders.next().is_some() {
        None
    } else {
        Some(leader.clone())
    }
}

/// Loose comparison for typed answers: case, punctuation, leading articles and
/// "what is"/"who is" prefixes are ignored.
pub fn answers_match(given: &str, expected: &str) -> bool {
    let given = normalize_answer(given);
    !given.is_empty() && given == normalize_answer(expected)
}

fn normalize_answer(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut words: Vec<&str> = cleaned.split_whitespace().collect();

    if words.len() >= 2
        && matches!(words[0], "what" | "who" | "where")
        && matches!(words[1], "is" | "are")
    {
        words.drain(..2);
    }
    if let Some(first) = words.first() {
        if matches!(*first, "the" | "a" | "an") {
            words.remove(0);
        }
    }
    words.join(" ")
}

/// Participants ordered by score, then by who reached their score first, then
/// by join order. The host seat never appears.
pub fn standings(players: &[Player]) -> Vec<Standing> {
    let mut ranked: Vec<(usize, &Player)> = players
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_participant())
        .collect();

    ranked.sort_by(|(ia, a), (ib, b)| {
        b.score
            .cmp(&a.score)
            .then(a.score_reached_at.cmp(&b.score_reached_at))
            .then(ia.cmp(ib))
    });

    ranked
        .into_iter()
        .enumerate()
        .map(|(i, (_, p))| Standing {
            rank: i as u32 + 1,
            player_id: p.id.clone(),
            name: p.name.clone(),
            score: p.score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::Role;

    fn player(id: &str, score: i64, reached: u64) -> Player {
        let mut p = Player::new(id, id.to_uppercase(), Role::Player, 0);
        p.score = score;
        p.score_reached_at = reached;
        p
    }

    #[test]
    fn test_award_stamps_score_time() {
        let mut players = vec![player("a", 0, 0)];
        assert!(award(&mut players, "a", 200, 7));
        assert_eq!(players[0].score, 200);
        assert_eq!(players[0].score_reached_at, 7);
        assert!(!award(&mut players, "zz", 100, 8));
    }

    #[test]
    fn test_award_zero_keeps_stamp() {
        let mut players = vec![player("a", 50, 3)];
        award(&mut players, "a", 0, 9);
        assert_eq!(players[0].score_reached_at, 3);
    }

    #[test]
    fn test_prediction_exact_match() {
        assert_eq!(prediction_points(206.0, 206.0), (0.0, PREDICTION_EXACT_POINTS));
    }

    #[test]
    fn test_prediction_inverse_error() {
        let (error, points) = prediction_points(150.0, 200.0);
        assert_approx_eq!(error, 50.0, 1e-9);
        assert_eq!(points, 150);

        let (_, far) = prediction_points(1000.0, 200.0);
        assert_eq!(far, 0);
    }

    #[test]
    fn test_prediction_small_answers_use_unit_scale() {
        let (_, points) = prediction_points(0.5, 0.0);
        assert_eq!(points, 100);
    }

    #[test]
    fn test_speed_points_bonus() {
        assert_eq!(speed_points(20_000, 20_000), 200);
        assert_eq!(speed_points(10_000, 20_000), 150);
        assert_eq!(speed_points(0, 20_000), 100);
        assert_eq!(speed_points(99_999, 20_000), 200);
        assert_eq!(speed_points(5, 0), 100);
    }

    #[test]
    fn test_plurality_strict() {
        let mut votes = BTreeMap::new();
        votes.insert("a".to_string(), "x".to_string());
        votes.insert("b".to_string(), "x".to_string());
        votes.insert("c".to_string(), "y".to_string());
        assert_eq!(plurality(&tally(&votes)), Some("x".to_string()));

        votes.insert("d".to_string(), "y".to_string());
        assert_eq!(plurality(&tally(&votes)), None);
        assert_eq!(plurality(&BTreeMap::new()), None);
    }

    #[test]
    fn test_answers_match() {
        assert!(answers_match("what is the Nile?", "the Nile"));
        assert!(answers_match("  ISTANBUL ", "Istanbul"));
        assert!(!answers_match("", "Istanbul"));
        assert!(!answers_match("Ankara", "Istanbul"));
    }

    #[test]
    fn test_standings_tiebreak() {
        let mut host = player("host", 0, 0);
        host.role = Role::Host;
        let players = vec![
            host,
            player("a", 300, 9),
            player("b", 300, 4),
            player("c", 100, 1),
            player("d", 100, 1),
        ];
        let order: Vec<String> = standings(&players)
            .into_iter()
            .map(|s| s.player_id)
            .collect();
        assert_eq!(order, vec!["b", "a", "c", "d"]);
    }
}
