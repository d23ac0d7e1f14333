//! Round content (secret words, boards, prompts, trivia).
//!
//! Content is owned by an external collaborator; the engine only asks for the
//! next item when a round starts and treats the result as opaque payload.

use rand::seq::SliceRandom;
use rand::RngCore;
use shared::{Category, Clue, FinalClue};

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionPrompt {
    pub prompt: String,
    pub unit: Option<String>,
    pub answer: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriviaQuestion {
    pub question: String,
    pub choices: Vec<String>,
    pub correct: usize,
}

/// Source of round content, consulted by the state machine on round start.
pub trait ContentProvider: Send + Sync {
    fn secret_word(&self, round: u32, rng: &mut dyn RngCore) -> String;
    fn jeopardy_board(&self, round: u32, rng: &mut dyn RngCore) -> Vec<Category>;
    fn final_clue(&self, rng: &mut dyn RngCore) -> Option<FinalClue>;
    fn prediction_prompt(&self, round: u32, rng: &mut dyn RngCore) -> PredictionPrompt;
    fn trivia_question(&self, round: u32, rng: &mut dyn RngCore) -> TriviaQuestion;
}

const WORDS: &[&str] = &[
    "OASIS", "LIGHTHOUSE", "VOLCANO", "LIBRARY", "SUBMARINE", "CIRCUS", "GLACIER", "BAKERY",
    "OBSERVATORY", "CASTLE",
];

const CATEGORIES: &[(&str, [(&str, &str); 3])] = &[
    (
        "Rivers",
        [
            ("Longest river in Africa", "the Nile"),
            ("It flows through Budapest and Vienna", "the Danube"),
            ("The Rio Negro joins it at Manaus", "the Amazon"),
        ],
    ),
    (
        "Elements",
        [
            ("Symbol Fe", "iron"),
            ("Lightest noble gas", "helium"),
            ("Atomic number 79", "gold"),
        ],
    ),
    (
        "Instruments",
        [
            ("88 keys", "the piano"),
            ("Largest member of the violin family", "the double bass"),
            ("Scottish bag-and-drone instrument", "the bagpipes"),
        ],
    ),
    (
        "Planets",
        [
            ("Red planet", "Mars"),
            ("Has the Great Red Spot", "Jupiter"),
            ("Rotates on its side", "Uranus"),
        ],
    ),
    (
        "Languages",
        [
            ("Spoken in Brazil", "Portuguese"),
            ("Official language of Iran", "Persian"),
            ("Language of the Rosetta Stone's middle text", "Demotic"),
        ],
    ),
];

const PROMPTS: &[(&str, Option<&str>, f64)] = &[
    ("How tall is the Eiffel Tower?", Some("m"), 330.0),
    ("How many bones are in the adult human body?", None, 206.0),
    ("In what year did the first person walk on the Moon?", None, 1969.0),
    ("How many keys does a standard piano have?", None, 88.0),
    ("How long is a marathon?", Some("km"), 42.195),
    ("How many countries are members of the UN?", None, 193.0),
];

const TRIVIA: &[(&str, [&str; 4], usize)] = &[
    ("Which planet is closest to the Sun?", ["Venus", "Mercury", "Mars", "Earth"], 1),
    ("What is H2O?", ["Salt", "Hydrogen", "Water", "Oxygen"], 2),
    ("How many sides does a hexagon have?", ["5", "6", "7", "8"], 1),
    ("Who painted the Mona Lisa?", ["Da Vinci", "Monet", "Picasso", "Rembrandt"], 0),
    ("Largest ocean on Earth?", ["Atlantic", "Indian", "Arctic", "Pacific"], 3),
    ("What gas do plants absorb?", ["Oxygen", "Carbon dioxide", "Nitrogen", "Helium"], 1),
];

const BOARD_CATEGORIES: usize = 3;
const BASE_CLUE_VALUE: i64 = 200;

/// Small built-in pool used when no external provider is plugged in.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinContent;

impl ContentProvider for BuiltinContent {
    fn secret_word(&self, _round: u32, rng: &mut dyn RngCore) -> String {
        WORDS.choose(rng).copied().unwrap_or("OASIS").to_string()
    }

    fn jeopardy_board(&self, round: u32, rng: &mut dyn RngCore) -> Vec<Category> {
        let multiplier = i64::from(round.max(1));
        let mut picked: Vec<_> = CATEGORIES.iter().collect();
        picked.shuffle(rng);

        picked
            .into_iter()
            .take(BOARD_CATEGORIES)
            .map(|(title, clues)| Category {
                title: title.to_string(),
                clues: clues
                    .iter()
                    .enumerate()
                    .map(|(i, (prompt, answer))| Clue {
                        value: BASE_CLUE_VALUE * (i as i64 + 1) * multiplier,
                        prompt: prompt.to_string(),
                        answer: Some(answer.to_string()),
                        played: false,
                    })
                    .collect(),
            })
            .collect()
    }

    fn final_clue(&self, _rng: &mut dyn RngCore) -> Option<FinalClue> {
        Some(FinalClue {
            category: "World Cities".to_string(),
            prompt: "Formerly Constantinople, this city straddles Europe and Asia".to_string(),
            answer: Some("Istanbul".to_string()),
        })
    }

    fn prediction_prompt(&self, _round: u32, rng: &mut dyn RngCore) -> PredictionPrompt {
        let (prompt, unit, answer) = PROMPTS.choose(rng).copied().unwrap_or(PROMPTS[0]);
        PredictionPrompt {
            prompt: prompt.to_string(),
            unit: unit.map(str::to_string),
            answer,
        }
    }

    fn trivia_question(&self, _round: u32, rng: &mut dyn RngCore) -> TriviaQuestion {
        let (question, choices, correct) = TRIVIA.choose(rng).copied().unwrap_or(TRIVIA[0]);
        TriviaQuestion {
            question: question.to_string(),
            choices: choices.iter().map(|c| c.to_string()).collect(),
            correct,
        }
    }
}

/// Deterministic provider: round `n` gets item `(n - 1) % len` of each list.
#[derive(Debug, Clone, Default)]
pub struct FixedContent {
    pub words: Vec<String>,
    pub boards: Vec<Vec<Category>>,
    pub final_clue: Option<FinalClue>,
    pub prompts: Vec<PredictionPrompt>,
    pub questions: Vec<TriviaQuestion>,
}

fn pick<T: Clone>(items: &[T], round: u32) -> Option<T> {
    if items.is_empty() {
        return None;
    }
    let index = (round.max(1) as usize - 1) % items.len();
    items.get(index).cloned()
}

impl ContentProvider for FixedContent {
    fn secret_word(&self, round: u32, rng: &mut dyn RngCore) -> String {
        pick(&self.words, round).unwrap_or_else(|| BuiltinContent.secret_word(round, rng))
    }

    fn jeopardy_board(&self, round: u32, rng: &mut dyn RngCore) -> Vec<Category> {
        pick(&self.boards, round).unwrap_or_else(|| BuiltinContent.jeopardy_board(round, rng))
    }

    fn final_clue(&self, _rng: &mut dyn RngCore) -> Option<FinalClue> {
        self.final_clue.clone()
    }

    fn prediction_prompt(&self, round: u32, rng: &mut dyn RngCore) -> PredictionPrompt {
        pick(&self.prompts, round).unwrap_or_else(|| BuiltinContent.prediction_prompt(round, rng))
    }

    fn trivia_question(&self, round: u32, rng: &mut dyn RngCore) -> TriviaQuestion {
        pick(&self.questions, round).unwrap_or_else(|| BuiltinContent.trivia_question(round, rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_builtin_board_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let board = BuiltinContent.jeopardy_board(1, &mut rng);
        assert_eq!(board.len(), BOARD_CATEGORIES);
        for category in &board {
            let values: Vec<i64> = category.clues.iter().map(|c| c.value).collect();
            assert_eq!(values, vec![200, 400, 600]);
            assert!(category.clues.iter().all(|c| !c.played));
        }
    }

    #[test]
    fn test_second_board_doubles_values() {
        let mut rng = StdRng::seed_from_u64(7);
        let board = BuiltinContent.jeopardy_board(2, &mut rng);
        assert_eq!(board[0].clues[0].value, 400);
    }

    #[test]
    fn test_trivia_correct_index_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for round in 1..20 {
            let q = BuiltinContent.trivia_question(round, &mut rng);
            assert!(q.correct < q.choices.len());
        }
    }

    #[test]
    fn test_fixed_content_cycles_by_round() {
        let content = FixedContent {
            words: vec!["OASIS".into(), "CASTLE".into()],
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(content.secret_word(1, &mut rng), "OASIS");
        assert_eq!(content.secret_word(2, &mut rng), "CASTLE");
        assert_eq!(content.secret_word(3, &mut rng), "OASIS");
    }

    #[test]
    fn test_fixed_content_falls_back_to_builtin() {
        let content = FixedContent::default();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(!content.secret_word(1, &mut rng).is_empty());
        assert!(content.final_clue(&mut rng).is_none());
    }
}
