//! Engine configuration: capacities, grace windows and phase durations.

use shared::{GameType, Phase};
use std::time::Duration;

/// Bounded durations for timed phases. `None` means the phase waits for an
/// explicit action (host-paced or buzzer-wait).
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseDurations {
    pub role_reveal: Option<Duration>,
    pub questioning: Option<Duration>,
    pub voting: Option<Duration>,
    pub reveal: Option<Duration>,
    pub answer: Option<Duration>,
    pub final_wager: Option<Duration>,
    pub final_answer: Option<Duration>,
    pub final_judging: Option<Duration>,
    pub predicting: Option<Duration>,
    pub results: Option<Duration>,
    pub question: Option<Duration>,
    pub round_end: Option<Duration>,
}

impl Default for PhaseDurations {
    fn default() -> Self {
        Self {
            role_reveal: Some(Duration::from_secs(15)),
            questioning: Some(Duration::from_secs(60)),
            voting: Some(Duration::from_secs(60)),
            reveal: Some(Duration::from_secs(15)),
            answer: Some(Duration::from_secs(30)),
            final_wager: Some(Duration::from_secs(30)),
            final_answer: Some(Duration::from_secs(60)),
            final_judging: Some(Duration::from_secs(120)),
            predicting: Some(Duration::from_secs(45)),
            results: Some(Duration::from_secs(15)),
            question: Some(Duration::from_secs(20)),
            round_end: Some(Duration::from_secs(8)),
        }
    }
}

impl PhaseDurations {
    pub fn for_phase(&self, phase: Phase) -> Option<Duration> {
        match phase {
            Phase::RoleReveal => self.role_reveal,
            Phase::Questioning => self.questioning,
            Phase::Voting => self.voting,
            Phase::Reveal => self.reveal,
            Phase::Answer => self.answer,
            Phase::FinalWager => self.final_wager,
            Phase::FinalAnswer => self.final_answer,
            Phase::FinalJudging => self.final_judging,
            Phase::Predicting => self.predicting,
            Phase::Results => self.results,
            Phase::Question => self.question,
            Phase::RoundEnd => self.round_end,
            Phase::Lobby | Phase::Board | Phase::Clue | Phase::Buzzer | Phase::Ended => None,
        }
    }

    /// Same duration for every timed phase; handy for tests.
    pub fn uniform(duration: Duration) -> Self {
        Self {
            role_reveal: Some(duration),
            questioning: Some(duration),
            voting: Some(duration),
            reveal: Some(duration),
            answer: Some(duration),
            final_wager: Some(duration),
            final_answer: Some(duration),
            final_judging: Some(duration),
            predicting: Some(duration),
            results: Some(duration),
            question: Some(duration),
            round_end: Some(duration),
        }
    }
}

/// Rules that are fixed for the lifetime of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub durations: PhaseDurations,
    pub max_players: usize,
    pub question_rounds: u32,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum participants per session (the host seat is not counted).
    pub max_players: usize,
    /// How long a disconnected player keeps their seat.
    pub grace_period: Duration,
    /// Sessions without any mutation for this long are destroyed.
    pub idle_ttl: Duration,
    pub sweep_interval: Duration,
    /// A connection that sends nothing for this long is considered lost.
    pub heartbeat_timeout: Duration,
    pub max_connections: usize,
    pub durations: PhaseDurations,
    /// Question/answer exchanges per Infiltrator round.
    pub infiltrator_question_rounds: u32,
    pub infiltrator_rounds: u32,
    pub jeopardy_rounds: u32,
    pub predict_rounds: u32,
    pub speed_match_rounds: u32,
    /// Seeds every session RNG when set, for reproducible games.
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_players: 12,
            grace_period: Duration::from_secs(60),
            idle_ttl: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(1),
            heartbeat_timeout: Duration::from_secs(10),
            max_connections: 1024,
            durations: PhaseDurations::default(),
            infiltrator_question_rounds: 3,
            infiltrator_rounds: 3,
            jeopardy_rounds: 1,
            predict_rounds: 5,
            speed_match_rounds: 10,
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    pub fn total_rounds(&self, game_type: GameType) -> u32 {
        let rounds = match game_type {
            GameType::Infiltrator => self.infiltrator_rounds,
            GameType::Jeopardy => self.jeopardy_rounds,
            GameType::Predict => self.predict_rounds,
            GameType::SpeedMatch => self.speed_match_rounds,
        };
        rounds.max(1)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            durations: self.durations.clone(),
            max_players: self.max_players,
            question_rounds: self.infiltrator_question_rounds.max(1),
        }
    }
}

/// Fewest participants needed before the host may start.
pub fn min_players(game_type: GameType) -> usize {
    match game_type {
        GameType::Infiltrator => 3,
        GameType::Jeopardy | GameType::Predict | GameType::SpeedMatch => 1,
    }
}

/// Whether players may still join once the lobby is over.
pub fn allows_late_join(game_type: GameType) -> bool {
    matches!(game_type, GameType::SpeedMatch)
}
