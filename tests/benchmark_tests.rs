//! Performance benchmarks for the hot paths of the session engine

use server::config::EngineConfig;
use server::content::BuiltinContent;
use server::engine::Engine;
use server::membership::Profile;
use server::scoring;
use shared::{
    apply_delta, decode, diff, encode, ActionKind, Delta, GameData, GameType, Phase, Player,
    PredictData, Role, Snapshot, MAX_DATAGRAM_SIZE,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

fn crowded_snapshot(players: usize, sequence: u64) -> Snapshot {
    let mut roster = vec![Player::new("host", "Host", Role::Host, 0)];
    let mut predictions = BTreeMap::new();
    for i in 0..players {
        let mut player = Player::new(format!("p{}", i), format!("Player {}", i), Role::Player, i as u64);
        player.score = (i as i64 * 37) % 500;
        roster.push(player);
        predictions.insert(format!("p{}", i), i as f64 * 1.5);
    }

    Snapshot {
        room_code: "AB12CD".to_string(),
        game_type: GameType::Predict,
        phase: Phase::Predicting,
        players: roster,
        host_id: "host".to_string(),
        round_index: 2,
        total_rounds: 5,
        game_data: GameData::Predict(PredictData {
            prompt: "How many bones are in the adult human body?".to_string(),
            unit: None,
            answer: None,
            predictions,
            results: Vec::new(),
        }),
        paused: false,
        phase_deadline: Some(45_000),
        legal_actions: Vec::new(),
        sequence,
    }
}

/// Benchmarks computing and applying deltas between two views
#[test]
fn benchmark_delta_roundtrip() {
    let before = crowded_snapshot(12, 40);
    let mut after = crowded_snapshot(12, 41);
    after.players[3].score += 200;
    after.phase = Phase::Results;

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let delta = Delta {
            room_code: before.room_code.clone(),
            sequence: 41,
            changes: diff(&before, &after),
            timestamp: 0,
        };
        let applied = apply_delta(&before, &delta).unwrap();
        assert_eq!(applied.sequence, 41);
    }

    let duration = start.elapsed();
    println!(
        "Delta diff+apply: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds even in debug builds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks snapshot encoding and checks it fits a single datagram
#[test]
fn benchmark_snapshot_serialization() {
    let snapshot = crowded_snapshot(12, 7);
    let encoded = encode(&snapshot).unwrap();
    println!("Snapshot with 13 seats: {} bytes", encoded.len());
    assert!(encoded.len() < MAX_DATAGRAM_SIZE);

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = encode(&snapshot).unwrap();
        let _decoded: Snapshot = decode(&bytes).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Snapshot serialization: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 5000);
}

/// Benchmarks final standings over a large roster
#[test]
fn benchmark_standings() {
    let players = crowded_snapshot(200, 0).players;

    let iterations = 2_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let standings = scoring::standings(&players);
        assert_eq!(standings.len(), 200);
    }

    let duration = start.elapsed();
    println!(
        "Standings (200 players): {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 5000);
}

/// Stress tests many concurrent sessions driven through the engine
#[tokio::test]
async fn stress_test_many_sessions() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = Engine::new(EngineConfig::default(), Arc::new(BuiltinContent), tx);
    let sessions = 200;
    let players_per_session = 4;

    let start = Instant::now();
    let mut next_connection = 1;
    for s in 0..sessions {
        let host = next_connection;
        next_connection += 1;
        let room = engine
            .create_session(host, GameType::Predict, Profile::new(format!("h{}", s), "Host"), 0)
            .await
            .unwrap();

        for p in 0..players_per_session {
            let id = format!("s{}p{}", s, p);
            engine
                .join_session(next_connection, &room, Profile::new(id.clone(), "Player"), 1)
                .await
                .unwrap();
            next_connection += 1;
        }

        engine
            .submit(&room, &format!("h{}", s), ActionKind::StartGame, 2)
            .await
            .unwrap();
        for p in 0..players_per_session {
            engine
                .submit(
                    &room,
                    &format!("s{}p{}", s, p),
                    ActionKind::Predict { value: p as f64 * 10.0 },
                    3,
                )
                .await
                .unwrap();
        }
    }
    let duration = start.elapsed();

    let mut delivered = 0;
    while rx.try_recv().is_ok() {
        delivered += 1;
    }
    println!(
        "{} sessions x {} players: {:?}, {} messages queued",
        sessions, players_per_session, duration, delivered
    );

    assert_eq!(engine.session_count().await, sessions);
    assert!(delivered > sessions * players_per_session);
    assert!(duration.as_secs() < 10);
}
