//! # Party Game Session Server
//!
//! This library is the authoritative engine for short, host-driven party
//! games (Infiltrator, Jeopardy, Predict, Speed Match). It owns every live
//! session, validates each player action against the session's phase,
//! applies accepted actions as single mutations and streams per-player
//! views of the result to every connected participant.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Sessions
//! Clients never mutate state. They submit actions; the engine decides
//! whether an action is legal, applies it, advances the state machine and
//! tells everyone what changed. A rejected action changes nothing.
//!
//! ### Synchronization
//! Every accepted mutation bumps the session's sequence number by exactly
//! one and produces a delta per recipient. Newly attached connections get
//! a full snapshot. Clients that notice a sequence gap ask for a snapshot
//! and continue from there.
//!
//! ### Hidden Information
//! Views are redacted per recipient before they leave the engine: the
//! infiltrator never sees the secret word, only the host sees answers,
//! and votes or predictions stay private until the reveal.
//!
//! ## Module Organization
//!
//! ### Session Core (`session`, `machine`, `games`, `dispatcher`)
//! - Transactional state container with draft, commit and sequence stamping
//! - Transition tables and phase entry effects for all four game types
//! - Per-game reducers for round setup, actions, timeouts and scoring
//! - Action validation pipeline shared by every game
//!
//! ### Roster (`membership`)
//! - Joining, reconnecting and leaving
//! - Disconnect grace periods and host handover
//!
//! ### Runtime (`engine`, `registry`, `scheduler`, `sync`)
//! - Room code allocation and connection bindings
//! - One phase timer per session, guarded by an epoch
//! - Outbound message queue drained by the transport
//!
//! ### Transport (`network`, `connections`)
//! - UDP socket, datagram codec and peer table
//! - Heartbeat timeouts and the periodic expiry sweep
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::EngineConfig;
//! use server::content::BuiltinContent;
//! use server::network::Server;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> server::network::NetResult<()> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         EngineConfig::default(),
//!         Arc::new(BuiltinContent),
//!     )
//!     .await?;
//!
//!     // Runs until the socket closes:
//!     // - decodes client messages and routes them to the engine
//!     // - delivers engine output to the right peers
//!     // - drops silent peers and expires idle sessions
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The engine can also be driven directly, without a socket, which is how
//! the integration tests exercise full games:
//!
//! ```rust,no_run
//! use server::config::EngineConfig;
//! use server::content::BuiltinContent;
//! use server::engine::Engine;
//! use server::membership::Profile;
//! use shared::GameType;
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! # async fn demo() -> Result<(), server::error::GameError> {
//! let (tx, _rx) = mpsc::unbounded_channel();
//! let engine = Engine::new(EngineConfig::default(), Arc::new(BuiltinContent), tx);
//! let room = engine
//!     .create_session(1, GameType::Predict, Profile::new("host", "Host"), 0)
//!     .await?;
//! engine.join_session(2, &room, Profile::new("p1", "Ada"), 10).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connections;
pub mod content;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod games;
pub mod machine;
pub mod membership;
pub mod network;
pub mod registry;
pub mod scheduler;
pub mod scoring;
pub mod session;
pub mod sync;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{GameError, GameResult};
pub use membership::Profile;
pub use sync::Outbound;
