//! # Party Game Terminal Client
//!
//! This library is a thin, text-based client for the party game session
//! server. It turns typed commands into protocol messages, keeps a local
//! mirror of the session the player is in and prints a readable view of it
//! after every change.
//!
//! ## Architecture Overview
//!
//! The client never decides anything about the game. The server is the
//! only authority; the client only mirrors what it is told.
//!
//! ### Snapshot + Delta Mirroring
//! The first message for a session is a full snapshot. Every later change
//! arrives as a delta stamped with the next sequence number and is folded
//! into the mirror with the same reducer the server tests against.
//!
//! ### Gap Recovery
//! Datagrams can be lost. When a delta skips a sequence number the mirror
//! stops applying deltas and the client asks for a fresh snapshot. Deltas
//! older than what is already applied are silently dropped.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! - Parses one line of text into a command
//! - Maps action commands onto the shared action types
//!
//! ### Mirror Module (`mirror`)
//! - Holds the last known snapshot and applies deltas
//! - Detects sequence gaps and stale messages
//! - Renders the session as plain text
//!
//! ### Network Module (`network`)
//! - UDP socket and message codec
//! - Heartbeats so the server keeps the seat alive
//! - Optional artificial latency for testing
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, Identity};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = Identity {
//!     player_id: "p1".to_string(),
//!     name: "Ada".to_string(),
//!     avatar_url: None,
//! };
//! let mut client = Client::new("127.0.0.1:8080", identity, 0, Duration::from_secs(2)).await?;
//! client.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod input;
pub mod mirror;
pub mod network;
