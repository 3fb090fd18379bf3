//! Four-in-a-line game service core: board engine, wire codec, shared
//! registries, lobby dispatcher and per-match worker.
//!
//! `src/bin/server.rs` and `src/bin/client.rs` are thin CLI shells around
//! this library; everything that matters for protocol and game-state
//! correctness lives here so it can be exercised directly from tests.

pub mod board;
pub mod conn;
pub mod event;
pub mod lobby;
pub mod logger;
pub mod protocol;
pub mod registry;
pub mod worker;
