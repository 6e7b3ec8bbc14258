//! # Roshambo Duel Server
//!
//! Session-based two-player rock-paper-scissors over WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ROSHAMBO SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Duel rules (deterministic)                │
//! │  ├── choice.rs   - Choice domain and round resolution        │
//! │  └── state.rs    - Player slots, scores, session lifecycle   │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── server.rs   - WebSocket server and event handlers       │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── identity.rs - Durable identities, connection binding    │
//! │  ├── session.rs  - Session registry and garbage collection   │
//! │  └── broadcast.rs- Full-view fan-out after mutations         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Synchronization Guarantee
//!
//! Session state changes only through the registry's operations, each of
//! which holds the session's lock for the whole mutation and ends with a
//! broadcast of the full session view to every member connection. A round
//! resolves **exactly once** per pair of choices - on the submission that
//! completes the pair - so duplicate submissions and reconnects can never
//! double-score. Identities are durable tokens, distinct from connections:
//! a reconnecting player lands back in the same seat with the same score.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::choice::{resolve, Choice, Outcome};
pub use game::state::{MatchPhase, MatchState, PlayerId, PlayerSlot, Role, RoundResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Participants per session (host + guest).
pub const SESSION_CAPACITY: usize = 2;

/// Hex characters in a session code (a 16^4 code space).
pub const SESSION_CODE_LEN: usize = 4;
