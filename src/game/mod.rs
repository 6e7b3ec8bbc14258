//! Game Logic Module
//!
//! The rules and per-session state of the duel. 100% deterministic.
//!
//! - `choice`: the choice domain and round resolution
//! - `state`: player slots, scores, and the session lifecycle

pub mod choice;
pub mod state;

// Re-export key types
pub use choice::{resolve, Choice, Outcome};
pub use state::{MatchPhase, MatchState, PlayerId, PlayerSlot, Role, RoundResult, StateError};
