//! Network Layer
//!
//! WebSocket server for real-time duel sessions.
//! This layer is **non-deterministic** - all game rules run through `game/`.

pub mod broadcast;
pub mod identity;
pub mod protocol;
pub mod server;
pub mod session;

pub use broadcast::Broadcaster;
pub use identity::{Identity, IdentityRegistry};
pub use protocol::{ClientMessage, ServerMessage, SessionView, SlotView};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use session::{GameSession, JoinOutcome, SessionCode, SessionError, SessionRegistry};
