//! Session State Definitions
//!
//! Per-session duel state: player slots, choice intake, round resolution,
//! and the continue/reset transitions. Deterministic; no I/O. Delivery of
//! state to connections is the network layer's job.

use serde::{Deserialize, Serialize};

use crate::game::choice::{resolve, Choice, Outcome};
use crate::SESSION_CAPACITY;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique player identifier (UUID as bytes).
///
/// Durable across reconnects: the identifier names the participant, never the
/// connection. Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Short uppercase hex prefix, for default names and log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..2]).to_ascii_uppercase()
    }
}

// =============================================================================
// SLOTS
// =============================================================================

/// A slot's role within the session. The first identity to be seated hosts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Created the session.
    Host,
    /// Joined by code.
    Guest,
}

/// A participant's position within a session.
///
/// Created when an identity first enters the session and destroyed only with
/// the session itself; reconnects reuse the existing slot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerSlot {
    /// Occupying identity.
    pub player: PlayerId,
    /// Display name shown to the opponent.
    pub name: String,
    /// Rounds won since the last reset.
    pub score: u32,
    /// Choice for the current round, if revealed.
    pub choice: Option<Choice>,
    /// Host or guest.
    pub role: Role,
}

/// Result of the most recently resolved round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundResult {
    /// Both slots made the same choice.
    Draw,
    /// The named identity won the round.
    Winner(PlayerId),
}

/// Derived lifecycle phase of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchPhase {
    /// One seated slot, waiting for an opponent.
    Waiting,
    /// Both slots seated, at most one choice revealed.
    Ready,
    /// Both choices revealed and a result recorded.
    Resolved,
}

/// State machine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// Session is full.
    #[error("Session is full")]
    SessionFull,

    /// Identity already occupies a slot.
    #[error("Already in session")]
    AlreadyInSession,

    /// Identity occupies no slot in this session.
    #[error("Not a member of this session")]
    NotAMember,
}

// =============================================================================
// MATCH STATE
// =============================================================================

/// State of one two-player duel.
///
/// Slot order is append order (host first) and never reordered. `result` is
/// present exactly while both slots hold a revealed choice, and a round
/// resolves at most once: resolution fires on the submission that completes
/// the pair, never on a resubmission.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MatchState {
    slots: Vec<PlayerSlot>,
    result: Option<RoundResult>,
}

impl MatchState {
    /// Create an empty session state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session state with `host` already seated.
    pub fn with_host(host: PlayerId, name: &str) -> Self {
        Self {
            slots: vec![PlayerSlot {
                player: host,
                name: name.to_string(),
                score: 0,
                choice: None,
                role: Role::Host,
            }],
            result: None,
        }
    }

    /// Seat an identity. The first seat hosts, the second is the guest.
    pub fn add_player(&mut self, player: PlayerId, name: &str) -> Result<Role, StateError> {
        if self.contains(&player) {
            return Err(StateError::AlreadyInSession);
        }
        if self.slots.len() >= SESSION_CAPACITY {
            return Err(StateError::SessionFull);
        }

        let role = if self.slots.is_empty() {
            Role::Host
        } else {
            Role::Guest
        };
        self.slots.push(PlayerSlot {
            player,
            name: name.to_string(),
            score: 0,
            choice: None,
            role,
        });
        Ok(role)
    }

    /// All seated slots, in append order.
    pub fn slots(&self) -> &[PlayerSlot] {
        &self.slots
    }

    /// The slot occupied by `player`, if seated.
    pub fn slot(&self, player: &PlayerId) -> Option<&PlayerSlot> {
        self.slots.iter().find(|s| s.player == *player)
    }

    fn slot_mut(&mut self, player: &PlayerId) -> Option<&mut PlayerSlot> {
        self.slots.iter_mut().find(|s| s.player == *player)
    }

    /// Whether `player` occupies a slot.
    pub fn contains(&self, player: &PlayerId) -> bool {
        self.slot(player).is_some()
    }

    /// Whether both seats are taken.
    pub fn is_full(&self) -> bool {
        self.slots.len() >= SESSION_CAPACITY
    }

    /// Number of seated players.
    pub fn player_count(&self) -> usize {
        self.slots.len()
    }

    /// The recorded result of the current round, if resolved.
    pub fn result(&self) -> Option<RoundResult> {
        self.result
    }

    /// Current lifecycle phase, derived from slots and result.
    pub fn phase(&self) -> MatchPhase {
        if self.result.is_some() {
            MatchPhase::Resolved
        } else if self.slots.len() < SESSION_CAPACITY {
            MatchPhase::Waiting
        } else {
            MatchPhase::Ready
        }
    }

    /// Record `player`'s choice for the current round.
    ///
    /// Resolution fires exactly when this submission completes the pair while
    /// no result is recorded yet; returns `true` in that case. Resubmitting a
    /// choice after resolution changes the slot but never re-scores.
    pub fn submit_choice(&mut self, player: &PlayerId, choice: Choice) -> Result<bool, StateError> {
        let slot = self.slot_mut(player).ok_or(StateError::NotAMember)?;
        slot.choice = Some(choice);

        if self.result.is_some() {
            return Ok(false);
        }

        let pair = match self.slots.as_slice() {
            [a, b] => a.choice.zip(b.choice),
            _ => None,
        };
        match pair {
            Some((first, second)) => {
                self.apply_result(first, second);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Caller guarantees exactly two seated slots with revealed choices.
    fn apply_result(&mut self, first: Choice, second: Choice) {
        let result = match resolve(first, second) {
            Outcome::Draw => RoundResult::Draw,
            Outcome::FirstWins => {
                self.slots[0].score += 1;
                RoundResult::Winner(self.slots[0].player)
            }
            Outcome::SecondWins => {
                self.slots[1].score += 1;
                RoundResult::Winner(self.slots[1].player)
            }
        };
        self.result = Some(result);
    }

    /// Start the next round: clear both choices and the result, keep scores.
    pub fn continue_round(&mut self) {
        for slot in &mut self.slots {
            slot.choice = None;
        }
        self.result = None;
    }

    /// Fresh start: clear choices, result, and scores.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.choice = None;
            slot.score = 0;
        }
        self.result = None;
    }

    /// Rename the slot occupied by `player`. Returns false if not seated.
    pub fn rename_player(&mut self, player: &PlayerId, name: &str) -> bool {
        match self.slot_mut(player) {
            Some(slot) => {
                slot.name = name.to_string();
                true
            }
            None => false,
        }
    }
}
