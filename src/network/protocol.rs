//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are serialized as JSON, tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::game::choice::Choice;
use crate::game::state::{MatchState, Role, RoundResult};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Resolve or mint a durable identity for this connection.
    Identify {
        /// Previously issued identity token, if the client kept one.
        #[serde(default)]
        id: Option<String>,
        /// Preferred display name.
        #[serde(default)]
        name: Option<String>,
    },

    /// Create a session and take the host seat.
    CreateSession,

    /// Join (or rejoin) a session by code.
    JoinSession {
        /// Session code shown to the host at creation.
        code: String,
    },

    /// Reveal a choice for the current round.
    SubmitChoice {
        /// One of the three-valued choice domain.
        choice: Choice,
    },

    /// Start the next round, keeping scores.
    Continue,

    /// Wipe choices and scores for a fresh start.
    Reset,

    /// Rename this identity (and its seat, if any).
    SetName {
        /// New display name.
        name: String,
    },

    /// Ping for latency measurement.
    Ping {
        /// Echoed back in the pong.
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Identity resolved for this connection.
    Identified {
        /// Durable identity token; present it on reconnect.
        id: String,
        /// Display name in effect.
        name: String,
    },

    /// Session created; the caller holds the host seat.
    SessionCreated {
        /// Code an opponent joins with.
        code: String,
    },

    /// Join succeeded; full view of the session as it stands.
    SessionJoined {
        /// Current session view.
        session: SessionView,
    },

    /// Full session view, sent to every member after each mutation.
    SessionUpdate {
        /// Current session view.
        session: SessionView,
    },

    /// No live session under the given code.
    SessionNotFound,

    /// Both seats in the session are already taken.
    SessionFull,

    /// The action requires an identity; send `identify` first.
    IdentityMissing,

    /// The request was understood but could not be applied.
    OperationFailed {
        /// Human-readable reason.
        message: String,
    },

    /// Pong response.
    Pong {
        /// Timestamp from the ping.
        timestamp: u64,
    },
}

// =============================================================================
// SESSION VIEW
// =============================================================================

/// Full session view broadcast after every mutation.
///
/// The whole view is retransmitted each time; state is small enough that
/// diffing would buy nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    /// Session code.
    pub code: String,
    /// Seated players, host first.
    pub slots: Vec<SlotView>,
    /// Result of the current round, if resolved.
    pub result: Option<ResultView>,
}

/// One seat in the session view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotView {
    /// Identity token of the seated player.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Rounds won since the last reset.
    pub score: u32,
    /// Revealed choice, if any.
    pub choice: Option<Choice>,
    /// Host or guest.
    pub role: Role,
}

/// Round result as presented to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResultView {
    /// Both players made the same choice.
    Draw,
    /// One player won the round.
    Winner {
        /// Identity token of the winner.
        id: String,
    },
}

impl SessionView {
    /// Build the full view of a session's current state.
    pub fn of(code: &str, state: &MatchState) -> Self {
        let slots = state
            .slots()
            .iter()
            .map(|slot| SlotView {
                id: slot.player.to_uuid_string(),
                name: slot.name.clone(),
                score: slot.score,
                choice: slot.choice,
                role: slot.role,
            })
            .collect();

        let result = state.result().map(|r| match r {
            RoundResult::Draw => ResultView::Draw,
            RoundResult::Winner(id) => ResultView::Winner {
                id: id.to_uuid_string(),
            },
        });

        Self {
            code: code.to_string(),
            slots,
            result,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::PlayerId;

    #[test]
    fn client_message_json_round_trip() {
        let msg = ClientMessage::SubmitChoice {
            choice: Choice::Rock,
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("submit_choice"));
        assert!(json.contains("rock"));

        let parsed = ClientMessage::from_json(&json).unwrap();
        if let ClientMessage::SubmitChoice { choice } = parsed {
            assert_eq!(choice, Choice::Rock);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn identify_fields_are_optional() {
        let parsed = ClientMessage::from_json(r#"{"type":"identify"}"#).unwrap();
        if let ClientMessage::Identify { id, name } = parsed {
            assert!(id.is_none());
            assert!(name.is_none());
        } else {
            panic!("Wrong message type");
        }

        let parsed =
            ClientMessage::from_json(r#"{"type":"identify","name":"Alice"}"#).unwrap();
        if let ClientMessage::Identify { id, name } = parsed {
            assert!(id.is_none());
            assert_eq!(name.as_deref(), Some("Alice"));
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn payload_free_events_parse() {
        for raw in [
            r#"{"type":"create_session"}"#,
            r#"{"type":"continue"}"#,
            r#"{"type":"reset"}"#,
        ] {
            let _ = ClientMessage::from_json(raw).unwrap();
        }
    }

    #[test]
    fn choice_outside_domain_is_rejected() {
        let raw = r#"{"type":"submit_choice","choice":"lizard"}"#;
        assert!(ClientMessage::from_json(raw).is_err());
    }

    #[test]
    fn server_message_json_round_trip() {
        let msg = ServerMessage::SessionCreated {
            code: "A1B2".to_string(),
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("session_created"));

        let parsed = ServerMessage::from_json(&json).unwrap();
        if let ServerMessage::SessionCreated { code } = parsed {
            assert_eq!(code, "A1B2");
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn failure_events_carry_their_names() {
        let json = ServerMessage::SessionNotFound.to_json().unwrap();
        assert!(json.contains("session_not_found"));

        let json = ServerMessage::SessionFull.to_json().unwrap();
        assert!(json.contains("session_full"));

        let json = ServerMessage::IdentityMissing.to_json().unwrap();
        assert!(json.contains("identity_missing"));

        let json = ServerMessage::OperationFailed {
            message: "Not a member of this session".to_string(),
        }
        .to_json()
        .unwrap();
        assert!(json.contains("operation_failed"));
    }

    #[test]
    fn session_view_mirrors_state() {
        let host = PlayerId::new([1; 16]);
        let guest = PlayerId::new([2; 16]);
        let mut state = MatchState::with_host(host, "Alice");
        state.add_player(guest, "Bob").unwrap();
        state.submit_choice(&host, Choice::Rock).unwrap();
        state.submit_choice(&guest, Choice::Scissors).unwrap();

        let view = SessionView::of("C0DE", &state);
        assert_eq!(view.code, "C0DE");
        assert_eq!(view.slots.len(), 2);
        assert_eq!(view.slots[0].name, "Alice");
        assert_eq!(view.slots[0].score, 1);
        assert_eq!(view.slots[0].role, Role::Host);
        assert_eq!(view.slots[1].choice, Some(Choice::Scissors));
        assert_eq!(
            view.result,
            Some(ResultView::Winner {
                id: host.to_uuid_string()
            })
        );

        // A draw renders without a winner id.
        state.continue_round();
        state.submit_choice(&host, Choice::Paper).unwrap();
        state.submit_choice(&guest, Choice::Paper).unwrap();
        let view = SessionView::of("C0DE", &state);
        assert_eq!(view.result, Some(ResultView::Draw));
    }

    #[test]
    fn unresolved_round_serializes_null_result() {
        let state = MatchState::with_host(PlayerId::new([1; 16]), "Alice");
        let view = SessionView::of("C0DE", &state);
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains("\"result\":null"));
    }
}
