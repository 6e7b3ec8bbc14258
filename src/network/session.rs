//! Session Registry
//!
//! Creates, looks up, and garbage-collects duel sessions by code. Each
//! session's state sits behind its own lock, so every state-machine
//! operation on a session is mutually exclusive; the registry map is locked
//! separately so code sampling and last-slot joins are atomic
//! check-and-insert.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::game::state::{MatchState, PlayerId};
use crate::network::identity::IdentityRegistry;
use crate::SESSION_CODE_LEN;

/// Short join code addressing a live session.
pub type SessionCode = String;

/// A live session: duel state plus registry bookkeeping.
pub struct GameSession {
    /// Code this session is addressed by.
    pub code: SessionCode,
    /// The duel state machine.
    pub state: MatchState,
    #[allow(dead_code)]
    created_at: Instant,
    last_activity: Instant,
}

impl GameSession {
    fn new(code: SessionCode, state: MatchState) -> Self {
        let now = Instant::now();
        Self {
            code,
            state,
            created_at: now,
            last_activity: now,
        }
    }

    /// Record activity, deferring garbage collection.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since the last successful operation.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Session registry errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No live session under the given code.
    #[error("Session not found")]
    NotFound,

    /// Both seats are already taken by other identities.
    #[error("Session is full")]
    Full,
}

/// How a join was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new guest slot was appended.
    Joined,
    /// The identity already held a slot; state untouched.
    Rejoined,
}

/// Manages all live sessions.
pub struct SessionRegistry {
    sessions: RwLock<BTreeMap<SessionCode, Arc<RwLock<GameSession>>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a session with `host` seated and return its code.
    ///
    /// The code is unique among live sessions: sampling repeats under the
    /// map's write lock until it misses an existing code.
    pub async fn create(&self, host: PlayerId, host_name: &str) -> SessionCode {
        let mut sessions = self.sessions.write().await;

        let code = loop {
            let candidate = sample_code();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        let session = GameSession::new(code.clone(), MatchState::with_host(host, host_name));
        sessions.insert(code.clone(), Arc::new(RwLock::new(session)));
        code
    }

    /// Look up a session by code. Codes are case-insensitive on input.
    pub async fn get(&self, code: &str) -> Option<Arc<RwLock<GameSession>>> {
        let code = normalize_code(code);
        self.sessions.read().await.get(&code).cloned()
    }

    /// Join (or rejoin) a session. No partial mutation on rejection.
    ///
    /// An identity that already holds a slot rejoins without any state
    /// change - the reconnect is indistinguishable from never having left.
    pub async fn join(
        &self,
        code: &str,
        player: PlayerId,
        name: &str,
    ) -> Result<(Arc<RwLock<GameSession>>, JoinOutcome), SessionError> {
        let session = self.get(code).await.ok_or(SessionError::NotFound)?;

        let outcome = {
            let mut s = session.write().await;
            if s.state.contains(&player) {
                s.touch();
                JoinOutcome::Rejoined
            } else {
                // Membership was ruled out above, so the only admission
                // failure left is a full session.
                s.state
                    .add_player(player, name)
                    .map_err(|_| SessionError::Full)?;
                s.touch();
                JoinOutcome::Joined
            }
        };

        Ok((session, outcome))
    }

    /// Remove a session.
    pub async fn remove(&self, code: &str) {
        let code = normalize_code(code);
        self.sessions.write().await.remove(&code);
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Purge sessions whose members all lost their connections and that
    /// have been idle longer than `timeout`. Returns the purged codes.
    pub async fn cleanup(
        &self,
        identities: &IdentityRegistry,
        timeout: Duration,
    ) -> Vec<SessionCode> {
        let mut purged = Vec::new();
        let mut sessions = self.sessions.write().await;
        let codes: Vec<SessionCode> = sessions.keys().cloned().collect();

        for code in codes {
            let Some(session) = sessions.get(&code).cloned() else {
                continue;
            };
            let (idle, members) = {
                let s = session.read().await;
                let members: Vec<PlayerId> =
                    s.state.slots().iter().map(|slot| slot.player).collect();
                (s.idle_for(), members)
            };
            if idle < timeout {
                continue;
            }

            let mut any_connected = false;
            for player in &members {
                if identities.is_connected(player).await {
                    any_connected = true;
                    break;
                }
            }
            if !any_connected {
                sessions.remove(&code);
                purged.push(code);
            }
        }

        purged
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Sample a candidate code: `SESSION_CODE_LEN` uppercase hex characters.
fn sample_code() -> SessionCode {
    let entropy = uuid::Uuid::new_v4();
    hex::encode(&entropy.as_bytes()[..SESSION_CODE_LEN / 2]).to_ascii_uppercase()
}

fn normalize_code(code: &str) -> SessionCode {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::choice::Choice;
    use crate::network::protocol::ServerMessage;
    use tokio::sync::mpsc;

    fn host() -> PlayerId {
        PlayerId::new([1; 16])
    }

    fn guest() -> PlayerId {
        PlayerId::new([2; 16])
    }

    #[test]
    fn sampled_codes_are_short_uppercase_hex() {
        for _ in 0..32 {
            let code = sample_code();
            assert_eq!(code.len(), SESSION_CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        }
    }

    #[tokio::test]
    async fn create_seats_the_host() {
        let registry = SessionRegistry::new();
        let code = registry.create(host(), "Alice").await;
        assert_eq!(registry.count().await, 1);

        let session = registry.get(&code).await.unwrap();
        let s = session.read().await;
        assert_eq!(s.code, code);
        assert_eq!(s.state.player_count(), 1);
        assert_eq!(s.state.slots()[0].name, "Alice");
        assert_eq!(s.state.slots()[0].score, 0);
        assert!(s.state.slots()[0].choice.is_none());
        assert!(s.state.result().is_none());
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive() {
        let registry = SessionRegistry::new();
        let code = registry.create(host(), "Alice").await;
        assert!(registry.get(&code.to_ascii_lowercase()).await.is_some());
        assert!(registry.get(&format!("  {code} ")).await.is_some());
    }

    #[tokio::test]
    async fn join_unknown_code_is_not_found() {
        let registry = SessionRegistry::new();
        let result = registry.join("ZZZZ", guest(), "Bob").await;
        assert!(matches!(result, Err(SessionError::NotFound)));
    }

    #[tokio::test]
    async fn join_appends_a_guest() {
        let registry = SessionRegistry::new();
        let code = registry.create(host(), "Alice").await;

        let (session, outcome) = registry.join(&code, guest(), "Bob").await.unwrap();
        assert_eq!(outcome, JoinOutcome::Joined);
        let s = session.read().await;
        assert_eq!(s.state.player_count(), 2);
        assert_eq!(s.state.slots()[1].name, "Bob");
    }

    #[tokio::test]
    async fn third_identity_is_rejected_and_session_unchanged() {
        let registry = SessionRegistry::new();
        let code = registry.create(host(), "Alice").await;
        registry.join(&code, guest(), "Bob").await.unwrap();

        let result = registry.join(&code, PlayerId::new([3; 16]), "Carol").await;
        assert!(matches!(result, Err(SessionError::Full)));

        let session = registry.get(&code).await.unwrap();
        let s = session.read().await;
        assert_eq!(s.state.player_count(), 2);
        assert_eq!(s.state.slots()[0].player, host());
        assert_eq!(s.state.slots()[1].player, guest());
    }

    #[tokio::test]
    async fn rejoin_keeps_slot_and_score() {
        let registry = SessionRegistry::new();
        let code = registry.create(host(), "Alice").await;
        registry.join(&code, guest(), "Bob").await.unwrap();

        // Play a round so the host has a score worth keeping.
        {
            let session = registry.get(&code).await.unwrap();
            let mut s = session.write().await;
            s.state.submit_choice(&host(), Choice::Rock).unwrap();
            s.state.submit_choice(&guest(), Choice::Scissors).unwrap();
        }

        let (session, outcome) = registry.join(&code, host(), "Alice").await.unwrap();
        assert_eq!(outcome, JoinOutcome::Rejoined);
        let s = session.read().await;
        assert_eq!(s.state.player_count(), 2);
        assert_eq!(s.state.slots()[0].score, 1);
        assert_eq!(s.state.slots()[0].choice, Some(Choice::Rock));
    }

    #[tokio::test]
    async fn remove_drops_the_session() {
        let registry = SessionRegistry::new();
        let code = registry.create(host(), "Alice").await;
        registry.remove(&code).await;
        assert_eq!(registry.count().await, 0);
        assert!(registry.get(&code).await.is_none());
    }

    #[tokio::test]
    async fn cleanup_purges_only_abandoned_sessions() {
        let registry = SessionRegistry::new();
        let identities = IdentityRegistry::new();

        // Session A: host still connected.
        let (tx, _rx) = mpsc::channel::<ServerMessage>(8);
        let connected = identities.resolve(None, Some("Alice"), tx).await;
        let kept = registry.create(connected.id, &connected.name).await;

        // Session B: member identity never bound to a connection.
        let abandoned = registry.create(PlayerId::new([9; 16]), "Ghost").await;

        let purged = registry.cleanup(&identities, Duration::ZERO).await;
        assert_eq!(purged, vec![abandoned.clone()]);
        assert!(registry.get(&kept).await.is_some());
        assert!(registry.get(&abandoned).await.is_none());
    }

    #[tokio::test]
    async fn cleanup_respects_idle_timeout() {
        let registry = SessionRegistry::new();
        let identities = IdentityRegistry::new();
        let code = registry.create(PlayerId::new([9; 16]), "Ghost").await;

        // Disconnected, but not idle long enough.
        let purged = registry.cleanup(&identities, Duration::from_secs(600)).await;
        assert!(purged.is_empty());
        assert!(registry.get(&code).await.is_some());
    }
}
