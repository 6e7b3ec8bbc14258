//! Identity Registry
//!
//! Binds durable participant identities to their currently active
//! connection. The identity survives reconnects; the connection handle is
//! freely replaced, latest binding wins. Also answers best-effort delivery
//! for the broadcast dispatcher and liveness queries for session GC.

use std::collections::BTreeMap;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::game::state::PlayerId;
use crate::network::protocol::ServerMessage;

/// A resolved participant identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Durable opaque token.
    pub id: PlayerId,
    /// Display name in effect.
    pub name: String,
}

/// What the registry knows about one identity.
struct Entry {
    name: String,
    /// Live connection handle; `None` between disconnect and reconnect.
    sender: Option<mpsc::Sender<ServerMessage>>,
}

/// Registry of identities and their live connection handles.
pub struct IdentityRegistry {
    entries: RwLock<BTreeMap<PlayerId, Entry>>,
}

impl IdentityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Resolve an identity and bind the calling connection to it.
    ///
    /// Mints a fresh token when none is supplied; malformed tokens and
    /// empty names are treated as absent. Never fails. Any prior binding
    /// for the resolved identity is replaced (latest wins).
    pub async fn resolve(
        &self,
        supplied_id: Option<&str>,
        supplied_name: Option<&str>,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Identity {
        let id = supplied_id
            .and_then(PlayerId::from_uuid_str)
            .unwrap_or_else(mint_player_id);
        let supplied_name = supplied_name
            .map(str::trim)
            .filter(|name| !name.is_empty());

        let mut entries = self.entries.write().await;
        let entry = entries.entry(id).or_insert_with(|| Entry {
            name: default_name(&id),
            sender: None,
        });
        if let Some(name) = supplied_name {
            entry.name = name.to_string();
        }
        if entry.sender.is_some() {
            debug!("Rebinding identity {} to a new connection", id.short_hex());
        }
        entry.sender = Some(sender);

        Identity {
            id,
            name: entry.name.clone(),
        }
    }

    /// Rename a known identity. Empty names are ignored.
    pub async fn rename(&self, id: &PlayerId, name: &str) -> Option<Identity> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(id)?;
        entry.name = name.to_string();
        Some(Identity {
            id: *id,
            name: entry.name.clone(),
        })
    }

    /// Best-effort delivery to the identity's live connection.
    ///
    /// Never blocks: a missing, closed, or saturated connection drops the
    /// message and returns `false`.
    pub async fn send_to(&self, id: &PlayerId, message: ServerMessage) -> bool {
        let entries = self.entries.read().await;
        match entries.get(id).and_then(|e| e.sender.as_ref()) {
            Some(sender) => sender.try_send(message).is_ok(),
            None => false,
        }
    }

    /// Whether the identity currently has a live connection.
    pub async fn is_connected(&self, id: &PlayerId) -> bool {
        let entries = self.entries.read().await;
        entries
            .get(id)
            .and_then(|e| e.sender.as_ref())
            .map_or(false, |sender| !sender.is_closed())
    }

    /// Drop the binding for `id` if it still belongs to `sender`.
    ///
    /// A reconnect may already have rebound the identity to a newer
    /// connection; that binding is left untouched.
    pub async fn unbind(&self, id: &PlayerId, sender: &mpsc::Sender<ServerMessage>) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(id) {
            let is_ours = entry
                .sender
                .as_ref()
                .map_or(false, |bound| bound.same_channel(sender));
            if is_ours {
                entry.sender = None;
            }
        }
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Mint a fresh opaque identity token.
fn mint_player_id() -> PlayerId {
    PlayerId::new(*uuid::Uuid::new_v4().as_bytes())
}

/// Default display name, derived deterministically from the token.
fn default_name(id: &PlayerId) -> String {
    format!("Player-{}", id.short_hex())
}
