//! Broadcast Dispatcher
//!
//! Fans the current session view out to every connection bound to a member
//! identity. Broadcasting is an explicit step run after each successful
//! mutation, not a side effect buried in handler code paths.

use std::sync::Arc;

use tracing::debug;

use crate::network::identity::IdentityRegistry;
use crate::network::protocol::{ServerMessage, SessionView};
use crate::network::session::GameSession;

/// Pushes full session views to all member connections.
pub struct Broadcaster {
    identities: Arc<IdentityRegistry>,
}

impl Broadcaster {
    /// Create a dispatcher that delivers through `identities` bindings.
    pub fn new(identities: Arc<IdentityRegistry>) -> Self {
        Self { identities }
    }

    /// Send the full current view of `session` to every member.
    ///
    /// Best-effort: an unreachable member is skipped and never blocks
    /// delivery to the other, nor surfaces an error to the caller.
    pub async fn session_update(&self, session: &GameSession) {
        let view = SessionView::of(&session.code, &session.state);
        let message = ServerMessage::SessionUpdate { session: view };

        for slot in session.state.slots() {
            let delivered = self
                .identities
                .send_to(&slot.player, message.clone())
                .await;
            if !delivered {
                debug!(
                    "Skipping unreachable member {} of session {}",
                    slot.player.short_hex(),
                    session.code
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::choice::Choice;
    use crate::network::protocol::ResultView;
    use crate::network::session::SessionRegistry;
    use tokio::sync::mpsc;

    fn update_view(rx: &mut mpsc::Receiver<ServerMessage>) -> SessionView {
        match rx.try_recv().expect("expected a broadcast") {
            ServerMessage::SessionUpdate { session } => session,
            other => panic!("expected session_update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn both_members_receive_the_same_view() {
        let identities = Arc::new(IdentityRegistry::new());
        let registry = SessionRegistry::new();
        let broadcaster = Broadcaster::new(identities.clone());

        let (host_tx, mut host_rx) = mpsc::channel(8);
        let (guest_tx, mut guest_rx) = mpsc::channel(8);
        let host = identities.resolve(None, Some("Alice"), host_tx).await;
        let guest = identities.resolve(None, Some("Bob"), guest_tx).await;

        let code = registry.create(host.id, &host.name).await;
        registry.join(&code, guest.id, &guest.name).await.unwrap();

        // Round: rock beats scissors.
        let session = registry.get(&code).await.unwrap();
        {
            let mut s = session.write().await;
            s.state.submit_choice(&host.id, Choice::Rock).unwrap();
            s.state.submit_choice(&guest.id, Choice::Scissors).unwrap();
            broadcaster.session_update(&s).await;
        }

        let host_view = update_view(&mut host_rx);
        let guest_view = update_view(&mut guest_rx);

        for view in [&host_view, &guest_view] {
            assert_eq!(view.code, code);
            assert_eq!(view.slots[0].score, 1);
            assert_eq!(view.slots[1].score, 0);
            assert_eq!(
                view.result,
                Some(ResultView::Winner {
                    id: host.id.to_uuid_string()
                })
            );
        }
    }

    #[tokio::test]
    async fn draw_broadcast_carries_no_winner() {
        let identities = Arc::new(IdentityRegistry::new());
        let registry = SessionRegistry::new();
        let broadcaster = Broadcaster::new(identities.clone());

        let (host_tx, mut host_rx) = mpsc::channel(8);
        let (guest_tx, _guest_rx) = mpsc::channel(8);
        let host = identities.resolve(None, Some("Alice"), host_tx).await;
        let guest = identities.resolve(None, Some("Bob"), guest_tx).await;

        let code = registry.create(host.id, &host.name).await;
        registry.join(&code, guest.id, &guest.name).await.unwrap();

        let session = registry.get(&code).await.unwrap();
        {
            let mut s = session.write().await;
            s.state.submit_choice(&host.id, Choice::Paper).unwrap();
            s.state.submit_choice(&guest.id, Choice::Paper).unwrap();
            broadcaster.session_update(&s).await;
        }

        let view = update_view(&mut host_rx);
        assert_eq!(view.result, Some(ResultView::Draw));
        assert!(view.slots.iter().all(|s| s.score == 0));
    }

    #[tokio::test]
    async fn dead_connection_does_not_block_the_other_member() {
        let identities = Arc::new(IdentityRegistry::new());
        let registry = SessionRegistry::new();
        let broadcaster = Broadcaster::new(identities.clone());

        let (host_tx, host_rx) = mpsc::channel(8);
        let (guest_tx, mut guest_rx) = mpsc::channel(8);
        let host = identities.resolve(None, Some("Alice"), host_tx).await;
        let guest = identities.resolve(None, Some("Bob"), guest_tx).await;

        let code = registry.create(host.id, &host.name).await;
        registry.join(&code, guest.id, &guest.name).await.unwrap();

        // Host's connection dies without unbinding.
        drop(host_rx);

        let session = registry.get(&code).await.unwrap();
        {
            let s = session.read().await;
            broadcaster.session_update(&s).await;
        }

        let view = update_view(&mut guest_rx);
        assert_eq!(view.slots.len(), 2);
    }

    #[tokio::test]
    async fn unbound_identity_is_skipped() {
        let identities = Arc::new(IdentityRegistry::new());
        let registry = SessionRegistry::new();
        let broadcaster = Broadcaster::new(identities.clone());

        // Host never identified through the registry, so no binding exists.
        let code = registry
            .create(crate::game::state::PlayerId::new([9; 16]), "Ghost")
            .await;
        let session = registry.get(&code).await.unwrap();
        let s = session.read().await;
        // Must not panic or error.
        broadcaster.session_update(&s).await;
    }
}
