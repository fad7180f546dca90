use std::sync::Arc;

use tracing::{error, warn};

use parley_db::MessageStore;
use parley_types::events::{ClientEvent, ServerEvent};
use parley_types::models::{Identity, MessageSender};

use crate::error::RelayError;
use crate::registry::{ConnectionId, Registry};

/// Dispatch one inbound event from an admitted connection. Events from a
/// single connection arrive here strictly in order — the connection's read
/// loop awaits each call before decoding the next frame.
///
/// Store and delivery failures are contained per-event: nothing here ever
/// terminates the connection's task.
pub async fn handle_event(
    registry: &Registry,
    store: &Arc<dyn MessageStore>,
    conn_id: ConnectionId,
    identity: &Identity,
    event: ClientEvent,
) {
    match event {
        // Already consumed by the handshake; a repeat is a no-op.
        ClientEvent::Auth { .. } => {}

        ClientEvent::Typing(is_typing) => {
            registry.broadcast_except(
                conn_id,
                ServerEvent::UserTyping {
                    user: identity.username.clone(),
                    is_typing,
                },
            );
        }

        ClientEvent::ChatMessage(content) => {
            let content = content.trim().to_string();
            if content.is_empty() {
                registry.unicast(
                    conn_id,
                    ServerEvent::Error("Message content must not be empty".into()),
                );
                return;
            }

            // The sender is always the identity resolved at handshake; the
            // wire format gives the client no field to claim otherwise.
            let sender_id = identity.id;
            let task_store = store.clone();
            let stored = tokio::task::spawn_blocking(move || {
                task_store.create_message(&content, sender_id)
            })
            .await;

            match flatten(stored) {
                Ok(row) => {
                    let timestamp = row.created_at_utc();
                    registry.broadcast(ServerEvent::ChatMessage {
                        id: row.id,
                        content: row.content,
                        sender: MessageSender::from(identity),
                        timestamp,
                        is_delivered: row.is_delivered,
                    });
                }
                Err(err) => {
                    error!("Error saving message: {}", err);
                    registry.unicast(
                        conn_id,
                        ServerEvent::Error("Failed to save message".into()),
                    );
                }
            }
        }

        ClientEvent::MarkAsRead(message_id) => {
            let task_store = store.clone();
            let outcome =
                tokio::task::spawn_blocking(move || task_store.mark_read(message_id)).await;

            match flatten(outcome) {
                Ok(()) => {
                    registry.broadcast(ServerEvent::MessageRead(message_id));
                }
                // Idempotent and low-stakes: swallow to log, no client notice.
                Err(err) => warn!("Error marking message {} as read: {}", message_id, err),
            }
        }
    }
}

fn flatten<T>(
    outcome: Result<anyhow::Result<T>, tokio::task::JoinError>,
) -> Result<T, RelayError> {
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(RelayError::Persistence(err)),
        Err(err) => Err(RelayError::Persistence(err.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI64, Ordering};

    use anyhow::bail;
    use parley_db::models::MessageRow;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct FakeStore {
        fail: bool,
        next_id: AtomicI64,
        creates: Mutex<Vec<(String, i64)>>,
        reads: Mutex<Vec<i64>>,
    }

    impl FakeStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                next_id: AtomicI64::new(1),
                creates: Mutex::new(Vec::new()),
                reads: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                next_id: AtomicI64::new(1),
                creates: Mutex::new(Vec::new()),
                reads: Mutex::new(Vec::new()),
            })
        }
    }

    impl MessageStore for FakeStore {
        fn create_message(&self, content: &str, sender_id: i64) -> anyhow::Result<MessageRow> {
            if self.fail {
                bail!("store down");
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.creates
                .lock()
                .unwrap()
                .push((content.to_string(), sender_id));
            Ok(MessageRow {
                id,
                content: content.to_string(),
                sender_id,
                sender_username: String::new(),
                is_delivered: true,
                is_read: false,
                created_at: "2026-01-01 00:00:00".into(),
            })
        }

        fn mark_read(&self, message_id: i64) -> anyhow::Result<()> {
            if self.fail {
                bail!("store down");
            }
            self.reads.lock().unwrap().push(message_id);
            Ok(())
        }
    }

    fn identity(id: i64, username: &str) -> Identity {
        Identity {
            id,
            username: username.into(),
        }
    }

    fn store(fake: &Arc<FakeStore>) -> Arc<dyn MessageStore> {
        fake.clone()
    }

    fn expect_chat(rx: &mut UnboundedReceiver<ServerEvent>) -> (i64, String, MessageSender) {
        match rx.try_recv().expect("expected a chat message event") {
            ServerEvent::ChatMessage {
                id,
                content,
                sender,
                is_delivered,
                ..
            } => {
                assert!(is_delivered);
                (id, content, sender)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_message_reaches_everyone_with_sender_from_identity() {
        let registry = Registry::new();
        let fake = FakeStore::new();
        let store = store(&fake);

        let alice = identity(1, "alice");
        let (a, mut rx_a) = registry.add(alice.clone());
        let (_b, mut rx_b) = registry.add(identity(2, "bob"));

        handle_event(
            &registry,
            &store,
            a,
            &alice,
            ClientEvent::ChatMessage("hello".into()),
        )
        .await;

        // Both connections, sender included, see the same persisted message.
        for rx in [&mut rx_a, &mut rx_b] {
            let (id, content, sender) = expect_chat(rx);
            assert_eq!(id, 1);
            assert_eq!(content, "hello");
            assert_eq!(sender.id, 1);
            assert_eq!(sender.username, "alice");
            assert!(!sender.is_bot);
        }

        // The store saw the connection's identity as sender.
        assert_eq!(fake.creates.lock().unwrap()[0], ("hello".to_string(), 1));
    }

    #[tokio::test]
    async fn typing_is_never_echoed_to_its_origin() {
        let registry = Registry::new();
        let fake = FakeStore::new();
        let store = store(&fake);

        let alice = identity(1, "alice");
        let (a, mut rx_a) = registry.add(alice.clone());
        let (_b, mut rx_b) = registry.add(identity(2, "bob"));

        handle_event(&registry, &store, a, &alice, ClientEvent::Typing(true)).await;

        assert!(rx_a.try_recv().is_err());
        match rx_b.try_recv().unwrap() {
            ServerEvent::UserTyping { user, is_typing } => {
                assert_eq!(user, "alice");
                assert!(is_typing);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn store_failure_notifies_only_the_sender() {
        let registry = Registry::new();
        let store = store(&FakeStore::failing());

        let alice = identity(1, "alice");
        let (a, mut rx_a) = registry.add(alice.clone());
        let (_b, mut rx_b) = registry.add(identity(2, "bob"));

        handle_event(
            &registry,
            &store,
            a,
            &alice,
            ClientEvent::ChatMessage("hello".into()),
        )
        .await;

        match rx_a.try_recv().unwrap() {
            ServerEvent::Error(msg) => assert_eq!(msg, "Failed to save message"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx_b.try_recv().is_err());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn empty_content_is_rejected_without_persisting() {
        let registry = Registry::new();
        let fake = FakeStore::new();
        let store = store(&fake);

        let alice = identity(1, "alice");
        let (a, mut rx_a) = registry.add(alice.clone());
        let (_b, mut rx_b) = registry.add(identity(2, "bob"));

        handle_event(
            &registry,
            &store,
            a,
            &alice,
            ClientEvent::ChatMessage("   \n\t ".into()),
        )
        .await;

        assert!(matches!(rx_a.try_recv().unwrap(), ServerEvent::Error(_)));
        assert!(rx_b.try_recv().is_err());
        assert!(fake.creates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_read_broadcasts_the_bare_id_idempotently() {
        let registry = Registry::new();
        let fake = FakeStore::new();
        let store = store(&fake);

        let bob = identity(2, "bob");
        let (b, _rx_b) = registry.add(bob.clone());
        let (_a, mut rx_a) = registry.add(identity(1, "alice"));

        handle_event(&registry, &store, b, &bob, ClientEvent::MarkAsRead(7)).await;
        handle_event(&registry, &store, b, &bob, ClientEvent::MarkAsRead(7)).await;

        // Same broadcast payload both times.
        for _ in 0..2 {
            match rx_a.try_recv().unwrap() {
                ServerEvent::MessageRead(id) => assert_eq!(id, 7),
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(*fake.reads.lock().unwrap(), vec![7, 7]);
    }

    #[tokio::test]
    async fn mark_read_store_failure_is_silent() {
        let registry = Registry::new();
        let store = store(&FakeStore::failing());

        let bob = identity(2, "bob");
        let (b, mut rx_b) = registry.add(bob.clone());

        handle_event(&registry, &store, b, &bob, ClientEvent::MarkAsRead(7)).await;

        assert!(rx_b.try_recv().is_err());
    }

    /// The two-client walkthrough: alice and bob are both connected, alice
    /// says hello, bob marks it read, and both sides observe each step.
    #[tokio::test]
    async fn two_clients_exchange_a_message_and_a_read_receipt() {
        let registry = Registry::new();
        let fake = FakeStore::new();
        let store = store(&fake);

        let alice = identity(1, "alice");
        let bob = identity(2, "bob");
        let (a, mut rx_a) = registry.add(alice.clone());
        let (b, mut rx_b) = registry.add(bob.clone());

        handle_event(
            &registry,
            &store,
            a,
            &alice,
            ClientEvent::ChatMessage("hello".into()),
        )
        .await;

        let (id_a, content_a, sender_a) = expect_chat(&mut rx_a);
        let (id_b, content_b, sender_b) = expect_chat(&mut rx_b);
        assert_eq!((id_a, content_a.as_str()), (id_b, content_b.as_str()));
        assert_eq!(content_a, "hello");
        assert_eq!(sender_a.id, 1);
        assert_eq!(sender_a.username, "alice");
        assert!(!sender_b.is_bot);

        handle_event(&registry, &store, b, &bob, ClientEvent::MarkAsRead(id_a)).await;

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.try_recv().unwrap() {
                ServerEvent::MessageRead(id) => assert_eq!(id, id_a),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }
}
