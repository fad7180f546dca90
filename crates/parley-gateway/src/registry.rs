use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use parley_types::events::ServerEvent;
use parley_types::models::Identity;

use crate::error::RelayError;

pub type ConnectionId = Uuid;

/// One admitted connection: the identity resolved at handshake plus the
/// sending half of its outbound queue. The receiving half lives in the
/// connection's forwarder task, so delivery here never blocks on a slow
/// transport.
struct ConnectionHandle {
    identity: Identity,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    fn deliver(&self, conn_id: ConnectionId, event: ServerEvent) -> Result<(), RelayError> {
        self.tx.send(event).map_err(|_| RelayError::Delivery(conn_id))
    }
}

/// The live set of admitted connections. The only shared mutable structure in
/// the relay core; a single registry-wide lock, never held across an await.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<HashMap<ConnectionId, ConnectionHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a connection with its resolved identity. Multiple connections
    /// per identity are valid and independent.
    pub fn add(&self, identity: Identity) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .write()
            .expect("registry lock poisoned")
            .insert(conn_id, ConnectionHandle { identity, tx });
        (conn_id, rx)
    }

    /// Remove a connection. Idempotent: removing an id that already left is
    /// a no-op, which absorbs double-disconnect races.
    pub fn remove(&self, conn_id: ConnectionId) {
        self.inner
            .write()
            .expect("registry lock poisoned")
            .remove(&conn_id);
    }

    /// Resolve a connection id back to its identity, if still admitted.
    /// Callers holding a connection id across suspension points revalidate
    /// through this instead of assuming liveness.
    pub fn identity_of(&self, conn_id: ConnectionId) -> Option<Identity> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .get(&conn_id)
            .map(|handle| handle.identity.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every admitted connection. Returns the number of
    /// successful deliveries.
    pub fn broadcast(&self, event: ServerEvent) -> usize {
        self.fan_out(None, event)
    }

    /// Deliver an event to every admitted connection except `origin`
    /// (typing signals are never echoed to their producer).
    pub fn broadcast_except(&self, origin: ConnectionId, event: ServerEvent) -> usize {
        self.fan_out(Some(origin), event)
    }

    /// Deliver an event to exactly one connection. Returns false if it is no
    /// longer admitted or its transport is gone.
    pub fn unicast(&self, conn_id: ConnectionId, event: ServerEvent) -> bool {
        let failed = {
            let members = self.inner.read().expect("registry lock poisoned");
            match members.get(&conn_id) {
                Some(handle) => match handle.deliver(conn_id, event) {
                    Ok(()) => return true,
                    Err(err) => {
                        warn!("{}", err);
                        true
                    }
                },
                None => false,
            }
        };

        if failed {
            self.remove(conn_id);
        }
        false
    }

    /// Fan-out under the read lock: the membership snapshot is consistent for
    /// the whole iteration, and delivery is a non-blocking channel send, so
    /// one dead or slow recipient cannot stall the rest. Recipients whose
    /// queue is gone are pruned afterwards.
    fn fan_out(&self, skip: Option<ConnectionId>, event: ServerEvent) -> usize {
        let mut delivered = 0;
        let mut dead: Vec<ConnectionId> = Vec::new();

        {
            let members = self.inner.read().expect("registry lock poisoned");
            for (&conn_id, handle) in members.iter() {
                if Some(conn_id) == skip {
                    continue;
                }
                match handle.deliver(conn_id, event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(err) => {
                        warn!("{}", err);
                        dead.push(conn_id);
                    }
                }
            }
        }

        if !dead.is_empty() {
            let mut members = self.inner.write().expect("registry lock poisoned");
            for conn_id in dead {
                members.remove(&conn_id);
                debug!("Pruned dead connection {}", conn_id);
            }
        }

        delivered
    }
}
