// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry of live router and handler connections.
//!
//! Each role has its own namespace mapping a peer identity to the sending
//! half of that peer's outbound channel. The connection task owns the
//! receiving half through its [`Registration`].
//!
//! # Lifecycle
//!
//! ```text
//! Unregistered --register--> Registered --unregister / superseded--> Unregistered
//! ```
//!
//! Registering an identity that is already present replaces the entry. The
//! old channel loses its last long-lived sender, so the superseded
//! connection observes `recv() == None` once in-flight deliveries drain.
//! Removal is conditional on the registration id, which keeps a late
//! unregister from a superseded connection from removing its successor.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Peer role; each role is an independent identity namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerRole {
    Router,
    Handler,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Router => f.write_str("router"),
            Self::Handler => f.write_str("handler"),
        }
    }
}

/// Delivery failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("{role} {identity} not connected")]
    NotConnected { role: PeerRole, identity: String },

    #[error("{role} {identity} channel closed")]
    Closed { role: PeerRole, identity: String },
}

struct ConnectionHandle<M> {
    id: u64,
    tx: mpsc::Sender<M>,
}

/// A live registration, held by the connection task.
pub struct Registration<M> {
    role: PeerRole,
    identity: String,
    id: u64,
    rx: mpsc::Receiver<M>,
}

impl<M> Registration<M> {
    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Registration id, unique within the namespace.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next outbound message. `None` once the registration was superseded
    /// or removed and the channel drained.
    pub async fn recv(&mut self) -> Option<M> {
        self.rx.recv().await
    }

    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<M> {
        self.rx.try_recv().ok()
    }
}

/// Connections for one role.
pub struct Connections<M> {
    role: PeerRole,
    capacity: usize,
    next_id: AtomicU64,
    entries: RwLock<HashMap<String, ConnectionHandle<M>>>,
}

impl<M> Connections<M> {
    /// Create an empty namespace. Outbound channels hold `capacity` messages.
    pub fn new(role: PeerRole, capacity: usize) -> Self {
        Self {
            role,
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    /// Install a fresh channel for `identity`, replacing any prior entry.
    pub fn register(&self, identity: &str) -> Registration<M> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let previous = self
            .entries
            .write()
            .insert(identity.to_string(), ConnectionHandle { id, tx });

        match previous {
            Some(old) => info!(
                "{} {} re-registered (registration {} supersedes {})",
                self.role, identity, id, old.id
            ),
            None => info!("{} {} registered", self.role, identity),
        }

        Registration {
            role: self.role,
            identity: identity.to_string(),
            id,
            rx,
        }
    }

    /// Remove `identity` if registration `id` is still the installed one.
    ///
    /// Returns `true` if an entry was removed.
    pub fn unregister(&self, identity: &str, id: u64) -> bool {
        let mut entries = self.entries.write();
        match entries.get(identity) {
            Some(handle) if handle.id == id => {
                entries.remove(identity);
                info!("{} {} unregistered", self.role, identity);
                true
            }
            Some(_) => {
                debug!(
                    "{} {} registration {} already superseded",
                    self.role, identity, id
                );
                false
            }
            None => false,
        }
    }

    /// Snapshot of the outbound sender for `identity`.
    pub fn lookup(&self, identity: &str) -> Option<mpsc::Sender<M>> {
        self.entries.read().get(identity).map(|h| h.tx.clone())
    }

    /// Deliver `msg` to `identity`, waiting while its channel is full.
    ///
    /// The registry lock is released before waiting.
    pub async fn send(&self, identity: &str, msg: M) -> Result<(), DeliveryError> {
        let tx = self
            .lookup(identity)
            .ok_or_else(|| DeliveryError::NotConnected {
                role: self.role,
                identity: identity.to_string(),
            })?;

        tx.send(msg).await.map_err(|_| DeliveryError::Closed {
            role: self.role,
            identity: identity.to_string(),
        })
    }

    pub fn is_connected(&self, identity: &str) -> bool {
        self.entries.read().contains_key(identity)
    }

    pub fn connection_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Identities currently registered, unordered.
    pub fn identities(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}
