//! Registry of live client connections.
//!
//! Each connection owns a bounded outbound queue drained by its own writer.
//! The hub only ever enqueues with `try_send`, so a slow client never stalls
//! delivery to others; a client whose queue stays full for
//! `max_full_sends` consecutive sends is evicted.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};

use tollgate_broker::NotificationSink;
use tollgate_core::{ConnectionId, UserId};

/// A message queued for a client.
pub type OutboundMessage = Arc<str>;

/// Configuration for the connection hub.
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Outbound queue capacity per connection.
    #[serde(default = "HubConfig::default_buffer")]
    pub connection_buffer: usize,
    /// Consecutive full-queue sends before a connection is evicted.
    #[serde(default = "HubConfig::default_max_full_sends")]
    pub max_full_sends: u32,
}

impl HubConfig {
    const fn default_buffer() -> usize {
        64
    }

    const fn default_max_full_sends() -> u32 {
        3
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            connection_buffer: Self::default_buffer(),
            max_full_sends: Self::default_max_full_sends(),
        }
    }
}

/// The hub's handle on one live connection.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    sender: mpsc::Sender<OutboundMessage>,
    full_sends: u32,
}

impl Connection {
    /// Create a connection and the receiving end its writer drains.
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let connection = Self {
            id: ConnectionId::generate(),
            sender,
            full_sends: 0,
        };
        (connection, receiver)
    }

    /// The connection id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Point-in-time hub counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Users with at least one live connection.
    pub total_users: usize,
    /// Live connections across all users.
    pub total_clients: usize,
}

enum SendOutcome {
    Queued,
    Full,
    Evict,
}

/// Registry of live connections keyed by user.
pub struct ConnectionHub {
    connections: Mutex<HashMap<UserId, HashMap<ConnectionId, Connection>>>,
    config: HubConfig,
}

impl ConnectionHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Outbound queue capacity for new connections.
    #[must_use]
    pub const fn buffer(&self) -> usize {
        self.config.connection_buffer
    }

    /// Add a connection to the user's live set.
    pub fn register(&self, user_id: &UserId, connection: Connection) -> ConnectionId {
        let id = connection.id;
        let mut connections = self.connections.lock();
        let devices = connections.entry(user_id.clone()).or_default();
        devices.insert(id, connection);
        let count = devices.len();
        drop(connections);

        metrics::gauge!("tollgate_hub_connections").increment(1.0);
        tracing::info!(user_id = %user_id, connection_id = %id, devices = count, "Connection registered");
        id
    }

    /// Remove a connection; drops the user entry once empty.
    ///
    /// Returns `false` if the connection was not registered.
    pub fn unregister(&self, user_id: &UserId, connection_id: &ConnectionId) -> bool {
        let mut connections = self.connections.lock();
        let Some(devices) = connections.get_mut(user_id) else {
            return false;
        };
        let removed = devices.remove(connection_id).is_some();
        if devices.is_empty() {
            connections.remove(user_id);
        }
        drop(connections);

        if removed {
            metrics::gauge!("tollgate_hub_connections").decrement(1.0);
            tracing::info!(user_id = %user_id, connection_id = %connection_id, "Connection unregistered");
        }
        removed
    }

    /// Queue `message` on every connection of `user_id`.
    ///
    /// Returns the number of connections it was queued on.
    pub fn send(&self, user_id: &UserId, message: &OutboundMessage) -> usize {
        let mut connections = self.connections.lock();
        let Some(devices) = connections.get_mut(user_id) else {
            tracing::debug!(user_id = %user_id, "No live connections, dropping message");
            return 0;
        };

        let delivered = self.deliver(user_id, devices, message);
        if devices.is_empty() {
            connections.remove(user_id);
        }
        delivered
    }

    /// Queue `message` on every live connection.
    pub fn broadcast(&self, message: &OutboundMessage) -> usize {
        let mut connections = self.connections.lock();
        let mut delivered = 0;
        connections.retain(|user_id, devices| {
            delivered += self.deliver(user_id, devices, message);
            !devices.is_empty()
        });
        delivered
    }

    fn deliver(
        &self,
        user_id: &UserId,
        devices: &mut HashMap<ConnectionId, Connection>,
        message: &OutboundMessage,
    ) -> usize {
        let mut delivered = 0;
        devices.retain(|id, connection| match self.try_send(connection, message) {
            SendOutcome::Queued => {
                delivered += 1;
                true
            }
            SendOutcome::Full => true,
            SendOutcome::Evict => {
                metrics::gauge!("tollgate_hub_connections").decrement(1.0);
                metrics::counter!("tollgate_hub_evictions_total").increment(1);
                tracing::warn!(user_id = %user_id, connection_id = %id, "Evicting unresponsive connection");
                false
            }
        });
        delivered
    }

    fn try_send(&self, connection: &mut Connection, message: &OutboundMessage) -> SendOutcome {
        match connection.sender.try_send(Arc::clone(message)) {
            Ok(()) => {
                connection.full_sends = 0;
                SendOutcome::Queued
            }
            Err(TrySendError::Full(_)) => {
                connection.full_sends += 1;
                if connection.full_sends >= self.config.max_full_sends {
                    SendOutcome::Evict
                } else {
                    SendOutcome::Full
                }
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Evict,
        }
    }

    /// Number of live connections for a user.
    #[must_use]
    pub fn connection_count(&self, user_id: &UserId) -> usize {
        self.connections.lock().get(user_id).map_or(0, HashMap::len)
    }

    /// Users with at least one live connection, sorted.
    #[must_use]
    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.connections.lock().keys().cloned().collect();
        users.sort();
        users
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let connections = self.connections.lock();
        HubStats {
            total_users: connections.len(),
            total_clients: connections.values().map(HashMap::len).sum(),
        }
    }

    /// Drop every connection so each writer ends and its socket closes.
    ///
    /// Returns the number of connections closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.connections.lock().drain().collect();
        let closed: usize = drained.iter().map(|(_, devices)| devices.len()).sum();
        drop(drained);

        #[allow(clippy::cast_precision_loss)]
        let gauge_delta = closed as f64;
        metrics::gauge!("tollgate_hub_connections").decrement(gauge_delta);
        tracing::info!(closed, "Closed all connections");
        closed
    }
}

#[async_trait]
impl NotificationSink for ConnectionHub {
    async fn send_to_user(&self, user: &UserId, payload: Arc<str>) -> usize {
        self.send(user, &payload)
    }

    async fn broadcast(&self, payload: Arc<str>) -> usize {
        ConnectionHub::broadcast(self, &payload)
    }
}
