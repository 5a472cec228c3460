//! Page contexts connected to the worker.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub type ClientId = u64;

/// A message the worker pushes to page contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Offline mode is ready.
    SwActivated { message: String },
    /// A worker with different partition versions finished installing.
    UpdateAvailable { version: String },
}

/// The page side of a connection.
#[derive(Debug)]
pub struct ClientHandle {
    pub id: ClientId,
    receiver: mpsc::UnboundedReceiver<ClientMessage>,
}

impl ClientHandle {
    /// Wait for the next message. `None` once the worker dropped the client.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ClientMessage> {
        self.receiver.try_recv().ok()
    }

    /// Everything delivered so far, without waiting.
    pub fn drain(&mut self) -> Vec<ClientMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Status view of one connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub id: ClientId,
    pub url: String,
    pub controlled: bool,
}

struct Slot {
    url: String,
    controlled: bool,
    sender: mpsc::UnboundedSender<ClientMessage>,
}

#[derive(Default)]
struct Registry {
    next_id: ClientId,
    clients: BTreeMap<ClientId, Slot>,
}

/// Connected clients, keyed by id in connection order.
#[derive(Default)]
pub(crate) struct ClientRegistry {
    inner: Mutex<Registry>,
}

impl ClientRegistry {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn connect(&self, url: &str, controlled: bool) -> ClientHandle {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.clients.insert(id, Slot { url: url.to_string(), controlled, sender });
        ClientHandle { id, receiver }
    }

    pub(crate) fn disconnect(&self, id: ClientId) -> bool {
        self.lock().clients.remove(&id).is_some()
    }

    /// Take control of every connected client. Returns how many were newly claimed.
    pub(crate) fn claim_all(&self) -> usize {
        let mut registry = self.lock();
        let mut claimed = 0;
        for slot in registry.clients.values_mut().filter(|slot| !slot.controlled) {
            slot.controlled = true;
            claimed += 1;
        }
        claimed
    }

    /// Send to every client (or only controlled ones), dropping clients whose
    /// receiver is gone. Returns the number of deliveries.
    pub(crate) fn broadcast(&self, message: &ClientMessage, include_uncontrolled: bool) -> usize {
        let mut registry = self.lock();
        let mut delivered = 0;
        registry.clients.retain(|id, slot| {
            if !include_uncontrolled && !slot.controlled {
                return true;
            }
            match slot.sender.send(message.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    tracing::debug!(client = id, "dropping disconnected client");
                    false
                }
            }
        });
        delivered
    }

    pub(crate) fn list(&self) -> Vec<ClientInfo> {
        self.lock()
            .clients
            .iter()
            .map(|(id, slot)| ClientInfo { id: *id, url: slot.url.clone(), controlled: slot.controlled })
            .collect()
    }
}
