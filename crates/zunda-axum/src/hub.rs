//! Websocket client registry and channel fan-out.
//!
//! Each connected socket gets a bounded outbound queue. The socket's writer
//! task drains the queue; the hub only ever `try_send`s into it, so a slow
//! or dead client can never stall a broadcast. A client whose queue is
//! full or closed is dropped from the registry during the broadcast that
//! noticed it.
//!
//! Broadcasts hold the registry lock for the whole pass, which makes
//! per-channel delivery order equal to `broadcast` call order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use zunda_core::{Channel, StageEvent, StageEventEmitter};

/// Identifies one registered socket.
pub type ClientId = Uuid;

/// A message as queued for delivery. Shared by every recipient.
pub type Outbound = Arc<str>;

/// Default per-client queue length.
pub const DEFAULT_CLIENT_QUEUE: usize = 256;

/// Per-connection delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    #[error("Client {0} has disconnected")]
    Closed(ClientId),

    #[error("Client {0} is not keeping up")]
    Full(ClientId),

    #[error("No client with id {0}")]
    UnknownClient(ClientId),
}

#[derive(Debug)]
struct Client {
    channel: Channel,
    tx: mpsc::Sender<Outbound>,
}

#[derive(Debug)]
struct HubInner {
    clients: Mutex<HashMap<ClientId, Client>>,
    queue: usize,
}

/// Registry of websocket clients, grouped by channel.
///
/// Cheap to clone; clones share the registry.
#[derive(Debug, Clone)]
pub struct ConnectionHub {
    inner: Arc<HubInner>,
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_QUEUE)
    }
}

impl ConnectionHub {
    /// Hub whose clients each buffer up to `queue` messages.
    pub fn new(queue: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                clients: Mutex::new(HashMap::new()),
                queue: queue.max(1),
            }),
        }
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<ClientId, Client>> {
        self.inner
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a client on `channel`. The receiver yields everything
    /// broadcast to that channel from now on.
    pub fn register(&self, channel: Channel) -> (ClientId, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(self.inner.queue);
        let id = Uuid::new_v4();
        self.clients().insert(id, Client { channel, tx });
        debug!(client = %id, channel = channel.as_str(), "Client registered");
        (id, rx)
    }

    /// Remove a client. Returns `false` if it was already gone.
    pub fn unregister(&self, id: ClientId) -> bool {
        let removed = self.clients().remove(&id).is_some();
        if removed {
            debug!(client = %id, "Client unregistered");
        }
        removed
    }

    /// Queue `message` for every client on `channel`. Returns the number of
    /// clients it was queued for.
    pub fn broadcast(&self, channel: Channel, message: &str) -> usize {
        let message: Outbound = Arc::from(message);
        let mut clients = self.clients();
        let mut delivered = 0;
        let mut dead = Vec::new();

        for (id, client) in clients.iter().filter(|(_, c)| c.channel == channel) {
            match client.tx.try_send(Arc::clone(&message)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => dead.push((*id, BroadcastError::Full(*id))),
                Err(TrySendError::Closed(_)) => dead.push((*id, BroadcastError::Closed(*id))),
            }
        }

        for (id, error) in dead {
            clients.remove(&id);
            warn!(channel = channel.as_str(), error = %error, "Pruned websocket client");
        }
        delivered
    }

    /// Serialize `value` and broadcast it.
    pub fn broadcast_json<T: Serialize>(&self, channel: Channel, value: &T) -> usize {
        match serde_json::to_string(value) {
            Ok(json) => self.broadcast(channel, &json),
            Err(e) => {
                warn!(channel = channel.as_str(), error = %e, "Failed to serialize broadcast");
                0
            }
        }
    }

    /// Queue `message` for one client, e.g. a reply to a command it sent.
    pub fn send_to(&self, id: ClientId, message: &str) -> Result<(), BroadcastError> {
        let mut clients = self.clients();
        let client = clients.get(&id).ok_or(BroadcastError::UnknownClient(id))?;
        let result = match client.tx.try_send(Arc::from(message)) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(_)) => BroadcastError::Full(id),
            Err(TrySendError::Closed(_)) => BroadcastError::Closed(id),
        };
        clients.remove(&id);
        warn!(error = %result, "Pruned websocket client");
        Err(result)
    }

    /// Serialize `value` and send it to one client.
    pub fn send_json<T: Serialize>(&self, id: ClientId, value: &T) -> Result<(), BroadcastError> {
        match serde_json::to_string(value) {
            Ok(json) => self.send_to(id, &json),
            Err(e) => {
                warn!(client = %id, error = %e, "Failed to serialize reply");
                Ok(())
            }
        }
    }

    pub fn client_count(&self, channel: Channel) -> usize {
        self.clients()
            .values()
            .filter(|c| c.channel == channel)
            .count()
    }
}

impl StageEventEmitter for ConnectionHub {
    fn emit(&self, event: StageEvent) {
        self.broadcast_json(event.channel(), &event);
    }

    fn clone_box(&self) -> Box<dyn StageEventEmitter> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zunda_core::{ControlEvent, PresentationEvent};

    fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message.to_string());
        }
        out
    }

    #[test]
    fn channels_are_independent() {
        let hub = ConnectionHub::default();
        let (_, mut renderer) = hub.register(Channel::Presentation);
        let (_, mut operator) = hub.register(Channel::Control);

        hub.present(PresentationEvent::Blink);
        hub.notify(ControlEvent::Ack {
            command: "speak".into(),
        });

        assert_eq!(drain(&mut renderer), [r#"{"action":"blink"}"#]);
        assert_eq!(
            drain(&mut operator),
            [r#"{"action":"ack","command":"speak"}"#]
        );
    }

    #[test]
    fn messages_arrive_in_broadcast_order() {
        let hub = ConnectionHub::default();
        let (_, mut a) = hub.register(Channel::Presentation);
        let (_, mut b) = hub.register(Channel::Presentation);

        for i in 0..5 {
            assert_eq!(hub.broadcast(Channel::Presentation, &i.to_string()), 2);
        }

        let expected = ["0", "1", "2", "3", "4"];
        assert_eq!(drain(&mut a), expected);
        assert_eq!(drain(&mut b), expected);
    }

    #[test]
    fn closed_client_is_pruned_without_affecting_others() {
        let hub = ConnectionHub::default();
        let (_, gone) = hub.register(Channel::Presentation);
        let (_, mut alive) = hub.register(Channel::Presentation);
        drop(gone);

        assert_eq!(hub.broadcast(Channel::Presentation, "x"), 1);
        assert_eq!(hub.client_count(Channel::Presentation), 1);
        assert_eq!(drain(&mut alive), ["x"]);
    }

    #[test]
    fn slow_client_is_pruned_when_its_queue_fills() {
        let hub = ConnectionHub::new(2);
        let (slow_id, _slow) = hub.register(Channel::Presentation);
        let (_, mut fast) = hub.register(Channel::Presentation);

        for i in 0..3 {
            hub.broadcast(Channel::Presentation, &i.to_string());
            drain(&mut fast);
        }

        assert_eq!(hub.client_count(Channel::Presentation), 1);
        assert!(!hub.unregister(slow_id));
        assert_eq!(hub.broadcast(Channel::Presentation, "after"), 1);
    }

    #[test]
    fn send_to_reaches_only_that_client() {
        let hub = ConnectionHub::default();
        let (id, mut target) = hub.register(Channel::Control);
        let (_, mut other) = hub.register(Channel::Control);

        hub.send_to(id, "reply").unwrap();
        assert_eq!(drain(&mut target), ["reply"]);
        assert!(drain(&mut other).is_empty());

        assert!(hub.unregister(id));
        assert_eq!(hub.send_to(id, "late"), Err(BroadcastError::UnknownClient(id)));
    }

    #[test]
    fn send_to_closed_client_prunes_it() {
        let hub = ConnectionHub::default();
        let (id, rx) = hub.register(Channel::Control);
        drop(rx);

        assert_eq!(hub.send_to(id, "x"), Err(BroadcastError::Closed(id)));
        assert_eq!(hub.client_count(Channel::Control), 0);
    }
}
