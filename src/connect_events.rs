//! C5 — fans out connected/disconnected/on-message events to receivers, in
//! the order the events were triggered.
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::message::ResponseMessage;

/// Capability set an upstream collaborator registers to be notified of
/// inbound messages, errors, and peer connection changes.
///
/// Modeled as a trait object set rather than a concrete struct of channels,
/// matching the design note that receiver polymorphism should not require
/// dynamic dispatch anywhere in the hot send path besides the final
/// delivery step (which does go through this trait, in a spawned task).
#[async_trait]
pub trait Receiver: Send + Sync {
    async fn receive_message(&self, from: PeerId, msg: ResponseMessage);
    async fn receive_error(&self, err: String);
    async fn peer_connected(&self, peer: PeerId);
    async fn peer_disconnected(&self, peer: PeerId);
}

/// An opaque peer identifier. Equality and string form are all this crate
/// relies on; the identity/address-book service that actually resolves one
/// is an external collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

enum ConnectEvent {
    Connected(PeerId),
    Disconnected(PeerId),
    OnMessage(PeerId),
}

/// Serializes connection lifecycle events across however many receivers are
/// registered, preserving trigger order even when multiple senders fire
/// events concurrently.
pub struct ConnectEventManager {
    sender: mpsc::UnboundedSender<ConnectEvent>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ConnectEventManager {
    pub fn new(receivers: Vec<Arc<dyn Receiver>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        ConnectEventManager {
            sender: tx,
            worker: parking_lot::Mutex::new(Some(Self::spawn_worker(rx, receivers))),
        }
    }

    fn spawn_worker(mut rx: mpsc::UnboundedReceiver<ConnectEvent>, receivers: Vec<Arc<dyn Receiver>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    ConnectEvent::Connected(peer) => {
                        debug!(%peer, "peer connected");
                        for r in &receivers {
                            r.peer_connected(peer.clone()).await;
                        }
                    }
                    ConnectEvent::Disconnected(peer) => {
                        debug!(%peer, "peer disconnected");
                        for r in &receivers {
                            r.peer_disconnected(peer.clone()).await;
                        }
                    }
                    ConnectEvent::OnMessage(_peer) => {
                        // Internal keepalive signal only; no receiver is
                        // notified of individual message exchanges.
                    }
                }
            }
        })
    }

    pub fn connected(&self, peer: PeerId) {
        let _ = self.sender.send(ConnectEvent::Connected(peer));
    }

    pub fn disconnected(&self, peer: PeerId) {
        let _ = self.sender.send(ConnectEvent::Disconnected(peer));
    }

    /// Signals that a message was exchanged with `peer` — a keepalive
    /// signal, not delivered to receivers (only `Connected`/`Disconnected`
    /// are receiver-visible events; `OnMessage` is consumed internally by
    /// components, such as the pinger, that want to know a peer is alive).
    pub fn on_message(&self, peer: PeerId) {
        let _ = self.sender.send(ConnectEvent::OnMessage(peer));
    }

    /// Stops the event-processing worker. Further calls to `connected` /
    /// `disconnected` / `on_message` are silently dropped.
    pub fn stop(&self) {
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
    }
}
