//! C8 — dispatches between the HTTP transport and a non-HTTP fallback
//! transport, per peer, preferring HTTP whenever a peer has a known HTTP
//! address.
//!
//! Translated from `router.go`. The upstream `router` holds two concrete
//! `BitSwapNetwork`s (`Bitswap`, `HTTP`); here the non-HTTP side is a trait
//! boundary, [`StreamNetwork`], since this crate implements the HTTP
//! transport only — the libp2p/bitswap stream transport is an external
//! collaborator (see Non-goals).
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::SenderOptions;
use crate::connect_events::{PeerId, Receiver};
use crate::error::NetworkError;
use crate::message::WantlistMessage;
use crate::network::HttpNetwork;
use crate::sender::MessageSender;

/// The addresses known for a peer, split by transport, mirroring what the
/// upstream `SplitHTTPAddrs` extracts from a libp2p `AddrInfo`.
#[derive(Clone, Debug, Default)]
pub struct PeerAddrs {
    pub http: Vec<Url>,
    pub other: Vec<Url>,
}

/// A transport-agnostic view of an in-progress send, so [`Router`] can hand
/// back either an HTTP [`MessageSender`] or a stream-transport session
/// through one return type.
#[async_trait]
pub trait SendSession: Send {
    async fn send_msg(&mut self, msg: WantlistMessage, cancel: &CancellationToken);
    fn close(&self);
    fn supports_have(&self) -> bool;
}

#[async_trait]
impl SendSession for MessageSender {
    async fn send_msg(&mut self, msg: WantlistMessage, cancel: &CancellationToken) {
        MessageSender::send_msg(self, msg, cancel).await
    }

    fn close(&self) {
        MessageSender::close(self)
    }

    fn supports_have(&self) -> bool {
        MessageSender::supports_have(self)
    }
}

/// The non-HTTP transport boundary a [`Router`] falls back to for peers with
/// no known HTTP address. This crate depends only on the trait; a concrete
/// implementation (the bitswap/libp2p stream transport) is an external
/// collaborator, out of scope here.
#[async_trait]
pub trait StreamNetwork: Send + Sync {
    fn start(&self, receivers: Vec<Arc<dyn Receiver>>);
    fn stop(&self);
    async fn connect(&self, peer: PeerId, addrs: Vec<Url>, cancel: &CancellationToken) -> Result<(), NetworkError>;
    async fn disconnect_from(&self, peer: &PeerId);
    async fn send_message(&self, peer: PeerId, msg: WantlistMessage, cancel: &CancellationToken) -> Result<(), NetworkError>;
    fn new_message_sender(&self, peer: PeerId, opts: SenderOptions) -> Result<Box<dyn SendSession>, NetworkError>;
    async fn ping(&self, peer: &PeerId) -> Duration;
    fn latency(&self, peer: &PeerId) -> Duration;
    fn stats(&self) -> (u64, u64);
}

/// Dispatches bitswap-network operations to whichever transport applies to a
/// given peer, preferring HTTP when the peer has one or more known HTTP
/// addresses (`router.go`'s `SplitHTTPAddrs` check).
pub struct Router {
    http: HttpNetwork,
    stream: Arc<dyn StreamNetwork>,
}

impl Router {
    pub fn new(http: HttpNetwork, stream: Arc<dyn StreamNetwork>) -> Self {
        Router { http, stream }
    }

    pub fn start(&self, receivers: Vec<Arc<dyn Receiver>>) {
        self.http.start(receivers.clone());
        self.stream.start(receivers);
    }

    pub fn stop(&self) {
        self.http.stop();
        self.stream.stop();
    }

    /// Connects to `peer`, preferring HTTP when `addrs.http` is non-empty.
    pub async fn connect(&self, peer: PeerId, addrs: PeerAddrs, cancel: &CancellationToken) -> Result<(), NetworkError> {
        if !addrs.http.is_empty() {
            self.http.connect(peer, addrs.http, cancel).await
        } else {
            self.stream.connect(peer, addrs.other, cancel).await
        }
    }

    /// Disconnects `peer` from both transports, since either or both may
    /// hold live state for it.
    pub async fn disconnect_from(&self, peer: &PeerId) {
        self.http.disconnect_from(peer).await;
        self.stream.disconnect_from(peer).await;
    }

    pub async fn ping(&self, peer: &PeerId) -> Duration {
        if self.http.has_http_addrs(peer) {
            self.http.ping(peer).await.latency
        } else {
            self.stream.ping(peer).await
        }
    }

    pub fn latency(&self, peer: &PeerId) -> Duration {
        if self.http.has_http_addrs(peer) {
            self.http.latency(peer)
        } else {
            self.stream.latency(peer)
        }
    }

    /// Combined message counters across both transports.
    pub fn stats(&self) -> (u64, u64) {
        let (http_sent, http_recvd) = self.http.stats().snapshot();
        let (stream_sent, stream_recvd) = self.stream.stats();
        (http_sent + stream_sent, http_recvd + stream_recvd)
    }

    /// Always goes out over the stream transport: `SendMessage` is used only
    /// for server-side asks, which this crate's HTTP side never receives.
    pub async fn send_message(
        &self,
        peer: PeerId,
        msg: WantlistMessage,
        cancel: &CancellationToken,
    ) -> Result<(), NetworkError> {
        self.stream.send_message(peer, msg, cancel).await
    }

    /// Returns a send session on whichever transport has addresses for
    /// `peer`, preferring HTTP.
    pub fn new_message_sender(&self, peer: PeerId, opts: SenderOptions) -> Result<Box<dyn SendSession>, NetworkError> {
        if self.http.has_http_addrs(&peer) {
            Ok(Box::new(self.http.new_message_sender(peer, opts)?))
        } else {
            self.stream.new_message_sender(peer, opts)
        }
    }
}
