//! C7 — the front object: configuration, shared HTTP client, peer
//! lifecycle, cooldown registry, allowlist, stats.
//!
//! Translated from `httpnet.go`. The cyclic relationship between the
//! network and its senders (a sender needs to read/write the network's
//! cooldown registry, client, metrics, and trigger disconnects) is modeled
//! as the sender holding a cheap clone of a shared `Arc`-backed handle,
//! never as mutual ownership — see the design note in spec §9.
use std::sync::Arc;
use std::time::Duration;

use cid::Cid;
use dashmap::DashMap;
use rand::seq::SliceRandom;
use reqwest::{Client, Method, RequestBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::config::{HttpNetworkConfig, SenderOptions};
use crate::connect_events::{ConnectEventManager, PeerId, Receiver};
use crate::endpoint::EndpointState;
use crate::error::NetworkError;
use crate::message::{ResponseMessage, WantlistMessage};
use crate::metrics::{Metrics, Stats};
use crate::pinger::{PingResult, Pinger};
use crate::request_tracker::{RequestScope, RequestTracker};
use crate::sender::MessageSender;

/// The well-known CID for an empty UnixFS directory, used as the connect
/// probe target: any completed HTTP response to this request (regardless of
/// status) is considered a successful connection.
const CONNECT_PROBE_CID: &str = "bafyaabakaieac";

struct Inner {
    client: Client,
    config: HttpNetworkConfig,
    cooldowns: DashMap<String, tokio::time::Instant>,
    stats: Stats,
    metrics: Metrics,
    receivers: parking_lot::RwLock<Vec<Arc<dyn Receiver>>>,
    connect_mgr: parking_lot::Mutex<Option<ConnectEventManager>>,
    pinger: Pinger,
    request_tracker: RequestTracker,
    // Address book: HTTP URLs known for a peer, permanent once connect
    // succeeds (cleared on disconnect).
    addrs: DashMap<PeerId, Vec<Url>>,
}

/// Front object for the HTTP transport. Cheap to clone — clones share the
/// same underlying client, registries, and receiver list.
#[derive(Clone)]
pub struct HttpNetwork {
    inner: Arc<Inner>,
}

impl HttpNetwork {
    pub fn new(config: HttpNetworkConfig) -> Self {
        let client = Client::builder()
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .pool_max_idle_per_host(config.max_idle_conns)
            .pool_idle_timeout(config.idle_conn_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .expect("static reqwest client configuration is always valid");

        HttpNetwork {
            inner: Arc::new(Inner {
                pinger: Pinger::new(client.clone()),
                client,
                config,
                cooldowns: DashMap::new(),
                stats: Stats::default(),
                metrics: Metrics::new(),
                receivers: parking_lot::RwLock::new(Vec::new()),
                connect_mgr: parking_lot::Mutex::new(None),
                request_tracker: RequestTracker::new(),
                addrs: DashMap::new(),
            }),
        }
    }

    /// Installs `receivers` and starts the connect-event manager. Must be
    /// called before any other method.
    pub fn start(&self, receivers: Vec<Arc<dyn Receiver>>) {
        info!(allowlist = ?self.inner.config.allowlist, "HTTP retrieval system started");
        *self.inner.receivers.write() = receivers.clone();
        *self.inner.connect_mgr.lock() = Some(ConnectEventManager::new(receivers));
    }

    /// Stops the connect-event manager. Further calls are undefined.
    pub fn stop(&self) {
        if let Some(mgr) = self.inner.connect_mgr.lock().as_ref() {
            mgr.stop();
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.inner.stats
    }

    pub(crate) fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    pub(crate) fn max_block_size(&self) -> u64 {
        self.inner.config.max_block_size
    }

    pub(crate) fn supports_have(&self) -> bool {
        self.inner.config.supports_have
    }

    /// Attempts an HTTP connection to `peer` at one of `addrs`. The first
    /// request to complete (regardless of HTTP status) is a success: the
    /// address is stored permanently, a `Connected` event fires, and
    /// pinging starts.
    pub async fn connect(&self, peer: PeerId, addrs: Vec<Url>, cancel: &CancellationToken) -> Result<(), NetworkError> {
        let mut urls = self.filter_allowlist(addrs)?;
        if urls.is_empty() {
            return Err(NetworkError::NoHttpAddresses);
        }
        urls.shuffle(&mut rand::thread_rng());

        for url in &urls {
            let request = self.build_request(url, Method::GET, CONNECT_PROBE_CID);
            debug!(url = %url, "connect probe");
            tokio::select! {
                resp = request.send() => {
                    if resp.is_ok() {
                        self.inner.addrs.insert(peer.clone(), urls.clone());
                        if let Some(mgr) = self.inner.connect_mgr.lock().as_ref() {
                            mgr.connected(peer.clone());
                        }
                        self.inner.pinger.start_pinging(peer.0.clone(), url.clone());
                        return Ok(());
                    }
                }
                _ = cancel.cancelled() => {
                    return Err(NetworkError::Cancelled);
                }
            }
        }
        Err(NetworkError::NoSuccess)
    }

    /// Marks `peer` disconnected: fires `Disconnected`, stops pinging, and
    /// purges the peer's addresses. Always succeeds.
    pub async fn disconnect_from(&self, peer: &PeerId) {
        if let Some(mgr) = self.inner.connect_mgr.lock().as_ref() {
            mgr.disconnected(peer.clone());
        }
        self.inner.pinger.stop_pinging(&peer.0);
        self.inner.addrs.remove(peer);
    }

    /// Shorthand: creates a sender with default options, sends, closes.
    /// Empty wantlists are a no-op.
    pub async fn send_message(
        &self,
        peer: PeerId,
        msg: WantlistMessage,
        cancel: &CancellationToken,
    ) -> Result<(), NetworkError> {
        if msg.is_empty() {
            return Ok(());
        }
        let mut sender = self.new_message_sender(peer, SenderOptions::default())?;
        sender.send_msg(msg, cancel).await;
        sender.close();
        Ok(())
    }

    /// Snapshots `peer`'s currently known URLs (with their current
    /// cooldowns) into a new [`MessageSender`].
    pub fn new_message_sender(&self, peer: PeerId, opts: SenderOptions) -> Result<MessageSender, NetworkError> {
        let urls = self.sender_urls(&peer);
        if urls.is_empty() {
            return Err(NetworkError::NoHttpAddresses);
        }
        Ok(MessageSender::new(peer, urls, self.clone(), opts))
    }

    pub async fn ping(&self, peer: &PeerId) -> PingResult {
        self.inner.pinger.ping(&peer.0).await
    }

    pub fn latency(&self, peer: &PeerId) -> Duration {
        self.inner.pinger.latency(&peer.0)
    }

    /// Whether `peer` has a known, live HTTP address — the signal
    /// [`crate::router::Router`] uses to prefer this transport over the
    /// stream fallback.
    pub fn has_http_addrs(&self, peer: &PeerId) -> bool {
        self.inner.addrs.contains_key(peer)
    }

    fn filter_allowlist(&self, urls: Vec<Url>) -> Result<Vec<Url>, NetworkError> {
        if self.inner.config.allowlist.is_empty() {
            return Ok(urls);
        }
        let mut filtered = Vec::new();
        for url in urls {
            let host = url
                .host_str()
                .ok_or_else(|| NetworkError::InvalidUrlHost(url.to_string()))?;
            if self.inner.config.allowlist.contains(host) {
                filtered.push(url);
            }
        }
        Ok(filtered)
    }

    fn sender_urls(&self, peer: &PeerId) -> Vec<EndpointState> {
        let Some(urls) = self.inner.addrs.get(peer) else {
            return Vec::new();
        };
        let now = tokio::time::Instant::now();
        urls.iter()
            .map(|u| {
                let cooldown = self
                    .inner
                    .cooldowns
                    .get(u.as_str())
                    .map(|dl| *dl)
                    .filter(|dl| *dl > now);
                EndpointState::with_cooldown(u.clone(), cooldown)
            })
            .collect()
    }

    pub(crate) fn build_request(&self, url: &Url, method: Method, cid: &str) -> RequestBuilder {
        let mut send_url = url.clone();
        send_url.set_query(Some("format=raw"));
        send_url.set_path(&format!("{}/ipfs/{}", url.path().trim_end_matches('/'), cid));

        self.inner
            .client
            .request(method, send_url)
            .header(reqwest::header::ACCEPT, "application/vnd.ipld.raw")
    }

    pub(crate) fn request_scope(&self, parent: &CancellationToken, cid: Cid) -> RequestScope {
        self.inner.request_tracker.request_context(parent, cid)
    }

    pub(crate) fn cancel_request(&self, cid: &Cid) {
        self.inner.request_tracker.cancel_request(cid);
    }

    pub(crate) fn set_cooldown(&self, endpoint: &mut EndpointState, backoff: Duration) {
        let deadline = tokio::time::Instant::now() + backoff;
        endpoint.cooldown = Some(deadline);
        self.inner.cooldowns.insert(endpoint.url.as_str().to_string(), deadline);
    }

    pub(crate) fn clear_cooldown(&self, endpoint: &mut EndpointState) {
        if endpoint.cooldown.take().is_some() {
            self.inner.cooldowns.remove(endpoint.url.as_str());
        }
    }

    pub(crate) fn on_message(&self, peer: PeerId) {
        if let Some(mgr) = self.inner.connect_mgr.lock().as_ref() {
            mgr.on_message(peer);
        }
    }

    pub(crate) async fn deliver(&self, peer: PeerId, msg: ResponseMessage) {
        let receivers = self.inner.receivers.read().clone();
        tokio::spawn(async move {
            for recv in &receivers {
                recv.receive_message(peer.clone(), msg.clone()).await;
            }
        });
    }

    pub(crate) async fn deliver_error(&self, err: String) {
        let receivers = self.inner.receivers.read().clone();
        for recv in &receivers {
            recv.receive_error(err.clone()).await;
        }
    }
}
