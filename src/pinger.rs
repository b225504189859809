//! C4 — periodic liveness + latency probe per connected peer.
use dashmap::DashMap;
use parking_lot::Mutex;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

/// EWMA smoothing factor for latency updates. Matches the shape of a
/// typical ping-latency EWMA (recent samples weighted more heavily) without
/// claiming a specific value from the upstream implementation, which this
/// crate does not retain.
const EWMA_ALPHA: f64 = 0.1;

const PING_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy)]
pub struct PingResult {
    pub latency: Duration,
    pub success: bool,
}

struct PeerPingState {
    url: Url,
    ewma: Mutex<Option<Duration>>,
    stop: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Periodically pings connected peers over HTTP and keeps an EWMA of
/// observed latency, used for diagnostics and for upstream peer-quality
/// decisions (outside this crate's scope).
#[derive(Default)]
pub struct Pinger {
    client: Client,
    peers: DashMap<String, Arc<PeerPingState>>,
}

fn update_ewma(current: &mut Option<Duration>, sample: Duration) {
    *current = Some(match *current {
        None => sample,
        Some(prev) => {
            let prev_s = prev.as_secs_f64();
            let sample_s = sample.as_secs_f64();
            let next = EWMA_ALPHA * sample_s + (1.0 - EWMA_ALPHA) * prev_s;
            Duration::from_secs_f64(next.max(0.0))
        }
    });
}

impl Pinger {
    pub fn new(client: Client) -> Self {
        Pinger {
            client,
            peers: DashMap::new(),
        }
    }

    /// Starts periodic pinging of `peer` at `url`. A no-op if already
    /// pinging this peer.
    pub fn start_pinging(&self, peer: impl Into<String>, url: Url) {
        let peer = peer.into();
        if self.peers.contains_key(&peer) {
            return;
        }
        let stop = Arc::new(AtomicBool::new(false));
        let state = Arc::new(PeerPingState {
            url: url.clone(),
            ewma: Mutex::new(None),
            stop: stop.clone(),
            task: Mutex::new(None),
        });
        self.peers.insert(peer.clone(), state.clone());

        let client = self.client.clone();
        let loop_state = state.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(PING_INTERVAL);
            loop {
                interval.tick().await;
                if loop_state.stop.load(Ordering::Relaxed) {
                    break;
                }
                let start = Instant::now();
                if client.get(loop_state.url.clone()).send().await.is_ok() {
                    update_ewma(&mut loop_state.ewma.lock(), start.elapsed());
                }
            }
        });
        *state.task.lock() = Some(handle);
    }

    /// Stops pinging `peer` and removes its latency state.
    pub fn stop_pinging(&self, peer: &str) {
        if let Some((_, state)) = self.peers.remove(peer) {
            state.stop.store(true, Ordering::Relaxed);
            if let Some(handle) = state.task.lock().take() {
                handle.abort();
            }
        }
    }

    /// Performs a single ping and returns latency immediately, independent
    /// of the periodic background probe.
    pub async fn ping(&self, peer: &str) -> PingResult {
        let Some(state) = self.peers.get(peer).map(|r| r.clone()) else {
            return PingResult {
                latency: Duration::ZERO,
                success: false,
            };
        };
        let url = state.url.clone();
        let start = Instant::now();
        let success = self.client.get(url).send().await.is_ok();
        let elapsed = start.elapsed();
        if success {
            update_ewma(&mut state.ewma.lock(), elapsed);
        }
        PingResult {
            latency: elapsed,
            success,
        }
    }

    /// Returns the current EWMA latency for `peer`, or zero if unknown.
    pub fn latency(&self, peer: &str) -> Duration {
        self.peers
            .get(peer)
            .and_then(|s| *s.ewma.lock())
            .unwrap_or(Duration::ZERO)
    }
}
