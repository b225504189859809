//! C3 — per-endpoint cooldown/error state and selection.
use std::cmp::Ordering;
use tokio::time::Instant;
use url::Url;

/// Per-endpoint state tracked by one [`crate::sender::MessageSender`] for
/// the lifetime of that sender.
#[derive(Debug, Clone)]
pub struct EndpointState {
    pub url: Url,
    pub cooldown: Option<Instant>,
    pub client_errors: u32,
    pub server_errors: u32,
}

impl EndpointState {
    pub fn new(url: Url) -> Self {
        EndpointState {
            url,
            cooldown: None,
            client_errors: 0,
            server_errors: 0,
        }
    }

    pub fn with_cooldown(url: Url, cooldown: Option<Instant>) -> Self {
        EndpointState {
            url,
            cooldown,
            client_errors: 0,
            server_errors: 0,
        }
    }

    fn exhausted(&self, max_retries: u32) -> bool {
        self.client_errors > max_retries || self.server_errors > max_retries
    }

    /// Ascending "worse" ordering: exhausted endpoints sort last; among the
    /// rest, shorter cooldown first (absent cooldown treated as zero), then
    /// fewer client errors, then fewer server errors.
    ///
    /// Note: the upstream Go implementation's sort comparator has a second
    /// branch (`b.clientErrors >= MaxRetries`) that looks like a copy-paste
    /// bug — it compares `b`'s client errors where a server-error check was
    /// probably intended, and is redundant with the first branch regardless.
    /// This implementation follows the corrected behavior described in the
    /// spec rather than reproducing that branch.
    fn cmp(&self, other: &Self, max_retries: u32) -> Ordering {
        let a_exhausted = self.exhausted(max_retries);
        let b_exhausted = other.exhausted(max_retries);
        if a_exhausted != b_exhausted {
            return a_exhausted.cmp(&b_exhausted);
        }
        if a_exhausted {
            // both exhausted; relative order among them is unspecified.
            return Ordering::Equal;
        }

        // `Option<Instant>` already orders `None` before any `Some`, giving
        // exactly "absent cooldown treated as zero" without reading the
        // clock (calling `Instant::now()` per side here would make two
        // cooldown-free endpoints compare unequal almost every time, since
        // the first read is monotonically <= the second).
        match self.cooldown.cmp(&other.cooldown) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.client_errors.cmp(&other.client_errors) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.server_errors.cmp(&other.server_errors)
    }
}

/// Outcome of selecting the best endpoint for the current wantlist entry.
pub enum Best<'a> {
    /// Use this endpoint.
    Endpoint(&'a mut EndpointState),
    /// No endpoint is usable for this entry (client retries exhausted
    /// everywhere); the caller should move on to the next wantlist entry.
    NoneForEntry,
    /// Every endpoint has exhausted its server-error budget; the caller
    /// should disconnect the peer and abort the whole wantlist.
    ServerExhausted,
}

/// Sorts `endpoints` by [`EndpointState::cmp`] and returns the best choice.
pub fn best(endpoints: &mut [EndpointState], max_retries: u32) -> Best<'_> {
    endpoints.sort_by(|a, b| a.cmp(b, max_retries));
    let Some(first) = endpoints.first() else {
        return Best::NoneForEntry;
    };
    if first.client_errors > max_retries {
        return Best::NoneForEntry;
    }
    if first.server_errors > max_retries {
        return Best::ServerExhausted;
    }
    Best::Endpoint(&mut endpoints[0])
}

/// Resets client-error counters on every endpoint. Called after each
/// wantlist entry completes so client errors are per-entry, not cumulative
/// across the whole message; server errors persist for the sender's
/// lifetime.
pub fn reset_client_errors(endpoints: &mut [EndpointState]) {
    for e in endpoints {
        e.client_errors = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn exhausted_client_errors_sort_last_and_yield_none() {
        let mut endpoints = vec![EndpointState::new(url("http://a.example"))];
        endpoints[0].client_errors = 2; // max_retries=1 -> exhausted
        match best(&mut endpoints, 1) {
            Best::NoneForEntry => {}
            _ => panic!("expected NoneForEntry"),
        }
    }

    #[test]
    fn exhausted_server_errors_yield_server_exhausted() {
        let mut endpoints = vec![EndpointState::new(url("http://a.example"))];
        endpoints[0].server_errors = 2;
        match best(&mut endpoints, 1) {
            Best::ServerExhausted => {}
            _ => panic!("expected ServerExhausted"),
        }
    }

    #[test]
    fn shorter_cooldown_wins() {
        let now = Instant::now();
        let mut endpoints = vec![
            EndpointState::with_cooldown(url("http://a.example"), Some(now + std::time::Duration::from_secs(5))),
            EndpointState::with_cooldown(url("http://b.example"), Some(now + std::time::Duration::from_millis(1))),
        ];
        match best(&mut endpoints, 1) {
            Best::Endpoint(e) => assert_eq!(e.url.host_str(), Some("b.example")),
            _ => panic!("expected Endpoint"),
        }
    }

    #[test]
    fn reset_client_errors_clears_all() {
        let mut endpoints = vec![EndpointState::new(url("http://a.example"))];
        endpoints[0].client_errors = 3;
        endpoints[0].server_errors = 1;
        reset_client_errors(&mut endpoints);
        assert_eq!(endpoints[0].client_errors, 0);
        assert_eq!(endpoints[0].server_errors, 1);
    }
}
