//! C2 — maps an in-flight identifier to a cancellation handle, so a later
//! wantlist entry marked `Cancel` can abort an in-progress GET/HEAD for the
//! same cid issued moments earlier.
use cid::Cid;
use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Tracks one cancellation token per in-flight cid. Concurrent
/// `request_context` calls for the same cid share the same token, so
/// `cancel_request` cancels every overlapping request at once.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    inflight: Arc<DashMap<Cid, CancellationToken>>,
}

/// A handle returned by [`RequestTracker::request_context`]. The tracked
/// entry for this cid is removed when the scope is dropped, releasing it
/// for the next unrelated request.
pub struct RequestScope {
    inflight: Arc<DashMap<Cid, CancellationToken>>,
    cid: Cid,
    token: CancellationToken,
}

impl RequestScope {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.inflight.remove(&self.cid);
    }
}

impl RequestTracker {
    pub fn new() -> Self {
        RequestTracker::default()
    }

    /// Returns a cancellable scope for `cid`, cancelled when either `parent`
    /// is cancelled or [`RequestTracker::cancel_request`] is later called
    /// for the same cid. The entry is released when the returned scope is
    /// dropped.
    ///
    /// The stored token is `parent`'s own child (tokio_util propagates
    /// parent cancellation to it with no extra task), so the first caller
    /// for a given cid is the one whose parent governs it; a concurrent
    /// second call for the same (already in-flight) cid just shares that
    /// same token rather than layering in its own parent.
    pub fn request_context(&self, parent: &CancellationToken, cid: Cid) -> RequestScope {
        let token = self.inflight.entry(cid).or_insert_with(|| parent.child_token()).clone();

        RequestScope {
            inflight: self.inflight.clone(),
            cid,
            token,
        }
    }

    /// Cancels the shared token for `cid`, aborting every request currently
    /// sharing it.
    pub fn cancel_request(&self, cid: &Cid) {
        if let Some(token) = self.inflight.get(cid) {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multihash::{Code, MultihashDigest};

    fn cid_for(data: &[u8]) -> Cid {
        let hash = Code::Sha2_256.digest(data);
        Cid::new_v1(0x55, hash)
    }

    #[tokio::test]
    async fn cancel_request_aborts_in_flight_scope() {
        let tracker = RequestTracker::new();
        let parent = CancellationToken::new();
        let cid = cid_for(b"x");

        let scope = tracker.request_context(&parent, cid);
        assert!(!scope.is_cancelled());

        tracker.cancel_request(&cid);
        assert!(scope.is_cancelled());
    }

    #[tokio::test]
    async fn parent_cancellation_propagates() {
        let tracker = RequestTracker::new();
        let parent = CancellationToken::new();
        let cid = cid_for(b"y");

        let scope = tracker.request_context(&parent, cid);
        parent.cancel();
        assert!(scope.is_cancelled());
    }

    #[tokio::test]
    async fn unrelated_cid_not_affected() {
        let tracker = RequestTracker::new();
        let parent = CancellationToken::new();
        let a = cid_for(b"a");
        let b = cid_for(b"b");

        let scope_a = tracker.request_context(&parent, a);
        let scope_b = tracker.request_context(&parent, b);
        tracker.cancel_request(&a);
        assert!(scope_a.is_cancelled());
        assert!(!scope_b.is_cancelled());
    }

    #[tokio::test]
    async fn dropping_scope_releases_entry() {
        let tracker = RequestTracker::new();
        let parent = CancellationToken::new();
        let cid = cid_for(b"z");

        {
            let _scope = tracker.request_context(&parent, cid);
            assert!(tracker.inflight.contains_key(&cid));
        }
        assert!(!tracker.inflight.contains_key(&cid));
    }
}
