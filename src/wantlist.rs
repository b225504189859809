//! C1 — the priority-ordered set of wanted identifiers.
//!
//! Translated from the upstream `bitswap/client/wantlist` package: a
//! deduplicating `cid -> Entry` map with a memoized priority-sorted view.
use crate::message::WantType;
use cid::Cid;
use std::collections::HashMap;

/// A single entry owned by a [`Wantlist`].
///
/// Unlike [`crate::message::Entry`] (the transient, message-order entry the
/// sender walks), this is the durable per-cid state a wantlist tracks over
/// time: no `cancel`/`send_dont_have` bits, just what's currently wanted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WantlistEntry {
    pub cid: Cid,
    pub priority: i32,
    pub want_type: WantType,
}

/// A deduplicating set of wanted identifiers, each tagged with a priority
/// and an intent. Iteration order is by descending priority; insertion order
/// is not preserved and ties are unspecified (tests must not depend on it).
#[derive(Debug, Default)]
pub struct Wantlist {
    set: HashMap<Cid, WantlistEntry>,
    // Recomputing the sorted view can get expensive; memoized and
    // invalidated on every mutation.
    cached: Option<Vec<WantlistEntry>>,
}

impl Wantlist {
    pub fn new() -> Self {
        Wantlist::default()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Adds `cid` with the given priority and intent. A no-op (returns
    /// `false`, old entry untouched) whenever the existing entry is already
    /// `Block` (re-adding `Block` or downgrading to `Have` both leave it
    /// alone) or the incoming `want_type` is `Have` (a `Have` never
    /// overwrites an existing `Have` or upgrades it). The only path that
    /// actually updates the entry is adding `Block` over an existing `Have`.
    pub fn add(&mut self, cid: Cid, priority: i32, want_type: WantType) -> bool {
        if let Some(existing) = self.set.get(&cid) {
            if existing.want_type == WantType::Block || want_type == WantType::Have {
                return false;
            }
        }
        self.put(
            cid,
            WantlistEntry {
                cid,
                priority,
                want_type,
            },
        );
        true
    }

    /// Removes `cid` unconditionally.
    pub fn remove(&mut self, cid: &Cid) {
        self.delete(cid);
    }

    /// Removes `cid` respecting intent: removing with `Have` does not remove
    /// an existing `Block` entry. Returns whether anything was removed.
    pub fn remove_with_intent(&mut self, cid: &Cid, want_type: WantType) -> bool {
        let Some(existing) = self.set.get(cid) else {
            return false;
        };
        if existing.want_type == WantType::Block && want_type == WantType::Have {
            return false;
        }
        self.delete(cid);
        true
    }

    pub fn has(&self, cid: &Cid) -> bool {
        self.set.contains_key(cid)
    }

    pub fn get(&self, cid: &Cid) -> Option<WantlistEntry> {
        self.set.get(cid).copied()
    }

    /// Returns all entries sorted by priority, descending. The result is
    /// memoized; any mutation invalidates the cache.
    pub fn entries(&mut self) -> &[WantlistEntry] {
        if self.cached.is_none() {
            let mut es: Vec<WantlistEntry> = self.set.values().copied().collect();
            es.sort_by(|a, b| b.priority.cmp(&a.priority));
            self.cached = Some(es);
        }
        self.cached.as_deref().unwrap()
    }

    fn put(&mut self, cid: Cid, entry: WantlistEntry) {
        self.cached = None;
        self.set.insert(cid, entry);
    }

    fn delete(&mut self, cid: &Cid) {
        self.cached = None;
        self.set.remove(cid);
    }
}
