//! The inbound wantlist message and outbound response message that
//! [`crate::sender::MessageSender`] consumes and produces.
//!
//! The upstream exchange engine that actually constructs these messages is
//! out of scope for this crate (see spec §1); what's defined here is the
//! minimal concrete shape the sender needs: an ordered list of entries in
//! (`WantType`, `Cancel`, `SendDontHave`) and an accumulator for blocks,
//! haves and dont-haves.
use crate::block::Block;
use cid::Cid;

/// What a wantlist entry is asking for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WantType {
    /// Want the block's bytes (`GET`).
    Block,
    /// Want only a presence indication (`HEAD`).
    Have,
}

/// One entry of an inbound wantlist message, as handed to the sender.
///
/// `priority` and `want_type` describe what is wanted; `cancel` and
/// `send_dont_have` are transient bits carried by the inbound message itself
/// (distinct from the priority-ordered [`crate::wantlist::Wantlist`], which
/// the sender never consults — entries are walked in message order, see
/// [`crate::sender::MessageSender::send_msg`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub cid: Cid,
    pub priority: i32,
    pub want_type: WantType,
    /// A cancellation for this cid: aborts any matching in-flight request.
    pub cancel: bool,
    /// Whether the peer wants an explicit `DontHave` when the block is
    /// unavailable, rather than silence.
    pub send_dont_have: bool,
}

impl Entry {
    pub fn new_block(cid: Cid, priority: i32) -> Self {
        Entry {
            cid,
            priority,
            want_type: WantType::Block,
            cancel: false,
            send_dont_have: false,
        }
    }

    pub fn new_have(cid: Cid, priority: i32) -> Self {
        Entry {
            cid,
            priority,
            want_type: WantType::Have,
            cancel: false,
            send_dont_have: false,
        }
    }

    pub fn cancel(cid: Cid) -> Self {
        Entry {
            cid,
            priority: 0,
            want_type: WantType::Block,
            cancel: true,
            send_dont_have: false,
        }
    }

    pub fn with_send_dont_have(mut self, v: bool) -> Self {
        self.send_dont_have = v;
        self
    }
}

/// An inbound message carrying a wantlist, in the order the upstream
/// exchange produced it.
#[derive(Clone, Debug, Default)]
pub struct WantlistMessage {
    pub entries: Vec<Entry>,
}

impl WantlistMessage {
    pub fn new(entries: Vec<Entry>) -> Self {
        WantlistMessage { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The response a [`crate::sender::MessageSender`] accumulates while walking
/// a wantlist, delivered to receivers once the wantlist loop finishes.
#[derive(Clone, Debug, Default)]
pub struct ResponseMessage {
    blocks: Vec<Block>,
    haves: Vec<Cid>,
    dont_haves: Vec<Cid>,
}

impl ResponseMessage {
    pub fn add_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn add_have(&mut self, cid: Cid) {
        if !self.haves.contains(&cid) {
            self.haves.push(cid);
        }
    }

    /// A single wantlist entry may be retried against the same endpoint
    /// (client-error budget allows `MaxRetries` extra attempts before the
    /// entry is abandoned), and each definitive-absence reply records a
    /// `DontHave` — dedup so the retried attempts don't surface the same cid
    /// twice in one response.
    pub fn add_dont_have(&mut self, cid: Cid) {
        if !self.dont_haves.contains(&cid) {
            self.dont_haves.push(cid);
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn haves(&self) -> &[Cid] {
        &self.haves
    }

    pub fn dont_haves(&self) -> &[Cid] {
        &self.dont_haves
    }

    /// Whether anything at all was recorded — governs whether this response
    /// is worth delivering to receivers (spec §4.4: "if nothing was
    /// recorded and there was an error, deliver the error instead").
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.haves.is_empty() && self.dont_haves.is_empty()
    }
}
