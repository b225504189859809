//! Block
use bytes::Bytes;
use cid::Cid;
use std::cmp::{Ord, Ordering, PartialOrd};
use std::hash::{Hash, Hasher};

#[derive(Clone, Debug, Eq)]
/// An immutable content-addressed block retrieved from a peer.
pub struct Block {
    data: Bytes,
    cid: Cid,
}

impl Block {
    /// Creates a new immutable block.
    pub fn new(data: Bytes, cid: Cid) -> Self {
        Block { data, cid }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn rough_size(&self) -> usize {
        self.cid.hash().digest().len() + 4 + self.data.len()
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }
}

impl Hash for Block {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Hash::hash(&self.cid, state)
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.cid == other.cid
    }
}

impl PartialOrd for Block {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cid.cmp(&other.cid))
    }
}

impl Ord for Block {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cid.cmp(&other.cid)
    }
}
