// Peer Set - Deduplicated, deterministically ordered membership
//
// Ordering matters downstream: the consistent-hash ring must see the same
// sequence on every node that observes the same members.

use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Set of peer addresses, always iterated in sorted order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSet(BTreeSet<String>);

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an address; returns false if it was already present
    pub fn insert(&mut self, address: impl Into<String>) -> bool {
        self.0.insert(address.into())
    }

    pub fn contains(&self, address: &str) -> bool {
        self.0.contains(address)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// Sorted copy of the addresses
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for PeerSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Last published peer set, shared between a backend's task and its callers
#[derive(Debug, Default)]
pub struct PeerCache {
    current: RwLock<Arc<PeerSet>>,
}

impl PeerCache {
    pub fn new(initial: PeerSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Current snapshot; never blocks on I/O
    pub fn snapshot(&self) -> Arc<PeerSet> {
        self.current.read().clone()
    }

    pub fn peers(&self) -> Vec<String> {
        self.snapshot().to_vec()
    }

    /// Swap in `next` if it differs; returns whether anything changed
    pub fn replace_if_changed(&self, next: PeerSet) -> bool {
        let mut current = self.current.write();
        if **current == next {
            return false;
        }
        *current = Arc::new(next);
        true
    }
}
