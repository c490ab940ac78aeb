//! Bounded selection of the peers closest to a target identifier.

use crate::core::{
    bucket::K,
    id::{Distance, Id},
    peer::Peer,
};

/// The peers closest to a target, sorted by ascending XOR distance and holding at most
/// `capacity` entries.
///
/// The set borrows the peers it selects, it is meant to be built and consumed within a single
/// lookup.
#[derive(Debug, Clone)]
pub struct ClosestSet<'a> {
    target: Id,
    capacity: usize,
    entries: Vec<(&'a Peer, Distance)>,
}

impl<'a> ClosestSet<'a> {
    /// Creates an empty set holding at most [`K`] peers.
    pub fn new(target: Id) -> Self {
        Self::with_capacity(target, K)
    }

    /// Creates an empty set holding at most `capacity` peers.
    pub fn with_capacity(target: Id, capacity: usize) -> Self {
        Self {
            target,
            capacity,
            // One extra slot for the entry that gets dropped when the set overflows.
            entries: Vec::with_capacity(capacity + 1),
        }
    }

    pub fn target(&self) -> &Id {
        &self.target
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Returns the distance of the farthest peer currently selected.
    pub fn farthest(&self) -> Option<Distance> {
        self.entries.last().map(|(_, distance)| *distance)
    }

    /// Offers a candidate, returns `true` if it was kept.
    ///
    /// Peers at equal distance keep their insertion order, and once the set is over capacity the
    /// farthest entry is dropped.
    pub fn offer(&mut self, peer: &'a Peer) -> bool {
        let distance = peer.id().distance(&self.target);

        // Insert after any entry at the same distance.
        let i = self.entries.partition_point(|(_, d)| d <= &distance);
        if i >= self.capacity {
            return false;
        }

        self.entries.insert(i, (peer, distance));
        if self.entries.len() > self.capacity {
            self.entries.pop();
        }

        true
    }

    /// Iterates over the selected peers and their distances, closest first.
    pub fn iter(&self) -> impl Iterator<Item = (&'a Peer, Distance)> + '_ {
        self.entries.iter().copied()
    }

    /// Consumes the set, returning the selected peers closest first.
    pub fn into_peers(self) -> Vec<&'a Peer> {
        self.entries.into_iter().map(|(peer, _)| peer).collect()
    }
}

impl<'a> Extend<&'a Peer> for ClosestSet<'a> {
    fn extend<I: IntoIterator<Item = &'a Peer>>(&mut self, iter: I) {
        for peer in iter {
            self.offer(peer);
        }
    }
}
