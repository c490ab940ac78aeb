//! Core routing table implementation.

use time::OffsetDateTime;
use tracing::{debug, trace};

use crate::{
    closest::ClosestSet,
    core::{
        bucket::Bucket,
        compact::NodeInfo,
        id::Id,
        peer::Peer,
    },
};

#[cfg(feature = "sync")]
mod sync;
#[cfg(feature = "sync")]
#[cfg_attr(doc_cfg, doc(cfg(feature = "sync")))]
pub use sync::SyncRoutingTable;

/// The maximum number of buckets, one per possible shared prefix length.
pub const MAX_BUCKETS: usize = Id::BITS;

/// The outcome of [`RoutingTable::insert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// A peer with the same identifier is already in the table, nothing changed.
    AlreadyPresent,
    /// The peer was added to the bucket at this index.
    Added(usize),
    /// The peer took the place of a bad or questionable peer in the bucket at this index, the
    /// evicted peer is handed back to the caller.
    Replaced(usize, Peer),
    /// There was no room for the peer, it was dropped.
    Full,
    /// The peer has the table's own identifier and was rejected.
    SelfEntry,
}

/// A Kademlia routing table made of buckets indexed by the shared prefix length with the local
/// identifier.
///
/// The table starts with a single bucket covering the whole id-space. Only the last bucket ever
/// splits: it is a catch-all holding every peer sharing at least its index bits with the local
/// identifier, while every other bucket `i` holds peers sharing exactly `i` bits.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    // The node's local identifier.
    local_id: Id,
    // Bucket `i` lives at index `i`, the vector only ever grows.
    buckets: Vec<Bucket>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new(Id::rand())
    }
}

impl RoutingTable {
    /// Creates a new routing table with a single bucket.
    pub fn new(local_id: Id) -> Self {
        Self {
            local_id,
            buckets: vec![Bucket::new(0)],
        }
    }

    /// Rebuilds a table from a previously taken [`snapshot`](RoutingTable::snapshot).
    ///
    /// Restored peers start out never contacted, nodes that no longer fit are dropped.
    pub fn restore<I>(local_id: Id, nodes: I) -> Self
    where
        I: IntoIterator<Item = NodeInfo>,
    {
        let mut rt = Self::new(local_id);
        for node in nodes {
            rt.insert(Peer::from(node));
        }

        rt
    }

    /// Creates a table for a lookup of `target`, seeded with copies of the closest peers the
    /// source table knows of.
    pub fn seed_from(local_id: Id, source: &RoutingTable, target: &Id) -> Self {
        let mut rt = Self::new(local_id);
        for peer in source.gather_closest(target) {
            rt.insert(peer.clone());
        }

        rt
    }

    /// Returns this table's local identifier.
    pub fn local_id(&self) -> Id {
        self.local_id
    }

    /// Returns the number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the bucket at index `i`, if it exists.
    pub fn bucket(&self, i: usize) -> Option<&Bucket> {
        self.buckets.get(i)
    }

    /// Iterates over the buckets in index order.
    pub fn buckets(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.iter()
    }

    /// Returns the number of peers in the table.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Bucket::is_empty)
    }

    /// Returns the index of the bucket responsible for the identifier.
    pub fn find_bucket(&self, id: &Id) -> usize {
        let i = self
            .local_id
            .shared_prefix(id)
            .min(self.buckets.len() - 1);
        debug_assert_eq!(self.buckets[i].index(), i);

        i
    }

    /// Inserts the peer, see [`insert_at`](RoutingTable::insert_at).
    pub fn insert(&mut self, peer: Peer) -> InsertResult {
        self.insert_at(peer, OffsetDateTime::now_utc())
    }

    /// Inserts the peer, evaluating the liveness of existing peers relative to `now`.
    ///
    /// When the responsible bucket is full a bad peer is replaced first, then the least recently
    /// active questionable one. Failing that, the last bucket splits if the candidate or one of
    /// its occupants belongs deeper, after which the insertion is retried once.
    pub fn insert_at(&mut self, peer: Peer, now: OffsetDateTime) -> InsertResult {
        if peer.id() == &self.local_id {
            return InsertResult::SelfEntry;
        }

        let mut i = self.find_bucket(peer.id());
        let bucket = &mut self.buckets[i];

        if bucket.contains(peer.id()) {
            return InsertResult::AlreadyPresent;
        }

        if bucket.is_full() {
            let peer = match bucket.replace_bad_at(peer, now) {
                Ok(evicted) => return InsertResult::Replaced(i, evicted),
                Err(peer) => peer,
            };

            let peer = match bucket.replace_questionable_at(peer, now) {
                Ok(evicted) => return InsertResult::Replaced(i, evicted),
                Err(peer) => peer,
            };

            if !self.can_split(i, peer.id()) {
                trace!(bucket = i, id = %peer.id(), "bucket full");
                return InsertResult::Full;
            }

            self.split_last(now);

            i = self.find_bucket(peer.id());
            return match self.buckets[i].add_at(peer, now) {
                Ok(()) => InsertResult::Added(i),
                Err(_) => {
                    trace!(bucket = i, "bucket still full after split");
                    InsertResult::Full
                }
            };
        }

        let res = bucket.add_at(peer, now);
        debug_assert!(res.is_ok(), "bucket {i} rejected a peer while not full");
        match res {
            Ok(()) => InsertResult::Added(i),
            Err(_) => InsertResult::Full,
        }
    }

    // Only the last bucket splits, and only if the table can still grow and some peer (the
    // candidate or an occupant) shares more than the bucket's index bits with the local id.
    fn can_split(&self, i: usize, candidate: &Id) -> bool {
        if i + 1 != self.buckets.len() || self.buckets.len() >= MAX_BUCKETS {
            return false;
        }

        self.local_id.shared_prefix(candidate) > i
            || self.buckets[i]
                .peers()
                .any(|peer| self.local_id.shared_prefix(peer.id()) > i)
    }

    // Appends a bucket and moves every peer of the previous last bucket that belongs in it.
    fn split_last(&mut self, now: OffsetDateTime) {
        debug_assert!(self.buckets.len() < MAX_BUCKETS);

        let old = self.buckets.len() - 1;
        let mut fresh = Bucket::new(old + 1);
        let local_id = self.local_id;
        let moved = self.buckets[old].migrate_into(&mut fresh, now, |peer| {
            local_id.shared_prefix(peer.id()) > old
        });

        debug!(bucket = old, moved, "split bucket");
        self.buckets.push(fresh);
    }

    /// Returns the peer with this identifier, if it exists.
    pub fn find_peer(&self, id: &Id) -> Option<&Peer> {
        self.buckets[self.find_bucket(id)].get(id)
    }

    /// Returns a mutable reference to the peer with this identifier, if it exists.
    pub fn find_peer_mut(&mut self, id: &Id) -> Option<&mut Peer> {
        let i = self.find_bucket(id);
        self.buckets[i].get_mut(id)
    }

    /// Returns `true` if a peer with this identifier is in the table.
    pub fn contains(&self, id: &Id) -> bool {
        self.find_peer(id).is_some()
    }

    /// Removes the peer with this identifier. Buckets never merge back.
    pub fn remove(&mut self, id: &Id) -> Option<Peer> {
        let i = self.find_bucket(id);
        self.buckets[i].remove(id)
    }

    /// Records a reply from the peer, returns `false` if it isn't in the table.
    pub fn mark_reply(&mut self, id: &Id) -> bool {
        self.mark_reply_at(id, OffsetDateTime::now_utc())
    }

    pub fn mark_reply_at(&mut self, id: &Id, now: OffsetDateTime) -> bool {
        match self.find_peer_mut(id) {
            Some(peer) => {
                peer.mark_reply_at(now);
                true
            }
            None => {
                trace!(%id, "reply from unknown peer");
                false
            }
        }
    }

    /// Records a query sent to the peer, returns `false` if it isn't in the table.
    pub fn mark_query(&mut self, id: &Id) -> bool {
        self.mark_query_at(id, OffsetDateTime::now_utc())
    }

    pub fn mark_query_at(&mut self, id: &Id, now: OffsetDateTime) -> bool {
        match self.find_peer_mut(id) {
            Some(peer) => {
                peer.mark_query_at(now);
                true
            }
            None => {
                trace!(%id, "query to unknown peer");
                false
            }
        }
    }

    /// Iterates over every peer, in bucket order then slot order.
    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.buckets.iter().flat_map(|bucket| bucket.peers())
    }

    /// Visits every peer, in bucket order then slot order.
    pub fn for_each_peer<'a, F>(&'a self, visit: F)
    where
        F: FnMut(&'a Peer),
    {
        self.peers().for_each(visit)
    }

    /// Visits every peer mutably, in the same order as [`for_each_peer`](Self::for_each_peer).
    ///
    /// Only a peer's liveness and address can change through the reference, so the table's
    /// structure stays intact.
    pub fn for_each_peer_mut<F>(&mut self, visit: F)
    where
        F: FnMut(&mut Peer),
    {
        self.buckets
            .iter_mut()
            .flat_map(|bucket| bucket.peers_mut())
            .for_each(visit)
    }

    /// Returns up to [`K`](crate::K) peers closest to the target, closest first.
    pub fn gather_closest(&self, target: &Id) -> Vec<&Peer> {
        let mut closest = ClosestSet::new(*target);
        self.for_each_peer(|peer| {
            closest.offer(peer);
        });

        closest.into_peers()
    }

    /// Returns the compact node info of every IPv4 peer, for persisting the table.
    pub fn snapshot(&self) -> Vec<NodeInfo> {
        self.peers().filter_map(Peer::node_info).collect()
    }

    /// Returns a random identifier that falls in the bucket at index `i`, useful to refresh it
    /// with a lookup.
    pub fn random_id_in_bucket(&self, i: usize) -> Option<Id> {
        if i >= self.buckets.len() {
            return None;
        }

        // The last bucket covers every id sharing at least `i` bits, the others exactly `i`.
        let id = if i + 1 == self.buckets.len() {
            Id::rand_with_prefix(&self.local_id, i)
        } else {
            Id::rand_with_prefix(&self.local_id.with_flipped_bit(i), i + 1)
        };

        Some(id)
    }
}
