//! Fixed-capacity peer buckets.

use thiserror::Error;
use time::OffsetDateTime;
use tracing::trace;

use crate::core::{
    id::Id,
    peer::{Peer, Status},
};

/// The maximum number of peers a bucket can hold.
pub const K: usize = 8;

/// The error returned when adding to a full bucket, it hands the rejected peer back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bucket is full, can't add {}", .0.id())]
pub struct BucketFull(pub Peer);

/// A sparse array of up to [`K`] peers sharing a prefix range with the local identifier.
///
/// Slots aren't kept contiguous: a full bucket is one with every slot occupied.
#[derive(Debug, Clone)]
pub struct Bucket {
    // The number of leading bits the peers share with the local identifier.
    index: usize,
    // The number of occupied slots.
    len: usize,
    last_changed: Option<OffsetDateTime>,
    slots: [Option<Peer>; K],
}

impl Bucket {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            len: 0,
            last_changed: None,
            slots: Default::default(),
        }
    }

    /// Returns the bucket's index, the shared prefix length its peers have with the local
    /// identifier.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the number of peers in the bucket.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == K
    }

    /// Returns the last time a peer was added, moved or replaced.
    pub fn last_changed(&self) -> Option<OffsetDateTime> {
        self.last_changed
    }

    /// Returns `true` if a peer with this identifier occupies a slot.
    pub fn contains(&self, id: &Id) -> bool {
        self.peers().any(|peer| peer.id() == id)
    }

    pub fn get(&self, id: &Id) -> Option<&Peer> {
        self.peers().find(|peer| peer.id() == id)
    }

    pub fn get_mut(&mut self, id: &Id) -> Option<&mut Peer> {
        self.peers_mut().find(|peer| peer.id() == id)
    }

    /// Iterates over the occupied slots in slot order.
    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.slots.iter().flatten()
    }

    pub(crate) fn peers_mut(&mut self) -> impl Iterator<Item = &mut Peer> {
        self.slots.iter_mut().flatten()
    }

    /// Places the peer in the first empty slot.
    pub fn add_at(&mut self, peer: Peer, now: OffsetDateTime) -> Result<(), BucketFull> {
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                debug_assert!(self.len < K);
                *slot = Some(peer);
                self.len += 1;
                self.last_changed = Some(now);

                Ok(())
            }
            None => {
                debug_assert_eq!(self.len, K);
                Err(BucketFull(peer))
            }
        }
    }

    /// Replaces the first [`Status::Bad`] peer, returning the evicted peer or handing the
    /// candidate back if there was none.
    pub fn replace_bad_at(&mut self, peer: Peer, now: OffsetDateTime) -> Result<Peer, Peer> {
        let slot = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Some(p) if p.status_at(now) == Status::Bad));

        match slot {
            Some(i) => Ok(self.swap(i, peer, now)),
            None => Err(peer),
        }
    }

    /// Replaces the least recently active [`Status::Questionable`] peer, returning the evicted
    /// peer or handing the candidate back if there was none.
    // TODO: ping the candidate before evicting it, it may only have been quiet.
    pub fn replace_questionable_at(
        &mut self,
        peer: Peer,
        now: OffsetDateTime,
    ) -> Result<Peer, Peer> {
        let mut oldest: Option<(usize, Option<OffsetDateTime>)> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            let Some(p) = slot else { continue };
            if p.status_at(now) != Status::Questionable {
                continue;
            }

            // Strictly older, so ties keep the first slot.
            let activity = p.last_activity();
            if oldest.map_or(true, |(_, oldest)| activity < oldest) {
                oldest = Some((i, activity));
            }
        }

        match oldest {
            Some((i, _)) => Ok(self.swap(i, peer, now)),
            None => Err(peer),
        }
    }

    /// Removes the peer with this identifier.
    pub fn remove(&mut self, id: &Id) -> Option<Peer> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(p) if p.id() == id))?;

        self.len -= 1;
        slot.take()
    }

    /// Moves every peer matching the predicate into `dst`, stopping early once `dst` is full.
    /// Returns the number of peers moved.
    pub(crate) fn migrate_into<F>(
        &mut self,
        dst: &mut Bucket,
        now: OffsetDateTime,
        mut f: F,
    ) -> usize
    where
        F: FnMut(&Peer) -> bool,
    {
        let mut moved = 0;
        for slot in self.slots.iter_mut() {
            if dst.is_full() {
                break;
            }

            if !slot.as_ref().map_or(false, &mut f) {
                continue;
            }

            if let Some(peer) = slot.take() {
                self.len -= 1;
                let _res = dst.add_at(peer, now);
                debug_assert!(_res.is_ok());
                moved += 1;
            }
        }

        if moved > 0 {
            self.last_changed = Some(now);
        }

        moved
    }

    fn swap(&mut self, i: usize, peer: Peer, now: OffsetDateTime) -> Peer {
        trace!(bucket = self.index, id = %peer.id(), "replacing peer");

        self.last_changed = Some(now);
        self.slots[i]
            .replace(peer)
            .expect("only occupied slots are selected for replacement")
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn peer(i: u8) -> Peer {
        let mut bytes = [0u8; Id::BYTES];
        bytes[Id::BYTES - 1] = i;
        Peer::new(Id::new(bytes), format!("127.0.0.1:{}", 6881 + i as u16).parse().unwrap())
    }

    fn full_bucket(now: OffsetDateTime) -> Bucket {
        let mut bucket = Bucket::new(0);
        for i in 1..=K as u8 {
            let mut p = peer(i);
            p.mark_reply_at(now);
            assert!(bucket.add_at(p, now).is_ok());
        }

        bucket
    }

    #[test]
    fn add() {
        let now = OffsetDateTime::now_utc();
        let mut bucket = Bucket::new(3);
        assert_eq!(bucket.index(), 3);
        assert!(bucket.is_empty());
        assert_eq!(bucket.last_changed(), None);

        for i in 1..=K as u8 {
            assert!(!bucket.is_full());
            assert!(bucket.add_at(peer(i), now).is_ok());
            assert!(bucket.contains(peer(i).id()));
        }

        assert!(bucket.is_full());
        assert_eq!(bucket.len(), K);
        assert_eq!(bucket.last_changed(), Some(now));

        let rejected = peer(100);
        assert_eq!(
            bucket.add_at(rejected.clone(), now),
            Err(BucketFull(rejected.clone()))
        );
        assert_eq!(
            BucketFull(rejected.clone()).to_string(),
            format!("bucket is full, can't add {}", rejected.id())
        );
        assert!(!bucket.contains(peer(100).id()));
    }

    #[test]
    fn sparse_slots() {
        let now = OffsetDateTime::now_utc();
        let mut bucket = full_bucket(now);

        assert!(bucket.remove(peer(3).id()).is_some());
        assert!(bucket.remove(peer(3).id()).is_none());
        assert_eq!(bucket.len(), K - 1);
        assert!(!bucket.is_full());

        // The hole is refilled.
        assert!(bucket.add_at(peer(42), now).is_ok());
        assert!(bucket.is_full());
        assert_eq!(bucket.peers().nth(2).unwrap().id(), peer(42).id());
    }

    #[test]
    fn replace_bad() {
        let now = OffsetDateTime::now_utc();
        let mut bucket = full_bucket(now);

        // Everyone is good.
        let candidate = peer(100);
        assert_eq!(bucket.replace_bad_at(candidate.clone(), now), Err(candidate));

        // Two unanswered queries long after the last reply make a peer bad.
        let later = now + Duration::hours(1);
        for i in [5, 6] {
            let p = bucket.get_mut(peer(i).id()).unwrap();
            p.mark_query_at(now);
            p.mark_query_at(now);
        }

        let evicted = bucket.replace_bad_at(peer(100), later).unwrap();
        assert_eq!(evicted.id(), peer(5).id());
        assert!(bucket.contains(peer(100).id()));
        assert_eq!(bucket.len(), K);
        assert_eq!(bucket.last_changed(), Some(later));
    }

    #[test]
    fn replace_questionable_picks_least_active() {
        let now = OffsetDateTime::now_utc();
        let mut bucket = Bucket::new(0);

        for i in 1..=K as u8 {
            let mut p = peer(i);
            p.mark_reply_at(now - Duration::hours(i as i64));
            p.mark_query_at(now - Duration::hours(1));
            assert!(bucket.add_at(p, now).is_ok());
        }

        // Peer 8 replied 8 hours ago, the longest idle.
        let evicted = bucket.replace_questionable_at(peer(100), now).unwrap();
        assert_eq!(evicted.id(), peer(8).id());

        // Peer 7 is next.
        let evicted = bucket.replace_questionable_at(peer(101), now).unwrap();
        assert_eq!(evicted.id(), peer(7).id());
    }

    #[test]
    fn replace_questionable_ignores_good_and_unknown() {
        let now = OffsetDateTime::now_utc();
        let mut bucket = full_bucket(now);

        let candidate = peer(100);
        assert_eq!(
            bucket.replace_questionable_at(candidate.clone(), now),
            Err(candidate)
        );

        let mut bucket = Bucket::new(0);
        for i in 1..=K as u8 {
            assert!(bucket.add_at(peer(i), now).is_ok());
        }
        let candidate = peer(100);
        assert_eq!(
            bucket.replace_questionable_at(candidate.clone(), now),
            Err(candidate)
        );
    }

    #[test]
    fn migrate() {
        let now = OffsetDateTime::now_utc();
        let mut src = full_bucket(now);
        let mut dst = Bucket::new(1);

        let moved = src.migrate_into(&mut dst, now, |p| p.id().as_bytes()[Id::BYTES - 1] % 2 == 0);
        assert_eq!(moved, K / 2);
        assert_eq!(src.len(), K / 2);
        assert_eq!(dst.len(), K / 2);
        assert!(dst.peers().all(|p| p.id().as_bytes()[Id::BYTES - 1] % 2 == 0));
        assert!(src.peers().all(|p| p.id().as_bytes()[Id::BYTES - 1] % 2 == 1));
    }

    #[test]
    fn migrate_stops_when_full() {
        let now = OffsetDateTime::now_utc();
        let mut src = full_bucket(now);
        let mut dst = Bucket::new(1);
        for i in 101..=(100 + K as u8 - 2) {
            assert!(dst.add_at(peer(i), now).is_ok());
        }

        assert_eq!(src.migrate_into(&mut dst, now, |_| true), 2);
        assert!(dst.is_full());
        assert_eq!(src.len(), K - 2);
    }
}
