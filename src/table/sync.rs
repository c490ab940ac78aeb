use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    core::{compact::NodeInfo, id::Id, peer::Peer},
    table::{InsertResult, RoutingTable},
};

#[cfg_attr(doc_cfg, doc(cfg(feature = "sync")))]
#[derive(Debug, Default, Clone)]
/// A routing table handle that can be shared between tasks.
///
/// It wraps [`RoutingTable`] behind a lock, every method holds the lock for the duration of a
/// single table operation. Peers are handed out as copies since they can't outlive the lock.
pub struct SyncRoutingTable {
    routing_table: Arc<RwLock<RoutingTable>>,
}

impl SyncRoutingTable {
    pub fn new(local_id: Id) -> Self {
        Self::from(RoutingTable::new(local_id))
    }

    pub fn local_id(&self) -> Id {
        self.routing_table.read().local_id()
    }

    pub fn len(&self) -> usize {
        self.routing_table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routing_table.read().is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.routing_table.read().bucket_count()
    }

    pub fn insert(&self, peer: Peer) -> InsertResult {
        self.routing_table.write().insert(peer)
    }

    pub fn find_peer(&self, id: &Id) -> Option<Peer> {
        self.routing_table.read().find_peer(id).cloned()
    }

    pub fn mark_reply(&self, id: &Id) -> bool {
        self.routing_table.write().mark_reply(id)
    }

    pub fn mark_query(&self, id: &Id) -> bool {
        self.routing_table.write().mark_query(id)
    }

    /// Returns copies of the peers closest to the target, closest first.
    pub fn gather_closest(&self, target: &Id) -> Vec<Peer> {
        self.routing_table
            .read()
            .gather_closest(target)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Creates a private table for a lookup of `target`, see [`RoutingTable::seed_from`].
    pub fn seed_search(&self, target: &Id) -> RoutingTable {
        let rt = self.routing_table.read();
        RoutingTable::seed_from(rt.local_id(), &rt, target)
    }

    pub fn snapshot(&self) -> Vec<NodeInfo> {
        self.routing_table.read().snapshot()
    }

    /// Runs the closure with shared access to the table.
    pub fn read<R>(&self, f: impl FnOnce(&RoutingTable) -> R) -> R {
        f(&self.routing_table.read())
    }

    /// Runs the closure with exclusive access to the table.
    pub fn write<R>(&self, f: impl FnOnce(&mut RoutingTable) -> R) -> R {
        f(&mut self.routing_table.write())
    }
}

impl From<RoutingTable> for SyncRoutingTable {
    fn from(rt: RoutingTable) -> Self {
        Self {
            routing_table: Arc::new(RwLock::new(rt)),
        }
    }
}
