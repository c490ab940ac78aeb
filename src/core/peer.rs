//! Peer records and liveness classification.

use std::net::SocketAddr;

use time::{Duration, OffsetDateTime};

use crate::core::{compact::NodeInfo, id::Id};

/// How long a reply (or a query we sent) keeps a peer in the [`Status::Good`] state.
pub const RESPITE: Duration = Duration::minutes(15);

/// The number of unanswered queries after which a peer is considered [`Status::Bad`].
pub const MAX_PENDING: u8 = 2;

/// The liveness state of a peer, always derived from its timestamps and the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The peer has never replied but hasn't failed enough queries to be written off.
    Unknown,
    /// The peer replied, or was queried, within the [`RESPITE`].
    Good,
    /// The peer replied at some point but has been quiet for longer than the [`RESPITE`].
    Questionable,
    /// The peer has [`MAX_PENDING`] or more unanswered queries.
    Bad,
}

/// A remote node known to the routing table.
///
/// A peer is owned by exactly one bucket slot at a time, copies handed to other tables are deep
/// clones and evolve independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    id: Id,
    addr: SocketAddr,
    last_reply: Option<OffsetDateTime>,
    last_query: Option<OffsetDateTime>,
    pending: u8,
}

impl Peer {
    /// Creates a peer that has never been contacted.
    pub fn new(id: Id, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_reply: None,
            last_query: None,
            pending: 0,
        }
    }

    /// Returns the peer's identifier.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Returns the peer's network address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Updates the peer's network address.
    pub fn set_addr(&mut self, addr: SocketAddr) {
        self.addr = addr;
    }

    /// Returns the time of the last reply received from the peer, if any.
    pub fn last_reply(&self) -> Option<OffsetDateTime> {
        self.last_reply
    }

    /// Returns the time of the last query sent to the peer, if any.
    pub fn last_query(&self) -> Option<OffsetDateTime> {
        self.last_query
    }

    /// Returns the number of queries sent since the last reply.
    pub fn pending(&self) -> u8 {
        self.pending
    }

    /// The least recent of the last reply and the last query, `None` sorts first and so counts as
    /// least recently active.
    pub fn last_activity(&self) -> Option<OffsetDateTime> {
        self.last_reply.min(self.last_query)
    }

    /// Records a reply received at `now`, clearing the pending query count.
    pub fn mark_reply_at(&mut self, now: OffsetDateTime) {
        self.last_reply = Some(now);
        self.pending = 0;
    }

    /// Records a reply received now.
    pub fn mark_reply(&mut self) {
        self.mark_reply_at(OffsetDateTime::now_utc())
    }

    /// Records a query sent at `now`, incrementing the pending query count.
    pub fn mark_query_at(&mut self, now: OffsetDateTime) {
        self.last_query = Some(now);
        self.pending = self.pending.saturating_add(1);
    }

    /// Records a query sent now.
    pub fn mark_query(&mut self) {
        self.mark_query_at(OffsetDateTime::now_utc())
    }

    /// Classifies the peer's liveness relative to `now`.
    pub fn status_at(&self, now: OffsetDateTime) -> Status {
        let within_respite = |t: Option<OffsetDateTime>| t.map_or(false, |t| now - t < RESPITE);

        match self.last_reply {
            Some(_) if within_respite(self.last_reply) || within_respite(self.last_query) => {
                Status::Good
            }
            Some(_) if self.pending < MAX_PENDING => Status::Questionable,
            None if self.pending < MAX_PENDING => Status::Unknown,
            _ => Status::Bad,
        }
    }

    /// Classifies the peer's liveness relative to the current time.
    pub fn status(&self) -> Status {
        self.status_at(OffsetDateTime::now_utc())
    }

    /// Returns the compact node info for this peer, `None` for IPv6 addresses.
    pub fn node_info(&self) -> Option<NodeInfo> {
        match self.addr {
            SocketAddr::V4(addr) => Some(NodeInfo { id: self.id, addr }),
            SocketAddr::V6(_) => None,
        }
    }
}

impl From<NodeInfo> for Peer {
    fn from(node: NodeInfo) -> Self {
        Peer::new(node.id, SocketAddr::V4(node.addr))
    }
}
