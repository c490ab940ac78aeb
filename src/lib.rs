//! A Kademlia routing table modelled on the BitTorrent [mainline DHT](https://www.bittorrent.org/beps/bep_0005.html).
//!
//! The crate covers the in-memory side of a DHT node: 160-bit identifiers and their XOR
//! distance, peer liveness, fixed-capacity buckets, a routing table whose buckets split along the
//! path to the local identifier, and the selection of the peers closest to a target. Transport,
//! message encoding and lookup scheduling are left to the caller.
//!
//! ## Liveness
//!
//! A peer's [`Status`] is never stored, it is derived from its reply and query timestamps every
//! time a decision depends on it:
//!
//! 1. a peer that replied or was queried within the last 15 minutes is good,
//! 2. a peer that replied at some point but has gone quiet is questionable,
//! 3. a peer with two or more unanswered queries is bad.
//!
//! Full buckets evict bad peers first, then the least recently active questionable one.
//!
//! ## Features
//!
//! - `codec`: `bincode` encoding for [`Id`] and [`NodeInfo`].
//! - `sync`: [`SyncRoutingTable`], a lock-wrapped handle to share a table between tasks.

#![cfg_attr(doc_cfg, feature(doc_cfg))]

mod closest;
mod core;
mod table;

pub use crate::{
    closest::ClosestSet,
    core::{
        bucket::{Bucket, BucketFull, K},
        compact::{self, CompactError, NodeInfo, COMPACT_NODE_LEN},
        id::{Distance, Id, ParseIdError},
        peer::{Peer, Status, MAX_PENDING, RESPITE},
    },
    table::{InsertResult, RoutingTable, MAX_BUCKETS},
};

#[cfg(feature = "sync")]
#[cfg_attr(doc_cfg, doc(cfg(feature = "sync")))]
pub use crate::table::SyncRoutingTable;
