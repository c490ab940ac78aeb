use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use mldht::{Id, Peer, RoutingTable};
use rand::{rngs::StdRng, SeedableRng};
use time::OffsetDateTime;
use tracing_subscriber::{fmt, EnvFilter};

#[allow(dead_code)]
pub fn enable_tracing() {
    fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

#[allow(dead_code)]
pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A random identifier sharing exactly `prefix` bits with `local_id`.
#[allow(dead_code)]
pub fn id_at(rng: &mut StdRng, local_id: &Id, prefix: usize) -> Id {
    Id::rand_with_prefix_from(rng, &local_id.with_flipped_bit(prefix), prefix + 1)
}

#[allow(dead_code)]
pub fn peer(id: Id, port: u16) -> Peer {
    Peer::new(id, SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)))
}

/// A peer that just replied.
#[allow(dead_code)]
pub fn good_peer(id: Id, port: u16, now: OffsetDateTime) -> Peer {
    let mut peer = peer(id, port);
    peer.mark_reply_at(now);
    peer
}

/// Fills the first `depth` buckets along the path to the local identifier.
#[allow(dead_code)]
pub fn full_path_table(rng: &mut StdRng, local_id: Id, depth: usize) -> RoutingTable {
    let now = OffsetDateTime::now_utc();
    let mut rt = RoutingTable::new(local_id);

    let mut port = 1;
    for prefix in 0..depth {
        for _ in 0..mldht::K {
            rt.insert_at(good_peer(id_at(rng, &local_id, prefix), port, now), now);
            port += 1;
        }
    }

    rt
}

/// The `k` closest identifiers to the target, by sorting everything.
#[allow(dead_code)]
pub fn brute_force_closest(ids: &[Id], target: &Id, k: usize) -> Vec<Id> {
    let mut ids = ids.to_vec();
    ids.sort_by_key(|id| id.distance(target));
    ids.truncate(k);

    ids
}
