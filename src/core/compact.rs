//! Compact node info, the 26-byte representation peers are exchanged in.
//!
//! Each entry is the 20-byte identifier followed by the IPv4 address and the port, both in
//! network byte order.

use std::net::{Ipv4Addr, SocketAddrV4};

#[cfg(feature = "codec")]
use bincode::{Decode, Encode};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::core::id::Id;

/// The encoded size of a single [`NodeInfo`].
pub const COMPACT_NODE_LEN: usize = Id::BYTES + 6;

/// An identifier and the IPv4 address it can be reached at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "codec", derive(Encode, Decode))]
pub struct NodeInfo {
    pub id: Id,
    pub addr: SocketAddrV4,
}

impl NodeInfo {
    /// Writes the compact representation to the buffer.
    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_slice(self.id.as_bytes());
        dst.put_slice(&self.addr.ip().octets());
        dst.put_u16(self.addr.port());
    }

    /// Reads a single entry, the caller must make sure at least [`COMPACT_NODE_LEN`] bytes remain.
    fn decode<B: Buf>(src: &mut B) -> Self {
        debug_assert!(src.remaining() >= COMPACT_NODE_LEN);

        let mut bytes = [0u8; Id::BYTES];
        src.copy_to_slice(&mut bytes);
        let ip = Ipv4Addr::from(src.get_u32());
        let port = src.get_u16();

        Self {
            id: Id::new(bytes),
            addr: SocketAddrV4::new(ip, port),
        }
    }
}

/// The reasons decoding compact node info can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CompactError {
    /// The buffer length isn't a multiple of [`COMPACT_NODE_LEN`].
    #[error(
        "compact node info length {0} isn't a multiple of {node_len}",
        node_len = COMPACT_NODE_LEN
    )]
    InvalidLength(usize),
}

/// Encodes the nodes into a contiguous compact buffer.
pub fn encode_nodes<'a, I>(nodes: I) -> Bytes
where
    I: IntoIterator<Item = &'a NodeInfo>,
{
    let nodes = nodes.into_iter();
    let mut dst = BytesMut::with_capacity(nodes.size_hint().0 * COMPACT_NODE_LEN);
    for node in nodes {
        node.encode(&mut dst);
    }

    dst.freeze()
}

/// Decodes every entry in the buffer.
pub fn decode_nodes<B: Buf>(mut src: B) -> Result<Vec<NodeInfo>, CompactError> {
    let len = src.remaining();
    if len % COMPACT_NODE_LEN != 0 {
        return Err(CompactError::InvalidLength(len));
    }

    let mut nodes = Vec::with_capacity(len / COMPACT_NODE_LEN);
    while src.has_remaining() {
        nodes.push(NodeInfo::decode(&mut src));
    }

    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let node = NodeInfo {
            id: Id::new([0xab; Id::BYTES]),
            addr: "10.0.0.1:6881".parse().unwrap(),
        };

        let bytes = encode_nodes([&node]);
        assert_eq!(bytes.len(), COMPACT_NODE_LEN);
        assert_eq!(&bytes[..Id::BYTES], &[0xab; Id::BYTES]);
        assert_eq!(&bytes[Id::BYTES..Id::BYTES + 4], &[10, 0, 0, 1]);
        // 6881 = 0x1ae1.
        assert_eq!(&bytes[Id::BYTES + 4..], &[0x1a, 0xe1]);

        assert_eq!(decode_nodes(bytes).unwrap(), vec![node]);
    }

    #[test]
    fn many() {
        let nodes: Vec<_> = (1..=8u16)
            .map(|i| NodeInfo {
                id: Id::rand(),
                addr: SocketAddrV4::new(Ipv4Addr::LOCALHOST, i),
            })
            .collect();

        let bytes = encode_nodes(&nodes);
        assert_eq!(bytes.len(), nodes.len() * COMPACT_NODE_LEN);
        assert_eq!(decode_nodes(bytes).unwrap(), nodes);
    }

    #[test]
    fn empty() {
        assert!(decode_nodes(Bytes::new()).unwrap().is_empty());
        assert!(encode_nodes(&[]).is_empty());
    }

    #[test]
    fn invalid_length() {
        let bytes = Bytes::from(vec![0u8; COMPACT_NODE_LEN + 1]);
        assert_eq!(
            decode_nodes(bytes),
            Err(CompactError::InvalidLength(COMPACT_NODE_LEN + 1))
        );
        assert_eq!(
            CompactError::InvalidLength(27).to_string(),
            "compact node info length 27 isn't a multiple of 26"
        );
    }

    #[cfg(feature = "codec")]
    #[test]
    fn bincode_node_info() {
        let node = NodeInfo {
            id: Id::rand(),
            addr: "192.168.1.2:51413".parse().unwrap(),
        };

        let bytes = bincode::encode_to_vec(node, bincode::config::standard()).unwrap();
        let (decoded, _length): (NodeInfo, usize) =
            bincode::decode_from_slice(&bytes, bincode::config::standard()).unwrap();

        assert_eq!(decoded, node);
    }
}
