use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

pub type PeerNamespace = i32;
pub type MessageNamespace = i32;

const SIGN_BIT: u32 = 0x8000_0000;

/// Stable identifier of a conversation counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId {
    pub namespace: PeerNamespace,
    pub id: i32,
}

impl PeerId {
    pub fn new(namespace: PeerNamespace, id: i32) -> Self {
        Self { namespace, id }
    }

    /// Packs namespace and id into one integer whose order matches `Ord`.
    pub fn to_i64(self) -> i64 {
        ((self.namespace as i64) << 32) | ((self.id as u32 ^ SIGN_BIT) as i64)
    }

    pub fn from_i64(value: i64) -> Self {
        Self {
            namespace: (value >> 32) as i32,
            id: (value as u32 ^ SIGN_BIT) as i32,
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId {
    pub peer_id: PeerId,
    pub namespace: MessageNamespace,
    pub id: i32,
}

impl MessageId {
    pub fn new(peer_id: PeerId, namespace: MessageNamespace, id: i32) -> Self {
        Self {
            peer_id,
            namespace,
            id,
        }
    }
}

/// Sort key of every ordered message operation.
///
/// Ordering is `(timestamp, namespace, id)`; the peer id only participates last so
/// that indices from different peers still order totally inside merged views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageIndex {
    pub id: MessageId,
    pub timestamp: i32,
}

impl MessageIndex {
    pub fn new(id: MessageId, timestamp: i32) -> Self {
        Self { id, timestamp }
    }

    /// Smallest index of a peer, used as an open lower bound for scans.
    pub fn lower_bound(peer_id: PeerId) -> Self {
        Self {
            id: MessageId::new(peer_id, i32::MIN, i32::MIN),
            timestamp: i32::MIN,
        }
    }

    pub fn upper_bound(peer_id: PeerId) -> Self {
        Self {
            id: MessageId::new(peer_id, i32::MAX, i32::MAX),
            timestamp: i32::MAX,
        }
    }

    pub fn with_peer(self, peer_id: PeerId) -> Self {
        Self {
            id: MessageId::new(peer_id, self.id.namespace, self.id.id),
            timestamp: self.timestamp,
        }
    }
}

impl Ord for MessageIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.id.namespace.cmp(&other.id.namespace))
            .then(self.id.id.cmp(&other.id.id))
            .then(self.id.peer_id.cmp(&other.id.peer_id))
    }
}

impl PartialOrd for MessageIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bitset classification of messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct MessageTags(pub u32);

impl MessageTags {
    pub const NONE: MessageTags = MessageTags(0);
    pub const ALL: MessageTags = MessageTags(u32::MAX);

    pub fn bit(index: u32) -> Self {
        MessageTags(1 << index)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: MessageTags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: MessageTags) -> bool {
        self.0 & other.0 != 0
    }

    /// Single-bit tags contained in this mask, lowest first.
    pub fn bits(self) -> impl Iterator<Item = MessageTags> {
        (0..32u32)
            .filter(move |i| self.0 & (1 << i) != 0)
            .map(MessageTags::bit)
    }
}

impl BitOr for MessageTags {
    type Output = MessageTags;

    fn bitor(self, rhs: Self) -> Self {
        MessageTags(self.0 | rhs.0)
    }
}

impl BitAnd for MessageTags {
    type Output = MessageTags;

    fn bitand(self, rhs: Self) -> Self {
        MessageTags(self.0 & rhs.0)
    }
}

impl Not for MessageTags {
    type Output = MessageTags;

    fn not(self) -> Self {
        MessageTags(!self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_packing_preserves_order() {
        let peers = [
            PeerId::new(-1, 5),
            PeerId::new(0, -7),
            PeerId::new(0, 3),
            PeerId::new(2, i32::MIN),
            PeerId::new(2, i32::MAX),
        ];
        for pair in peers.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].to_i64() < pair[1].to_i64());
            assert_eq!(PeerId::from_i64(pair[0].to_i64()), pair[0]);
        }
    }

    #[test]
    fn message_index_orders_by_timestamp_then_id() {
        let peer = PeerId::new(0, 1);
        let a = MessageIndex::new(MessageId::new(peer, 0, 50), 10);
        let b = MessageIndex::new(MessageId::new(peer, 0, 10), 11);
        let c = MessageIndex::new(MessageId::new(peer, 0, 11), 11);
        assert!(a < b);
        assert!(b < c);
        assert!(MessageIndex::lower_bound(peer) < a);
        assert!(c < MessageIndex::upper_bound(peer));
    }

    #[test]
    fn tag_mask_operations() {
        let photo = MessageTags::bit(0);
        let file = MessageTags::bit(3);
        let mask = photo | file;
        assert!(mask.contains(photo));
        assert!(mask.intersects(file));
        assert!(!(mask & !photo).intersects(photo));
        assert_eq!(mask.bits().collect::<Vec<_>>(), vec![photo, file]);
    }
}
