use super::ids::{MessageIndex, PeerId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Position of a conversation in the chat list. Greater sorts nearer the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatListIndex {
    pub pinning_index: Option<u16>,
    pub message_index: MessageIndex,
}

impl ChatListIndex {
    pub fn new(pinning_index: Option<u16>, message_index: MessageIndex) -> Self {
        Self {
            pinning_index,
            message_index,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.message_index.id.peer_id
    }

    pub fn absolute_lower_bound() -> Self {
        Self {
            pinning_index: None,
            message_index: MessageIndex::lower_bound(PeerId::new(i32::MIN, i32::MIN)),
        }
    }

    pub fn absolute_upper_bound() -> Self {
        Self {
            pinning_index: Some(0),
            message_index: MessageIndex::upper_bound(PeerId::new(i32::MAX, i32::MAX)),
        }
    }
}

impl Ord for ChatListIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.pinning_index, other.pinning_index) {
            (Some(lhs), Some(rhs)) => rhs
                .cmp(&lhs)
                .then_with(|| self.message_index.cmp(&other.message_index)),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => self.message_index.cmp(&other.message_index),
        }
    }
}

impl PartialOrd for ChatListIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Everything below `index` in the chat list is not known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatListHole {
    pub index: MessageIndex,
}

impl ChatListHole {
    pub fn new(index: MessageIndex) -> Self {
        Self { index }
    }

    pub fn chat_list_index(&self) -> ChatListIndex {
        ChatListIndex::new(None, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChatListInclusion {
    /// Included once the peer has messages, unless its namespace is excluded.
    #[default]
    NotSpecified,
    Never,
    IfHasMessages,
    /// Included even without messages, positioned at `min_timestamp`.
    Always { min_timestamp: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ids::MessageId;

    fn index(peer: i32, id: i32, timestamp: i32) -> MessageIndex {
        MessageIndex::new(MessageId::new(PeerId::new(0, peer), 0, id), timestamp)
    }

    #[test]
    fn pinned_entries_order_above_recent_ones() {
        let recent = ChatListIndex::new(None, index(1, 10, 1_000));
        let old_pinned = ChatListIndex::new(Some(1), index(2, 1, 5));
        let first_pinned = ChatListIndex::new(Some(0), index(3, 1, 1));
        assert!(recent < old_pinned);
        assert!(old_pinned < first_pinned);
        assert!(first_pinned < ChatListIndex::absolute_upper_bound());
        assert!(ChatListIndex::absolute_lower_bound() < recent);
    }
}
