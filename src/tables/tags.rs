use super::Table;
use crate::storage::codec;
use crate::storage::key::ValueBoxKey;
use crate::storage::value_box::{ValueBox, ValueBoxTable};
use crate::types::{MessageHistoryHole, MessageIndex, MessageTags, PeerId};
use serde::{Deserialize, Serialize};

/// One position in a single-tag partition of a peer's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaggedEntry {
    Message(MessageIndex),
    Hole(MessageHistoryHole),
}

impl TaggedEntry {
    pub fn index(&self) -> MessageIndex {
        match self {
            TaggedEntry::Message(index) => *index,
            TaggedEntry::Hole(hole) => hole.max_index,
        }
    }
}

/// Per-tag history partitions. Holes are mirrored for every tracked tag bit they
/// leave unknown so tagged views can render them in order.
pub struct TagsTable {
    table: ValueBoxTable,
}

fn bit_index(tag: MessageTags) -> u8 {
    tag.0.trailing_zeros() as u8
}

impl TagsTable {
    pub fn new(table: ValueBoxTable) -> Self {
        Self { table }
    }

    fn prefix(peer_id: PeerId, tag: MessageTags) -> ValueBoxKey {
        ValueBoxKey::new().i64(peer_id.to_i64()).u8(bit_index(tag))
    }

    fn key(tag: MessageTags, index: MessageIndex) -> ValueBoxKey {
        Self::prefix(index.id.peer_id, tag)
            .i32(index.timestamp)
            .i32(index.id.namespace)
            .i32(index.id.id)
    }

    pub fn add_message(&mut self, store: &mut dyn ValueBox, index: MessageIndex, tags: MessageTags) {
        for tag in tags.bits() {
            codec::put(store, self.table, &Self::key(tag, index), &TaggedEntry::Message(index));
        }
    }

    pub fn remove_message(
        &mut self,
        store: &mut dyn ValueBox,
        index: MessageIndex,
        tags: MessageTags,
    ) {
        for tag in tags.bits() {
            store.remove(self.table, &Self::key(tag, index));
        }
    }

    pub fn add_hole(
        &mut self,
        store: &mut dyn ValueBox,
        hole: &MessageHistoryHole,
        tracked: MessageTags,
    ) {
        for tag in (hole.tags & tracked).bits() {
            codec::put(store, self.table, &Self::key(tag, hole.max_index), &TaggedEntry::Hole(*hole));
        }
    }

    pub fn remove_hole(
        &mut self,
        store: &mut dyn ValueBox,
        hole: &MessageHistoryHole,
        tracked: MessageTags,
    ) {
        for tag in (hole.tags & tracked).bits() {
            store.remove(self.table, &Self::key(tag, hole.max_index));
        }
    }

    pub fn earlier(
        &self,
        store: &dyn ValueBox,
        peer_id: PeerId,
        tag: MessageTags,
        before: Option<MessageIndex>,
        limit: usize,
    ) -> Vec<TaggedEntry> {
        let prefix = Self::prefix(peer_id, tag);
        let from = match before {
            Some(index) => Self::key(tag, index.with_peer(peer_id)),
            None => prefix.successor(),
        };
        codec::range(store, self.table, &from, &prefix, limit)
            .into_iter()
            .map(|(_, entry)| entry)
            .collect()
    }

    pub fn later(
        &self,
        store: &dyn ValueBox,
        peer_id: PeerId,
        tag: MessageTags,
        after: Option<MessageIndex>,
        limit: usize,
    ) -> Vec<TaggedEntry> {
        let prefix = Self::prefix(peer_id, tag);
        let from = match after {
            Some(index) => Self::key(tag, index.with_peer(peer_id)),
            None => prefix.clone(),
        };
        codec::range(store, self.table, &from, &prefix.successor(), limit)
            .into_iter()
            .map(|(_, entry)| entry)
            .collect()
    }
}

impl Table for TagsTable {
    fn before_commit(&mut self, _store: &mut dyn ValueBox) {}

    fn clear_memory_cache(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::value_box::MemoryValueBox;
    use crate::types::MessageId;

    #[test]
    fn holes_are_mirrored_only_for_tracked_bits() {
        let mut store = MemoryValueBox::new();
        let mut table = TagsTable::new(ValueBoxTable(12));
        let peer = PeerId::new(0, 1);
        let photos = MessageTags::bit(0);
        let files = MessageTags::bit(3);
        store.begin().expect("begin");

        let index = MessageIndex::new(MessageId::new(peer, 0, 5), 50);
        table.add_message(&mut store, index, photos);
        let hole = MessageHistoryHole {
            stable_id: 1,
            max_index: MessageIndex::new(MessageId::new(peer, 0, 20), 200),
            min_id: 6,
            tags: MessageTags::ALL,
        };
        table.add_hole(&mut store, &hole, photos);

        let entries = table.earlier(&store, peer, photos, None, 10);
        assert_eq!(entries, vec![TaggedEntry::Hole(hole), TaggedEntry::Message(index)]);
        assert!(table.earlier(&store, peer, files, None, 10).is_empty());

        table.remove_hole(&mut store, &hole, photos);
        assert_eq!(table.later(&store, peer, photos, None, 10), vec![TaggedEntry::Message(index)]);
    }
}
