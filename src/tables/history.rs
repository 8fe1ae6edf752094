use super::Table;
use crate::storage::codec;
use crate::storage::key::ValueBoxKey;
use crate::storage::value_box::{ValueBox, ValueBoxTable};
use crate::types::{IntermediateMessage, MessageHistoryHole, MessageIndex, PeerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HistoryEntry {
    Message(IntermediateMessage),
    Hole(MessageHistoryHole),
}

impl HistoryEntry {
    pub fn index(&self) -> MessageIndex {
        match self {
            HistoryEntry::Message(message) => message.index(),
            HistoryEntry::Hole(hole) => hole.max_index,
        }
    }
}

/// Messages and holes of every peer in `MessageIndex` order.
pub struct HistoryTable {
    table: ValueBoxTable,
}

impl HistoryTable {
    pub fn new(table: ValueBoxTable) -> Self {
        Self { table }
    }

    fn prefix(peer_id: PeerId) -> ValueBoxKey {
        ValueBoxKey::new().i64(peer_id.to_i64())
    }

    fn key(index: MessageIndex) -> ValueBoxKey {
        Self::prefix(index.id.peer_id)
            .i32(index.timestamp)
            .i32(index.id.namespace)
            .i32(index.id.id)
    }

    pub fn set_message(&mut self, store: &mut dyn ValueBox, message: &IntermediateMessage) {
        let entry = HistoryEntry::Message(message.clone());
        codec::put(store, self.table, &Self::key(message.index()), &entry);
    }

    pub fn set_hole(&mut self, store: &mut dyn ValueBox, hole: &MessageHistoryHole) {
        codec::put(store, self.table, &Self::key(hole.max_index), &HistoryEntry::Hole(*hole));
    }

    pub fn remove(&mut self, store: &mut dyn ValueBox, index: MessageIndex) {
        store.remove(self.table, &Self::key(index));
    }

    pub fn get(&self, store: &dyn ValueBox, index: MessageIndex) -> Option<HistoryEntry> {
        codec::get(store, self.table, &Self::key(index))
    }

    pub fn get_message(
        &self,
        store: &dyn ValueBox,
        index: MessageIndex,
    ) -> Option<IntermediateMessage> {
        match self.get(store, index)? {
            HistoryEntry::Message(message) => Some(message),
            HistoryEntry::Hole(_) => None,
        }
    }

    /// Entries strictly below `before` (or from the top), newest first.
    pub fn earlier(
        &self,
        store: &dyn ValueBox,
        peer_id: PeerId,
        before: Option<MessageIndex>,
        limit: usize,
    ) -> Vec<HistoryEntry> {
        let from = match before {
            Some(index) => Self::key(index.with_peer(peer_id)),
            None => Self::prefix(peer_id).successor(),
        };
        codec::range(store, self.table, &from, &Self::prefix(peer_id), limit)
            .into_iter()
            .map(|(_, entry)| entry)
            .collect()
    }

    /// Entries strictly above `after` (or from the bottom), oldest first.
    pub fn later(
        &self,
        store: &dyn ValueBox,
        peer_id: PeerId,
        after: Option<MessageIndex>,
        limit: usize,
    ) -> Vec<HistoryEntry> {
        let from = match after {
            Some(index) => Self::key(index.with_peer(peer_id)),
            None => Self::prefix(peer_id),
        };
        codec::range(store, self.table, &from, &Self::prefix(peer_id).successor(), limit)
            .into_iter()
            .map(|(_, entry)| entry)
            .collect()
    }

    /// Newest stored message of the peer across all namespaces.
    pub fn top_message(&self, store: &dyn ValueBox, peer_id: PeerId) -> Option<IntermediateMessage> {
        let mut before = None;
        loop {
            let page = self.earlier(store, peer_id, before, 16);
            let last = page.last().map(HistoryEntry::index)?;
            for entry in page.iter() {
                if let HistoryEntry::Message(message) = entry {
                    return Some(message.clone());
                }
            }
            if page.len() < 16 {
                return None;
            }
            before = Some(last);
        }
    }
}

impl Table for HistoryTable {
    fn before_commit(&mut self, _store: &mut dyn ValueBox) {}

    fn clear_memory_cache(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::value_box::MemoryValueBox;
    use crate::types::{MessageFlags, MessageId, MessageTags};

    fn message(peer: PeerId, id: i32, timestamp: i32) -> IntermediateMessage {
        IntermediateMessage {
            stable_id: id as u32,
            id: MessageId::new(peer, 0, id),
            globally_unique_id: None,
            timestamp,
            flags: MessageFlags::default(),
            tags: MessageTags::NONE,
            author_id: None,
            text: String::new(),
            attributes: Vec::new(),
        }
    }

    #[test]
    fn scans_are_ordered_by_timestamp_and_scoped_to_peer() {
        let mut store = MemoryValueBox::new();
        let mut table = HistoryTable::new(ValueBoxTable(7));
        let peer = PeerId::new(0, 1);
        let other = PeerId::new(0, 2);
        store.begin().expect("begin");
        table.set_message(&mut store, &message(peer, 1, 300));
        table.set_message(&mut store, &message(peer, 2, 100));
        table.set_message(&mut store, &message(peer, 3, 200));
        table.set_message(&mut store, &message(other, 9, 250));

        let newest: Vec<i32> = table
            .earlier(&store, peer, None, 10)
            .iter()
            .map(|e| e.index().id.id)
            .collect();
        assert_eq!(newest, vec![1, 3, 2]);

        let anchor = message(peer, 3, 200).index();
        let later: Vec<i32> = table
            .later(&store, peer, Some(anchor), 10)
            .iter()
            .map(|e| e.index().id.id)
            .collect();
        assert_eq!(later, vec![1]);
        assert_eq!(table.top_message(&store, peer).map(|m| m.id.id), Some(1));
    }
}
