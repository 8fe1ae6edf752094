use super::Table;
use super::peer_values::PeerValueTable;
use crate::storage::codec;
use crate::storage::key::ValueBoxKey;
use crate::storage::value_box::{ValueBox, ValueBoxTable};
use crate::types::{ChatListHole, ChatListInclusion, ChatListIndex, MessageId, MessageIndex, PeerId};
use serde::{Deserialize, Serialize};

/// Chat-list bookkeeping of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeerChatListState {
    pub inclusion: ChatListInclusion,
    pub pinning_index: Option<u16>,
    /// Position the peer currently occupies in the ordered chat list.
    pub current: Option<ChatListIndex>,
}

pub struct ChatListIndexTable {
    states: PeerValueTable<PeerChatListState>,
}

impl ChatListIndexTable {
    pub fn new(table: ValueBoxTable) -> Self {
        Self {
            states: PeerValueTable::new(table),
        }
    }

    pub fn get(&mut self, store: &dyn ValueBox, peer_id: PeerId) -> PeerChatListState {
        self.states.get(store, peer_id).unwrap_or_default()
    }

    pub fn set(&mut self, peer_id: PeerId, state: PeerChatListState) {
        if state == PeerChatListState::default() {
            self.states.remove(peer_id);
        } else {
            self.states.set(peer_id, state);
        }
    }

    pub fn peer_ids(&self, store: &dyn ValueBox) -> Vec<PeerId> {
        self.states.peer_ids(store)
    }

    /// Pinned peers, first pin first.
    pub fn pinned_peer_ids(&mut self, store: &dyn ValueBox) -> Vec<PeerId> {
        let mut pinned: Vec<(u16, PeerId)> = Vec::new();
        for peer_id in self.peer_ids(store) {
            if let Some(index) = self.get(store, peer_id).pinning_index {
                pinned.push((index, peer_id));
            }
        }
        pinned.sort();
        pinned.into_iter().map(|(_, peer_id)| peer_id).collect()
    }
}

impl Table for ChatListIndexTable {
    fn before_commit(&mut self, store: &mut dyn ValueBox) {
        self.states.before_commit(store);
    }

    fn clear_memory_cache(&mut self) {
        self.states.clear_memory_cache();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatListEntry {
    Peer(ChatListIndex),
    Hole(ChatListHole),
}

impl ChatListEntry {
    pub fn index(&self) -> ChatListIndex {
        match self {
            ChatListEntry::Peer(index) => *index,
            ChatListEntry::Hole(hole) => hole.chat_list_index(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum StoredKind {
    Peer,
    Hole,
}

/// The ordered chat list. Keys sort exactly like `ChatListIndex`.
pub struct ChatListTable {
    table: ValueBoxTable,
}

impl ChatListTable {
    pub fn new(table: ValueBoxTable) -> Self {
        Self { table }
    }

    fn key(index: &ChatListIndex) -> ValueBoxKey {
        let message = index.message_index;
        let key = match index.pinning_index {
            Some(pin) => ValueBoxKey::new().u8(1).u16(u16::MAX - pin),
            None => ValueBoxKey::new().u8(0).u16(0),
        };
        key.i32(message.timestamp)
            .i32(message.id.namespace)
            .i32(message.id.id)
            .i64(message.id.peer_id.to_i64())
    }

    fn decode_key(key: &ValueBoxKey) -> ChatListIndex {
        let mut reader = key.reader();
        let pinned = reader.u8() == 1;
        let pin = u16::MAX - reader.u16();
        let timestamp = reader.i32();
        let namespace = reader.i32();
        let id = reader.i32();
        let peer_id = PeerId::from_i64(reader.i64());
        ChatListIndex::new(
            pinned.then_some(pin),
            MessageIndex::new(MessageId::new(peer_id, namespace, id), timestamp),
        )
    }

    fn entry(key: &ValueBoxKey, kind: StoredKind) -> ChatListEntry {
        let index = Self::decode_key(key);
        match kind {
            StoredKind::Peer => ChatListEntry::Peer(index),
            StoredKind::Hole => ChatListEntry::Hole(ChatListHole::new(index.message_index)),
        }
    }

    pub fn set_peer(&mut self, store: &mut dyn ValueBox, index: &ChatListIndex) {
        codec::put(store, self.table, &Self::key(index), &StoredKind::Peer);
    }

    pub fn set_hole(&mut self, store: &mut dyn ValueBox, hole: &ChatListHole) {
        codec::put(store, self.table, &Self::key(&hole.chat_list_index()), &StoredKind::Hole);
    }

    pub fn get(&self, store: &dyn ValueBox, index: &ChatListIndex) -> Option<ChatListEntry> {
        let key = Self::key(index);
        codec::get::<StoredKind>(store, self.table, &key).map(|kind| Self::entry(&key, kind))
    }

    pub fn remove(&mut self, store: &mut dyn ValueBox, index: &ChatListIndex) {
        store.remove(self.table, &Self::key(index));
    }

    fn lower_bound() -> ValueBoxKey {
        ValueBoxKey::new()
    }

    fn upper_bound() -> ValueBoxKey {
        ValueBoxKey::new().u8(2)
    }

    /// Entries strictly below `before` (or from the top), highest first.
    pub fn earlier(
        &self,
        store: &dyn ValueBox,
        before: Option<ChatListIndex>,
        limit: usize,
    ) -> Vec<ChatListEntry> {
        let from = before.map_or_else(Self::upper_bound, |index| Self::key(&index));
        codec::range::<StoredKind>(store, self.table, &from, &Self::lower_bound(), limit)
            .into_iter()
            .map(|(key, kind)| Self::entry(&key, kind))
            .collect()
    }

    /// Entries strictly above `after` (or from the bottom), lowest first.
    pub fn later(
        &self,
        store: &dyn ValueBox,
        after: Option<ChatListIndex>,
        limit: usize,
    ) -> Vec<ChatListEntry> {
        let from = after.map_or_else(Self::lower_bound, |index| Self::key(&index));
        codec::range::<StoredKind>(store, self.table, &from, &Self::upper_bound(), limit)
            .into_iter()
            .map(|(key, kind)| Self::entry(&key, kind))
            .collect()
    }

    pub fn holes(&self, store: &dyn ValueBox) -> Vec<ChatListHole> {
        self.later(store, None, usize::MAX)
            .into_iter()
            .filter_map(|entry| match entry {
                ChatListEntry::Hole(hole) => Some(hole),
                ChatListEntry::Peer(_) => None,
            })
            .collect()
    }
}

impl Table for ChatListTable {
    fn before_commit(&mut self, _store: &mut dyn ValueBox) {}

    fn clear_memory_cache(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::value_box::MemoryValueBox;

    fn index(pin: Option<u16>, peer: i32, timestamp: i32) -> ChatListIndex {
        let id = MessageId::new(PeerId::new(0, peer), 0, 1);
        ChatListIndex::new(pin, MessageIndex::new(id, timestamp))
    }

    #[test]
    fn key_order_matches_index_order() {
        let mut store = MemoryValueBox::new();
        let mut table = ChatListTable::new(ValueBoxTable(9));
        store.begin().expect("begin");
        let mut indices = vec![
            index(None, 1, 10),
            index(None, 2, 30),
            index(Some(1), 3, 5),
            index(Some(0), 4, 1),
        ];
        for i in &indices {
            table.set_peer(&mut store, i);
        }
        let hole = ChatListHole::new(MessageIndex::new(
            MessageId::new(PeerId::new(0, 0), 0, 1),
            20,
        ));
        table.set_hole(&mut store, &hole);
        indices.push(hole.chat_list_index());
        indices.sort();
        indices.reverse();

        let scanned: Vec<ChatListIndex> = table
            .earlier(&store, None, 10)
            .iter()
            .map(ChatListEntry::index)
            .collect();
        assert_eq!(scanned, indices);
        assert_eq!(table.holes(&store), vec![hole]);
    }

    #[test]
    fn default_state_is_not_stored() {
        let mut store = MemoryValueBox::new();
        let mut table = ChatListIndexTable::new(ValueBoxTable(8));
        let peer = PeerId::new(0, 7);
        store.begin().expect("begin");
        table.set(
            peer,
            PeerChatListState {
                pinning_index: Some(0),
                ..Default::default()
            },
        );
        assert_eq!(table.pinned_peer_ids(&store), vec![peer]);
        table.set(peer, PeerChatListState::default());
        table.before_commit(&mut store);
        assert!(table.peer_ids(&store).is_empty());
    }
}
