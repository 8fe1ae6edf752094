use super::Table;
use crate::storage::codec;
use crate::storage::key::ValueBoxKey;
use crate::storage::value_box::{ValueBox, ValueBoxTable};
use crate::types::PeerId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};

/// One value per peer, cached and written back in `before_commit`.
pub struct PeerValueTable<T> {
    table: ValueBoxTable,
    cache: HashMap<PeerId, Option<T>>,
    dirty: HashSet<PeerId>,
}

impl<T> PeerValueTable<T>
where
    T: Serialize + DeserializeOwned + Clone + Send,
{
    pub fn new(table: ValueBoxTable) -> Self {
        Self {
            table,
            cache: HashMap::new(),
            dirty: HashSet::new(),
        }
    }

    fn key(peer_id: PeerId) -> ValueBoxKey {
        ValueBoxKey::new().i64(peer_id.to_i64())
    }

    pub fn get(&mut self, store: &dyn ValueBox, peer_id: PeerId) -> Option<T> {
        if let Some(cached) = self.cache.get(&peer_id) {
            return cached.clone();
        }
        let value: Option<T> = codec::get(store, self.table, &Self::key(peer_id));
        self.cache.insert(peer_id, value.clone());
        value
    }

    pub fn set(&mut self, peer_id: PeerId, value: T) {
        self.cache.insert(peer_id, Some(value));
        self.dirty.insert(peer_id);
    }

    pub fn remove(&mut self, peer_id: PeerId) {
        self.cache.insert(peer_id, None);
        self.dirty.insert(peer_id);
    }

    /// Every stored peer id, including values not yet written back.
    pub fn peer_ids(&self, store: &dyn ValueBox) -> Vec<PeerId> {
        let lower = ValueBoxKey::new();
        let upper = ValueBoxKey::from_bytes(&[0xFF; 9]);
        let mut ids: HashSet<PeerId> = store
            .range(self.table, &lower, &upper, usize::MAX)
            .into_iter()
            .map(|(key, _)| PeerId::from_i64(key.reader().i64()))
            .collect();
        for (peer_id, value) in &self.cache {
            if value.is_some() {
                ids.insert(*peer_id);
            } else {
                ids.remove(peer_id);
            }
        }
        let mut ids: Vec<PeerId> = ids.into_iter().collect();
        ids.sort();
        ids
    }
}

impl<T> Table for PeerValueTable<T>
where
    T: Serialize + DeserializeOwned + Clone + Send,
{
    fn before_commit(&mut self, store: &mut dyn ValueBox) {
        for peer_id in self.dirty.drain() {
            let key = Self::key(peer_id);
            match self.cache.get(&peer_id) {
                Some(Some(value)) => codec::put(store, self.table, &key, value),
                _ => store.remove(self.table, &key),
            }
        }
    }

    fn clear_memory_cache(&mut self) {
        debug_assert!(self.dirty.is_empty(), "cache cleared with unflushed writes");
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::value_box::MemoryValueBox;

    #[test]
    fn writes_are_buffered_until_before_commit() {
        let mut store = MemoryValueBox::new();
        let mut table: PeerValueTable<String> = PeerValueTable::new(ValueBoxTable(50));
        let peer = PeerId::new(1, 2);
        store.begin().expect("begin");
        table.set(peer, "alice".into());
        assert_eq!(table.get(&store, peer).as_deref(), Some("alice"));
        assert!(store.get(ValueBoxTable(50), &ValueBoxKey::new().i64(peer.to_i64())).is_none());
        table.before_commit(&mut store);
        store.commit().expect("commit");

        table.clear_memory_cache();
        assert_eq!(table.get(&store, peer).as_deref(), Some("alice"));
        assert_eq!(table.peer_ids(&store), vec![peer]);
    }

    #[test]
    fn removal_is_visible_before_flush() {
        let mut store = MemoryValueBox::new();
        let mut table: PeerValueTable<i32> = PeerValueTable::new(ValueBoxTable(50));
        let peer = PeerId::new(0, 9);
        store.begin().expect("begin");
        table.set(peer, 4);
        table.before_commit(&mut store);
        table.remove(peer);
        assert_eq!(table.get(&store, peer), None);
        assert!(table.peer_ids(&store).is_empty());
        table.before_commit(&mut store);
        store.commit().expect("commit");
        table.clear_memory_cache();
        assert_eq!(table.get(&store, peer), None);
    }
}
