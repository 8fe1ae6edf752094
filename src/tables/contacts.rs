use super::Table;
use crate::storage::key::ValueBoxKey;
use crate::storage::value_box::{ValueBox, ValueBoxTable};
use crate::types::PeerId;
use std::collections::BTreeSet;

pub struct ContactsTable {
    table: ValueBoxTable,
    cache: Option<BTreeSet<PeerId>>,
}

impl ContactsTable {
    pub fn new(table: ValueBoxTable) -> Self {
        Self { table, cache: None }
    }

    fn key(peer_id: PeerId) -> ValueBoxKey {
        ValueBoxKey::new().i64(peer_id.to_i64())
    }

    pub fn get(&mut self, store: &dyn ValueBox) -> BTreeSet<PeerId> {
        if let Some(ids) = &self.cache {
            return ids.clone();
        }
        let upper = ValueBoxKey::from_bytes(&[0xFF; 9]);
        let ids: BTreeSet<PeerId> = store
            .range(self.table, &ValueBoxKey::new(), &upper, usize::MAX)
            .into_iter()
            .map(|(key, _)| PeerId::from_i64(key.reader().i64()))
            .collect();
        self.cache = Some(ids.clone());
        ids
    }

    pub fn contains(&mut self, store: &dyn ValueBox, peer_id: PeerId) -> bool {
        self.get(store).contains(&peer_id)
    }

    /// Returns whether the stored set changed.
    pub fn replace(&mut self, store: &mut dyn ValueBox, ids: BTreeSet<PeerId>) -> bool {
        let current = self.get(store);
        if current == ids {
            return false;
        }
        for removed in current.difference(&ids) {
            store.remove(self.table, &Self::key(*removed));
        }
        for added in ids.difference(&current) {
            store.set(self.table, &Self::key(*added), Vec::new());
        }
        self.cache = Some(ids);
        true
    }
}

impl Table for ContactsTable {
    fn before_commit(&mut self, _store: &mut dyn ValueBox) {}

    fn clear_memory_cache(&mut self) {
        self.cache = None;
    }
}
