use super::Table;
use crate::storage::key::ValueBoxKey;
use crate::storage::value_box::{ValueBox, ValueBoxTable};

/// Small secrets read through the blocking escape hatch. Not cached.
pub struct KeychainTable {
    table: ValueBoxTable,
}

impl KeychainTable {
    pub fn new(table: ValueBoxTable) -> Self {
        Self { table }
    }

    pub fn get(&self, store: &dyn ValueBox, key: &str) -> Option<Vec<u8>> {
        store.get(self.table, &ValueBoxKey::new().string(key))
    }

    pub fn set(&mut self, store: &mut dyn ValueBox, key: &str, value: Vec<u8>) {
        store.set(self.table, &ValueBoxKey::new().string(key), value);
    }

    pub fn remove(&mut self, store: &mut dyn ValueBox, key: &str) {
        store.remove(self.table, &ValueBoxKey::new().string(key));
    }
}

impl Table for KeychainTable {
    fn before_commit(&mut self, _store: &mut dyn ValueBox) {}

    fn clear_memory_cache(&mut self) {}
}
