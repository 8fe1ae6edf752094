use super::Table;
use crate::storage::codec;
use crate::storage::key::ValueBoxKey;
use crate::storage::value_box::{ValueBox, ValueBoxTable};
use crate::types::PreferencesEntry;

pub struct PreferencesTable {
    table: ValueBoxTable,
}

impl PreferencesTable {
    pub fn new(table: ValueBoxTable) -> Self {
        Self { table }
    }

    pub fn get(&self, store: &dyn ValueBox, key: &str) -> Option<PreferencesEntry> {
        codec::get(store, self.table, &ValueBoxKey::new().string(key))
    }

    pub fn set(&mut self, store: &mut dyn ValueBox, key: &str, entry: Option<&PreferencesEntry>) {
        let key = ValueBoxKey::new().string(key);
        match entry {
            Some(entry) => codec::put(store, self.table, &key, entry),
            None => store.remove(self.table, &key),
        }
    }
}

impl Table for PreferencesTable {
    fn before_commit(&mut self, _store: &mut dyn ValueBox) {}

    fn clear_memory_cache(&mut self) {}
}
