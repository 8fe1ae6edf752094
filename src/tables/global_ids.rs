use super::Table;
use crate::storage::codec;
use crate::storage::key::ValueBoxKey;
use crate::storage::value_box::{ValueBox, ValueBoxTable};
use crate::types::MessageId;

/// Maps server-global message ids back to the local message id.
pub struct GlobalMessageIdsTable {
    table: ValueBoxTable,
}

impl GlobalMessageIdsTable {
    pub fn new(table: ValueBoxTable) -> Self {
        Self { table }
    }

    fn key(global_id: i32) -> ValueBoxKey {
        ValueBoxKey::new().i32(global_id)
    }

    pub fn get(&self, store: &dyn ValueBox, global_id: i32) -> Option<MessageId> {
        codec::get(store, self.table, &Self::key(global_id))
    }

    pub fn set(&mut self, store: &mut dyn ValueBox, global_id: i32, id: MessageId) {
        codec::put(store, self.table, &Self::key(global_id), &id);
    }

    pub fn remove(&mut self, store: &mut dyn ValueBox, global_id: i32, id: MessageId) {
        if self.get(store, global_id) == Some(id) {
            store.remove(self.table, &Self::key(global_id));
        }
    }
}

impl Table for GlobalMessageIdsTable {
    fn before_commit(&mut self, _store: &mut dyn ValueBox) {}

    fn clear_memory_cache(&mut self) {}
}
