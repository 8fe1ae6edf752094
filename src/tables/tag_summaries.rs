use super::Table;
use crate::storage::codec;
use crate::storage::key::ValueBoxKey;
use crate::storage::value_box::{ValueBox, ValueBoxTable};
use crate::types::{MessageTagSummary, MessageTagSummaryKey};

pub struct TagSummaryTable {
    table: ValueBoxTable,
}

impl TagSummaryTable {
    pub fn new(table: ValueBoxTable) -> Self {
        Self { table }
    }

    fn key(key: &MessageTagSummaryKey) -> ValueBoxKey {
        ValueBoxKey::new()
            .u32(key.tag.0)
            .i64(key.peer_id.to_i64())
            .i32(key.namespace)
    }

    pub fn get(&self, store: &dyn ValueBox, key: &MessageTagSummaryKey) -> Option<MessageTagSummary> {
        codec::get(store, self.table, &Self::key(key))
    }

    pub fn set(
        &mut self,
        store: &mut dyn ValueBox,
        key: &MessageTagSummaryKey,
        summary: &MessageTagSummary,
    ) {
        codec::put(store, self.table, &Self::key(key), summary);
    }
}

impl Table for TagSummaryTable {
    fn before_commit(&mut self, _store: &mut dyn ValueBox) {}

    fn clear_memory_cache(&mut self) {}
}
