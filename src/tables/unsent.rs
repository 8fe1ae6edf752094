use super::Table;
use crate::storage::key::ValueBoxKey;
use crate::storage::value_box::{ValueBox, ValueBoxTable};
use crate::types::{MessageId, PeerId};

/// Ids of outgoing messages that have not been confirmed by the server.
pub struct UnsentTable {
    table: ValueBoxTable,
}

impl UnsentTable {
    pub fn new(table: ValueBoxTable) -> Self {
        Self { table }
    }

    fn key(id: MessageId) -> ValueBoxKey {
        ValueBoxKey::new()
            .i64(id.peer_id.to_i64())
            .i32(id.namespace)
            .i32(id.id)
    }

    pub fn add(&mut self, store: &mut dyn ValueBox, id: MessageId) -> bool {
        let key = Self::key(id);
        if store.get(self.table, &key).is_some() {
            return false;
        }
        store.set(self.table, &key, Vec::new());
        true
    }

    pub fn remove(&mut self, store: &mut dyn ValueBox, id: MessageId) -> bool {
        let key = Self::key(id);
        if store.get(self.table, &key).is_none() {
            return false;
        }
        store.remove(self.table, &key);
        true
    }

    pub fn ids(&self, store: &dyn ValueBox) -> Vec<MessageId> {
        let upper = ValueBoxKey::from_bytes(&[0xFF; 17]);
        store
            .range(self.table, &ValueBoxKey::new(), &upper, usize::MAX)
            .into_iter()
            .map(|(key, _)| {
                let mut reader = key.reader();
                let peer_id = PeerId::from_i64(reader.i64());
                let namespace = reader.i32();
                MessageId::new(peer_id, namespace, reader.i32())
            })
            .collect()
    }
}

impl Table for UnsentTable {
    fn before_commit(&mut self, _store: &mut dyn ValueBox) {}

    fn clear_memory_cache(&mut self) {}
}
