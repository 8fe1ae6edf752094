use super::Table;
use crate::storage::codec;
use crate::storage::key::ValueBoxKey;
use crate::storage::value_box::{ValueBox, ValueBoxTable};
use crate::types::{OrderedItemListCollection, OrderedItemListEntry};

/// Small ordered collections (recent stickers, saved searches), one record each.
pub struct OrderedItemListTable {
    table: ValueBoxTable,
}

impl OrderedItemListTable {
    pub fn new(table: ValueBoxTable) -> Self {
        Self { table }
    }

    fn key(collection: OrderedItemListCollection) -> ValueBoxKey {
        ValueBoxKey::new().i32(collection)
    }

    pub fn items(
        &self,
        store: &dyn ValueBox,
        collection: OrderedItemListCollection,
    ) -> Vec<OrderedItemListEntry> {
        codec::get(store, self.table, &Self::key(collection)).unwrap_or_default()
    }

    pub fn replace(
        &mut self,
        store: &mut dyn ValueBox,
        collection: OrderedItemListCollection,
        items: &[OrderedItemListEntry],
    ) {
        let key = Self::key(collection);
        if items.is_empty() {
            store.remove(self.table, &key);
        } else {
            codec::put(store, self.table, &key, &items);
        }
    }

    pub fn add_or_move_to_first(
        &mut self,
        store: &mut dyn ValueBox,
        collection: OrderedItemListCollection,
        item: OrderedItemListEntry,
        max_count: Option<usize>,
    ) {
        let mut items = self.items(store, collection);
        items.retain(|existing| existing.id != item.id);
        items.insert(0, item);
        if let Some(max_count) = max_count {
            items.truncate(max_count);
        }
        self.replace(store, collection, &items);
    }

    /// Returns whether an item was removed.
    pub fn remove(
        &mut self,
        store: &mut dyn ValueBox,
        collection: OrderedItemListCollection,
        id: &[u8],
    ) -> bool {
        let mut items = self.items(store, collection);
        let before = items.len();
        items.retain(|existing| existing.id != id);
        if items.len() == before {
            return false;
        }
        self.replace(store, collection, &items);
        true
    }
}

impl Table for OrderedItemListTable {
    fn before_commit(&mut self, _store: &mut dyn ValueBox) {}

    fn clear_memory_cache(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::value_box::MemoryValueBox;

    #[test]
    fn move_to_first_dedupes_and_caps() {
        let mut store = MemoryValueBox::new();
        let mut table = OrderedItemListTable::new(ValueBoxTable(38));
        store.begin().expect("begin");
        for id in [b"a", b"b", b"c"] {
            table.add_or_move_to_first(&mut store, 1, OrderedItemListEntry::new(*id, *id), Some(2));
        }
        table.add_or_move_to_first(&mut store, 1, OrderedItemListEntry::new(*b"b", *b"x"), Some(2));
        let ids: Vec<Vec<u8>> = table.items(&store, 1).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b"b".to_vec(), b"c".to_vec()]);
        assert!(table.remove(&mut store, 1, b"c"));
        assert!(!table.remove(&mut store, 1, b"c"));
    }
}
