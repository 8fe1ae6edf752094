use super::MutableView;
use crate::coordinator::context::StoreContext;
use crate::delta::TransactionDelta;
use crate::types::{OrderedItemListCollection, OrderedItemListEntry, OrderedItemListOperation};

pub(crate) struct OrderedItemListView {
    collection: OrderedItemListCollection,
    items: Vec<OrderedItemListEntry>,
}

impl OrderedItemListView {
    pub fn new(ctx: &mut StoreContext, collection: OrderedItemListCollection) -> Self {
        Self {
            collection,
            items: ctx
                .tables
                .ordered_item_lists
                .items(ctx.store.as_ref(), collection),
        }
    }
}

impl MutableView for OrderedItemListView {
    type Snapshot = Vec<OrderedItemListEntry>;

    fn replay(&mut self, _ctx: &mut StoreContext, delta: &TransactionDelta) -> bool {
        let Some(operations) = delta.ordered_item_list_operations.get(&self.collection) else {
            return false;
        };
        for operation in operations {
            match operation {
                OrderedItemListOperation::Replace(items) => self.items = items.clone(),
                OrderedItemListOperation::AddOrMoveToFirstPosition { item, max_count } => {
                    self.items.retain(|existing| existing.id != item.id);
                    self.items.insert(0, item.clone());
                    if let Some(max_count) = max_count {
                        self.items.truncate(*max_count);
                    }
                }
                OrderedItemListOperation::Remove(id) => {
                    self.items.retain(|existing| existing.id != *id);
                }
            }
        }
        true
    }

    fn reload(&mut self, ctx: &mut StoreContext) {
        self.items = ctx
            .tables
            .ordered_item_lists
            .items(ctx.store.as_ref(), self.collection);
    }

    fn snapshot(&self) -> Vec<OrderedItemListEntry> {
        self.items.clone()
    }
}
