use super::MutableView;
use crate::coordinator::context::StoreContext;
use crate::delta::TransactionDelta;
use crate::types::PeerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnreadMessageCountsItem {
    Total,
    Peer(PeerId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadMessageCountsSnapshot {
    /// One count per requested item, in request order.
    pub counts: Vec<(UnreadMessageCountsItem, i32)>,
}

impl UnreadMessageCountsSnapshot {
    pub fn total(&self) -> Option<i32> {
        self.count(UnreadMessageCountsItem::Total)
    }

    pub fn count(&self, item: UnreadMessageCountsItem) -> Option<i32> {
        self.counts
            .iter()
            .find(|(candidate, _)| *candidate == item)
            .map(|(_, count)| *count)
    }
}

pub(crate) struct UnreadMessageCountsView {
    snapshot: UnreadMessageCountsSnapshot,
}

impl UnreadMessageCountsView {
    pub fn new(ctx: &mut StoreContext, items: Vec<UnreadMessageCountsItem>) -> Self {
        let counts = items
            .into_iter()
            .map(|item| (item, Self::load(ctx, item)))
            .collect();
        Self {
            snapshot: UnreadMessageCountsSnapshot { counts },
        }
    }

    fn load(ctx: &mut StoreContext, item: UnreadMessageCountsItem) -> i32 {
        match item {
            UnreadMessageCountsItem::Total => {
                ctx.tables.metadata.total_unread_count(ctx.store.as_ref())
            }
            UnreadMessageCountsItem::Peer(peer_id) => ctx
                .read_state(peer_id)
                .map_or(0, |state| state.count()),
        }
    }
}

impl MutableView for UnreadMessageCountsView {
    type Snapshot = UnreadMessageCountsSnapshot;

    fn replay(&mut self, _ctx: &mut StoreContext, delta: &TransactionDelta) -> bool {
        let mut changed = false;
        for (item, count) in &mut self.snapshot.counts {
            let updated = match item {
                UnreadMessageCountsItem::Total => delta.updated_total_unread_count,
                UnreadMessageCountsItem::Peer(peer_id) => delta
                    .updated_read_states
                    .get(peer_id)
                    .map(|state| state.count()),
            };
            if let Some(updated) = updated
                && updated != *count
            {
                *count = updated;
                changed = true;
            }
        }
        changed
    }

    fn reload(&mut self, ctx: &mut StoreContext) {
        for index in 0..self.snapshot.counts.len() {
            let item = self.snapshot.counts[index].0;
            self.snapshot.counts[index].1 = Self::load(ctx, item);
        }
    }

    fn snapshot(&self) -> UnreadMessageCountsSnapshot {
        self.snapshot.clone()
    }
}
