use super::MutableView;
use crate::coordinator::context::StoreContext;
use crate::delta::TransactionDelta;
use crate::types::{MergedOperationLogOperation, OperationLogEntry, OperationLogTag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedOperationLogSnapshot {
    /// Lowest merged index first, at most `limit` entries.
    pub entries: Vec<OperationLogEntry>,
    /// Merged index the next appended entry will receive.
    pub tail_index: i32,
}

/// Head of the merged log of one tag.
pub(crate) struct MergedOperationLogView {
    tag: OperationLogTag,
    limit: usize,
    snapshot: MergedOperationLogSnapshot,
}

impl MergedOperationLogView {
    pub fn new(ctx: &mut StoreContext, tag: OperationLogTag, limit: usize) -> Self {
        Self {
            tag,
            limit,
            snapshot: Self::load(ctx, tag, limit),
        }
    }

    fn load(ctx: &mut StoreContext, tag: OperationLogTag, limit: usize) -> MergedOperationLogSnapshot {
        let store = ctx.store.as_ref();
        MergedOperationLogSnapshot {
            entries: ctx
                .tables
                .operation_log
                .merged_entries(store, tag, i32::MIN, limit),
            tail_index: ctx.tables.operation_log.merged_tail_index(store, tag),
        }
    }
}

impl MutableView for MergedOperationLogView {
    type Snapshot = MergedOperationLogSnapshot;

    fn replay(&mut self, ctx: &mut StoreContext, delta: &TransactionDelta) -> bool {
        let mut changed = false;
        let mut refill = false;
        for operation in &delta.merged_operation_log_operations {
            if operation.tag() != self.tag {
                continue;
            }
            match operation {
                MergedOperationLogOperation::Append(entry) => {
                    if self.snapshot.entries.len() < self.limit {
                        self.snapshot.entries.push(entry.clone());
                    }
                    if let Some(merged_index) = entry.merged_index {
                        self.snapshot.tail_index = self.snapshot.tail_index.max(merged_index + 1);
                    }
                    changed = true;
                }
                MergedOperationLogOperation::UpdateContents(entry) => {
                    if let Some(existing) = self
                        .snapshot
                        .entries
                        .iter_mut()
                        .find(|existing| existing.merged_index == entry.merged_index)
                    {
                        *existing = entry.clone();
                        changed = true;
                    }
                }
                MergedOperationLogOperation::Remove { merged_indices, .. } => {
                    let before = self.snapshot.entries.len();
                    self.snapshot.entries.retain(|entry| {
                        entry
                            .merged_index
                            .is_none_or(|index| !merged_indices.contains(&index))
                    });
                    if self.snapshot.entries.len() != before {
                        changed = true;
                        refill = true;
                    }
                }
            }
        }
        if refill {
            self.snapshot = Self::load(ctx, self.tag, self.limit);
        }
        changed
    }

    fn reload(&mut self, ctx: &mut StoreContext) {
        self.snapshot = Self::load(ctx, self.tag, self.limit);
    }

    fn snapshot(&self) -> MergedOperationLogSnapshot {
        self.snapshot.clone()
    }
}
