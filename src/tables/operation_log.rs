//! Per-peer, per-tag queues of pending operations plus a per-tag merged order.
//!
//! Local indices come from a per-(peer, tag) counter and merged indices from a
//! per-tag counter. Neither counter ever decreases and merged indices are never
//! renumbered, so a merged index identifies one entry for the life of the store.

use super::Table;
use crate::storage::codec;
use crate::storage::key::ValueBoxKey;
use crate::storage::value_box::{ValueBox, ValueBoxTable};
use crate::types::{
    ContentsUpdate, MergedIndexUpdate, MergedOperationLogOperation, OperationLogEntry,
    OperationLogEntryUpdate, OperationLogTag, PeerId, TagLocalIndex, TagMergedIndex,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const LOCAL_COUNTER: u8 = 0;
const MERGED_COUNTER: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    merged_index: Option<i32>,
    contents: Vec<u8>,
}

pub struct OperationLogTable {
    entries: ValueBoxTable,
    metadata: ValueBoxTable,
    merged: ValueBoxTable,
}

impl OperationLogTable {
    pub fn new(entries: ValueBoxTable, metadata: ValueBoxTable, merged: ValueBoxTable) -> Self {
        Self {
            entries,
            metadata,
            merged,
        }
    }

    fn entry_prefix(peer_id: PeerId, tag: OperationLogTag) -> ValueBoxKey {
        ValueBoxKey::new().i64(peer_id.to_i64()).u8(tag.0)
    }

    fn entry_key(peer_id: PeerId, tag: OperationLogTag, local_index: i32) -> ValueBoxKey {
        Self::entry_prefix(peer_id, tag).i32(local_index)
    }

    fn merged_prefix(tag: OperationLogTag) -> ValueBoxKey {
        ValueBoxKey::new().u8(tag.0)
    }

    fn merged_key(tag: OperationLogTag, merged_index: i32) -> ValueBoxKey {
        Self::merged_prefix(tag).i32(merged_index)
    }

    fn local_counter_key(peer_id: PeerId, tag: OperationLogTag) -> ValueBoxKey {
        ValueBoxKey::new()
            .u8(LOCAL_COUNTER)
            .i64(peer_id.to_i64())
            .u8(tag.0)
    }

    fn merged_counter_key(tag: OperationLogTag) -> ValueBoxKey {
        ValueBoxKey::new().u8(MERGED_COUNTER).u8(tag.0)
    }

    pub fn next_local_index(&self, store: &dyn ValueBox, peer_id: PeerId, tag: OperationLogTag) -> i32 {
        codec::get(store, self.metadata, &Self::local_counter_key(peer_id, tag)).unwrap_or(1)
    }

    /// Index the next merged entry of `tag` will receive.
    pub fn merged_tail_index(&self, store: &dyn ValueBox, tag: OperationLogTag) -> i32 {
        codec::get(store, self.metadata, &Self::merged_counter_key(tag)).unwrap_or(1)
    }

    fn take_merged_index(&mut self, store: &mut dyn ValueBox, tag: OperationLogTag) -> i32 {
        let index = self.merged_tail_index(store, tag);
        codec::put(store, self.metadata, &Self::merged_counter_key(tag), &(index + 1));
        index
    }

    fn assign_merged_index(
        &mut self,
        store: &mut dyn ValueBox,
        peer_id: PeerId,
        tag: OperationLogTag,
        local_index: i32,
    ) -> i32 {
        let merged_index = self.take_merged_index(store, tag);
        codec::put(
            store,
            self.merged,
            &Self::merged_key(tag, merged_index),
            &(peer_id.to_i64(), local_index),
        );
        merged_index
    }

    fn stored(
        &self,
        store: &dyn ValueBox,
        peer_id: PeerId,
        tag: OperationLogTag,
        local_index: i32,
    ) -> Option<StoredEntry> {
        codec::get(store, self.entries, &Self::entry_key(peer_id, tag, local_index))
    }

    pub fn get_entry(
        &self,
        store: &dyn ValueBox,
        peer_id: PeerId,
        tag: OperationLogTag,
        local_index: i32,
    ) -> Option<OperationLogEntry> {
        let stored = self.stored(store, peer_id, tag, local_index)?;
        Some(OperationLogEntry {
            peer_id,
            tag,
            tag_local_index: local_index,
            merged_index: stored.merged_index,
            contents: stored.contents,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_entry(
        &mut self,
        store: &mut dyn ValueBox,
        peer_id: PeerId,
        tag: OperationLogTag,
        local_index: TagLocalIndex,
        merged_index: TagMergedIndex,
        contents: Vec<u8>,
        ops: &mut Vec<MergedOperationLogOperation>,
    ) -> OperationLogEntry {
        let next = self.next_local_index(store, peer_id, tag);
        let local_index = match local_index {
            TagLocalIndex::Automatic => next,
            TagLocalIndex::Manual(index) => index,
        };
        let counter = next.max(local_index.saturating_add(1));
        codec::put(store, self.metadata, &Self::local_counter_key(peer_id, tag), &counter);

        if let Some(replaced) = self.stored(store, peer_id, tag, local_index)
            && let Some(old_merged) = replaced.merged_index
        {
            store.remove(self.merged, &Self::merged_key(tag, old_merged));
            Self::push_removal(ops, tag, old_merged);
        }

        let merged_index = match merged_index {
            TagMergedIndex::Automatic => {
                Some(self.assign_merged_index(store, peer_id, tag, local_index))
            }
            TagMergedIndex::None => None,
        };
        let stored = StoredEntry {
            merged_index,
            contents,
        };
        codec::put(store, self.entries, &Self::entry_key(peer_id, tag, local_index), &stored);
        let entry = OperationLogEntry {
            peer_id,
            tag,
            tag_local_index: local_index,
            merged_index,
            contents: stored.contents,
        };
        if merged_index.is_some() {
            ops.push(MergedOperationLogOperation::Append(entry.clone()));
        }
        entry
    }

    fn push_removal(ops: &mut Vec<MergedOperationLogOperation>, tag: OperationLogTag, merged_index: i32) {
        if let Some(MergedOperationLogOperation::Remove {
            tag: last_tag,
            merged_indices,
        }) = ops.last_mut()
            && *last_tag == tag
        {
            merged_indices.insert(merged_index);
            return;
        }
        ops.push(MergedOperationLogOperation::Remove {
            tag,
            merged_indices: BTreeSet::from([merged_index]),
        });
    }

    pub fn remove_entry(
        &mut self,
        store: &mut dyn ValueBox,
        peer_id: PeerId,
        tag: OperationLogTag,
        local_index: i32,
        ops: &mut Vec<MergedOperationLogOperation>,
    ) -> bool {
        let Some(stored) = self.stored(store, peer_id, tag, local_index) else {
            return false;
        };
        store.remove(self.entries, &Self::entry_key(peer_id, tag, local_index));
        if let Some(merged_index) = stored.merged_index {
            store.remove(self.merged, &Self::merged_key(tag, merged_index));
            Self::push_removal(ops, tag, merged_index);
        }
        true
    }

    fn local_indices(
        &self,
        store: &dyn ValueBox,
        peer_id: PeerId,
        tag: OperationLogTag,
    ) -> Vec<i32> {
        let prefix = Self::entry_prefix(peer_id, tag);
        store
            .range(self.entries, &prefix, &prefix.successor(), usize::MAX)
            .into_iter()
            .map(|(key, _)| {
                let mut reader = key.reader();
                reader.i64();
                reader.u8();
                reader.i32()
            })
            .collect()
    }

    pub fn remove_all_entries(
        &mut self,
        store: &mut dyn ValueBox,
        peer_id: PeerId,
        tag: OperationLogTag,
        ops: &mut Vec<MergedOperationLogOperation>,
    ) {
        for local_index in self.local_indices(store, peer_id, tag) {
            self.remove_entry(store, peer_id, tag, local_index, ops);
        }
    }

    /// Removes entries with a local index up to and including `up_to`.
    pub fn remove_entries_up_to(
        &mut self,
        store: &mut dyn ValueBox,
        peer_id: PeerId,
        tag: OperationLogTag,
        up_to: i32,
        ops: &mut Vec<MergedOperationLogOperation>,
    ) {
        for local_index in self.local_indices(store, peer_id, tag) {
            if local_index > up_to {
                break;
            }
            self.remove_entry(store, peer_id, tag, local_index, ops);
        }
    }

    pub fn update_entry<F>(
        &mut self,
        store: &mut dyn ValueBox,
        peer_id: PeerId,
        tag: OperationLogTag,
        local_index: i32,
        f: F,
        ops: &mut Vec<MergedOperationLogOperation>,
    ) where
        F: FnOnce(Option<&OperationLogEntry>) -> OperationLogEntryUpdate,
    {
        let current = self.get_entry(store, peer_id, tag, local_index);
        let update = f(current.as_ref());
        let Some(mut entry) = current else {
            return;
        };
        let mut contents_changed = false;
        if let ContentsUpdate::Update(contents) = update.contents {
            contents_changed = contents != entry.contents;
            entry.contents = contents;
        }
        let mut appended = false;
        match update.merged_index {
            MergedIndexUpdate::Remain => {}
            MergedIndexUpdate::Remove => {
                if let Some(merged_index) = entry.merged_index.take() {
                    store.remove(self.merged, &Self::merged_key(tag, merged_index));
                    Self::push_removal(ops, tag, merged_index);
                }
            }
            MergedIndexUpdate::NewAutomatic => {
                if let Some(merged_index) = entry.merged_index.take() {
                    store.remove(self.merged, &Self::merged_key(tag, merged_index));
                    Self::push_removal(ops, tag, merged_index);
                }
                entry.merged_index =
                    Some(self.assign_merged_index(store, peer_id, tag, local_index));
                appended = true;
            }
        }
        let stored = StoredEntry {
            merged_index: entry.merged_index,
            contents: entry.contents.clone(),
        };
        codec::put(store, self.entries, &Self::entry_key(peer_id, tag, local_index), &stored);
        if appended {
            ops.push(MergedOperationLogOperation::Append(entry));
        } else if contents_changed && entry.merged_index.is_some() {
            ops.push(MergedOperationLogOperation::UpdateContents(entry));
        }
    }

    /// Visits entries of one (peer, tag) in local-index order until `f` returns false.
    pub fn enumerate_entries<F>(
        &self,
        store: &dyn ValueBox,
        peer_id: PeerId,
        tag: OperationLogTag,
        mut f: F,
    ) where
        F: FnMut(&OperationLogEntry) -> bool,
    {
        for local_index in self.local_indices(store, peer_id, tag) {
            if let Some(entry) = self.get_entry(store, peer_id, tag, local_index)
                && !f(&entry)
            {
                return;
            }
        }
    }

    /// Merged entries of `tag` with a merged index at or above `from`.
    pub fn merged_entries(
        &self,
        store: &dyn ValueBox,
        tag: OperationLogTag,
        from: i32,
        limit: usize,
    ) -> Vec<OperationLogEntry> {
        let prefix = Self::merged_prefix(tag);
        let lower = if from == i32::MIN {
            prefix.clone()
        } else {
            Self::merged_key(tag, from - 1)
        };
        codec::range::<(i64, i32)>(store, self.merged, &lower, &prefix.successor(), limit)
            .into_iter()
            .filter_map(|(_, (peer, local_index))| {
                self.get_entry(store, PeerId::from_i64(peer), tag, local_index)
            })
            .collect()
    }
}

impl Table for OperationLogTable {
    fn before_commit(&mut self, _store: &mut dyn ValueBox) {}

    fn clear_memory_cache(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::value_box::MemoryValueBox;

    const TAG: OperationLogTag = OperationLogTag(3);

    fn setup() -> (MemoryValueBox, OperationLogTable) {
        let mut store = MemoryValueBox::new();
        store.begin().expect("begin");
        let table = OperationLogTable::new(ValueBoxTable(31), ValueBoxTable(29), ValueBoxTable(30));
        (store, table)
    }

    #[test]
    fn merged_indices_are_never_reused() {
        let (mut store, mut table) = setup();
        let peer = PeerId::new(0, 1);
        let mut ops = Vec::new();
        for byte in 0..3u8 {
            table.add_entry(
                &mut store,
                peer,
                TAG,
                TagLocalIndex::Automatic,
                TagMergedIndex::Automatic,
                vec![byte],
                &mut ops,
            );
        }
        assert!(table.remove_entry(&mut store, peer, TAG, 3, &mut ops));
        let entry = table.add_entry(
            &mut store,
            peer,
            TAG,
            TagLocalIndex::Automatic,
            TagMergedIndex::Automatic,
            vec![9],
            &mut ops,
        );
        assert_eq!(entry.tag_local_index, 4);
        assert_eq!(entry.merged_index, Some(4));
        let merged: Vec<i32> = table
            .merged_entries(&store, TAG, 1, 10)
            .iter()
            .filter_map(|e| e.merged_index)
            .collect();
        assert_eq!(merged, vec![1, 2, 4]);
        assert_eq!(table.merged_tail_index(&store, TAG), 5);
    }

    #[test]
    fn manual_local_index_advances_counter() {
        let (mut store, mut table) = setup();
        let peer = PeerId::new(0, 2);
        let mut ops = Vec::new();
        table.add_entry(&mut store, peer, TAG, TagLocalIndex::Manual(10), TagMergedIndex::None, vec![], &mut ops);
        assert_eq!(table.next_local_index(&store, peer, TAG), 11);
        table.add_entry(&mut store, peer, TAG, TagLocalIndex::Manual(2), TagMergedIndex::None, vec![], &mut ops);
        assert_eq!(table.next_local_index(&store, peer, TAG), 11);
        assert!(ops.is_empty());
    }

    #[test]
    fn manual_index_over_existing_entry_replaces_its_merged_row() {
        let (mut store, mut table) = setup();
        let peer = PeerId::new(0, 4);
        let mut ops = Vec::new();
        table.add_entry(&mut store, peer, TAG, TagLocalIndex::Manual(5), TagMergedIndex::Automatic, vec![1], &mut ops);
        ops.clear();
        table.add_entry(&mut store, peer, TAG, TagLocalIndex::Manual(5), TagMergedIndex::Automatic, vec![2], &mut ops);

        let merged: Vec<(i32, Option<i32>, Vec<u8>)> = table
            .merged_entries(&store, TAG, i32::MIN, 10)
            .into_iter()
            .map(|e| (e.tag_local_index, e.merged_index, e.contents))
            .collect();
        assert_eq!(merged, vec![(5, Some(2), vec![2])]);
        assert!(matches!(
            &ops[0],
            MergedOperationLogOperation::Remove { merged_indices, .. }
                if *merged_indices == BTreeSet::from([1])
        ));
        assert!(matches!(&ops[1], MergedOperationLogOperation::Append(entry) if entry.merged_index == Some(2)));

        ops.clear();
        table.add_entry(&mut store, peer, TAG, TagLocalIndex::Manual(5), TagMergedIndex::None, vec![3], &mut ops);
        assert!(table.merged_entries(&store, TAG, i32::MIN, 10).is_empty());
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn update_to_new_merged_index_moves_entry_to_tail() {
        let (mut store, mut table) = setup();
        let mut ops = Vec::new();
        let a = PeerId::new(0, 1);
        let b = PeerId::new(0, 2);
        table.add_entry(&mut store, a, TAG, TagLocalIndex::Automatic, TagMergedIndex::Automatic, vec![1], &mut ops);
        table.add_entry(&mut store, b, TAG, TagLocalIndex::Automatic, TagMergedIndex::Automatic, vec![2], &mut ops);
        ops.clear();
        table.update_entry(
            &mut store,
            a,
            TAG,
            1,
            |_| OperationLogEntryUpdate {
                merged_index: MergedIndexUpdate::NewAutomatic,
                contents: ContentsUpdate::Update(vec![7]),
            },
            &mut ops,
        );
        assert_eq!(ops.len(), 2);
        let order: Vec<(PeerId, Vec<u8>)> = table
            .merged_entries(&store, TAG, i32::MIN, 10)
            .into_iter()
            .map(|e| (e.peer_id, e.contents))
            .collect();
        assert_eq!(order, vec![(b, vec![2]), (a, vec![7])]);

        table.remove_entries_up_to(&mut store, a, TAG, 1, &mut ops);
        assert!(table.get_entry(&store, a, TAG, 1).is_none());
        let mut seen = 0;
        table.enumerate_entries(&store, b, TAG, |_| {
            seen += 1;
            true
        });
        assert_eq!(seen, 1);
    }
}
