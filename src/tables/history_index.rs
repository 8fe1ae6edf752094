//! Id-space index of one peer's history: which ids hold messages and which ranges
//! are holes. Every structural change is reported as an [`IndexOperation`] so the
//! caller can mirror it into the ordered history, the tag index and the
//! transaction delta.

use super::Table;
use crate::storage::codec;
use crate::storage::key::ValueBoxKey;
use crate::storage::value_box::{ValueBox, ValueBoxTable};
use crate::types::hole::{HolePiece, split_filled_hole};
use crate::types::{
    AddMessagesLocation, HoleFill, IdRange, IntermediateMessage, MessageHistoryHole, MessageId,
    MessageIndex, MessageNamespace, MessageTags, PeerId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const SCAN_PAGE: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum IndexEntry {
    Message { timestamp: i32 },
    Hole(MessageHistoryHole),
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexOperation {
    InsertMessage(IntermediateMessage),
    InsertHole(MessageHistoryHole),
    RemoveMessage(MessageIndex),
    RemoveHole(MessageHistoryHole),
}

pub struct HistoryIndexTable {
    table: ValueBoxTable,
    metadata_table: ValueBoxTable,
    next_stable_id: Option<u32>,
    stable_id_dirty: bool,
}

impl HistoryIndexTable {
    pub fn new(table: ValueBoxTable, metadata_table: ValueBoxTable) -> Self {
        Self {
            table,
            metadata_table,
            next_stable_id: None,
            stable_id_dirty: false,
        }
    }

    fn prefix(peer_id: PeerId, namespace: MessageNamespace) -> ValueBoxKey {
        ValueBoxKey::new().i64(peer_id.to_i64()).i32(namespace)
    }

    fn key(peer_id: PeerId, namespace: MessageNamespace, id: i32) -> ValueBoxKey {
        Self::prefix(peer_id, namespace).i32(id)
    }

    fn stable_id_key() -> ValueBoxKey {
        ValueBoxKey::new().u8(1)
    }

    /// Stable ids are shared by messages and holes and never reused.
    pub fn allocate_stable_id(&mut self, store: &dyn ValueBox) -> u32 {
        let next = match self.next_stable_id {
            Some(next) => next,
            None => codec::get(store, self.metadata_table, &Self::stable_id_key()).unwrap_or(1),
        };
        self.next_stable_id = Some(next.wrapping_add(1));
        self.stable_id_dirty = true;
        next
    }

    fn scan(
        &self,
        store: &dyn ValueBox,
        peer_id: PeerId,
        namespace: MessageNamespace,
        range: IdRange,
        limit: usize,
        ascending: bool,
    ) -> Vec<(i32, IndexEntry)> {
        if range.is_empty() {
            return Vec::new();
        }
        let prefix = Self::prefix(peer_id, namespace);
        let lower = if range.min == i32::MIN {
            prefix.clone()
        } else {
            Self::key(peer_id, namespace, range.min - 1)
        };
        let upper = if range.max == i32::MAX {
            prefix.successor()
        } else {
            Self::key(peer_id, namespace, range.max + 1)
        };
        let (from, to) = if ascending {
            (lower, upper)
        } else {
            (upper, lower)
        };
        codec::range::<IndexEntry>(store, self.table, &from, &to, limit)
            .into_iter()
            .map(|(key, entry)| {
                let mut reader = key.reader();
                reader.i64();
                reader.i32();
                (reader.i32(), entry)
            })
            .collect()
    }

    fn entry(&self, store: &dyn ValueBox, id: MessageId) -> Option<IndexEntry> {
        codec::get(store, self.table, &Self::key(id.peer_id, id.namespace, id.id))
    }

    /// Index of a stored message, if the id holds one.
    pub fn message_index(&self, store: &dyn ValueBox, id: MessageId) -> Option<MessageIndex> {
        match self.entry(store, id)? {
            IndexEntry::Message { timestamp } => Some(MessageIndex::new(id, timestamp)),
            IndexEntry::Hole(_) => None,
        }
    }

    pub fn message_exists(&self, store: &dyn ValueBox, id: MessageId) -> bool {
        self.message_index(store, id).is_some()
    }

    pub fn containing_hole(
        &self,
        store: &dyn ValueBox,
        peer_id: PeerId,
        namespace: MessageNamespace,
        id: i32,
    ) -> Option<MessageHistoryHole> {
        let range = IdRange::new(id, i32::MAX);
        match self.scan(store, peer_id, namespace, range, 1, true).pop() {
            Some((_, IndexEntry::Hole(hole))) if hole.min_id <= id => Some(hole),
            _ => None,
        }
    }

    pub fn holes(
        &self,
        store: &dyn ValueBox,
        peer_id: PeerId,
        namespace: MessageNamespace,
    ) -> Vec<MessageHistoryHole> {
        self.holes_intersecting(store, peer_id, namespace, IdRange::new(i32::MIN, i32::MAX))
    }

    pub fn holes_intersecting(
        &self,
        store: &dyn ValueBox,
        peer_id: PeerId,
        namespace: MessageNamespace,
        range: IdRange,
    ) -> Vec<MessageHistoryHole> {
        let mut holes: Vec<MessageHistoryHole> = self
            .scan(store, peer_id, namespace, range, usize::MAX, true)
            .into_iter()
            .filter_map(|(_, entry)| match entry {
                IndexEntry::Hole(hole) => Some(hole),
                IndexEntry::Message { .. } => None,
            })
            .collect();
        if range.max < i32::MAX {
            let above = IdRange::new(range.max + 1, i32::MAX);
            if let Some((_, IndexEntry::Hole(hole))) =
                self.scan(store, peer_id, namespace, above, 1, true).pop()
                && hole.min_id <= range.max
            {
                holes.push(hole);
            }
        }
        holes
    }

    pub fn message_indices_in(
        &self,
        store: &dyn ValueBox,
        peer_id: PeerId,
        namespace: MessageNamespace,
        range: IdRange,
    ) -> Vec<MessageIndex> {
        self.scan(store, peer_id, namespace, range, usize::MAX, true)
            .into_iter()
            .filter_map(|(id, entry)| match entry {
                IndexEntry::Message { timestamp } => Some(MessageIndex::new(
                    MessageId::new(peer_id, namespace, id),
                    timestamp,
                )),
                IndexEntry::Hole(_) => None,
            })
            .collect()
    }

    pub fn top_message_index(
        &self,
        store: &dyn ValueBox,
        peer_id: PeerId,
        namespace: MessageNamespace,
    ) -> Option<MessageIndex> {
        let mut range = IdRange::new(i32::MIN, i32::MAX);
        loop {
            let page = self.scan(store, peer_id, namespace, range, SCAN_PAGE, false);
            let last_id = page.last().map(|(id, _)| *id)?;
            for (id, entry) in &page {
                if let IndexEntry::Message { timestamp } = entry {
                    return Some(MessageIndex::new(
                        MessageId::new(peer_id, namespace, *id),
                        *timestamp,
                    ));
                }
            }
            if page.len() < SCAN_PAGE || last_id == i32::MIN {
                return None;
            }
            range = IdRange::new(i32::MIN, last_id - 1);
        }
    }

    /// Timestamp of the closest message above `id`, from the store or the batch
    /// being inserted.
    fn next_timestamp_above(
        &self,
        store: &dyn ValueBox,
        peer_id: PeerId,
        namespace: MessageNamespace,
        id: i32,
        batch: &[IntermediateMessage],
    ) -> Option<i32> {
        let from_batch = batch
            .iter()
            .filter(|m| m.id.peer_id == peer_id && m.id.namespace == namespace && m.id.id > id)
            .min_by_key(|m| m.id.id)
            .map(|m| (m.id.id, m.timestamp));
        let mut stored = None;
        if id < i32::MAX {
            let mut range = IdRange::new(id + 1, i32::MAX);
            'pages: loop {
                let page = self.scan(store, peer_id, namespace, range, SCAN_PAGE, true);
                let Some(last_id) = page.last().map(|(id, _)| *id) else {
                    break;
                };
                for (entry_id, entry) in &page {
                    if let IndexEntry::Message { timestamp } = entry {
                        stored = Some((*entry_id, *timestamp));
                        break 'pages;
                    }
                }
                if page.len() < SCAN_PAGE || last_id == i32::MAX {
                    break;
                }
                range = IdRange::new(last_id + 1, i32::MAX);
            }
        }
        match (from_batch, stored) {
            (Some(a), Some(b)) => Some(if a.0 < b.0 { a.1 } else { b.1 }),
            (a, b) => a.or(b).map(|(_, timestamp)| timestamp),
        }
    }

    fn write_hole(
        &mut self,
        store: &mut dyn ValueBox,
        hole: MessageHistoryHole,
        ops: &mut Vec<IndexOperation>,
    ) {
        let key = Self::key(hole.peer_id(), hole.namespace(), hole.max_id());
        codec::put(store, self.table, &key, &IndexEntry::Hole(hole));
        ops.push(IndexOperation::InsertHole(hole));
    }

    fn erase_hole(
        &mut self,
        store: &mut dyn ValueBox,
        hole: MessageHistoryHole,
        ops: &mut Vec<IndexOperation>,
    ) {
        let key = Self::key(hole.peer_id(), hole.namespace(), hole.max_id());
        store.remove(self.table, &key);
        ops.push(IndexOperation::RemoveHole(hole));
    }

    fn materialize(
        &mut self,
        store: &dyn ValueBox,
        original: &MessageHistoryHole,
        piece: HolePiece,
        batch: &[IntermediateMessage],
    ) -> MessageHistoryHole {
        if piece.range.max == original.max_id() {
            return MessageHistoryHole {
                stable_id: original.stable_id,
                max_index: original.max_index,
                min_id: piece.range.min,
                tags: piece.tags,
            };
        }
        let (peer_id, namespace) = (original.peer_id(), original.namespace());
        let timestamp = self
            .next_timestamp_above(store, peer_id, namespace, piece.range.max, batch)
            .map_or(original.max_index.timestamp, |t| {
                t.min(original.max_index.timestamp)
            });
        MessageHistoryHole {
            stable_id: self.allocate_stable_id(store),
            max_index: MessageIndex::new(
                MessageId::new(peer_id, namespace, piece.range.max),
                timestamp,
            ),
            min_id: piece.range.min,
            tags: piece.tags,
        }
    }

    fn replace_hole(
        &mut self,
        store: &mut dyn ValueBox,
        hole: MessageHistoryHole,
        pieces: Vec<HolePiece>,
        batch: &[IntermediateMessage],
        ops: &mut Vec<IndexOperation>,
    ) {
        if let [piece] = pieces.as_slice()
            && piece.range == hole.range()
            && piece.tags == hole.tags
        {
            return;
        }
        self.erase_hole(store, hole, ops);
        for piece in pieces {
            let replacement = self.materialize(store, &hole, piece, batch);
            self.write_hole(store, replacement, ops);
        }
    }

    /// Removes the `filled_tags` partitions of every hole overlapping `covered`.
    fn clear_holes(
        &mut self,
        store: &mut dyn ValueBox,
        peer_id: PeerId,
        namespace: MessageNamespace,
        covered: IdRange,
        filled_tags: MessageTags,
        batch: &[IntermediateMessage],
        ops: &mut Vec<IndexOperation>,
    ) {
        for hole in self.holes_intersecting(store, peer_id, namespace, covered) {
            if !hole.tags.intersects(filled_tags) {
                continue;
            }
            let pieces = split_filled_hole(hole.range(), hole.tags, covered, filled_tags, &[]);
            self.replace_hole(store, hole, pieces, batch, ops);
        }
    }

    /// Inserts one message, splitting a hole that contained its id.
    fn insert_message(
        &mut self,
        store: &mut dyn ValueBox,
        message: &IntermediateMessage,
        ops: &mut Vec<IndexOperation>,
    ) -> bool {
        let id = message.id;
        if self.entry(store, id).is_some_and(|e| matches!(e, IndexEntry::Message { .. })) {
            return false;
        }
        if let Some(hole) = self.containing_hole(store, id.peer_id, id.namespace, id.id) {
            let pieces = hole
                .range()
                .punch(&[id.id])
                .into_iter()
                .map(|range| HolePiece {
                    range,
                    tags: hole.tags,
                })
                .collect();
            self.replace_hole(store, hole, pieces, std::slice::from_ref(message), ops);
        }
        let key = Self::key(id.peer_id, id.namespace, id.id);
        codec::put(
            store,
            self.table,
            &key,
            &IndexEntry::Message {
                timestamp: message.timestamp,
            },
        );
        ops.push(IndexOperation::InsertMessage(message.clone()));
        true
    }

    pub fn add_messages(
        &mut self,
        store: &mut dyn ValueBox,
        messages: &[IntermediateMessage],
        location: AddMessagesLocation,
        ops: &mut Vec<IndexOperation>,
    ) {
        let mut sorted: Vec<&IntermediateMessage> = messages.iter().collect();
        sorted.sort_by_key(|m| m.id);
        let mut spans: BTreeMap<(PeerId, MessageNamespace), IdRange> = BTreeMap::new();
        for message in sorted {
            self.insert_message(store, message, ops);
            let point = IdRange::new(message.id.id, message.id.id);
            spans
                .entry((message.id.peer_id, message.id.namespace))
                .and_modify(|span| *span = span.span(&point))
                .or_insert(point);
        }
        if location == AddMessagesLocation::UpperHistoryBlock {
            for ((peer_id, namespace), span) in spans {
                self.clear_holes(store, peer_id, namespace, span, MessageTags::ALL, messages, ops);
            }
        }
    }

    /// Inserts a hole spanning the unknown gap around `id`.
    pub fn add_hole(
        &mut self,
        store: &mut dyn ValueBox,
        id: MessageId,
        ops: &mut Vec<IndexOperation>,
    ) {
        let (peer_id, namespace) = (id.peer_id, id.namespace);
        if self.entry(store, id).is_some()
            || self.containing_hole(store, peer_id, namespace, id.id).is_some()
        {
            return;
        }
        let below = if id.id == i32::MIN {
            None
        } else {
            self.scan(store, peer_id, namespace, IdRange::new(i32::MIN, id.id - 1), 1, false)
                .pop()
        };
        let above = if id.id == i32::MAX {
            None
        } else {
            self.scan(store, peer_id, namespace, IdRange::new(id.id + 1, i32::MAX), 1, true)
                .pop()
        };
        let min_id = match below {
            Some((entry_id, _)) => entry_id + 1,
            None => id.id.min(1),
        };
        let (max_id, timestamp) = match above {
            Some((entry_id, IndexEntry::Message { timestamp })) => (entry_id - 1, timestamp),
            Some((_, IndexEntry::Hole(hole))) => (hole.min_id - 1, hole.max_index.timestamp),
            None => (i32::MAX, i32::MAX),
        };
        let hole = MessageHistoryHole {
            stable_id: self.allocate_stable_id(store),
            max_index: MessageIndex::new(MessageId::new(peer_id, namespace, max_id), timestamp),
            min_id,
            tags: MessageTags::ALL,
        };
        self.write_hole(store, hole, ops);
    }

    /// Marks the parts of `range` that are neither holes nor messages as unknown.
    pub fn add_hole_range(
        &mut self,
        store: &mut dyn ValueBox,
        peer_id: PeerId,
        namespace: MessageNamespace,
        range: IdRange,
        tags: MessageTags,
        ops: &mut Vec<IndexOperation>,
    ) {
        if range.is_empty() || tags.is_empty() {
            return;
        }
        let occupied = self.holes_intersecting(store, peer_id, namespace, range);
        let known: Vec<i32> = self
            .message_indices_in(store, peer_id, namespace, range)
            .into_iter()
            .map(|index| index.id.id)
            .collect();
        let mut blocked = known;
        let mut free = Vec::new();
        let mut lower = range.min;
        for hole in occupied {
            let hole_range = hole.range();
            if hole_range.min > lower {
                free.push(IdRange::new(lower, hole_range.min - 1));
            }
            lower = hole_range.max.saturating_add(1);
            if hole_range.max == i32::MAX {
                lower = i32::MAX;
                blocked.push(i32::MAX);
            }
        }
        if lower <= range.max {
            free.push(IdRange::new(lower, range.max));
        }
        for gap in free {
            for piece in gap.punch(&blocked) {
                let timestamp = self
                    .next_timestamp_above(store, peer_id, namespace, piece.max, &[])
                    .unwrap_or(i32::MAX);
                let hole = MessageHistoryHole {
                    stable_id: self.allocate_stable_id(store),
                    max_index: MessageIndex::new(
                        MessageId::new(peer_id, namespace, piece.max),
                        timestamp,
                    ),
                    min_id: piece.min,
                    tags,
                };
                self.write_hole(store, hole, ops);
            }
        }
    }

    /// Merges a fetched batch into history. Returns the id range the batch was
    /// authoritative for, or `None` when the fill resolved nothing.
    ///
    /// Messages outside the covered range are discarded. With `multiple` the
    /// covered range widens to the batch's id span and may resolve other holes.
    #[allow(clippy::too_many_arguments)]
    pub fn fill_hole(
        &mut self,
        store: &mut dyn ValueBox,
        main: &MessageHistoryHole,
        fill: HoleFill,
        tag_mask: Option<MessageTags>,
        messages: &[IntermediateMessage],
        multiple: bool,
        ops: &mut Vec<IndexOperation>,
    ) -> Option<IdRange> {
        let (peer_id, namespace) = (main.peer_id(), main.namespace());
        let in_partition = |m: &&IntermediateMessage| {
            m.id.peer_id == peer_id && m.id.namespace == namespace
        };
        let current = self
            .containing_hole(store, peer_id, namespace, main.max_id())
            .or_else(|| self.containing_hole(store, peer_id, namespace, main.min_id));
        let mut covered = current.and_then(|hole| fill.coverage(hole.range()));
        if multiple {
            let batch_span = messages
                .iter()
                .filter(in_partition)
                .map(|m| IdRange::new(m.id.id, m.id.id))
                .reduce(|a, b| a.span(&b));
            covered = match (covered, batch_span) {
                (Some(c), Some(s)) => Some(c.span(&s)),
                (c, s) => c.or(s),
            };
        }
        let covered = covered?;
        let accepted: Vec<IntermediateMessage> = messages
            .iter()
            .filter(in_partition)
            .filter(|m| covered.contains(m.id.id))
            .cloned()
            .collect();
        let filled_tags = tag_mask.unwrap_or(MessageTags::ALL);
        self.clear_holes(store, peer_id, namespace, covered, filled_tags, &accepted, ops);
        let mut sorted: Vec<&IntermediateMessage> = accepted.iter().collect();
        sorted.sort_by_key(|m| m.id);
        for message in sorted {
            self.insert_message(store, message, ops);
        }
        Some(covered)
    }

    pub fn remove_message(
        &mut self,
        store: &mut dyn ValueBox,
        id: MessageId,
        ops: &mut Vec<IndexOperation>,
    ) -> Option<MessageIndex> {
        let index = self.message_index(store, id)?;
        store.remove(self.table, &Self::key(id.peer_id, id.namespace, id.id));
        ops.push(IndexOperation::RemoveMessage(index));
        Some(index)
    }

    pub fn remove_hole(
        &mut self,
        store: &mut dyn ValueBox,
        hole: &MessageHistoryHole,
        ops: &mut Vec<IndexOperation>,
    ) -> bool {
        let current = self.entry(
            store,
            MessageId::new(hole.peer_id(), hole.namespace(), hole.max_id()),
        );
        match current {
            Some(IndexEntry::Hole(stored)) => {
                self.erase_hole(store, stored, ops);
                true
            }
            _ => false,
        }
    }
}

impl Table for HistoryIndexTable {
    fn before_commit(&mut self, store: &mut dyn ValueBox) {
        if self.stable_id_dirty
            && let Some(next) = self.next_stable_id
        {
            codec::put(store, self.metadata_table, &Self::stable_id_key(), &next);
            self.stable_id_dirty = false;
        }
    }

    fn clear_memory_cache(&mut self) {
        self.next_stable_id = None;
        self.stable_id_dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::value_box::MemoryValueBox;
    use crate::types::{HoleFillDirection, MessageFlags};

    const INDEX: ValueBoxTable = ValueBoxTable(4);
    const META: ValueBoxTable = ValueBoxTable(5);

    fn peer() -> PeerId {
        PeerId::new(0, 1)
    }

    fn message(id: i32) -> IntermediateMessage {
        IntermediateMessage {
            stable_id: id as u32,
            id: MessageId::new(peer(), 0, id),
            globally_unique_id: None,
            timestamp: id * 10,
            flags: MessageFlags::default(),
            tags: MessageTags::NONE,
            author_id: None,
            text: format!("m{id}"),
            attributes: Vec::new(),
        }
    }

    fn setup() -> (MemoryValueBox, HistoryIndexTable) {
        let mut store = MemoryValueBox::new();
        store.begin().expect("begin");
        (store, HistoryIndexTable::new(INDEX, META))
    }

    fn ranges(table: &HistoryIndexTable, store: &MemoryValueBox) -> Vec<(i32, i32)> {
        table
            .holes(store, peer(), 0)
            .into_iter()
            .map(|h| (h.min_id, h.max_id()))
            .collect()
    }

    fn reference_hole(table: &HistoryIndexTable, store: &MemoryValueBox) -> MessageHistoryHole {
        table.holes(store, peer(), 0)[0]
    }

    #[test]
    fn newer_to_older_fill_truncates_at_bound() {
        let (mut store, mut table) = setup();
        let mut ops = Vec::new();
        table.add_hole_range(&mut store, peer(), 0, IdRange::new(1, 100), MessageTags::ALL, &mut ops);
        let hole = reference_hole(&table, &store);
        ops.clear();
        let fill = HoleFill::new(
            false,
            HoleFillDirection::UpperToLower {
                upper_bound: Some(25),
            },
        );
        let batch = [message(10), message(20), message(30)];
        let covered = table.fill_hole(&mut store, &hole, fill, None, &batch, false, &mut ops);
        assert_eq!(covered, Some(IdRange::new(1, 25)));
        assert_eq!(ranges(&table, &store), vec![(26, 100)]);
        assert!(table.message_exists(&store, MessageId::new(peer(), 0, 10)));
        assert!(table.message_exists(&store, MessageId::new(peer(), 0, 20)));
        assert!(!table.message_exists(&store, MessageId::new(peer(), 0, 30)));

        ops.clear();
        table.fill_hole(&mut store, &hole, fill, None, &batch, false, &mut ops);
        assert!(ops.is_empty(), "refill produced {ops:?}");
        assert_eq!(ranges(&table, &store), vec![(26, 100)]);
    }

    #[test]
    fn stale_reference_covers_only_the_current_hole() {
        let (mut store, mut table) = setup();
        let mut ops = Vec::new();
        table.add_hole_range(&mut store, peer(), 0, IdRange::new(1, 100), MessageTags::ALL, &mut ops);
        let stale = reference_hole(&table, &store);
        let lower_half = HoleFill::new(
            false,
            HoleFillDirection::LowerToUpper {
                lower_bound: Some(50),
            },
        );
        table.fill_hole(&mut store, &stale, lower_half, None, &[message(60)], false, &mut ops);
        assert_eq!(ranges(&table, &store), vec![(1, 49)]);

        let rest = HoleFill::new(false, HoleFillDirection::UpperToLower { upper_bound: None });
        let batch = [message(30), message(70)];
        let covered = table.fill_hole(&mut store, &stale, rest, None, &batch, false, &mut ops);
        assert_eq!(covered, Some(IdRange::new(1, 49)));
        assert!(ranges(&table, &store).is_empty());
        assert!(table.message_exists(&store, MessageId::new(peer(), 0, 30)));
        assert!(!table.message_exists(&store, MessageId::new(peer(), 0, 70)));
    }

    #[test]
    fn inserting_into_hole_splits_it() {
        let (mut store, mut table) = setup();
        let mut ops = Vec::new();
        table.add_hole_range(&mut store, peer(), 0, IdRange::new(1, 100), MessageTags::ALL, &mut ops);
        table.add_messages(&mut store, &[message(50)], AddMessagesLocation::Random, &mut ops);
        assert_eq!(ranges(&table, &store), vec![(1, 49), (51, 100)]);
        let lower = table.holes(&store, peer(), 0)[0];
        assert_eq!(lower.max_index.timestamp, 500);
    }

    #[test]
    fn upper_history_block_clears_span() {
        let (mut store, mut table) = setup();
        let mut ops = Vec::new();
        table.add_hole_range(&mut store, peer(), 0, IdRange::new(1, 100), MessageTags::ALL, &mut ops);
        table.add_messages(
            &mut store,
            &[message(40), message(60)],
            AddMessagesLocation::UpperHistoryBlock,
            &mut ops,
        );
        assert_eq!(ranges(&table, &store), vec![(1, 39), (61, 100)]);
    }

    #[test]
    fn add_hole_fills_gap_between_known_entries() {
        let (mut store, mut table) = setup();
        let mut ops = Vec::new();
        table.add_messages(&mut store, &[message(5), message(50)], AddMessagesLocation::Random, &mut ops);
        table.add_hole(&mut store, MessageId::new(peer(), 0, 20), &mut ops);
        assert_eq!(ranges(&table, &store), vec![(6, 49)]);
        let hole = table.holes(&store, peer(), 0)[0];
        assert_eq!(hole.max_index.timestamp, 500);
        ops.clear();
        table.add_hole(&mut store, MessageId::new(peer(), 0, 30), &mut ops);
        table.add_hole(&mut store, MessageId::new(peer(), 0, 5), &mut ops);
        assert!(ops.is_empty());
    }

    #[test]
    fn tagged_fill_keeps_hole_for_other_tags() {
        let (mut store, mut table) = setup();
        let photos = MessageTags::bit(0);
        let mut ops = Vec::new();
        table.add_hole_range(&mut store, peer(), 0, IdRange::new(1, 10), MessageTags::ALL, &mut ops);
        let hole = reference_hole(&table, &store);
        let fill = HoleFill::new(true, HoleFillDirection::UpperToLower { upper_bound: None });
        let batch = [message(4).clone()];
        table.fill_hole(&mut store, &hole, fill, Some(photos), &batch, false, &mut ops);
        let holes = table.holes(&store, peer(), 0);
        assert_eq!(
            holes.iter().map(|h| (h.min_id, h.max_id())).collect::<Vec<_>>(),
            vec![(1, 3), (5, 10)]
        );
        assert!(holes.iter().all(|h| !h.tags.intersects(photos)));
    }

    #[test]
    fn multiple_fill_resolves_overlapped_holes() {
        let (mut store, mut table) = setup();
        let mut ops = Vec::new();
        table.add_hole_range(&mut store, peer(), 0, IdRange::new(1, 10), MessageTags::ALL, &mut ops);
        table.add_messages(&mut store, &[message(11)], AddMessagesLocation::Random, &mut ops);
        table.add_hole_range(&mut store, peer(), 0, IdRange::new(12, 30), MessageTags::ALL, &mut ops);
        let main = reference_hole(&table, &store);
        let fill = HoleFill::new(true, HoleFillDirection::LowerToUpper { lower_bound: None });
        let batch = [message(3), message(20)];
        table.fill_hole(&mut store, &main, fill, None, &batch, true, &mut ops);
        assert_eq!(ranges(&table, &store), vec![(21, 30)]);
        assert!(table.message_exists(&store, MessageId::new(peer(), 0, 20)));
    }

    #[test]
    fn top_message_skips_holes() {
        let (mut store, mut table) = setup();
        let mut ops = Vec::new();
        table.add_messages(&mut store, &[message(3), message(7)], AddMessagesLocation::Random, &mut ops);
        table.add_hole(&mut store, MessageId::new(peer(), 0, 100), &mut ops);
        let top = table.top_message_index(&store, peer(), 0).expect("top");
        assert_eq!(top.id.id, 7);
        assert_eq!(table.top_message_index(&store, PeerId::new(9, 9), 0), None);
    }

    #[test]
    fn stable_ids_persist_through_before_commit() {
        let (mut store, mut table) = setup();
        let first = table.allocate_stable_id(&store);
        table.before_commit(&mut store);
        store.commit().expect("commit");
        table.clear_memory_cache();
        store.begin().expect("begin");
        assert_eq!(table.allocate_stable_id(&store), first + 1);
    }
}
