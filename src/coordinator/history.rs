//! Mirrors id-index changes into the ordered history, the tag partitions and the
//! secondary tables, and records them into the running transaction.

use super::context::StoreContext;
use crate::delta::{MessageHistoryOperation, TransactionAccumulator, UnsentOperation};
use crate::tables::IndexOperation;
use crate::types::{
    CombinedPeerReadState, IdRange, IntermediateMessage, MessageFlags, MessageIndex,
    MessageNamespace, MessageTagSummaryKey, MessageTags, PeerId,
};

pub(crate) fn apply_index_operations(
    ctx: &mut StoreContext,
    acc: &mut TransactionAccumulator,
    operations: Vec<IndexOperation>,
) {
    let tracked = ctx.config.seed.existing_message_tags;
    for operation in operations {
        match operation {
            IndexOperation::InsertMessage(message) => insert_message(ctx, acc, message),
            IndexOperation::RemoveMessage(index) => remove_message(ctx, acc, index),
            IndexOperation::InsertHole(hole) => {
                let store = ctx.store.as_mut();
                ctx.tables.history.set_hole(store, &hole);
                ctx.tables.tags.add_hole(store, &hole, tracked);
                acc.history(hole.peer_id(), MessageHistoryOperation::InsertHole(hole));
            }
            IndexOperation::RemoveHole(hole) => {
                let store = ctx.store.as_mut();
                ctx.tables.history.remove(store, hole.max_index);
                ctx.tables.tags.remove_hole(store, &hole, tracked);
                acc.history(hole.peer_id(), MessageHistoryOperation::RemoveHole(hole));
            }
        }
    }
}

fn is_pending(flags: MessageFlags) -> bool {
    flags.contains(MessageFlags::UNSENT) && !flags.contains(MessageFlags::FAILED)
}

fn insert_message(
    ctx: &mut StoreContext,
    acc: &mut TransactionAccumulator,
    message: IntermediateMessage,
) {
    let id = message.id;
    let index = message.index();
    let store = ctx.store.as_mut();
    ctx.tables.history.set_message(store, &message);
    ctx.tables.tags.add_message(store, index, message.tags);
    if ctx.config.global_message_id_namespaces.contains(&id.namespace) {
        ctx.tables.global_ids.set(store, id.id, id);
    }
    if is_pending(message.flags) && ctx.tables.unsent.add(store, id) {
        acc.delta.unsent_operations.push(UnsentOperation::Insert(id));
    }
    for tag in message.tags.bits() {
        let key = MessageTagSummaryKey {
            tag,
            peer_id: id.peer_id,
            namespace: id.namespace,
        };
        if let Some(mut summary) = ctx.tables.tag_summaries.get(store, &key)
            && id.id > summary.max_id
        {
            summary.count += 1;
            summary.max_id = id.id;
            ctx.tables.tag_summaries.set(store, &key, &summary);
            acc.delta.updated_tag_summaries.insert(key, summary);
        }
    }
    if message.is_incoming() {
        update_read_state(ctx, acc, id.peer_id, |state| {
            let Some((_, read)) = state.states.iter_mut().find(|(ns, _)| *ns == id.namespace)
            else {
                return false;
            };
            let mut changed = false;
            if id.id > read.max_known_id {
                read.max_known_id = id.id;
                changed = true;
            }
            if id.id > read.max_incoming_read_id {
                read.count += 1;
                changed = true;
            }
            changed
        });
    }
    acc.history(id.peer_id, MessageHistoryOperation::InsertMessage(message));
    acc.touch_chat_list(id.peer_id);
}

fn remove_message(ctx: &mut StoreContext, acc: &mut TransactionAccumulator, index: MessageIndex) {
    let id = index.id;
    let store = ctx.store.as_mut();
    let stored = ctx.tables.history.get_message(store, index);
    ctx.tables.history.remove(store, index);
    let mut tags = MessageTags::NONE;
    if let Some(message) = stored {
        tags = message.tags;
        ctx.tables.tags.remove_message(store, index, message.tags);
        if ctx.config.global_message_id_namespaces.contains(&id.namespace) {
            ctx.tables.global_ids.remove(store, id.id, id);
        }
        if ctx.tables.unsent.remove(store, id) {
            acc.delta.unsent_operations.push(UnsentOperation::Remove(id));
        }
        if message.is_incoming() {
            update_read_state(ctx, acc, id.peer_id, |state| {
                match state.states.iter_mut().find(|(ns, _)| *ns == id.namespace) {
                    Some((_, read)) if id.id > read.max_incoming_read_id && read.count > 0 => {
                        read.count -= 1;
                        true
                    }
                    _ => false,
                }
            });
        }
    }
    acc.history(id.peer_id, MessageHistoryOperation::Remove(index, tags));
    acc.touch_chat_list(id.peer_id);
}

/// Applies `f` to the peer's stored read state and records the result if `f`
/// reports a change. Peers without a read state are left alone.
pub(crate) fn update_read_state<F>(
    ctx: &mut StoreContext,
    acc: &mut TransactionAccumulator,
    peer_id: PeerId,
    f: F,
) -> bool
where
    F: FnOnce(&mut CombinedPeerReadState) -> bool,
{
    let Some(mut state) = ctx.read_state(peer_id) else {
        return false;
    };
    let previous = state.count();
    if !f(&mut state) {
        return false;
    }
    ctx.tables.read_states.set(peer_id, state.clone());
    acc.read_state(peer_id, previous, state);
    true
}

/// Incoming messages of one namespace with an id above `after`.
pub(crate) fn count_incoming_after(
    ctx: &StoreContext,
    peer_id: PeerId,
    namespace: MessageNamespace,
    after: i32,
) -> i32 {
    if after == i32::MAX {
        return 0;
    }
    let store = ctx.store.as_ref();
    let range = IdRange::new(after + 1, i32::MAX);
    let count = ctx
        .tables
        .history_index
        .message_indices_in(store, peer_id, namespace, range)
        .into_iter()
        .filter_map(|index| ctx.tables.history.get_message(store, index))
        .filter(IntermediateMessage::is_incoming)
        .count();
    i32::try_from(count).unwrap_or(i32::MAX)
}
