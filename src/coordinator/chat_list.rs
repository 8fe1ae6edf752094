//! Pre-commit finalization: chat-list positions and the total unread counter.

use super::context::StoreContext;
use crate::delta::{ChatListOperation, TransactionAccumulator};
use crate::tables::chat_list::PeerChatListState;
use crate::types::{ChatListInclusion, ChatListIndex, MessageId, MessageIndex, PeerId};
use tracing::trace;

fn desired_index(
    ctx: &mut StoreContext,
    peer_id: PeerId,
    state: &PeerChatListState,
) -> Option<ChatListIndex> {
    let top = ctx
        .tables
        .history
        .top_message(ctx.store.as_ref(), peer_id)
        .map(|message| message.index());
    let included = state.pinning_index.is_some()
        || match state.inclusion {
            ChatListInclusion::Never => false,
            ChatListInclusion::Always { .. } => true,
            ChatListInclusion::IfHasMessages => top.is_some(),
            ChatListInclusion::NotSpecified => {
                top.is_some() && !ctx.config.chat_list_inclusion_required(peer_id.namespace)
            }
        };
    if !included {
        return None;
    }
    let floor = match state.inclusion {
        ChatListInclusion::Always { min_timestamp } => Some(MessageIndex::new(
            MessageId::new(peer_id, 0, 0),
            min_timestamp,
        )),
        _ => None,
    };
    let message_index = match (top, floor) {
        (Some(top), Some(floor)) => top.max(floor),
        (top, floor) => top
            .or(floor)
            .unwrap_or_else(|| MessageIndex::new(MessageId::new(peer_id, 0, 0), 0)),
    };
    Some(ChatListIndex::new(state.pinning_index, message_index))
}

/// Moves every touched peer to the chat-list position its state now implies.
pub(crate) fn replay_chat_list(ctx: &mut StoreContext, acc: &mut TransactionAccumulator) {
    for peer_id in std::mem::take(&mut acc.chat_list_peers) {
        let mut state = ctx.tables.chat_list_index.get(ctx.store.as_ref(), peer_id);
        let desired = desired_index(ctx, peer_id, &state);
        if desired == state.current {
            continue;
        }
        trace!(peer = %peer_id, ?desired, "chat list position changed");
        let store = ctx.store.as_mut();
        if let Some(current) = state.current {
            ctx.tables.chat_list.remove(store, &current);
            acc.chat_list(ChatListOperation::RemoveEntry(vec![current]));
        }
        if let Some(desired) = desired {
            ctx.tables.chat_list.set_peer(store, &desired);
            acc.chat_list(ChatListOperation::InsertEntry(desired));
        }
        state.current = desired;
        ctx.tables.chat_list_index.set(peer_id, state);
    }
}

/// Folds this transaction's read-state changes into the stored total.
pub(crate) fn finalize_unread_count(ctx: &mut StoreContext, acc: &mut TransactionAccumulator) {
    if acc.unread_baselines.is_empty() {
        return;
    }
    let mut total = ctx.tables.metadata.total_unread_count(ctx.store.as_ref());
    let initial = total;
    for (peer_id, baseline) in std::mem::take(&mut acc.unread_baselines) {
        let current = ctx.read_state(peer_id).map_or(0, |state| state.count());
        total += current - baseline;
    }
    let total = total.max(0);
    if total != initial {
        ctx.tables
            .metadata
            .set_total_unread_count(ctx.store.as_mut(), total);
        acc.delta.updated_total_unread_count = Some(total);
    }
}
