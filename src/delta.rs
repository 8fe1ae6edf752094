//! Record of everything one committed transaction changed.
//!
//! The facade fills a [`TransactionAccumulator`] while it mutates the tables; the
//! coordinator turns it into an immutable [`TransactionDelta`] that the view tracker
//! replays against every live view.

use crate::types::{
    CachedPeerData, ChatListHole, ChatListIndex, CombinedPeerReadState, HoleFillDirection,
    IntermediateMessage, MergedOperationLogOperation, MessageHistoryHole, MessageId,
    MessageIndex, MessageTagSummary, MessageTagSummaryKey, MessageTags,
    OrderedItemListCollection, OrderedItemListOperation, Peer, PeerId, PeerNotificationSettings,
    PeerPresence, PreferencesOperation, ReadStateSyncOperation,
};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub enum MessageHistoryOperation {
    InsertMessage(IntermediateMessage),
    InsertHole(MessageHistoryHole),
    Remove(MessageIndex, MessageTags),
    RemoveHole(MessageHistoryHole),
    UpdateReadState(CombinedPeerReadState),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatListOperation {
    InsertEntry(ChatListIndex),
    InsertHole(ChatListHole),
    RemoveEntry(Vec<ChatListIndex>),
    RemoveHoles(Vec<ChatListIndex>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsentOperation {
    Insert(MessageId),
    Remove(MessageId),
}

#[derive(Debug, Clone, Default)]
pub struct TransactionDelta {
    /// Version the store carries after this transaction; `0` for the empty delta.
    pub state_version: u64,
    pub history_operations: BTreeMap<PeerId, Vec<MessageHistoryOperation>>,
    pub filled_holes: BTreeMap<PeerId, BTreeMap<MessageIndex, HoleFillDirection>>,
    pub removed_holes: BTreeMap<PeerId, BTreeMap<MessageIndex, HoleFillDirection>>,
    pub chat_list_operations: Vec<ChatListOperation>,
    pub updated_peers: BTreeMap<PeerId, Peer>,
    pub updated_notification_settings: BTreeMap<PeerId, PeerNotificationSettings>,
    pub updated_cached_data: BTreeMap<PeerId, CachedPeerData>,
    pub updated_presences: BTreeMap<PeerId, PeerPresence>,
    pub updated_read_states: BTreeMap<PeerId, CombinedPeerReadState>,
    pub updated_total_unread_count: Option<i32>,
    pub updated_tag_summaries: BTreeMap<MessageTagSummaryKey, MessageTagSummary>,
    pub merged_operation_log_operations: Vec<MergedOperationLogOperation>,
    pub preferences_operations: Vec<PreferencesOperation>,
    pub ordered_item_list_operations:
        BTreeMap<OrderedItemListCollection, Vec<OrderedItemListOperation>>,
    pub unsent_operations: Vec<UnsentOperation>,
    pub synchronize_read_state_operations: BTreeMap<PeerId, Option<ReadStateSyncOperation>>,
    pub replaced_contact_peer_ids: Option<BTreeSet<PeerId>>,
    pub updated_remote_contact_count: Option<i32>,
    pub updated_state: Option<Vec<u8>>,
    pub updated_peer_chat_states: BTreeSet<PeerId>,
    pub updated_master_client_id: Option<i64>,
}

impl TransactionDelta {
    pub fn is_empty(&self) -> bool {
        self.history_operations.is_empty()
            && self.filled_holes.is_empty()
            && self.removed_holes.is_empty()
            && self.chat_list_operations.is_empty()
            && self.updated_peers.is_empty()
            && self.updated_notification_settings.is_empty()
            && self.updated_cached_data.is_empty()
            && self.updated_presences.is_empty()
            && self.updated_read_states.is_empty()
            && self.updated_total_unread_count.is_none()
            && self.updated_tag_summaries.is_empty()
            && self.merged_operation_log_operations.is_empty()
            && self.preferences_operations.is_empty()
            && self.ordered_item_list_operations.is_empty()
            && self.unsent_operations.is_empty()
            && self.synchronize_read_state_operations.is_empty()
            && self.replaced_contact_peer_ids.is_none()
            && self.updated_remote_contact_count.is_none()
            && self.updated_state.is_none()
            && self.updated_peer_chat_states.is_empty()
            && self.updated_master_client_id.is_none()
    }

    pub fn history_operation_count(&self) -> usize {
        self.history_operations.values().map(Vec::len).sum()
    }
}

/// Mutable collector owned by one running transaction.
#[derive(Debug, Default)]
pub struct TransactionAccumulator {
    pub delta: TransactionDelta,
    /// Peers whose chat-list position must be recomputed before commit.
    pub chat_list_peers: BTreeSet<PeerId>,
    /// Unread count of each peer before its first read-state change in this transaction.
    pub unread_baselines: BTreeMap<PeerId, i32>,
}

impl TransactionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&mut self, peer_id: PeerId, operation: MessageHistoryOperation) {
        self.delta
            .history_operations
            .entry(peer_id)
            .or_default()
            .push(operation);
    }

    pub fn filled_hole(&mut self, peer_id: PeerId, hole: MessageIndex, direction: HoleFillDirection) {
        self.delta
            .filled_holes
            .entry(peer_id)
            .or_default()
            .insert(hole, direction);
    }

    pub fn removed_hole(
        &mut self,
        peer_id: PeerId,
        hole: MessageIndex,
        direction: HoleFillDirection,
    ) {
        self.delta
            .removed_holes
            .entry(peer_id)
            .or_default()
            .insert(hole, direction);
    }

    pub fn chat_list(&mut self, operation: ChatListOperation) {
        self.delta.chat_list_operations.push(operation);
    }

    /// Records a read-state change; `previous_count` is the count before this change.
    pub fn read_state(&mut self, peer_id: PeerId, previous_count: i32, state: CombinedPeerReadState) {
        self.unread_baselines.entry(peer_id).or_insert(previous_count);
        self.history(peer_id, MessageHistoryOperation::UpdateReadState(state.clone()));
        self.delta.updated_read_states.insert(peer_id, state);
    }

    pub fn touch_chat_list(&mut self, peer_id: PeerId) {
        self.chat_list_peers.insert(peer_id);
    }

    pub fn into_delta(self, state_version: u64) -> TransactionDelta {
        TransactionDelta {
            state_version,
            ..self.delta
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PeerReadState;

    #[test]
    fn empty_until_something_is_recorded() {
        let mut acc = TransactionAccumulator::new();
        acc.touch_chat_list(PeerId::new(0, 1));
        assert!(acc.delta.is_empty());

        let state = CombinedPeerReadState {
            states: vec![(0, PeerReadState::new(5, 5, 2))],
        };
        acc.read_state(PeerId::new(0, 1), 4, state.clone());
        acc.read_state(PeerId::new(0, 1), 2, state);
        assert_eq!(acc.unread_baselines.get(&PeerId::new(0, 1)), Some(&4));
        let delta = acc.into_delta(7);
        assert!(!delta.is_empty());
        assert_eq!(delta.state_version, 7);
        assert_eq!(delta.history_operation_count(), 2);
    }
}
