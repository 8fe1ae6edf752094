//! Mutation facade handed to transaction bodies.
//!
//! Every mutation is applied to the tables immediately and recorded into the
//! transaction's accumulator, so reads later in the same body observe earlier
//! writes and the committed delta describes exactly what changed.

use crate::coordinator::context::StoreContext;
use crate::coordinator::history::{apply_index_operations, count_incoming_after};
use crate::delta::{ChatListOperation, TransactionAccumulator};
use crate::tables::chat_list::ChatListEntry;
use crate::tables::tags::TaggedEntry;
use crate::tables::{HistoryEntry, IndexOperation};
use crate::types::{
    AddMessagesLocation, CachedPeerData, ChatListHole, ChatListInclusion, ChatListIndex,
    CombinedPeerReadState, HoleFill, IdRange, IntermediateMessage, Message, MessageHistoryHole,
    MessageId, MessageIndex, MessageNamespace, MessageTagSummary, MessageTagSummaryKey,
    MessageTags, OperationLogEntry, OperationLogEntryUpdate, OperationLogTag,
    OrderedItemListCollection, OrderedItemListEntry, OrderedItemListOperation, Peer, PeerId,
    PeerNamespace, PeerNotificationSettings, PeerPresence, PeerReadState, PreferencesEntry,
    PreferencesOperation, ReadStateSyncOperation, StoreMessage, StoreMessageId,
    StoreMessageUpdate, TagLocalIndex, TagMergedIndex,
};
use std::collections::{BTreeMap, BTreeSet};

/// Entry produced by [`Transaction::scan_messages`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScanMessageEntry {
    Message(Message),
    Hole(MessageHistoryHole),
}

/// Mutation facade of one running transaction.
pub struct Transaction<'a> {
    ctx: &'a mut StoreContext,
    acc: &'a mut TransactionAccumulator,
    disposed: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(ctx: &'a mut StoreContext, acc: &'a mut TransactionAccumulator) -> Self {
        Self {
            ctx,
            acc,
            disposed: false,
        }
    }

    pub(crate) fn dispose(&mut self) {
        self.disposed = true;
    }

    fn check(&self) {
        assert!(!self.disposed, "transaction used after it was disposed");
    }

    fn apply(&mut self, operations: Vec<IndexOperation>) {
        apply_index_operations(self.ctx, self.acc, operations);
    }

    /// Seeds a never-seen peer's history with the configured initial holes.
    pub(crate) fn initialize_peer_history(&mut self, peer_id: PeerId) {
        let store = self.ctx.store.as_ref();
        if self
            .ctx
            .tables
            .metadata
            .is_peer_history_initialized(store, peer_id)
        {
            return;
        }
        let namespaces: Vec<MessageNamespace> = self
            .ctx
            .config
            .initial_hole_namespaces(peer_id.namespace)
            .collect();
        let store = self.ctx.store.as_mut();
        self.ctx
            .tables
            .metadata
            .set_peer_history_initialized(store, peer_id);
        let mut operations = Vec::new();
        for namespace in namespaces {
            self.ctx.tables.history_index.add_hole_range(
                store,
                peer_id,
                namespace,
                IdRange::new(1, i32::MAX),
                MessageTags::ALL,
                &mut operations,
            );
        }
        self.apply(operations);
    }

    /// Seeds an uninitialized chat list with `hole`.
    pub(crate) fn initialize_chat_list(&mut self, hole: Option<ChatListHole>) {
        let store = self.ctx.store.as_mut();
        if self.ctx.tables.metadata.is_chat_list_initialized(store) {
            return;
        }
        self.ctx.tables.metadata.set_chat_list_initialized(store);
        if let Some(hole) = hole {
            self.add_chat_list_hole(hole);
        }
    }

    pub(crate) fn master_client_id(&mut self) -> i64 {
        self.ctx
            .tables
            .metadata
            .master_client_id(self.ctx.store.as_ref())
    }

    pub(crate) fn set_master_client_id(&mut self, id: i64) {
        self.check();
        let store = self.ctx.store.as_mut();
        if self.ctx.tables.metadata.master_client_id(store) == id {
            return;
        }
        self.ctx.tables.metadata.set_master_client_id(store, id);
        self.acc.delta.updated_master_client_id = Some(id);
    }

    fn intermediate(&mut self, message: StoreMessage, id: MessageId) -> IntermediateMessage {
        let stable_id = self
            .ctx
            .tables
            .history_index
            .allocate_stable_id(self.ctx.store.as_ref());
        IntermediateMessage {
            stable_id,
            id,
            globally_unique_id: message.globally_unique_id,
            timestamp: message.timestamp,
            flags: message.flags,
            tags: message.tags,
            author_id: message.author_id,
            text: message.text,
            attributes: message.attributes,
        }
    }

    /// Resolves partial ids to the next free id above the current top of the
    /// namespace, counting explicit ids of the same batch.
    fn resolve_messages(&mut self, messages: Vec<StoreMessage>) -> Vec<IntermediateMessage> {
        let mut next_ids: BTreeMap<(PeerId, MessageNamespace), i32> = BTreeMap::new();
        for message in &messages {
            if let StoreMessageId::Id(id) = message.id {
                let next = next_ids.entry((id.peer_id, id.namespace)).or_insert(1);
                *next = (*next).max(id.id.saturating_add(1));
            }
        }
        let mut resolved = Vec::with_capacity(messages.len());
        for message in messages {
            let id = match message.id {
                StoreMessageId::Id(id) => id,
                StoreMessageId::Partial(peer_id, namespace) => {
                    let top = self
                        .ctx
                        .tables
                        .history_index
                        .top_message_index(self.ctx.store.as_ref(), peer_id, namespace)
                        .map_or(1, |index| index.id.id.saturating_add(1));
                    let next = next_ids.entry((peer_id, namespace)).or_insert(top);
                    *next = (*next).max(top);
                    let id = MessageId::new(peer_id, namespace, *next);
                    *next = next.saturating_add(1);
                    id
                }
            };
            resolved.push(self.intermediate(message, id));
        }
        resolved
    }

    // Messages

    /// Stores a batch and returns the id assigned to each message, in input order.
    pub fn add_messages(
        &mut self,
        messages: Vec<StoreMessage>,
        location: AddMessagesLocation,
    ) -> Vec<MessageId> {
        self.check();
        let peers: BTreeSet<PeerId> = messages.iter().map(|m| m.id.peer_id()).collect();
        for peer_id in peers {
            self.initialize_peer_history(peer_id);
        }
        let resolved = self.resolve_messages(messages);
        let ids = resolved.iter().map(|message| message.id).collect();
        let mut operations = Vec::new();
        self.ctx.tables.history_index.add_messages(
            self.ctx.store.as_mut(),
            &resolved,
            location,
            &mut operations,
        );
        self.apply(operations);
        ids
    }

    pub fn add_hole(&mut self, id: MessageId) {
        self.check();
        self.initialize_peer_history(id.peer_id);
        let mut operations = Vec::new();
        self.ctx
            .tables
            .history_index
            .add_hole(self.ctx.store.as_mut(), id, &mut operations);
        self.apply(operations);
    }

    pub fn add_hole_range(
        &mut self,
        peer_id: PeerId,
        namespace: MessageNamespace,
        min_id: i32,
        max_id: i32,
        tags: MessageTags,
    ) {
        self.check();
        self.initialize_peer_history(peer_id);
        let mut operations = Vec::new();
        self.ctx.tables.history_index.add_hole_range(
            self.ctx.store.as_mut(),
            peer_id,
            namespace,
            IdRange::new(min_id, max_id),
            tags,
            &mut operations,
        );
        self.apply(operations);
    }

    fn fill(
        &mut self,
        hole: &MessageHistoryHole,
        fill: HoleFill,
        tag_mask: Option<MessageTags>,
        messages: Vec<StoreMessage>,
        multiple: bool,
    ) {
        self.check();
        let (peer_id, namespace) = (hole.peer_id(), hole.namespace());
        let store = self.ctx.store.as_ref();
        let index = &self.ctx.tables.history_index;
        let located = index
            .containing_hole(store, peer_id, namespace, hole.max_id())
            .or_else(|| index.containing_hole(store, peer_id, namespace, hole.min_id));
        let resolved = self.resolve_messages(messages);
        let mut operations = Vec::new();
        let covered = self.ctx.tables.history_index.fill_hole(
            self.ctx.store.as_mut(),
            hole,
            fill,
            tag_mask,
            &resolved,
            multiple,
            &mut operations,
        );
        if covered.is_none() || operations.is_empty() {
            return;
        }
        let filled = located.map_or(hole.max_index, |located| located.max_index);
        self.acc.filled_hole(peer_id, filled, fill.direction);
        for operation in &operations {
            if let IndexOperation::RemoveHole(removed) = operation {
                self.acc
                    .removed_hole(peer_id, removed.max_index, fill.direction);
            }
        }
        self.apply(operations);
    }

    /// Merges a fetched batch into the hole it was requested for.
    pub fn fill_hole(
        &mut self,
        hole: &MessageHistoryHole,
        fill: HoleFill,
        tag_mask: Option<MessageTags>,
        messages: Vec<StoreMessage>,
    ) {
        self.fill(hole, fill, tag_mask, messages, false);
    }

    /// Like [`fill_hole`](Self::fill_hole), but the batch may resolve every hole
    /// its id span intersects.
    pub fn fill_multiple_holes(
        &mut self,
        hole: &MessageHistoryHole,
        fill: HoleFill,
        tag_mask: Option<MessageTags>,
        messages: Vec<StoreMessage>,
    ) {
        self.fill(hole, fill, tag_mask, messages, true);
    }

    pub fn delete_messages(&mut self, ids: &[MessageId]) {
        self.check();
        let mut operations = Vec::new();
        for id in ids {
            self.ctx
                .tables
                .history_index
                .remove_message(self.ctx.store.as_mut(), *id, &mut operations);
        }
        self.apply(operations);
    }

    pub fn delete_messages_in_range(
        &mut self,
        peer_id: PeerId,
        namespace: MessageNamespace,
        min_id: i32,
        max_id: i32,
    ) {
        self.check();
        let ids: Vec<MessageId> = self
            .ctx
            .tables
            .history_index
            .message_indices_in(
                self.ctx.store.as_ref(),
                peer_id,
                namespace,
                IdRange::new(min_id, max_id),
            )
            .into_iter()
            .map(|index| index.id)
            .collect();
        self.delete_messages(&ids);
    }

    fn history_entries(&self, peer_id: PeerId) -> Vec<HistoryEntry> {
        self.ctx
            .tables
            .history
            .later(self.ctx.store.as_ref(), peer_id, None, usize::MAX)
    }

    /// Removes every message and hole of the peer.
    pub fn clear_history(&mut self, peer_id: PeerId) {
        self.check();
        let mut operations = Vec::new();
        for entry in self.history_entries(peer_id) {
            let store = self.ctx.store.as_mut();
            match entry {
                HistoryEntry::Message(message) => {
                    self.ctx
                        .tables
                        .history_index
                        .remove_message(store, message.id, &mut operations);
                }
                HistoryEntry::Hole(hole) => {
                    self.ctx
                        .tables
                        .history_index
                        .remove_hole(store, &hole, &mut operations);
                }
            }
        }
        self.apply(operations);
    }

    pub fn remove_all_messages_with_author(&mut self, peer_id: PeerId, author_id: PeerId) {
        self.check();
        let ids: Vec<MessageId> = self
            .history_entries(peer_id)
            .into_iter()
            .filter_map(|entry| match entry {
                HistoryEntry::Message(message) if message.author_id == Some(author_id) => {
                    Some(message.id)
                }
                _ => None,
            })
            .collect();
        self.delete_messages(&ids);
    }

    /// Replaces a stored message with the callback's result. The message keeps its
    /// stable id; a changed id moves it within the history.
    pub fn update_message<F>(&mut self, id: MessageId, f: F)
    where
        F: FnOnce(&Message) -> StoreMessageUpdate,
    {
        self.check();
        let Some(current) = self.ctx.message(id) else {
            return;
        };
        let StoreMessageUpdate::Update(updated) = f(&current) else {
            return;
        };
        let new_id = match updated.id {
            StoreMessageId::Id(new_id) => new_id,
            StoreMessageId::Partial(..) => id,
        };
        let message = IntermediateMessage {
            stable_id: current.stable_id,
            id: new_id,
            globally_unique_id: updated.globally_unique_id,
            timestamp: updated.timestamp,
            flags: updated.flags,
            tags: updated.tags,
            author_id: updated.author_id,
            text: updated.text,
            attributes: updated.attributes,
        };
        let mut operations = Vec::new();
        let store = self.ctx.store.as_mut();
        let index = &mut self.ctx.tables.history_index;
        index.remove_message(store, id, &mut operations);
        index.add_messages(store, &[message], AddMessagesLocation::Random, &mut operations);
        self.apply(operations);
    }

    pub fn get_message(&mut self, id: MessageId) -> Option<Message> {
        self.check();
        self.ctx.message(id)
    }

    pub fn get_top_peer_message_index(
        &self,
        peer_id: PeerId,
        namespace: MessageNamespace,
    ) -> Option<MessageIndex> {
        self.check();
        self.ctx
            .tables
            .history_index
            .top_message_index(self.ctx.store.as_ref(), peer_id, namespace)
    }

    pub fn get_top_peer_message_id(
        &self,
        peer_id: PeerId,
        namespace: MessageNamespace,
    ) -> Option<MessageId> {
        self.get_top_peer_message_index(peer_id, namespace)
            .map(|index| index.id)
    }

    /// The subset of `ids` that are stored messages.
    pub fn filter_stored_message_ids(&self, ids: &[MessageId]) -> BTreeSet<MessageId> {
        self.check();
        let store = self.ctx.store.as_ref();
        ids.iter()
            .copied()
            .filter(|id| self.ctx.tables.history_index.message_exists(store, *id))
            .collect()
    }

    pub fn message_ids_for_global_ids(&self, global_ids: &[i32]) -> Vec<MessageId> {
        self.check();
        let store = self.ctx.store.as_ref();
        global_ids
            .iter()
            .filter_map(|global_id| self.ctx.tables.global_ids.get(store, *global_id))
            .collect()
    }

    /// Walks one tag partition of a (peer, namespace) from the newest entry down,
    /// one page at a time, until `f` returns false.
    pub fn scan_messages<F>(
        &mut self,
        peer_id: PeerId,
        namespace: MessageNamespace,
        tag: MessageTags,
        mut f: F,
    ) where
        F: FnMut(ScanMessageEntry) -> bool,
    {
        self.check();
        let Some(tag) = tag.bits().next() else {
            return;
        };
        let page_size = self.ctx.config.scan_page_size;
        let mut before = None;
        loop {
            let page = self.ctx.tables.tags.earlier(
                self.ctx.store.as_ref(),
                peer_id,
                tag,
                before,
                page_size,
            );
            let Some(last) = page.last() else {
                return;
            };
            before = Some(last.index());
            let exhausted = page.len() < page_size;
            for entry in page {
                if entry.index().id.namespace != namespace {
                    continue;
                }
                let item = match entry {
                    TaggedEntry::Message(index) => {
                        let stored = self
                            .ctx
                            .tables
                            .history
                            .get_message(self.ctx.store.as_ref(), index);
                        let Some(message) = stored else {
                            continue;
                        };
                        ScanMessageEntry::Message(self.ctx.render_message(message))
                    }
                    TaggedEntry::Hole(hole) => ScanMessageEntry::Hole(hole),
                };
                if !f(item) {
                    return;
                }
            }
            if exhausted {
                return;
            }
        }
    }

    pub fn get_message_history_holes(
        &self,
        peer_id: PeerId,
        namespace: MessageNamespace,
    ) -> Vec<MessageHistoryHole> {
        self.check();
        self.ctx
            .tables
            .history_index
            .holes(self.ctx.store.as_ref(), peer_id, namespace)
    }

    // Chat list

    pub fn get_peer_chat_list_inclusion(&mut self, peer_id: PeerId) -> ChatListInclusion {
        self.check();
        self.ctx
            .tables
            .chat_list_index
            .get(self.ctx.store.as_ref(), peer_id)
            .inclusion
    }

    pub fn get_peer_chat_list_index(&mut self, peer_id: PeerId) -> Option<ChatListIndex> {
        self.check();
        self.ctx
            .tables
            .chat_list_index
            .get(self.ctx.store.as_ref(), peer_id)
            .current
    }

    pub fn update_peer_chat_list_inclusion<F>(&mut self, peer_id: PeerId, f: F)
    where
        F: FnOnce(ChatListInclusion) -> ChatListInclusion,
    {
        self.check();
        let table = &mut self.ctx.tables.chat_list_index;
        let mut state = table.get(self.ctx.store.as_ref(), peer_id);
        let inclusion = f(state.inclusion);
        if inclusion == state.inclusion {
            return;
        }
        state.inclusion = inclusion;
        table.set(peer_id, state);
        self.acc.touch_chat_list(peer_id);
    }

    /// Pins exactly `peer_ids`, first one topmost.
    pub fn set_pinned_peer_ids(&mut self, peer_ids: &[PeerId]) {
        self.check();
        let store = self.ctx.store.as_ref();
        let table = &mut self.ctx.tables.chat_list_index;
        for peer_id in table.pinned_peer_ids(store) {
            if !peer_ids.contains(&peer_id) {
                let mut state = table.get(store, peer_id);
                state.pinning_index = None;
                table.set(peer_id, state);
                self.acc.touch_chat_list(peer_id);
            }
        }
        for (position, peer_id) in peer_ids.iter().enumerate() {
            let pin = u16::try_from(position).unwrap_or(u16::MAX);
            let mut state = table.get(store, *peer_id);
            if state.pinning_index != Some(pin) {
                state.pinning_index = Some(pin);
                table.set(*peer_id, state);
                self.acc.touch_chat_list(*peer_id);
            }
        }
    }

    pub fn get_pinned_peer_ids(&mut self) -> Vec<PeerId> {
        self.check();
        self.ctx
            .tables
            .chat_list_index
            .pinned_peer_ids(self.ctx.store.as_ref())
    }

    /// Removes the chat-list hole at `index` and inserts `hole` in its place.
    pub fn replace_chat_list_hole(&mut self, index: MessageIndex, hole: Option<ChatListHole>) {
        self.check();
        let existing = ChatListHole::new(index).chat_list_index();
        let store = self.ctx.store.as_mut();
        if matches!(
            self.ctx.tables.chat_list.get(store, &existing),
            Some(ChatListEntry::Hole(_))
        ) {
            self.ctx.tables.chat_list.remove(store, &existing);
            self.acc
                .chat_list(ChatListOperation::RemoveHoles(vec![existing]));
        }
        if let Some(hole) = hole {
            self.add_chat_list_hole(hole);
        }
    }

    pub fn add_chat_list_hole(&mut self, hole: ChatListHole) {
        self.check();
        let store = self.ctx.store.as_mut();
        if self
            .ctx
            .tables
            .chat_list
            .get(store, &hole.chat_list_index())
            .is_some()
        {
            return;
        }
        self.ctx.tables.chat_list.set_hole(store, &hole);
        self.acc.chat_list(ChatListOperation::InsertHole(hole));
    }

    /// Drops every chat-list hole, forgets the inclusion of peers outside
    /// `keep_peer_namespaces` and inserts `replacement_hole`.
    pub fn reset_chat_list(
        &mut self,
        keep_peer_namespaces: &[PeerNamespace],
        replacement_hole: Option<ChatListHole>,
    ) {
        self.check();
        let store = self.ctx.store.as_mut();
        let holes = self.ctx.tables.chat_list.holes(store);
        if !holes.is_empty() {
            let indices: Vec<ChatListIndex> =
                holes.iter().map(ChatListHole::chat_list_index).collect();
            for index in &indices {
                self.ctx.tables.chat_list.remove(store, index);
            }
            self.acc.chat_list(ChatListOperation::RemoveHoles(indices));
        }
        let table = &mut self.ctx.tables.chat_list_index;
        for peer_id in table.peer_ids(store) {
            if keep_peer_namespaces.contains(&peer_id.namespace) {
                continue;
            }
            let mut state = table.get(store, peer_id);
            if state.inclusion != ChatListInclusion::NotSpecified {
                state.inclusion = ChatListInclusion::NotSpecified;
                table.set(peer_id, state);
                self.acc.touch_chat_list(peer_id);
            }
        }
        if let Some(hole) = replacement_hole {
            self.add_chat_list_hole(hole);
        }
    }

    // Peers

    /// Offers each peer to `f` together with the stored version; a returned peer
    /// that differs from the stored one replaces it.
    pub fn update_peers<F>(&mut self, peers: Vec<Peer>, mut f: F)
    where
        F: FnMut(Option<&Peer>, &Peer) -> Option<Peer>,
    {
        self.check();
        for peer in peers {
            let current = self.ctx.peer(peer.id);
            let Some(updated) = f(current.as_ref(), &peer) else {
                continue;
            };
            if current.as_ref() == Some(&updated) {
                continue;
            }
            self.ctx.tables.peers.set(updated.id, updated.clone());
            self.acc.delta.updated_peers.insert(updated.id, updated);
        }
    }

    pub fn get_peer(&mut self, peer_id: PeerId) -> Option<Peer> {
        self.check();
        self.ctx.peer(peer_id)
    }

    pub fn update_peer_cached_data<F>(&mut self, peer_ids: &[PeerId], mut f: F)
    where
        F: FnMut(PeerId, Option<&CachedPeerData>) -> Option<CachedPeerData>,
    {
        self.check();
        for peer_id in peer_ids {
            let table = &mut self.ctx.tables.cached_peer_data;
            let current = table.get(self.ctx.store.as_ref(), *peer_id);
            let Some(updated) = f(*peer_id, current.as_ref()) else {
                continue;
            };
            if current.as_ref() == Some(&updated) {
                continue;
            }
            table.set(*peer_id, updated.clone());
            self.acc.delta.updated_cached_data.insert(*peer_id, updated);
        }
    }

    pub fn get_peer_cached_data(&mut self, peer_id: PeerId) -> Option<CachedPeerData> {
        self.check();
        self.ctx
            .tables
            .cached_peer_data
            .get(self.ctx.store.as_ref(), peer_id)
    }

    /// Stores presences that differ from the stored ones.
    pub fn update_peer_presences(&mut self, presences: BTreeMap<PeerId, PeerPresence>) {
        self.check();
        for (peer_id, presence) in presences {
            let table = &mut self.ctx.tables.presences;
            if table.get(self.ctx.store.as_ref(), peer_id).as_ref() == Some(&presence) {
                continue;
            }
            table.set(peer_id, presence.clone());
            self.acc.delta.updated_presences.insert(peer_id, presence);
        }
    }

    pub fn get_peer_presence(&mut self, peer_id: PeerId) -> Option<PeerPresence> {
        self.check();
        self.ctx.tables.presences.get(self.ctx.store.as_ref(), peer_id)
    }

    pub fn update_current_peer_notification_settings(
        &mut self,
        settings: BTreeMap<PeerId, PeerNotificationSettings>,
    ) {
        self.check();
        for (peer_id, settings) in settings {
            let table = &mut self.ctx.tables.notification_settings;
            if table.get(self.ctx.store.as_ref(), peer_id).as_ref() == Some(&settings) {
                continue;
            }
            table.set(peer_id, settings.clone());
            self.acc
                .delta
                .updated_notification_settings
                .insert(peer_id, settings);
        }
    }

    pub fn get_peer_notification_settings(
        &mut self,
        peer_id: PeerId,
    ) -> Option<PeerNotificationSettings> {
        self.check();
        self.ctx
            .tables
            .notification_settings
            .get(self.ctx.store.as_ref(), peer_id)
    }

    pub fn set_peer_chat_state(&mut self, peer_id: PeerId, state: Vec<u8>) {
        self.check();
        self.ctx.tables.peer_chat_states.set(peer_id, state);
        self.acc.delta.updated_peer_chat_states.insert(peer_id);
    }

    pub fn get_peer_chat_state(&mut self, peer_id: PeerId) -> Option<Vec<u8>> {
        self.check();
        self.ctx
            .tables
            .peer_chat_states
            .get(self.ctx.store.as_ref(), peer_id)
    }

    // Contacts

    pub fn replace_contact_peer_ids(&mut self, peer_ids: BTreeSet<PeerId>) {
        self.check();
        if self
            .ctx
            .tables
            .contacts
            .replace(self.ctx.store.as_mut(), peer_ids.clone())
        {
            self.acc.delta.replaced_contact_peer_ids = Some(peer_ids);
        }
    }

    pub fn get_contact_peer_ids(&mut self) -> BTreeSet<PeerId> {
        self.check();
        self.ctx.tables.contacts.get(self.ctx.store.as_ref())
    }

    pub fn is_peer_contact(&mut self, peer_id: PeerId) -> bool {
        self.check();
        self.ctx
            .tables
            .contacts
            .contains(self.ctx.store.as_ref(), peer_id)
    }

    pub fn replace_remote_contact_count(&mut self, count: i32) {
        self.check();
        let store = self.ctx.store.as_mut();
        if self.ctx.tables.metadata.remote_contact_count(store) == count {
            return;
        }
        self.ctx.tables.metadata.set_remote_contact_count(store, count);
        self.acc.delta.updated_remote_contact_count = Some(count);
    }

    pub fn get_remote_contact_count(&self) -> i32 {
        self.check();
        self.ctx
            .tables
            .metadata
            .remote_contact_count(self.ctx.store.as_ref())
    }

    // Read states

    pub fn get_peer_read_states(&mut self, peer_id: PeerId) -> Option<CombinedPeerReadState> {
        self.check();
        self.ctx.read_state(peer_id)
    }

    fn store_read_state(&mut self, peer_id: PeerId, state: CombinedPeerReadState) -> bool {
        let current = self.ctx.read_state(peer_id);
        if current.as_ref() == Some(&state) {
            return false;
        }
        let previous = current.map_or(0, |state| state.count());
        self.ctx.tables.read_states.set(peer_id, state.clone());
        self.acc.read_state(peer_id, previous, state);
        true
    }

    fn set_sync_operation(&mut self, peer_id: PeerId, operation: Option<ReadStateSyncOperation>) {
        let table = &mut self.ctx.tables.synchronize_read_states;
        let current = table.get(self.ctx.store.as_ref(), peer_id);
        if current == operation {
            return;
        }
        match operation {
            Some(operation) => table.set(peer_id, operation),
            None => table.remove(peer_id),
        }
        self.acc
            .delta
            .synchronize_read_state_operations
            .insert(peer_id, operation);
    }

    /// Replaces the given namespaces' read states with authoritative server values
    /// and drops any pending synchronization for those peers.
    pub fn reset_incoming_read_states(
        &mut self,
        states: BTreeMap<PeerId, Vec<(MessageNamespace, PeerReadState)>>,
    ) {
        self.check();
        for (peer_id, namespaces) in states {
            let mut combined = self.ctx.read_state(peer_id).unwrap_or_default();
            for (namespace, state) in namespaces {
                match combined.states.iter_mut().find(|(ns, _)| *ns == namespace) {
                    Some((_, existing)) => *existing = state,
                    None => combined.states.push((namespace, state)),
                }
            }
            combined.states.sort_by_key(|(namespace, _)| *namespace);
            self.store_read_state(peer_id, combined);
            self.set_sync_operation(peer_id, None);
        }
    }

    pub fn confirm_synchronized_incoming_read_state(&mut self, peer_id: PeerId) {
        self.check();
        self.set_sync_operation(peer_id, None);
    }

    pub fn get_read_state_sync_operation(
        &mut self,
        peer_id: PeerId,
    ) -> Option<ReadStateSyncOperation> {
        self.check();
        self.ctx
            .tables
            .synchronize_read_states
            .get(self.ctx.store.as_ref(), peer_id)
    }

    /// Marks incoming messages up to `id` as read. Returns whether the read
    /// position advanced.
    pub fn apply_incoming_read_max_id(&mut self, id: MessageId) -> bool {
        self.check();
        let (peer_id, namespace) = (id.peer_id, id.namespace);
        let mut combined = self.ctx.read_state(peer_id).unwrap_or_default();
        let position = match combined.states.iter().position(|(ns, _)| *ns == namespace) {
            Some(position) => position,
            None => {
                combined.states.push((namespace, PeerReadState::default()));
                combined.states.len() - 1
            }
        };
        let state = &mut combined.states[position].1;
        if id.id <= state.max_incoming_read_id {
            return false;
        }
        state.max_incoming_read_id = id.id;
        state.max_known_id = state.max_known_id.max(id.id);
        state.count = count_incoming_after(&*self.ctx, peer_id, namespace, id.id);
        combined.states.sort_by_key(|(namespace, _)| *namespace);
        self.store_read_state(peer_id, combined)
    }

    pub fn apply_outgoing_read_max_id(&mut self, id: MessageId) -> bool {
        self.check();
        let Some(mut combined) = self.ctx.read_state(id.peer_id) else {
            return false;
        };
        let Some((_, state)) = combined.states.iter_mut().find(|(ns, _)| *ns == id.namespace)
        else {
            return false;
        };
        if id.id <= state.max_outgoing_read_id {
            return false;
        }
        state.max_outgoing_read_id = id.id;
        state.max_known_id = state.max_known_id.max(id.id);
        self.store_read_state(id.peer_id, combined)
    }

    /// Marks everything at or below `index` as read in every namespace of the peer
    /// and schedules a push to the server. Returns the newly read incoming ids.
    pub fn apply_interactive_read_max_index(&mut self, index: MessageIndex) -> Vec<MessageId> {
        self.check();
        let peer_id = index.id.peer_id;
        let mut namespaces: Vec<MessageNamespace> = self
            .ctx
            .read_state(peer_id)
            .map(|combined| combined.states.iter().map(|(ns, _)| *ns).collect())
            .unwrap_or_default();
        if !namespaces.contains(&index.id.namespace) {
            namespaces.push(index.id.namespace);
        }
        let mut newly_read = Vec::new();
        let mut pushed = None;
        for namespace in namespaces {
            let read_up_to = self
                .ctx
                .read_state(peer_id)
                .and_then(|combined| combined.state(namespace).map(|s| s.max_incoming_read_id))
                .unwrap_or(0);
            if read_up_to == i32::MAX {
                continue;
            }
            let store = self.ctx.store.as_ref();
            let candidates: Vec<MessageIndex> = self
                .ctx
                .tables
                .history_index
                .message_indices_in(store, peer_id, namespace, IdRange::new(read_up_to + 1, i32::MAX))
                .into_iter()
                .filter(|candidate| *candidate <= index)
                .collect();
            let Some(max_id) = candidates.iter().map(|candidate| candidate.id.id).max() else {
                continue;
            };
            for candidate in &candidates {
                if self
                    .ctx
                    .tables
                    .history
                    .get_message(store, *candidate)
                    .is_some_and(|message| message.is_incoming())
                {
                    newly_read.push(candidate.id);
                }
            }
            let id = MessageId::new(peer_id, namespace, max_id);
            if self.apply_incoming_read_max_id(id) && namespace == index.id.namespace {
                pushed = Some(max_id);
            }
        }
        if let Some(max_incoming_read_id) = pushed {
            self.set_sync_operation(
                peer_id,
                Some(ReadStateSyncOperation::Push {
                    max_incoming_read_id,
                }),
            );
        }
        newly_read.sort();
        newly_read
    }

    pub fn get_total_unread_count(&mut self) -> i32 {
        self.check();
        self.ctx
            .tables
            .metadata
            .total_unread_count(self.ctx.store.as_ref())
    }

    // Tag summaries

    pub fn replace_message_tag_summary(
        &mut self,
        key: MessageTagSummaryKey,
        summary: MessageTagSummary,
    ) {
        self.check();
        let store = self.ctx.store.as_mut();
        if self.ctx.tables.tag_summaries.get(store, &key) == Some(summary) {
            return;
        }
        self.ctx.tables.tag_summaries.set(store, &key, &summary);
        self.acc.delta.updated_tag_summaries.insert(key, summary);
    }

    pub fn get_message_tag_summary(&self, key: &MessageTagSummaryKey) -> Option<MessageTagSummary> {
        self.check();
        self.ctx
            .tables
            .tag_summaries
            .get(self.ctx.store.as_ref(), key)
    }

    // Operation log

    pub fn operation_log_next_local_index(&self, peer_id: PeerId, tag: OperationLogTag) -> i32 {
        self.check();
        self.ctx
            .tables
            .operation_log
            .next_local_index(self.ctx.store.as_ref(), peer_id, tag)
    }

    pub fn operation_log_add_entry(
        &mut self,
        peer_id: PeerId,
        tag: OperationLogTag,
        local_index: TagLocalIndex,
        merged_index: TagMergedIndex,
        contents: Vec<u8>,
    ) -> OperationLogEntry {
        self.check();
        self.ctx.tables.operation_log.add_entry(
            self.ctx.store.as_mut(),
            peer_id,
            tag,
            local_index,
            merged_index,
            contents,
            &mut self.acc.delta.merged_operation_log_operations,
        )
    }

    pub fn operation_log_remove_entry(
        &mut self,
        peer_id: PeerId,
        tag: OperationLogTag,
        local_index: i32,
    ) -> bool {
        self.check();
        self.ctx.tables.operation_log.remove_entry(
            self.ctx.store.as_mut(),
            peer_id,
            tag,
            local_index,
            &mut self.acc.delta.merged_operation_log_operations,
        )
    }

    pub fn operation_log_remove_all_entries(&mut self, peer_id: PeerId, tag: OperationLogTag) {
        self.check();
        self.ctx.tables.operation_log.remove_all_entries(
            self.ctx.store.as_mut(),
            peer_id,
            tag,
            &mut self.acc.delta.merged_operation_log_operations,
        );
    }

    /// Removes entries with a local index up to and including `up_to`.
    pub fn operation_log_remove_entries_up_to(
        &mut self,
        peer_id: PeerId,
        tag: OperationLogTag,
        up_to: i32,
    ) {
        self.check();
        self.ctx.tables.operation_log.remove_entries_up_to(
            self.ctx.store.as_mut(),
            peer_id,
            tag,
            up_to,
            &mut self.acc.delta.merged_operation_log_operations,
        );
    }

    pub fn operation_log_update_entry<F>(
        &mut self,
        peer_id: PeerId,
        tag: OperationLogTag,
        local_index: i32,
        f: F,
    ) where
        F: FnOnce(Option<&OperationLogEntry>) -> OperationLogEntryUpdate,
    {
        self.check();
        self.ctx.tables.operation_log.update_entry(
            self.ctx.store.as_mut(),
            peer_id,
            tag,
            local_index,
            f,
            &mut self.acc.delta.merged_operation_log_operations,
        );
    }

    pub fn operation_log_enumerate_entries<F>(&self, peer_id: PeerId, tag: OperationLogTag, f: F)
    where
        F: FnMut(&OperationLogEntry) -> bool,
    {
        self.check();
        self.ctx
            .tables
            .operation_log
            .enumerate_entries(self.ctx.store.as_ref(), peer_id, tag, f);
    }

    pub fn operation_log_merged_entries(
        &self,
        tag: OperationLogTag,
        from_merged_index: i32,
        limit: usize,
    ) -> Vec<OperationLogEntry> {
        self.check();
        self.ctx.tables.operation_log.merged_entries(
            self.ctx.store.as_ref(),
            tag,
            from_merged_index,
            limit,
        )
    }

    // Preferences

    pub fn get_preferences_entry(&self, key: &str) -> Option<PreferencesEntry> {
        self.check();
        self.ctx.tables.preferences.get(self.ctx.store.as_ref(), key)
    }

    pub fn set_preferences_entry(&mut self, key: &str, entry: Option<PreferencesEntry>) {
        self.check();
        let store = self.ctx.store.as_mut();
        if self.ctx.tables.preferences.get(store, key) == entry {
            return;
        }
        self.ctx.tables.preferences.set(store, key, entry.as_ref());
        self.acc
            .delta
            .preferences_operations
            .push(PreferencesOperation::Update(key.to_string(), entry));
    }

    pub fn update_preferences_entry<F>(&mut self, key: &str, f: F)
    where
        F: FnOnce(Option<PreferencesEntry>) -> Option<PreferencesEntry>,
    {
        let current = self.get_preferences_entry(key);
        self.set_preferences_entry(key, f(current));
    }

    // Ordered item lists

    fn record_item_list(
        &mut self,
        collection: OrderedItemListCollection,
        operation: OrderedItemListOperation,
    ) {
        self.acc
            .delta
            .ordered_item_list_operations
            .entry(collection)
            .or_default()
            .push(operation);
    }

    pub fn replace_ordered_item_list_items(
        &mut self,
        collection: OrderedItemListCollection,
        items: Vec<OrderedItemListEntry>,
    ) {
        self.check();
        let store = self.ctx.store.as_mut();
        if self.ctx.tables.ordered_item_lists.items(store, collection) == items {
            return;
        }
        self.ctx
            .tables
            .ordered_item_lists
            .replace(store, collection, &items);
        self.record_item_list(collection, OrderedItemListOperation::Replace(items));
    }

    pub fn add_or_move_to_first_position_in_ordered_item_list(
        &mut self,
        collection: OrderedItemListCollection,
        item: OrderedItemListEntry,
        max_count: Option<usize>,
    ) {
        self.check();
        self.ctx.tables.ordered_item_lists.add_or_move_to_first(
            self.ctx.store.as_mut(),
            collection,
            item.clone(),
            max_count,
        );
        self.record_item_list(
            collection,
            OrderedItemListOperation::AddOrMoveToFirstPosition { item, max_count },
        );
    }

    pub fn remove_ordered_item_list_item(
        &mut self,
        collection: OrderedItemListCollection,
        id: &[u8],
    ) -> bool {
        self.check();
        let removed = self
            .ctx
            .tables
            .ordered_item_lists
            .remove(self.ctx.store.as_mut(), collection, id);
        if removed {
            self.record_item_list(collection, OrderedItemListOperation::Remove(id.to_vec()));
        }
        removed
    }

    pub fn get_ordered_item_list_items(
        &self,
        collection: OrderedItemListCollection,
    ) -> Vec<OrderedItemListEntry> {
        self.check();
        self.ctx
            .tables
            .ordered_item_lists
            .items(self.ctx.store.as_ref(), collection)
    }

    // Misc

    pub fn get_state(&mut self) -> Option<Vec<u8>> {
        self.check();
        self.ctx.tables.metadata.user_state(self.ctx.store.as_ref())
    }

    pub fn set_state(&mut self, state: Vec<u8>) {
        self.check();
        self.ctx
            .tables
            .metadata
            .set_user_state(self.ctx.store.as_mut(), state.clone());
        self.acc.delta.updated_state = Some(state);
    }

    pub fn get_unsent_message_ids(&self) -> Vec<MessageId> {
        self.check();
        self.ctx.tables.unsent.ids(self.ctx.store.as_ref())
    }

    pub fn get_keychain_entry(&self, key: &str) -> Option<Vec<u8>> {
        self.check();
        self.ctx.tables.keychain.get(self.ctx.store.as_ref(), key)
    }

    pub fn set_keychain_entry(&mut self, key: &str, value: Vec<u8>) {
        self.check();
        self.ctx
            .tables
            .keychain
            .set(self.ctx.store.as_mut(), key, value);
    }

    pub fn remove_keychain_entry(&mut self, key: &str) {
        self.check();
        self.ctx
            .tables
            .keychain
            .remove(self.ctx.store.as_mut(), key);
    }
}
