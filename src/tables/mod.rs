//! Storage tables. Each owns disjoint key ranges of the byte store, keeps an
//! in-memory cache that is only touched from the transaction queue, and takes part
//! in the transaction lifecycle through [`Table`].

pub mod chat_list;
pub mod contacts;
pub mod global_ids;
pub mod history;
pub mod history_index;
pub mod item_lists;
pub mod keychain;
pub mod metadata;
pub mod operation_log;
pub mod peer_values;
pub mod preferences;
pub mod tag_summaries;
pub mod tags;
pub mod unsent;

use crate::storage::value_box::{ValueBox, ValueBoxTable};
use crate::types::{
    CachedPeerData, CombinedPeerReadState, Peer, PeerNotificationSettings, PeerPresence,
    ReadStateSyncOperation,
};

pub use chat_list::{ChatListIndexTable, ChatListTable};
pub use contacts::ContactsTable;
pub use global_ids::GlobalMessageIdsTable;
pub use history::{HistoryEntry, HistoryTable};
pub use history_index::{HistoryIndexTable, IndexOperation};
pub use item_lists::OrderedItemListTable;
pub use keychain::KeychainTable;
pub use metadata::MetadataTable;
pub use operation_log::OperationLogTable;
pub use peer_values::PeerValueTable;
pub use preferences::PreferencesTable;
pub use tag_summaries::TagSummaryTable;
pub use tags::TagsTable;
pub use unsent::UnsentTable;

/// Lifecycle hooks every table takes part in.
pub trait Table: Send {
    /// Writes table-local buffered state into the store before it commits.
    fn before_commit(&mut self, store: &mut dyn ValueBox);

    /// Drops cached state so the next read goes to the store.
    fn clear_memory_cache(&mut self);
}

pub(crate) mod ids {
    use super::ValueBoxTable;

    pub const METADATA: ValueBoxTable = ValueBoxTable(0);
    pub const KEYCHAIN: ValueBoxTable = ValueBoxTable(1);
    pub const PEERS: ValueBoxTable = ValueBoxTable(2);
    pub const GLOBAL_MESSAGE_IDS: ValueBoxTable = ValueBoxTable(3);
    pub const HISTORY_INDEX: ValueBoxTable = ValueBoxTable(4);
    pub const HISTORY_METADATA: ValueBoxTable = ValueBoxTable(5);
    pub const HISTORY: ValueBoxTable = ValueBoxTable(7);
    pub const CHAT_LIST_INDEX: ValueBoxTable = ValueBoxTable(8);
    pub const CHAT_LIST: ValueBoxTable = ValueBoxTable(9);
    pub const UNSENT: ValueBoxTable = ValueBoxTable(11);
    pub const TAGS: ValueBoxTable = ValueBoxTable(12);
    pub const PEER_CHAT_STATE: ValueBoxTable = ValueBoxTable(13);
    pub const READ_STATE: ValueBoxTable = ValueBoxTable(14);
    pub const SYNCHRONIZE_READ_STATE: ValueBoxTable = ValueBoxTable(15);
    pub const CONTACTS: ValueBoxTable = ValueBoxTable(16);
    pub const CACHED_PEER_DATA: ValueBoxTable = ValueBoxTable(18);
    pub const NOTIFICATION_SETTINGS: ValueBoxTable = ValueBoxTable(19);
    pub const PRESENCES: ValueBoxTable = ValueBoxTable(20);
    pub const OPERATION_LOG_METADATA: ValueBoxTable = ValueBoxTable(29);
    pub const OPERATION_LOG_MERGED: ValueBoxTable = ValueBoxTable(30);
    pub const OPERATION_LOG: ValueBoxTable = ValueBoxTable(31);
    pub const PREFERENCES: ValueBoxTable = ValueBoxTable(35);
    pub const ORDERED_ITEM_LISTS: ValueBoxTable = ValueBoxTable(38);
    pub const TAG_SUMMARIES: ValueBoxTable = ValueBoxTable(44);
}

/// Every table of one store.
pub struct Tables {
    pub metadata: MetadataTable,
    pub keychain: KeychainTable,
    pub peers: PeerValueTable<Peer>,
    pub global_ids: GlobalMessageIdsTable,
    pub history_index: HistoryIndexTable,
    pub history: HistoryTable,
    pub tags: TagsTable,
    pub unsent: UnsentTable,
    pub chat_list_index: ChatListIndexTable,
    pub chat_list: ChatListTable,
    pub peer_chat_states: PeerValueTable<Vec<u8>>,
    pub read_states: PeerValueTable<CombinedPeerReadState>,
    pub synchronize_read_states: PeerValueTable<ReadStateSyncOperation>,
    pub contacts: ContactsTable,
    pub cached_peer_data: PeerValueTable<CachedPeerData>,
    pub notification_settings: PeerValueTable<PeerNotificationSettings>,
    pub presences: PeerValueTable<PeerPresence>,
    pub operation_log: OperationLogTable,
    pub preferences: PreferencesTable,
    pub ordered_item_lists: OrderedItemListTable,
    pub tag_summaries: TagSummaryTable,
}

impl Tables {
    pub fn new() -> Self {
        Self {
            metadata: MetadataTable::new(ids::METADATA),
            keychain: KeychainTable::new(ids::KEYCHAIN),
            peers: PeerValueTable::new(ids::PEERS),
            global_ids: GlobalMessageIdsTable::new(ids::GLOBAL_MESSAGE_IDS),
            history_index: HistoryIndexTable::new(ids::HISTORY_INDEX, ids::HISTORY_METADATA),
            history: HistoryTable::new(ids::HISTORY),
            tags: TagsTable::new(ids::TAGS),
            unsent: UnsentTable::new(ids::UNSENT),
            chat_list_index: ChatListIndexTable::new(ids::CHAT_LIST_INDEX),
            chat_list: ChatListTable::new(ids::CHAT_LIST),
            peer_chat_states: PeerValueTable::new(ids::PEER_CHAT_STATE),
            read_states: PeerValueTable::new(ids::READ_STATE),
            synchronize_read_states: PeerValueTable::new(ids::SYNCHRONIZE_READ_STATE),
            contacts: ContactsTable::new(ids::CONTACTS),
            cached_peer_data: PeerValueTable::new(ids::CACHED_PEER_DATA),
            notification_settings: PeerValueTable::new(ids::NOTIFICATION_SETTINGS),
            presences: PeerValueTable::new(ids::PRESENCES),
            operation_log: OperationLogTable::new(
                ids::OPERATION_LOG,
                ids::OPERATION_LOG_METADATA,
                ids::OPERATION_LOG_MERGED,
            ),
            preferences: PreferencesTable::new(ids::PREFERENCES),
            ordered_item_lists: OrderedItemListTable::new(ids::ORDERED_ITEM_LISTS),
            tag_summaries: TagSummaryTable::new(ids::TAG_SUMMARIES),
        }
    }

    pub fn all_mut(&mut self) -> [&mut dyn Table; 21] {
        [
            &mut self.metadata,
            &mut self.keychain,
            &mut self.peers,
            &mut self.global_ids,
            &mut self.history_index,
            &mut self.history,
            &mut self.tags,
            &mut self.unsent,
            &mut self.chat_list_index,
            &mut self.chat_list,
            &mut self.peer_chat_states,
            &mut self.read_states,
            &mut self.synchronize_read_states,
            &mut self.contacts,
            &mut self.cached_peer_data,
            &mut self.notification_settings,
            &mut self.presences,
            &mut self.operation_log,
            &mut self.preferences,
            &mut self.ordered_item_lists,
            &mut self.tag_summaries,
        ]
    }

    pub fn before_commit(&mut self, store: &mut dyn ValueBox) {
        for table in self.all_mut() {
            table.before_commit(store);
        }
    }

    pub fn clear_memory_cache(&mut self) {
        for table in self.all_mut() {
            table.clear_memory_cache();
        }
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self::new()
    }
}
