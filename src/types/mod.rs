pub mod chat_list;
pub mod hole;
pub mod ids;
pub mod items;
pub mod message;
pub mod operation_log;
pub mod peer;
pub mod read_state;

pub use chat_list::{ChatListHole, ChatListInclusion, ChatListIndex};
pub use hole::{HoleFill, HoleFillDirection, IdRange, MessageHistoryHole};
pub use ids::{MessageId, MessageIndex, MessageNamespace, MessageTags, PeerId, PeerNamespace};
pub use items::{
    MessageTagSummary, MessageTagSummaryKey, OrderedItemListCollection, OrderedItemListEntry,
    OrderedItemListOperation, PreferencesEntry, PreferencesKey, PreferencesOperation,
};
pub use message::{
    AddMessagesLocation, IntermediateMessage, Message, MessageFlags, StoreMessage,
    StoreMessageId, StoreMessageUpdate,
};
pub use operation_log::{
    ContentsUpdate, MergedIndexUpdate, MergedOperationLogOperation, OperationLogEntry,
    OperationLogEntryUpdate, OperationLogTag, TagLocalIndex, TagMergedIndex,
};
pub use peer::{CachedPeerData, Peer, PeerNotificationSettings, PeerPresence};
pub use read_state::{CombinedPeerReadState, PeerReadState, ReadStateSyncOperation};
