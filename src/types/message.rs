use super::ids::{MessageId, MessageIndex, MessageNamespace, MessageTags, PeerId};
use super::peer::Peer;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MessageFlags(pub u32);

impl MessageFlags {
    pub const INCOMING: MessageFlags = MessageFlags(1);
    pub const UNSENT: MessageFlags = MessageFlags(1 << 1);
    pub const FAILED: MessageFlags = MessageFlags(1 << 2);

    pub fn contains(self, other: MessageFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: MessageFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: MessageFlags) {
        self.0 &= !other.0;
    }

    pub fn union(self, other: MessageFlags) -> Self {
        MessageFlags(self.0 | other.0)
    }
}

/// Id of a message handed to `add_messages`: either fully assigned or left to the
/// store, which picks the next id after the current top of the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreMessageId {
    Id(MessageId),
    Partial(PeerId, MessageNamespace),
}

impl StoreMessageId {
    pub fn peer_id(&self) -> PeerId {
        match self {
            StoreMessageId::Id(id) => id.peer_id,
            StoreMessageId::Partial(peer_id, _) => *peer_id,
        }
    }

    pub fn namespace(&self) -> MessageNamespace {
        match self {
            StoreMessageId::Id(id) => id.namespace,
            StoreMessageId::Partial(_, namespace) => *namespace,
        }
    }
}

/// Message as supplied by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMessage {
    pub id: StoreMessageId,
    pub globally_unique_id: Option<i64>,
    pub timestamp: i32,
    pub flags: MessageFlags,
    pub tags: MessageTags,
    pub author_id: Option<PeerId>,
    pub text: String,
    pub attributes: Vec<u8>,
}

impl StoreMessage {
    pub fn new(id: MessageId, timestamp: i32, text: impl Into<String>) -> Self {
        Self {
            id: StoreMessageId::Id(id),
            globally_unique_id: None,
            timestamp,
            flags: MessageFlags::default(),
            tags: MessageTags::NONE,
            author_id: None,
            text: text.into(),
            attributes: Vec::new(),
        }
    }

    pub fn incoming(mut self) -> Self {
        self.flags.insert(MessageFlags::INCOMING);
        self
    }

    pub fn with_tags(mut self, tags: MessageTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_author(mut self, author_id: PeerId) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn with_global_id(mut self, globally_unique_id: i64) -> Self {
        self.globally_unique_id = Some(globally_unique_id);
        self
    }
}

/// Persisted form of a message: ids are resolved, references are not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateMessage {
    pub stable_id: u32,
    pub id: MessageId,
    pub globally_unique_id: Option<i64>,
    pub timestamp: i32,
    pub flags: MessageFlags,
    pub tags: MessageTags,
    pub author_id: Option<PeerId>,
    pub text: String,
    pub attributes: Vec<u8>,
}

impl IntermediateMessage {
    pub fn index(&self) -> MessageIndex {
        MessageIndex::new(self.id, self.timestamp)
    }

    pub fn is_incoming(&self) -> bool {
        self.flags.contains(MessageFlags::INCOMING)
    }

    pub fn to_store_message(&self) -> StoreMessage {
        StoreMessage {
            id: StoreMessageId::Id(self.id),
            globally_unique_id: self.globally_unique_id,
            timestamp: self.timestamp,
            flags: self.flags,
            tags: self.tags,
            author_id: self.author_id,
            text: self.text.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

/// Read model of a message with its author resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub stable_id: u32,
    pub id: MessageId,
    pub globally_unique_id: Option<i64>,
    pub timestamp: i32,
    pub flags: MessageFlags,
    pub tags: MessageTags,
    pub author: Option<Peer>,
    pub text: String,
    pub attributes: Vec<u8>,
}

impl Message {
    pub fn index(&self) -> MessageIndex {
        MessageIndex::new(self.id, self.timestamp)
    }
}

/// Where a batch passed to `add_messages` sits relative to known history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMessagesLocation {
    /// Sparse messages; only their own ids become known.
    Random,
    /// A contiguous block: every id between the lowest and highest added id is known.
    UpperHistoryBlock,
}

/// Result of an `update_message` callback.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreMessageUpdate {
    Skip,
    Update(StoreMessage),
}
