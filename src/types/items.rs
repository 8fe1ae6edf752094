use super::ids::{MessageNamespace, MessageTags, PeerId};
use serde::{Deserialize, Serialize};

pub type PreferencesKey = String;
pub type OrderedItemListCollection = i32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferencesEntry(pub Vec<u8>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreferencesOperation {
    Update(PreferencesKey, Option<PreferencesEntry>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedItemListEntry {
    pub id: Vec<u8>,
    pub contents: Vec<u8>,
}

impl OrderedItemListEntry {
    pub fn new(id: impl Into<Vec<u8>>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            contents: contents.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderedItemListOperation {
    Replace(Vec<OrderedItemListEntry>),
    AddOrMoveToFirstPosition {
        item: OrderedItemListEntry,
        max_count: Option<usize>,
    },
    Remove(Vec<u8>),
}

/// Key of a per-tag message count maintained alongside history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageTagSummaryKey {
    pub tag: MessageTags,
    pub peer_id: PeerId,
    pub namespace: MessageNamespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageTagSummary {
    pub count: i32,
    pub max_id: i32,
}
