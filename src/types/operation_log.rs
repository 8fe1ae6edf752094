use super::ids::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationLogTag(pub u8);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub peer_id: PeerId,
    pub tag: OperationLogTag,
    pub tag_local_index: i32,
    pub merged_index: Option<i32>,
    pub contents: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagLocalIndex {
    Automatic,
    Manual(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMergedIndex {
    None,
    Automatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergedIndexUpdate {
    Remain,
    Remove,
    /// Moves the entry to the tail of the merged log under a fresh index.
    NewAutomatic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentsUpdate {
    Keep,
    Update(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationLogEntryUpdate {
    pub merged_index: MergedIndexUpdate,
    pub contents: ContentsUpdate,
}

impl OperationLogEntryUpdate {
    pub fn none() -> Self {
        Self {
            merged_index: MergedIndexUpdate::Remain,
            contents: ContentsUpdate::Keep,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergedOperationLogOperation {
    Append(OperationLogEntry),
    UpdateContents(OperationLogEntry),
    Remove {
        tag: OperationLogTag,
        merged_indices: BTreeSet<i32>,
    },
}

impl MergedOperationLogOperation {
    pub fn tag(&self) -> OperationLogTag {
        match self {
            MergedOperationLogOperation::Append(entry)
            | MergedOperationLogOperation::UpdateContents(entry) => entry.tag,
            MergedOperationLogOperation::Remove { tag, .. } => *tag,
        }
    }
}
