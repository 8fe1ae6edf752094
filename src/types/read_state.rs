use super::ids::{MessageIndex, MessageNamespace};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeerReadState {
    pub max_incoming_read_id: i32,
    pub max_outgoing_read_id: i32,
    pub max_known_id: i32,
    pub count: i32,
}

impl PeerReadState {
    pub fn new(max_incoming_read_id: i32, max_outgoing_read_id: i32, count: i32) -> Self {
        Self {
            max_incoming_read_id,
            max_outgoing_read_id,
            max_known_id: max_incoming_read_id.max(max_outgoing_read_id),
            count,
        }
    }

    pub fn is_incoming_message_read(&self, id: i32) -> bool {
        id <= self.max_incoming_read_id
    }

    pub fn is_outgoing_message_read(&self, id: i32) -> bool {
        id <= self.max_outgoing_read_id
    }
}

/// Read states of every message namespace of one peer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CombinedPeerReadState {
    pub states: Vec<(MessageNamespace, PeerReadState)>,
}

impl CombinedPeerReadState {
    pub fn count(&self) -> i32 {
        self.states.iter().map(|(_, state)| state.count.max(0)).sum()
    }

    pub fn state(&self, namespace: MessageNamespace) -> Option<&PeerReadState> {
        self.states
            .iter()
            .find(|(ns, _)| *ns == namespace)
            .map(|(_, state)| state)
    }

    pub fn is_incoming_message_index_read(&self, index: MessageIndex) -> bool {
        self.state(index.id.namespace)
            .is_some_and(|state| state.is_incoming_message_read(index.id.id))
    }
}

/// Pending synchronization of a locally changed read state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadStateSyncOperation {
    /// Ask the server for the authoritative state.
    Validate,
    /// Push the local incoming read position to the server.
    Push { max_incoming_read_id: i32 },
}
