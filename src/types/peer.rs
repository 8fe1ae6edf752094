use super::ids::{MessageId, PeerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub name: String,
    /// Secondary peer whose history is shown together with this one.
    pub associated_peer_id: Option<PeerId>,
    pub payload: Vec<u8>,
}

impl Peer {
    pub fn new(id: PeerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            associated_peer_id: None,
            payload: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CachedPeerData {
    pub peer_ids: Vec<PeerId>,
    pub message_ids: Vec<MessageId>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerPresence {
    pub last_activity: i32,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeerNotificationSettings {
    pub muted: bool,
    pub payload: Vec<u8>,
}

impl PeerNotificationSettings {
    pub fn muted() -> Self {
        Self {
            muted: true,
            payload: Vec::new(),
        }
    }
}
