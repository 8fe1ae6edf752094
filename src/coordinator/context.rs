use crate::config::ChatStoreConfig;
use crate::storage::value_box::ValueBox;
use crate::tables::Tables;
use crate::types::{
    CombinedPeerReadState, IntermediateMessage, Message, MessageId, Peer, PeerId,
};
use std::sync::Arc;

/// Store and tables as seen from inside the transaction queue.
pub struct StoreContext {
    pub(crate) store: Box<dyn ValueBox>,
    pub(crate) tables: Tables,
    pub(crate) config: Arc<ChatStoreConfig>,
}

impl StoreContext {
    pub(crate) fn new(store: Box<dyn ValueBox>, config: Arc<ChatStoreConfig>) -> Self {
        Self {
            store,
            tables: Tables::new(),
            config,
        }
    }

    pub(crate) fn intermediate_message(&self, id: MessageId) -> Option<IntermediateMessage> {
        let index = self.tables.history_index.message_index(self.store.as_ref(), id)?;
        self.tables.history.get_message(self.store.as_ref(), index)
    }

    pub(crate) fn render_message(&mut self, message: IntermediateMessage) -> Message {
        let author = message
            .author_id
            .and_then(|author_id| self.peer(author_id));
        Message {
            stable_id: message.stable_id,
            id: message.id,
            globally_unique_id: message.globally_unique_id,
            timestamp: message.timestamp,
            flags: message.flags,
            tags: message.tags,
            author,
            text: message.text,
            attributes: message.attributes,
        }
    }

    pub(crate) fn message(&mut self, id: MessageId) -> Option<Message> {
        let message = self.intermediate_message(id)?;
        Some(self.render_message(message))
    }

    pub(crate) fn peer(&mut self, peer_id: PeerId) -> Option<Peer> {
        self.tables.peers.get(self.store.as_ref(), peer_id)
    }

    pub(crate) fn read_state(&mut self, peer_id: PeerId) -> Option<CombinedPeerReadState> {
        self.tables.read_states.get(self.store.as_ref(), peer_id)
    }
}
