use crate::error::ChatStoreError;
use crate::types::{ChatListHole, MessageNamespace, MessageTags, PeerNamespace};

/// Data written into a freshly created store.
#[derive(Debug, Clone, Default)]
pub struct SeedConfiguration {
    /// Hole placed into an empty chat list so the client knows to fetch it.
    pub initialize_chat_list_with_hole: Option<ChatListHole>,
    /// For each peer namespace, the message namespaces whose history of a newly
    /// seen peer starts as one unbounded hole.
    pub initialize_message_namespaces_with_holes: Vec<(PeerNamespace, MessageNamespace)>,
    /// Tag bits that get their own history partition.
    pub existing_message_tags: MessageTags,
    /// Peer namespaces that only enter the chat list through an explicit inclusion.
    pub peer_namespaces_required_for_chat_list_inclusion: Vec<PeerNamespace>,
}

/// Runtime configuration for a chat store.
#[derive(Debug, Clone)]
pub struct ChatStoreConfig {
    pub max_queued_requests: usize,
    /// Applies to queue submission and to waiting for the result; `0` disables it.
    pub request_timeout_ms: u64,
    pub seed: SeedConfiguration,
    /// Message namespaces whose ids are unique across peers.
    pub global_message_id_namespaces: Vec<MessageNamespace>,
    pub scan_page_size: usize,
}

impl Default for ChatStoreConfig {
    fn default() -> Self {
        Self {
            max_queued_requests: 256,
            request_timeout_ms: 5_000,
            seed: SeedConfiguration::default(),
            global_message_id_namespaces: Vec::new(),
            scan_page_size: 64,
        }
    }
}

impl ChatStoreConfig {
    /// No timeouts, so a paused debugger does not fail pending requests.
    pub fn development() -> Self {
        Self {
            request_timeout_ms: 0,
            ..Self::default()
        }
    }

    /// Small queue and short deadline for interactive clients.
    pub fn low_latency() -> Self {
        Self {
            max_queued_requests: 32,
            request_timeout_ms: 1_000,
            scan_page_size: 32,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: SeedConfiguration) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), ChatStoreError> {
        if self.max_queued_requests == 0 {
            return Err(ChatStoreError::InvalidConfig {
                message: "max_queued_requests must be > 0".into(),
            });
        }
        if self.scan_page_size == 0 {
            return Err(ChatStoreError::InvalidConfig {
                message: "scan_page_size must be > 0".into(),
            });
        }
        Ok(())
    }

    pub(crate) fn chat_list_inclusion_required(&self, namespace: PeerNamespace) -> bool {
        self.seed
            .peer_namespaces_required_for_chat_list_inclusion
            .contains(&namespace)
    }

    pub(crate) fn initial_hole_namespaces(
        &self,
        peer_namespace: PeerNamespace,
    ) -> impl Iterator<Item = MessageNamespace> + '_ {
        self.seed
            .initialize_message_namespaces_with_holes
            .iter()
            .filter(move |(peer, _)| *peer == peer_namespace)
            .map(|(_, namespace)| *namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_validate() {
        ChatStoreConfig::default().validate().expect("default");
        ChatStoreConfig::development().validate().expect("development");
        ChatStoreConfig::low_latency().validate().expect("low latency");
        let invalid = ChatStoreConfig {
            max_queued_requests: 0,
            ..ChatStoreConfig::default()
        };
        assert!(invalid.validate().is_err());
    }
}
