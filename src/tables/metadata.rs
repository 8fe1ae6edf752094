use super::Table;
use crate::storage::codec;
use crate::storage::key::ValueBoxKey;
use crate::storage::value_box::{ValueBox, ValueBoxTable};
use crate::types::PeerId;
use std::collections::HashSet;

const USER_STATE: u8 = 1;
const MASTER_CLIENT_ID: u8 = 2;
const REMOTE_CONTACT_COUNT: u8 = 3;
const TOTAL_UNREAD_COUNT: u8 = 4;
const CHAT_LIST_INITIALIZED: u8 = 5;
const PEER_HISTORY_INITIALIZED: u8 = 6;

/// Store-wide scalar values. Writes go straight to the store; reads are cached.
pub struct MetadataTable {
    table: ValueBoxTable,
    user_state: Option<Option<Vec<u8>>>,
    master_client_id: Option<i64>,
    total_unread_count: Option<i32>,
    initialized_peers: HashSet<PeerId>,
}

impl MetadataTable {
    pub fn new(table: ValueBoxTable) -> Self {
        Self {
            table,
            user_state: None,
            master_client_id: None,
            total_unread_count: None,
            initialized_peers: HashSet::new(),
        }
    }

    fn key(tag: u8) -> ValueBoxKey {
        ValueBoxKey::new().u8(tag)
    }

    pub fn user_state(&mut self, store: &dyn ValueBox) -> Option<Vec<u8>> {
        if let Some(cached) = &self.user_state {
            return cached.clone();
        }
        let value = store.get(self.table, &Self::key(USER_STATE));
        self.user_state = Some(value.clone());
        value
    }

    pub fn set_user_state(&mut self, store: &mut dyn ValueBox, state: Vec<u8>) {
        store.set(self.table, &Self::key(USER_STATE), state.clone());
        self.user_state = Some(Some(state));
    }

    pub fn master_client_id(&mut self, store: &dyn ValueBox) -> i64 {
        if let Some(id) = self.master_client_id {
            return id;
        }
        let id = codec::get(store, self.table, &Self::key(MASTER_CLIENT_ID)).unwrap_or(0);
        self.master_client_id = Some(id);
        id
    }

    pub fn set_master_client_id(&mut self, store: &mut dyn ValueBox, id: i64) {
        codec::put(store, self.table, &Self::key(MASTER_CLIENT_ID), &id);
        self.master_client_id = Some(id);
    }

    pub fn remote_contact_count(&self, store: &dyn ValueBox) -> i32 {
        codec::get(store, self.table, &Self::key(REMOTE_CONTACT_COUNT)).unwrap_or(0)
    }

    pub fn set_remote_contact_count(&mut self, store: &mut dyn ValueBox, count: i32) {
        codec::put(store, self.table, &Self::key(REMOTE_CONTACT_COUNT), &count);
    }

    pub fn total_unread_count(&mut self, store: &dyn ValueBox) -> i32 {
        if let Some(count) = self.total_unread_count {
            return count;
        }
        let count = codec::get(store, self.table, &Self::key(TOTAL_UNREAD_COUNT)).unwrap_or(0);
        self.total_unread_count = Some(count);
        count
    }

    pub fn set_total_unread_count(&mut self, store: &mut dyn ValueBox, count: i32) {
        codec::put(store, self.table, &Self::key(TOTAL_UNREAD_COUNT), &count);
        self.total_unread_count = Some(count);
    }

    pub fn is_chat_list_initialized(&self, store: &dyn ValueBox) -> bool {
        store
            .get(self.table, &Self::key(CHAT_LIST_INITIALIZED))
            .is_some()
    }

    pub fn set_chat_list_initialized(&mut self, store: &mut dyn ValueBox) {
        store.set(self.table, &Self::key(CHAT_LIST_INITIALIZED), vec![1]);
    }

    pub fn is_peer_history_initialized(&mut self, store: &dyn ValueBox, peer_id: PeerId) -> bool {
        if self.initialized_peers.contains(&peer_id) {
            return true;
        }
        let key = Self::key(PEER_HISTORY_INITIALIZED).i64(peer_id.to_i64());
        let initialized = store.get(self.table, &key).is_some();
        if initialized {
            self.initialized_peers.insert(peer_id);
        }
        initialized
    }

    pub fn set_peer_history_initialized(&mut self, store: &mut dyn ValueBox, peer_id: PeerId) {
        let key = Self::key(PEER_HISTORY_INITIALIZED).i64(peer_id.to_i64());
        store.set(self.table, &key, vec![1]);
        self.initialized_peers.insert(peer_id);
    }
}

impl Table for MetadataTable {
    fn before_commit(&mut self, _store: &mut dyn ValueBox) {}

    fn clear_memory_cache(&mut self) {
        self.user_state = None;
        self.master_client_id = None;
        self.total_unread_count = None;
        self.initialized_peers.clear();
    }
}
