use crate::ChatStore;
use crate::coordinator::in_apply_loop;
use crate::error::ChatStoreError;
use crate::transaction::Transaction;
use std::future::Future;
use tokio::runtime::Handle;

/// Drives `f` to completion from synchronous code. Inside a multi-thread runtime
/// the current worker is handed off through `block_in_place` first.
pub fn block_on_chatstore<F, T>(rt: &Handle, f: F) -> T
where
    F: Future<Output = T>,
{
    match Handle::try_current() {
        Ok(_) => tokio::task::block_in_place(|| rt.block_on(f)),
        Err(_) => rt.block_on(f),
    }
}

/// Blocking facade over [`ChatStore`] for callers without an async context.
pub struct ChatStoreSync {
    inner: ChatStore,
    rt: Handle,
}

impl ChatStoreSync {
    pub fn new(inner: ChatStore, rt: Handle) -> Self {
        Self { inner, rt }
    }

    pub fn inner(&self) -> &ChatStore {
        &self.inner
    }

    pub fn transaction<T, F>(&self, body: F) -> Result<T, ChatStoreError>
    where
        F: FnOnce(&mut Transaction<'_>) -> T + Send + 'static,
        T: Send + 'static,
    {
        if in_apply_loop() {
            return Err(ChatStoreError::ReentrantBlockingCall);
        }
        block_on_chatstore(&self.rt, self.inner.transaction(body))
    }

    pub fn keychain_entry(&self, key: &str) -> Result<Option<Vec<u8>>, ChatStoreError> {
        self.inner.keychain_entry_blocking(key)
    }

    pub fn set_keychain_entry(&self, key: &str, value: Vec<u8>) -> Result<(), ChatStoreError> {
        block_on_chatstore(&self.rt, self.inner.set_keychain_entry(key, value))
    }

    pub fn become_master_client(&self) -> Result<(), ChatStoreError> {
        block_on_chatstore(&self.rt, self.inner.become_master_client())
    }

    pub fn state_version(&self) -> Result<u64, ChatStoreError> {
        block_on_chatstore(&self.rt, self.inner.state_version())
    }
}
