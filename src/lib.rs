pub mod config;
pub(crate) mod coordinator;
pub mod delta;
pub mod error;
pub mod storage;
pub mod sync_bridge;
pub mod tables;
pub mod transaction;
pub mod types;
pub mod views;

pub use config::{ChatStoreConfig, SeedConfiguration};
pub use coordinator::ChatStoreMetrics;
pub use delta::{ChatListOperation, MessageHistoryOperation, TransactionDelta, UnsentOperation};
pub use error::{ChatStoreError, ChatStoreErrorCode};
pub use storage::{CheckpointValueBox, MemoryValueBox, ValueBox, ValueBoxKey, ValueBoxTable};
pub use sync_bridge::ChatStoreSync;
pub use transaction::{ScanMessageEntry, Transaction};
pub use types::*;
pub use views::{
    ChatListAnchor, ChatListPeerEntry, ChatListSnapshot, ChatListViewEntry,
    ContactPeerIdsSnapshot, MergedOperationLogSnapshot, MessageHistoryAnchor,
    MessageHistoryEntry, MessageHistorySnapshot, MessageHistoryViewParams, PeerViewSnapshot,
    UnreadMessageCountsItem, UnreadMessageCountsSnapshot, ViewId, ViewSubscription, ViewUpdate,
};

use crate::coordinator::context::StoreContext;
use crate::coordinator::{CoordinatorState, Job, Telemetry, in_apply_loop, spawn_apply_loop};
use crate::views::chat_list::ChatListView;
use crate::views::contacts::ContactPeerIdsView;
use crate::views::message::MessageView;
use crate::views::message_history::MessageHistoryView;
use crate::views::operation_log::MergedOperationLogView;
use crate::views::ordered_item_list::OrderedItemListView;
use crate::views::peer::PeerView;
use crate::views::preferences::PreferencesView;
use crate::views::state::StateView;
use crate::views::unread_counts::UnreadMessageCountsView;
use crate::views::MutableView;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// Layout version of the persisted tables. Stores written with another version are
/// rejected on open.
pub const SCHEMA_VERSION: i32 = 1;

/// Collects items produced by a streaming transaction body. They are delivered
/// only once the transaction has committed.
pub struct StreamSink<T> {
    items: Vec<T>,
}

impl<T> StreamSink<T> {
    pub fn send(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Handle on an open store. Clones share the same transaction queue.
#[derive(Clone)]
pub struct ChatStore {
    jobs: mpsc::Sender<Job>,
    removals: mpsc::UnboundedSender<ViewId>,
    config: Arc<ChatStoreConfig>,
    telemetry: Arc<Telemetry>,
    master_client_id: watch::Receiver<i64>,
    session_id: i64,
    runtime: Handle,
    background_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ChatStore {
    /// Opens an engine on `store` and starts its apply loop on the current runtime.
    pub async fn open(
        config: ChatStoreConfig,
        store: impl ValueBox + 'static,
    ) -> Result<Self, ChatStoreError> {
        config.validate()?;
        let config = Arc::new(config);
        let mut store: Box<dyn ValueBox> = Box::new(store);
        match store.schema_version() {
            Some(found) if found != SCHEMA_VERSION => {
                return Err(ChatStoreError::SchemaVersionMismatch {
                    expected: SCHEMA_VERSION,
                    found,
                });
            }
            Some(_) => {}
            None => {
                store.begin()?;
                store.set_schema_version(SCHEMA_VERSION);
                store.commit()?;
            }
        }

        let telemetry = Arc::new(Telemetry::default());
        let (master_tx, master_rx) = watch::channel(0);
        let ctx = StoreContext::new(store, Arc::clone(&config));
        let mut state = CoordinatorState::new(ctx, master_tx.clone(), Arc::clone(&telemetry));
        let seed_hole = config.seed.initialize_chat_list_with_hole;
        let master = state.run_transaction(|tx| {
            tx.initialize_chat_list(seed_hole);
            tx.master_client_id()
        })?;
        master_tx.send_replace(master);
        let session_id = uuid::Uuid::new_v4().as_u128() as i64;
        info!(
            schema_version = SCHEMA_VERSION,
            state_version = state.state_version(),
            session_id,
            "chat store opened"
        );

        let (jobs_tx, jobs_rx) = mpsc::channel(config.max_queued_requests);
        let (removals_tx, removals_rx) = mpsc::unbounded_channel();
        let handle = spawn_apply_loop(state, jobs_rx, removals_rx);
        Ok(Self {
            jobs: jobs_tx,
            removals: removals_tx,
            config,
            telemetry,
            master_client_id: master_rx,
            session_id,
            runtime: Handle::current(),
            background_tasks: Arc::new(Mutex::new(vec![handle])),
        })
    }

    /// Opens an in-memory store.
    pub async fn open_in_memory(config: ChatStoreConfig) -> Result<Self, ChatStoreError> {
        Self::open(config, MemoryValueBox::new()).await
    }

    /// Queues `f` behind every earlier request and waits for its result.
    async fn request<T, F>(&self, f: F) -> Result<T, ChatStoreError>
    where
        F: FnOnce(&mut CoordinatorState) -> Result<T, ChatStoreError> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::new(move |state| {
            let _ = result_tx.send(f(state));
        });
        let timeout_ms = self.config.request_timeout_ms;
        if timeout_ms == 0 {
            self.jobs
                .send(job)
                .await
                .map_err(|_| ChatStoreError::Closed)?;
            return result_rx.await.map_err(|_| ChatStoreError::Closed)?;
        }
        let timeout = Duration::from_millis(timeout_ms);
        match tokio::time::timeout(timeout, self.jobs.send(job)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(ChatStoreError::Closed),
            Err(_) => {
                self.record_timeout();
                return Err(ChatStoreError::Timeout);
            }
        }
        match tokio::time::timeout(timeout, result_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ChatStoreError::Closed),
            Err(_) => {
                self.record_timeout();
                Err(ChatStoreError::Timeout)
            }
        }
    }

    fn record_timeout(&self) {
        self.telemetry
            .timeout_rejections
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    /// Runs `body` as one transaction on the queue.
    pub async fn transaction<T, F>(&self, body: F) -> Result<T, ChatStoreError>
    where
        F: FnOnce(&mut Transaction<'_>) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.request(move |state| state.run_transaction(body)).await
    }

    /// Like [`transaction`](Self::transaction), but the body emits items through a
    /// sink. The returned receiver yields them after the commit, then closes.
    pub async fn transaction_stream<T, F>(
        &self,
        body: F,
    ) -> Result<mpsc::UnboundedReceiver<T>, ChatStoreError>
    where
        F: FnOnce(&mut Transaction<'_>, &mut StreamSink<T>) + Send + 'static,
        T: Send + 'static,
    {
        let items = self
            .request(move |state| {
                state.run_transaction(|tx| {
                    let mut sink = StreamSink { items: Vec::new() };
                    body(tx, &mut sink);
                    sink.items
                })
            })
            .await?;
        let (sender, receiver) = mpsc::unbounded_channel();
        for item in items {
            let _ = sender.send(item);
        }
        Ok(receiver)
    }

    async fn subscribe<V, P, B>(
        &self,
        prepare: P,
        build: B,
    ) -> Result<ViewSubscription<V::Snapshot>, ChatStoreError>
    where
        V: MutableView,
        P: FnOnce(&mut Transaction<'_>) + Send + 'static,
        B: FnOnce(&mut StoreContext) -> V + Send + 'static,
    {
        let view = self
            .request(move |state| state.register_view(prepare, build))
            .await?;
        Ok(ViewSubscription::new(
            view.id,
            view.initial,
            view.updates,
            view.cancelled,
            self.jobs.clone(),
            self.removals.clone(),
        ))
    }

    /// Live window over a peer's history. A never-seen peer gets its configured
    /// initial holes first.
    pub async fn subscribe_message_history(
        &self,
        params: MessageHistoryViewParams,
    ) -> Result<ViewSubscription<MessageHistorySnapshot>, ChatStoreError> {
        let peer_id = params.peer_id;
        self.subscribe(
            move |tx| tx.initialize_peer_history(peer_id),
            move |ctx| MessageHistoryView::new(ctx, &params),
        )
        .await
    }

    pub async fn subscribe_chat_list(
        &self,
        anchor: ChatListAnchor,
        count: usize,
    ) -> Result<ViewSubscription<ChatListSnapshot>, ChatStoreError> {
        self.subscribe(|_| {}, move |ctx| ChatListView::new(ctx, anchor, count))
            .await
    }

    pub async fn subscribe_peer(
        &self,
        peer_id: PeerId,
    ) -> Result<ViewSubscription<PeerViewSnapshot>, ChatStoreError> {
        self.subscribe(|_| {}, move |ctx| PeerView::new(ctx, peer_id))
            .await
    }

    pub async fn subscribe_contact_peer_ids(
        &self,
    ) -> Result<ViewSubscription<ContactPeerIdsSnapshot>, ChatStoreError> {
        self.subscribe(|_| {}, ContactPeerIdsView::new).await
    }

    pub async fn subscribe_unread_message_counts(
        &self,
        items: Vec<UnreadMessageCountsItem>,
    ) -> Result<ViewSubscription<UnreadMessageCountsSnapshot>, ChatStoreError> {
        self.subscribe(|_| {}, move |ctx| UnreadMessageCountsView::new(ctx, items))
            .await
    }

    pub async fn subscribe_merged_operation_log(
        &self,
        tag: OperationLogTag,
        limit: usize,
    ) -> Result<ViewSubscription<MergedOperationLogSnapshot>, ChatStoreError> {
        self.subscribe(|_| {}, move |ctx| MergedOperationLogView::new(ctx, tag, limit))
            .await
    }

    pub async fn subscribe_preferences(
        &self,
        keys: BTreeSet<PreferencesKey>,
    ) -> Result<ViewSubscription<BTreeMap<PreferencesKey, PreferencesEntry>>, ChatStoreError> {
        self.subscribe(|_| {}, move |ctx| PreferencesView::new(ctx, keys))
            .await
    }

    pub async fn subscribe_message(
        &self,
        id: MessageId,
    ) -> Result<ViewSubscription<Option<Message>>, ChatStoreError> {
        self.subscribe(|_| {}, move |ctx| MessageView::new(ctx, id))
            .await
    }

    pub async fn subscribe_ordered_item_list(
        &self,
        collection: OrderedItemListCollection,
    ) -> Result<ViewSubscription<Vec<OrderedItemListEntry>>, ChatStoreError> {
        self.subscribe(|_| {}, move |ctx| OrderedItemListView::new(ctx, collection))
            .await
    }

    pub async fn subscribe_state(
        &self,
    ) -> Result<ViewSubscription<Option<Vec<u8>>>, ChatStoreError> {
        self.subscribe(|_| {}, StateView::new).await
    }

    pub async fn keychain_entry(&self, key: &str) -> Result<Option<Vec<u8>>, ChatStoreError> {
        let key = key.to_string();
        self.transaction(move |tx| tx.get_keychain_entry(&key)).await
    }

    pub async fn set_keychain_entry(&self, key: &str, value: Vec<u8>) -> Result<(), ChatStoreError> {
        let key = key.to_string();
        self.transaction(move |tx| tx.set_keychain_entry(&key, value))
            .await
    }

    /// Blocking read of a keychain entry for callers outside async code. Fails
    /// instead of deadlocking when issued from inside a transaction body.
    pub fn keychain_entry_blocking(&self, key: &str) -> Result<Option<Vec<u8>>, ChatStoreError> {
        if in_apply_loop() {
            return Err(ChatStoreError::ReentrantBlockingCall);
        }
        sync_bridge::block_on_chatstore(&self.runtime, self.keychain_entry(key))
    }

    /// Records this session as the master client.
    pub async fn become_master_client(&self) -> Result<(), ChatStoreError> {
        let session_id = self.session_id;
        self.transaction(move |tx| tx.set_master_client_id(session_id))
            .await
    }

    /// Follows the master client id stored in the database.
    pub fn master_client_id(&self) -> watch::Receiver<i64> {
        self.master_client_id.clone()
    }

    pub fn is_master_client(&self) -> bool {
        *self.master_client_id.borrow() == self.session_id
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    /// State version after the last transaction this engine ran.
    pub async fn state_version(&self) -> Result<u64, ChatStoreError> {
        self.request(|state| Ok(state.state_version())).await
    }

    pub fn config(&self) -> &ChatStoreConfig {
        &self.config
    }

    pub fn metrics(&self) -> ChatStoreMetrics {
        self.telemetry.snapshot()
    }
}

impl Drop for ChatStore {
    fn drop(&mut self) {
        if Arc::strong_count(&self.background_tasks) != 1 {
            return;
        }
        for handle in self.background_tasks.lock().drain(..) {
            handle.abort();
        }
    }
}
