//! The transaction queue: one apply task owns the store, the tables and the view
//! tracker, and runs submitted jobs strictly in submission order.

pub(crate) mod chat_list;
pub mod context;
pub(crate) mod history;

use crate::delta::TransactionAccumulator;
use crate::error::ChatStoreError;
use crate::transaction::Transaction;
use crate::views::tracker::{NewView, ViewTracker};
use crate::views::{MutableView, ViewId};
use context::StoreContext;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Unit of work executed on the apply task.
pub(crate) type Job = Box<dyn FnOnce(&mut CoordinatorState) + Send>;

tokio::task_local! {
    static IN_APPLY_LOOP: ();
}

/// Whether the caller is running inside a job on the apply task.
pub(crate) fn in_apply_loop() -> bool {
    IN_APPLY_LOOP.try_with(|_| ()).is_ok()
}

#[derive(Debug, Default)]
pub(crate) struct Telemetry {
    pub transactions_total: AtomicU64,
    pub empty_transactions: AtomicU64,
    pub transaction_errors: AtomicU64,
    pub timeout_rejections: AtomicU64,
    pub external_refreshes: AtomicU64,
    pub view_updates: AtomicU64,
    pub total_apply_micros: AtomicU64,
    pub active_views: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatStoreMetrics {
    pub transactions_total: u64,
    pub empty_transactions: u64,
    pub transaction_errors: u64,
    pub timeout_rejections: u64,
    pub external_refreshes: u64,
    pub view_updates: u64,
    pub avg_apply_micros: u64,
    pub active_views: usize,
}

impl Telemetry {
    pub fn snapshot(&self) -> ChatStoreMetrics {
        let transactions_total = self.transactions_total.load(Ordering::Relaxed);
        let total_apply_micros = self.total_apply_micros.load(Ordering::Relaxed);
        let avg_apply_micros = if transactions_total == 0 {
            0
        } else {
            total_apply_micros / transactions_total
        };
        ChatStoreMetrics {
            transactions_total,
            empty_transactions: self.empty_transactions.load(Ordering::Relaxed),
            transaction_errors: self.transaction_errors.load(Ordering::Relaxed),
            timeout_rejections: self.timeout_rejections.load(Ordering::Relaxed),
            external_refreshes: self.external_refreshes.load(Ordering::Relaxed),
            view_updates: self.view_updates.load(Ordering::Relaxed),
            avg_apply_micros,
            active_views: self.active_views.load(Ordering::Relaxed),
        }
    }
}

pub(crate) struct CoordinatorState {
    ctx: StoreContext,
    tracker: ViewTracker,
    observed_state_version: u64,
    master_client_id: watch::Sender<i64>,
    poisoned: Option<String>,
    telemetry: Arc<Telemetry>,
}

impl CoordinatorState {
    pub fn new(
        ctx: StoreContext,
        master_client_id: watch::Sender<i64>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        let observed_state_version = ctx.store.state_version();
        Self {
            ctx,
            tracker: ViewTracker::new(),
            observed_state_version,
            master_client_id,
            poisoned: None,
            telemetry,
        }
    }

    pub fn state_version(&self) -> u64 {
        self.observed_state_version
    }

    fn poison(&mut self, err: ChatStoreError) -> ChatStoreError {
        error!(error = %err, code = err.code_str(), "store failure, rejecting further transactions");
        self.telemetry
            .transaction_errors
            .fetch_add(1, Ordering::Relaxed);
        self.poisoned = Some(err.to_string());
        err
    }

    /// Drops caches and rebuilds every view when another writer committed since
    /// the last transaction of this engine.
    fn detect_external_mutation(&mut self) {
        let current = self.ctx.store.state_version();
        if current == self.observed_state_version {
            return;
        }
        warn!(
            observed = self.observed_state_version,
            current, "store changed by another writer, reloading views"
        );
        self.ctx.tables.clear_memory_cache();
        self.observed_state_version = current;
        let reloaded = self
            .tracker
            .refresh_views_due_to_external_transaction(&mut self.ctx, current);
        self.telemetry
            .external_refreshes
            .fetch_add(1, Ordering::Relaxed);
        self.telemetry
            .view_updates
            .fetch_add(reloaded as u64, Ordering::Relaxed);
        let master = self
            .ctx
            .tables
            .metadata
            .master_client_id(self.ctx.store.as_ref());
        self.master_client_id.send_if_modified(|id| {
            let changed = *id != master;
            *id = master;
            changed
        });
    }

    /// Runs `body` as one store transaction and publishes its delta.
    pub fn run_transaction<T, F>(&mut self, body: F) -> Result<T, ChatStoreError>
    where
        F: FnOnce(&mut Transaction<'_>) -> T,
    {
        if let Some(reason) = &self.poisoned {
            return Err(ChatStoreError::Poisoned {
                reason: reason.clone(),
            });
        }
        let started = Instant::now();
        if let Err(err) = self.ctx.store.begin() {
            return Err(self.poison(err));
        }
        self.detect_external_mutation();

        let mut acc = TransactionAccumulator::new();
        let value = {
            let mut transaction = Transaction::new(&mut self.ctx, &mut acc);
            let value = body(&mut transaction);
            transaction.dispose();
            value
        };
        chat_list::replay_chat_list(&mut self.ctx, &mut acc);
        chat_list::finalize_unread_count(&mut self.ctx, &mut acc);
        self.ctx.tables.before_commit(self.ctx.store.as_mut());

        let empty = acc.delta.is_empty();
        let version = if empty {
            self.observed_state_version
        } else {
            self.observed_state_version + 1
        };
        if !empty {
            self.ctx.store.set_state_version(version);
        }
        if let Err(err) = self.ctx.store.commit() {
            self.ctx.tables.clear_memory_cache();
            return Err(self.poison(err));
        }
        self.observed_state_version = version;
        self.telemetry
            .transactions_total
            .fetch_add(1, Ordering::Relaxed);
        if empty {
            self.telemetry
                .empty_transactions
                .fetch_add(1, Ordering::Relaxed);
        } else {
            let delta = acc.into_delta(version);
            let updated = self.tracker.update_views(&mut self.ctx, &delta);
            if let Some(id) = delta.updated_master_client_id {
                self.master_client_id.send_replace(id);
            }
            debug!(
                state_version = version,
                history_operations = delta.history_operation_count(),
                chat_list_operations = delta.chat_list_operations.len(),
                views_updated = updated,
                "transaction committed"
            );
            self.telemetry
                .view_updates
                .fetch_add(updated as u64, Ordering::Relaxed);
            self.telemetry
                .active_views
                .store(self.tracker.len(), Ordering::Relaxed);
        }
        self.telemetry.total_apply_micros.fetch_add(
            u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        Ok(value)
    }

    /// Runs `prepare` as a transaction, then builds the view against the committed
    /// state and registers it.
    pub fn register_view<V, P, B>(
        &mut self,
        prepare: P,
        build: B,
    ) -> Result<NewView<V::Snapshot>, ChatStoreError>
    where
        V: MutableView,
        P: FnOnce(&mut Transaction<'_>),
        B: FnOnce(&mut StoreContext) -> V,
    {
        self.run_transaction(prepare)?;
        let view = build(&mut self.ctx);
        let registered = self.tracker.add_view(view);
        self.telemetry
            .active_views
            .store(self.tracker.len(), Ordering::Relaxed);
        Ok(registered)
    }

    pub fn remove_view(&mut self, id: ViewId) {
        self.tracker.remove_view(id);
        self.telemetry
            .active_views
            .store(self.tracker.len(), Ordering::Relaxed);
    }
}

/// Spawns the apply loop. Removal requests from dropped subscriptions are served
/// ahead of queued jobs.
pub(crate) fn spawn_apply_loop(
    mut state: CoordinatorState,
    mut jobs: mpsc::Receiver<Job>,
    mut removals: mpsc::UnboundedReceiver<ViewId>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                Some(id) = removals.recv() => {
                    state.remove_view(id);
                }
                job = jobs.recv() => match job {
                    Some(job) => IN_APPLY_LOOP.sync_scope((), || job(&mut state)),
                    None => break,
                },
            }
        }
        debug!("apply loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatStoreConfig;
    use crate::storage::value_box::MemoryValueBox;
    use crate::types::PeerId;
    use crate::views::state::StateView;

    fn state() -> CoordinatorState {
        let ctx = StoreContext::new(
            Box::new(MemoryValueBox::new()),
            Arc::new(ChatStoreConfig::default()),
        );
        let (tx, _rx) = watch::channel(0);
        CoordinatorState::new(ctx, tx, Arc::new(Telemetry::default()))
    }

    #[test]
    fn version_moves_only_for_non_empty_transactions() {
        let mut state = state();
        state
            .run_transaction(|tx| tx.get_peer(PeerId::new(0, 1)))
            .expect("read only");
        assert_eq!(state.state_version(), 0);
        state
            .run_transaction(|tx| tx.set_state(vec![1]))
            .expect("write");
        assert_eq!(state.state_version(), 1);
        state
            .run_transaction(|tx| tx.set_keychain_entry("k", vec![2]))
            .expect("keychain");
        assert_eq!(state.state_version(), 1);
        let metrics = state.telemetry.snapshot();
        assert_eq!(metrics.transactions_total, 3);
        assert_eq!(metrics.empty_transactions, 2);
    }

    #[test]
    fn registered_views_follow_commits() {
        let mut state = state();
        let mut view = state
            .register_view(|_| {}, StateView::new)
            .expect("register");
        assert_eq!(view.initial, None);
        state
            .run_transaction(|tx| tx.set_state(b"s".to_vec()))
            .expect("write");
        let update = view.updates.try_recv().expect("update");
        assert_eq!(update.snapshot, Some(b"s".to_vec()));
        assert_eq!(update.state_version, 1);
        state.remove_view(view.id);
        assert_eq!(state.telemetry.snapshot().active_views, 0);
    }

    #[test]
    fn external_writer_triggers_reload() {
        let shared = MemoryValueBox::new();
        let other = shared.share();
        let ctx = StoreContext::new(Box::new(shared), Arc::new(ChatStoreConfig::default()));
        let (tx, rx) = watch::channel(0);
        let mut first = CoordinatorState::new(ctx, tx, Arc::new(Telemetry::default()));
        let ctx = StoreContext::new(Box::new(other), Arc::new(ChatStoreConfig::default()));
        let (other_tx, _other_rx) = watch::channel(0);
        let mut second = CoordinatorState::new(ctx, other_tx, Arc::new(Telemetry::default()));

        let mut view = first
            .register_view(|_| {}, StateView::new)
            .expect("register");
        second
            .run_transaction(|tx| {
                tx.set_state(b"other".to_vec());
                tx.set_master_client_id(42);
            })
            .expect("external write");
        first.run_transaction(|_| {}).expect("noop");

        let update = view.updates.try_recv().expect("reload");
        assert!(update.reloaded);
        assert_eq!(update.snapshot, Some(b"other".to_vec()));
        assert_eq!(*rx.borrow(), 42);
        assert_eq!(first.telemetry.snapshot().external_refreshes, 1);
    }
}
