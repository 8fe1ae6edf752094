//! Live views: query results kept current by replaying each committed delta.

pub mod chat_list;
pub mod contacts;
pub mod message;
pub mod message_history;
pub mod operation_log;
pub mod ordered_item_list;
pub mod peer;
pub mod preferences;
pub mod state;
pub mod tracker;
pub mod unread_counts;
mod window;

use crate::coordinator::context::StoreContext;
use crate::coordinator::Job;
use crate::delta::TransactionDelta;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};

pub use chat_list::{ChatListAnchor, ChatListPeerEntry, ChatListSnapshot, ChatListViewEntry};
pub use contacts::ContactPeerIdsSnapshot;
pub use message_history::{
    MessageHistoryAnchor, MessageHistoryEntry, MessageHistorySnapshot, MessageHistoryViewParams,
};
pub use operation_log::MergedOperationLogSnapshot;
pub use peer::PeerViewSnapshot;
pub use unread_counts::{UnreadMessageCountsItem, UnreadMessageCountsSnapshot};

/// A query result that can follow committed transactions.
pub(crate) trait MutableView: Send + 'static {
    type Snapshot: Clone + Send + 'static;

    /// Applies a committed delta; returns whether the visible state changed.
    fn replay(&mut self, ctx: &mut StoreContext, delta: &TransactionDelta) -> bool;

    /// Rebuilds the view from storage after another writer changed the store.
    fn reload(&mut self, ctx: &mut StoreContext);

    fn snapshot(&self) -> Self::Snapshot;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId(pub(crate) u64);

#[derive(Debug, Clone)]
pub struct ViewUpdate<S> {
    pub state_version: u64,
    pub snapshot: S,
    /// Set when the view was rebuilt because another writer changed the store.
    pub reloaded: bool,
}

/// Handle on a registered view. Dropping it unregisters the view.
pub struct ViewSubscription<S> {
    id: ViewId,
    initial: S,
    updates: mpsc::UnboundedReceiver<ViewUpdate<S>>,
    cancelled: Arc<AtomicBool>,
    jobs: mpsc::Sender<Job>,
    removals: mpsc::UnboundedSender<ViewId>,
}

impl<S> ViewSubscription<S> {
    pub(crate) fn new(
        id: ViewId,
        initial: S,
        updates: mpsc::UnboundedReceiver<ViewUpdate<S>>,
        cancelled: Arc<AtomicBool>,
        jobs: mpsc::Sender<Job>,
        removals: mpsc::UnboundedSender<ViewId>,
    ) -> Self {
        Self {
            id,
            initial,
            updates,
            cancelled,
            jobs,
            removals,
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    /// Snapshot taken inside the registering transaction.
    pub fn initial(&self) -> &S {
        &self.initial
    }

    /// Next update in commit order, or `None` once the store is gone.
    pub async fn next(&mut self) -> Option<ViewUpdate<S>> {
        if self.is_cancelled() {
            return None;
        }
        self.updates.recv().await
    }

    pub fn try_next(&mut self) -> Option<ViewUpdate<S>> {
        if self.is_cancelled() {
            return None;
        }
        self.updates.try_recv().ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Unregisters the view and waits until the queue has dropped it.
    pub async fn cancel(self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        let id = self.id;
        let job: Job = Box::new(move |state| {
            state.remove_view(id);
            let _ = ack_tx.send(());
        });
        if self.jobs.send(job).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

impl<S> Drop for ViewSubscription<S> {
    fn drop(&mut self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            let _ = self.removals.send(self.id);
        }
    }
}
