use super::{MutableView, ViewId, ViewUpdate};
use crate::coordinator::context::StoreContext;
use crate::delta::TransactionDelta;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

trait TrackedView: Send {
    /// Returns whether an update was delivered.
    fn replay(&mut self, ctx: &mut StoreContext, delta: &TransactionDelta) -> bool;
    fn reload(&mut self, ctx: &mut StoreContext, state_version: u64) -> bool;
    /// The receiver is gone without the subscription ever unregistering, as happens
    /// when the registering request timed out.
    fn is_abandoned(&self) -> bool;
}

struct Registration<V: MutableView> {
    view: V,
    sender: mpsc::UnboundedSender<ViewUpdate<V::Snapshot>>,
    cancelled: Arc<AtomicBool>,
}

impl<V: MutableView> Registration<V> {
    fn deliver(&self, state_version: u64, reloaded: bool) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        self.sender
            .send(ViewUpdate {
                state_version,
                snapshot: self.view.snapshot(),
                reloaded,
            })
            .is_ok()
    }
}

impl<V: MutableView> TrackedView for Registration<V> {
    fn replay(&mut self, ctx: &mut StoreContext, delta: &TransactionDelta) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        self.view.replay(ctx, delta) && self.deliver(delta.state_version, false)
    }

    fn reload(&mut self, ctx: &mut StoreContext, state_version: u64) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        self.view.reload(ctx);
        self.deliver(state_version, true)
    }

    fn is_abandoned(&self) -> bool {
        self.sender.is_closed() && !self.cancelled.load(Ordering::Acquire)
    }
}

pub(crate) struct NewView<S> {
    pub id: ViewId,
    pub initial: S,
    pub updates: mpsc::UnboundedReceiver<ViewUpdate<S>>,
    pub cancelled: Arc<AtomicBool>,
}

/// Registry of live views, only touched from the transaction queue.
#[derive(Default)]
pub(crate) struct ViewTracker {
    views: Vec<(ViewId, Box<dyn TrackedView>)>,
    next_id: u64,
}

impl ViewTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn add_view<V: MutableView>(&mut self, view: V) -> NewView<V::Snapshot> {
        self.next_id += 1;
        let id = ViewId(self.next_id);
        let (sender, updates) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let initial = view.snapshot();
        self.views.push((
            id,
            Box::new(Registration {
                view,
                sender,
                cancelled: Arc::clone(&cancelled),
            }),
        ));
        debug!(view = id.0, active = self.views.len(), "view registered");
        NewView {
            id,
            initial,
            updates,
            cancelled,
        }
    }

    pub fn remove_view(&mut self, id: ViewId) {
        match self.views.iter().position(|(view_id, _)| *view_id == id) {
            Some(position) => {
                self.views.remove(position);
                debug!(view = id.0, active = self.views.len(), "view removed");
            }
            None => {
                debug_assert!(false, "removal of unknown view {id:?}");
                warn!(view = id.0, "removal of unknown view");
            }
        }
    }

    /// Offers `delta` to every view in registration order. Returns the number of
    /// updates delivered.
    pub fn update_views(&mut self, ctx: &mut StoreContext, delta: &TransactionDelta) -> usize {
        self.views.retain(|(id, view)| {
            let abandoned = view.is_abandoned();
            if abandoned {
                debug!(view = id.0, "dropping abandoned view");
            }
            !abandoned
        });
        self.views
            .iter_mut()
            .filter_map(|(_, view)| view.replay(ctx, delta).then_some(()))
            .count()
    }

    pub fn refresh_views_due_to_external_transaction(
        &mut self,
        ctx: &mut StoreContext,
        state_version: u64,
    ) -> usize {
        self.views
            .iter_mut()
            .filter_map(|(_, view)| view.reload(ctx, state_version).then_some(()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatStoreConfig;
    use crate::storage::value_box::MemoryValueBox;

    struct Counter {
        seen: u64,
    }

    impl MutableView for Counter {
        type Snapshot = u64;

        fn replay(&mut self, _ctx: &mut StoreContext, delta: &TransactionDelta) -> bool {
            if delta.updated_state.is_none() {
                return false;
            }
            self.seen += 1;
            true
        }

        fn reload(&mut self, _ctx: &mut StoreContext) {
            self.seen = 0;
        }

        fn snapshot(&self) -> u64 {
            self.seen
        }
    }

    fn context() -> StoreContext {
        StoreContext::new(
            Box::new(MemoryValueBox::new()),
            Arc::new(ChatStoreConfig::default()),
        )
    }

    #[test]
    fn only_changed_views_publish() {
        let mut ctx = context();
        let mut tracker = ViewTracker::new();
        let mut view = tracker.add_view(Counter { seen: 0 });
        assert_eq!(view.initial, 0);

        let mut delta = TransactionDelta {
            state_version: 1,
            ..Default::default()
        };
        assert_eq!(tracker.update_views(&mut ctx, &delta), 0);
        delta.updated_state = Some(vec![1]);
        delta.state_version = 2;
        assert_eq!(tracker.update_views(&mut ctx, &delta), 1);
        let update = view.updates.try_recv().expect("update");
        assert_eq!((update.state_version, update.snapshot), (2, 1));
        assert!(view.updates.try_recv().is_err());
    }

    #[test]
    fn cancelled_views_receive_nothing() {
        let mut ctx = context();
        let mut tracker = ViewTracker::new();
        let mut view = tracker.add_view(Counter { seen: 0 });
        view.cancelled.store(true, Ordering::Release);
        let delta = TransactionDelta {
            state_version: 1,
            updated_state: Some(Vec::new()),
            ..Default::default()
        };
        assert_eq!(tracker.update_views(&mut ctx, &delta), 0);
        assert_eq!(tracker.refresh_views_due_to_external_transaction(&mut ctx, 2), 0);
        assert!(view.updates.try_recv().is_err());
        tracker.remove_view(view.id);
        assert_eq!(tracker.len(), 0);
    }

    #[test]
    fn views_without_a_receiver_are_dropped() {
        let mut ctx = context();
        let mut tracker = ViewTracker::new();
        drop(tracker.add_view(Counter { seen: 0 }).updates);
        let delta = TransactionDelta {
            state_version: 1,
            updated_state: Some(Vec::new()),
            ..Default::default()
        };
        assert_eq!(tracker.update_views(&mut ctx, &delta), 0);
        assert_eq!(tracker.len(), 0);
    }
}
