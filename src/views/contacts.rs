use super::MutableView;
use crate::coordinator::context::StoreContext;
use crate::delta::TransactionDelta;
use crate::types::PeerId;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContactPeerIdsSnapshot {
    pub peer_ids: BTreeSet<PeerId>,
    pub remote_total_count: i32,
}

pub(crate) struct ContactPeerIdsView {
    snapshot: ContactPeerIdsSnapshot,
}

impl ContactPeerIdsView {
    pub fn new(ctx: &mut StoreContext) -> Self {
        Self {
            snapshot: Self::load(ctx),
        }
    }

    fn load(ctx: &mut StoreContext) -> ContactPeerIdsSnapshot {
        ContactPeerIdsSnapshot {
            peer_ids: ctx.tables.contacts.get(ctx.store.as_ref()),
            remote_total_count: ctx.tables.metadata.remote_contact_count(ctx.store.as_ref()),
        }
    }
}

impl MutableView for ContactPeerIdsView {
    type Snapshot = ContactPeerIdsSnapshot;

    fn replay(&mut self, _ctx: &mut StoreContext, delta: &TransactionDelta) -> bool {
        let mut changed = false;
        if let Some(ids) = &delta.replaced_contact_peer_ids {
            self.snapshot.peer_ids = ids.clone();
            changed = true;
        }
        if let Some(count) = delta.updated_remote_contact_count {
            self.snapshot.remote_total_count = count;
            changed = true;
        }
        changed
    }

    fn reload(&mut self, ctx: &mut StoreContext) {
        self.snapshot = Self::load(ctx);
    }

    fn snapshot(&self) -> ContactPeerIdsSnapshot {
        self.snapshot.clone()
    }
}
