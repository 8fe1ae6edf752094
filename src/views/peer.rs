use super::MutableView;
use crate::coordinator::context::StoreContext;
use crate::delta::TransactionDelta;
use crate::types::{CachedPeerData, Peer, PeerId, PeerNotificationSettings, PeerPresence};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PeerViewSnapshot {
    pub peer: Option<Peer>,
    /// Peers referenced by the cached data, keyed by id.
    pub associated_peers: BTreeMap<PeerId, Peer>,
    pub cached_data: Option<CachedPeerData>,
    pub presence: Option<PeerPresence>,
    pub notification_settings: Option<PeerNotificationSettings>,
}

pub(crate) struct PeerView {
    peer_id: PeerId,
    snapshot: PeerViewSnapshot,
}

impl PeerView {
    pub fn new(ctx: &mut StoreContext, peer_id: PeerId) -> Self {
        Self {
            peer_id,
            snapshot: Self::load(ctx, peer_id),
        }
    }

    fn load(ctx: &mut StoreContext, peer_id: PeerId) -> PeerViewSnapshot {
        let peer = ctx.peer(peer_id);
        let cached_data = ctx.tables.cached_peer_data.get(ctx.store.as_ref(), peer_id);
        let mut associated_peers = BTreeMap::new();
        let associated_ids = peer
            .as_ref()
            .and_then(|peer| peer.associated_peer_id)
            .into_iter()
            .chain(cached_data.iter().flat_map(|data| data.peer_ids.iter().copied()));
        for associated_id in associated_ids.collect::<Vec<_>>() {
            if let Some(associated) = ctx.peer(associated_id) {
                associated_peers.insert(associated_id, associated);
            }
        }
        PeerViewSnapshot {
            peer,
            associated_peers,
            cached_data,
            presence: ctx.tables.presences.get(ctx.store.as_ref(), peer_id),
            notification_settings: ctx
                .tables
                .notification_settings
                .get(ctx.store.as_ref(), peer_id),
        }
    }
}

impl MutableView for PeerView {
    type Snapshot = PeerViewSnapshot;

    fn replay(&mut self, ctx: &mut StoreContext, delta: &TransactionDelta) -> bool {
        let mut changed = false;
        if let Some(presence) = delta.updated_presences.get(&self.peer_id) {
            self.snapshot.presence = Some(presence.clone());
            changed = true;
        }
        if let Some(settings) = delta.updated_notification_settings.get(&self.peer_id) {
            self.snapshot.notification_settings = Some(settings.clone());
            changed = true;
        }
        let structural = delta.updated_peers.contains_key(&self.peer_id)
            || delta.updated_cached_data.contains_key(&self.peer_id)
            || self
                .snapshot
                .peer
                .as_ref()
                .and_then(|peer| peer.associated_peer_id)
                .into_iter()
                .chain(self.snapshot.cached_data.iter().flat_map(|d| d.peer_ids.iter().copied()))
                .any(|id| delta.updated_peers.contains_key(&id));
        if structural {
            let reloaded = Self::load(ctx, self.peer_id);
            changed |= reloaded != self.snapshot;
            self.snapshot = reloaded;
        }
        changed
    }

    fn reload(&mut self, ctx: &mut StoreContext) {
        self.snapshot = Self::load(ctx, self.peer_id);
    }

    fn snapshot(&self) -> PeerViewSnapshot {
        self.snapshot.clone()
    }
}
