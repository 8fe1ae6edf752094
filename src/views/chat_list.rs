use super::MutableView;
use super::window::{Window, WindowAnchor};
use crate::coordinator::context::StoreContext;
use crate::delta::{ChatListOperation, TransactionDelta};
use crate::tables::chat_list::ChatListEntry;
use crate::types::{
    ChatListHole, ChatListIndex, CombinedPeerReadState, Message, Peer, PeerId,
    PeerNotificationSettings,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatListAnchor {
    Upper,
    Index(ChatListIndex),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatListPeerEntry {
    pub index: ChatListIndex,
    pub peer: Option<Peer>,
    pub message: Option<Message>,
    pub read_state: Option<CombinedPeerReadState>,
    pub notification_settings: Option<PeerNotificationSettings>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatListViewEntry {
    Peer(ChatListPeerEntry),
    Hole(ChatListHole),
}

impl ChatListViewEntry {
    pub fn index(&self) -> ChatListIndex {
        match self {
            ChatListViewEntry::Peer(entry) => entry.index,
            ChatListViewEntry::Hole(hole) => hole.chat_list_index(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatListSnapshot {
    /// Lowest first; the top of the chat list is the last entry.
    pub entries: Vec<ChatListViewEntry>,
    pub earlier: Option<ChatListIndex>,
    pub later: Option<ChatListIndex>,
}

impl ChatListSnapshot {
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                ChatListViewEntry::Peer(entry) => Some(entry.index.peer_id()),
                ChatListViewEntry::Hole(_) => None,
            })
            .collect()
    }
}

pub(crate) struct ChatListView {
    window: Window<ChatListIndex, ChatListViewEntry>,
}

impl ChatListView {
    pub fn new(ctx: &mut StoreContext, anchor: ChatListAnchor, count: usize) -> Self {
        let anchor = match anchor {
            ChatListAnchor::Upper => WindowAnchor::Upper,
            ChatListAnchor::Index(index) => WindowAnchor::At(index),
        };
        Self {
            window: Self::load(ctx, anchor, count),
        }
    }

    fn render_peer(ctx: &mut StoreContext, index: ChatListIndex) -> ChatListViewEntry {
        let peer_id = index.peer_id();
        let message = ctx
            .tables
            .history
            .top_message(ctx.store.as_ref(), peer_id)
            .map(|message| ctx.render_message(message));
        ChatListViewEntry::Peer(ChatListPeerEntry {
            index,
            peer: ctx.peer(peer_id),
            message,
            read_state: ctx.read_state(peer_id),
            notification_settings: ctx
                .tables
                .notification_settings
                .get(ctx.store.as_ref(), peer_id),
        })
    }

    fn render(ctx: &mut StoreContext, entry: ChatListEntry) -> (ChatListIndex, ChatListViewEntry) {
        match entry {
            ChatListEntry::Peer(index) => (index, Self::render_peer(ctx, index)),
            ChatListEntry::Hole(hole) => (hole.chat_list_index(), ChatListViewEntry::Hole(hole)),
        }
    }

    fn load(
        ctx: &mut StoreContext,
        anchor: WindowAnchor<ChatListIndex>,
        count: usize,
    ) -> Window<ChatListIndex, ChatListViewEntry> {
        let limit = count + 1;
        let store = ctx.store.as_ref();
        let (below, above) = match anchor {
            WindowAnchor::Upper => (ctx.tables.chat_list.earlier(store, None, limit), Vec::new()),
            WindowAnchor::Lower => (Vec::new(), ctx.tables.chat_list.later(store, None, limit)),
            WindowAnchor::At(index) => {
                let below = ctx.tables.chat_list.earlier(store, Some(index), limit);
                let mut above: Vec<ChatListEntry> =
                    ctx.tables.chat_list.get(store, &index).into_iter().collect();
                above.extend(ctx.tables.chat_list.later(store, Some(index), limit));
                (below, above)
            }
        };
        let below = below.into_iter().map(|e| Self::render(ctx, e)).collect();
        let above = above.into_iter().map(|e| Self::render(ctx, e)).collect();
        Window::from_parts(anchor, count, below, above)
    }

    fn rebuild(&mut self, ctx: &mut StoreContext) {
        self.window = Self::load(ctx, self.window.anchor(), self.window.count());
    }

    fn refresh_peer(&mut self, ctx: &mut StoreContext, peer_id: PeerId) -> bool {
        let indices: Vec<ChatListIndex> = self
            .window
            .entries
            .iter()
            .filter(|(index, entry)| {
                matches!(entry, ChatListViewEntry::Peer(_)) && index.peer_id() == peer_id
            })
            .map(|(index, _)| *index)
            .collect();
        let mut changed = false;
        for index in indices {
            let rendered = Self::render_peer(ctx, index);
            if let Some(slot) = self.window.get_mut(&index)
                && *slot != rendered
            {
                *slot = rendered;
                changed = true;
            }
        }
        changed
    }
}

impl MutableView for ChatListView {
    type Snapshot = ChatListSnapshot;

    fn replay(&mut self, ctx: &mut StoreContext, delta: &TransactionDelta) -> bool {
        let mut changed = false;
        let mut stale = false;
        for operation in &delta.chat_list_operations {
            match operation {
                ChatListOperation::InsertEntry(index) => {
                    let entry = Self::render_peer(ctx, *index);
                    changed |= self.window.insert(*index, entry);
                }
                ChatListOperation::InsertHole(hole) => {
                    changed |= self
                        .window
                        .insert(hole.chat_list_index(), ChatListViewEntry::Hole(*hole));
                }
                ChatListOperation::RemoveEntry(indices) | ChatListOperation::RemoveHoles(indices) => {
                    for index in indices {
                        let (removed, marker) = self.window.remove(index);
                        changed |= removed;
                        stale |= marker;
                    }
                }
            }
        }
        if stale || self.window.is_underfilled() {
            self.rebuild(ctx);
            return true;
        }
        self.window.trim();

        let touched: Vec<PeerId> = delta
            .history_operations
            .keys()
            .chain(delta.updated_read_states.keys())
            .chain(delta.updated_notification_settings.keys())
            .chain(delta.updated_peers.keys())
            .copied()
            .collect();
        for peer_id in touched {
            changed |= self.refresh_peer(ctx, peer_id);
        }
        changed
    }

    fn reload(&mut self, ctx: &mut StoreContext) {
        self.rebuild(ctx);
    }

    fn snapshot(&self) -> ChatListSnapshot {
        ChatListSnapshot {
            entries: self.window.entries.iter().map(|(_, e)| e.clone()).collect(),
            earlier: self.window.earlier,
            later: self.window.later,
        }
    }
}
