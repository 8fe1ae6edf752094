use super::MutableView;
use super::window::{Window, WindowAnchor};
use crate::coordinator::context::StoreContext;
use crate::delta::{MessageHistoryOperation, TransactionDelta};
use crate::tables::HistoryEntry;
use crate::tables::tags::TaggedEntry;
use crate::types::{CombinedPeerReadState, Message, MessageHistoryHole, MessageIndex, MessageTags, PeerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageHistoryAnchor {
    Upper,
    Lower,
    Index(MessageIndex),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageHistoryViewParams {
    pub peer_id: PeerId,
    pub anchor: MessageHistoryAnchor,
    pub count: usize,
    /// Restricts the view to one tag partition; only the lowest bit is used.
    pub tag: Option<MessageTags>,
}

impl MessageHistoryViewParams {
    pub fn new(peer_id: PeerId, anchor: MessageHistoryAnchor, count: usize) -> Self {
        Self {
            peer_id,
            anchor,
            count,
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: MessageTags) -> Self {
        self.tag = Some(tag);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageHistoryEntry {
    Message(Message),
    Hole(MessageHistoryHole),
}

impl MessageHistoryEntry {
    pub fn index(&self) -> MessageIndex {
        match self {
            MessageHistoryEntry::Message(message) => message.index(),
            MessageHistoryEntry::Hole(hole) => hole.max_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageHistorySnapshot {
    /// Oldest first.
    pub entries: Vec<MessageHistoryEntry>,
    pub earlier: Option<MessageIndex>,
    pub later: Option<MessageIndex>,
    pub read_state: Option<CombinedPeerReadState>,
}

impl MessageHistorySnapshot {
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().filter_map(|entry| match entry {
            MessageHistoryEntry::Message(message) => Some(message),
            MessageHistoryEntry::Hole(_) => None,
        })
    }

    pub fn holes(&self) -> impl Iterator<Item = &MessageHistoryHole> {
        self.entries.iter().filter_map(|entry| match entry {
            MessageHistoryEntry::Message(_) => None,
            MessageHistoryEntry::Hole(hole) => Some(hole),
        })
    }
}

pub(crate) struct MessageHistoryView {
    peer_id: PeerId,
    /// Main peer followed by its associated peer, if any.
    peer_ids: Vec<PeerId>,
    tag: Option<MessageTags>,
    window: Window<MessageIndex, MessageHistoryEntry>,
    read_state: Option<CombinedPeerReadState>,
}

fn window_anchor(anchor: MessageHistoryAnchor) -> WindowAnchor<MessageIndex> {
    match anchor {
        MessageHistoryAnchor::Upper => WindowAnchor::Upper,
        MessageHistoryAnchor::Lower => WindowAnchor::Lower,
        MessageHistoryAnchor::Index(index) => WindowAnchor::At(index),
    }
}

impl MessageHistoryView {
    pub fn new(ctx: &mut StoreContext, params: &MessageHistoryViewParams) -> Self {
        let tag = params.tag.and_then(|tag| tag.bits().next());
        let mut peer_ids = vec![params.peer_id];
        if let Some(associated) = ctx.peer(params.peer_id).and_then(|p| p.associated_peer_id) {
            peer_ids.push(associated);
        }
        let window = Self::load(ctx, &peer_ids, tag, window_anchor(params.anchor), params.count);
        Self {
            peer_id: params.peer_id,
            read_state: ctx.read_state(params.peer_id),
            peer_ids,
            tag,
            window,
        }
    }

    fn render(ctx: &mut StoreContext, entry: HistoryEntry) -> (MessageIndex, MessageHistoryEntry) {
        match entry {
            HistoryEntry::Message(message) => {
                let message = ctx.render_message(message);
                (message.index(), MessageHistoryEntry::Message(message))
            }
            HistoryEntry::Hole(hole) => (hole.max_index, MessageHistoryEntry::Hole(hole)),
        }
    }

    fn fetch(
        ctx: &mut StoreContext,
        peer_id: PeerId,
        tag: Option<MessageTags>,
        from: Option<MessageIndex>,
        limit: usize,
        downwards: bool,
    ) -> Vec<(MessageIndex, MessageHistoryEntry)> {
        let store = ctx.store.as_ref();
        let raw: Vec<HistoryEntry> = match tag {
            None if downwards => ctx.tables.history.earlier(store, peer_id, from, limit),
            None => ctx.tables.history.later(store, peer_id, from, limit),
            Some(tag) => {
                let tagged = if downwards {
                    ctx.tables.tags.earlier(store, peer_id, tag, from, limit)
                } else {
                    ctx.tables.tags.later(store, peer_id, tag, from, limit)
                };
                tagged
                    .into_iter()
                    .filter_map(|entry| match entry {
                        TaggedEntry::Message(index) => ctx
                            .tables
                            .history
                            .get_message(store, index)
                            .map(HistoryEntry::Message),
                        TaggedEntry::Hole(hole) => Some(HistoryEntry::Hole(hole)),
                    })
                    .collect()
            }
        };
        raw.into_iter().map(|entry| Self::render(ctx, entry)).collect()
    }

    fn load(
        ctx: &mut StoreContext,
        peer_ids: &[PeerId],
        tag: Option<MessageTags>,
        anchor: WindowAnchor<MessageIndex>,
        count: usize,
    ) -> Window<MessageIndex, MessageHistoryEntry> {
        let limit = count + 1;
        let tracked = ctx.config.seed.existing_message_tags;
        let mut below = Vec::new();
        let mut above = Vec::new();
        for peer_id in peer_ids {
            match anchor {
                WindowAnchor::Upper => {
                    below.extend(Self::fetch(ctx, *peer_id, tag, None, limit, true));
                }
                WindowAnchor::Lower => {
                    above.extend(Self::fetch(ctx, *peer_id, tag, None, limit, false));
                }
                WindowAnchor::At(index) => {
                    let index = index.with_peer(*peer_id);
                    below.extend(Self::fetch(ctx, *peer_id, tag, Some(index), limit, true));
                    let exact = ctx
                        .tables
                        .history
                        .get(ctx.store.as_ref(), index)
                        .filter(|entry| match (entry, tag) {
                            (_, None) => true,
                            (HistoryEntry::Message(message), Some(tag)) => message.tags.contains(tag),
                            (HistoryEntry::Hole(hole), Some(tag)) => (hole.tags & tracked).contains(tag),
                        });
                    if let Some(entry) = exact {
                        above.push(Self::render(ctx, entry));
                    }
                    above.extend(Self::fetch(ctx, *peer_id, tag, Some(index), limit, false));
                }
            }
        }
        below.sort_by(|a, b| b.0.cmp(&a.0));
        above.sort_by(|a, b| a.0.cmp(&b.0));
        Window::from_parts(anchor, count, below, above)
    }

    fn accepts_tags(&self, tags: MessageTags) -> bool {
        self.tag.is_none_or(|tag| tags.contains(tag))
    }

    fn rebuild(&mut self, ctx: &mut StoreContext) {
        self.window = Self::load(
            ctx,
            &self.peer_ids,
            self.tag,
            self.window.anchor(),
            self.window.count(),
        );
    }
}

impl MutableView for MessageHistoryView {
    type Snapshot = MessageHistorySnapshot;

    fn replay(&mut self, ctx: &mut StoreContext, delta: &TransactionDelta) -> bool {
        let tracked = ctx.config.seed.existing_message_tags;
        let mut changed = false;
        let mut stale = false;
        for peer_id in self.peer_ids.clone() {
            let Some(operations) = delta.history_operations.get(&peer_id) else {
                continue;
            };
            for operation in operations {
                match operation {
                    MessageHistoryOperation::InsertMessage(message) => {
                        if self.accepts_tags(message.tags) {
                            let message = ctx.render_message(message.clone());
                            changed |= self
                                .window
                                .insert(message.index(), MessageHistoryEntry::Message(message));
                        }
                    }
                    MessageHistoryOperation::InsertHole(hole) => {
                        let visible = match self.tag {
                            None => true,
                            Some(tag) => (hole.tags & tracked).contains(tag),
                        };
                        if visible {
                            changed |= self
                                .window
                                .insert(hole.max_index, MessageHistoryEntry::Hole(*hole));
                        }
                    }
                    MessageHistoryOperation::Remove(index, _) => {
                        let (removed, marker) = self.window.remove(index);
                        changed |= removed;
                        stale |= marker;
                    }
                    MessageHistoryOperation::RemoveHole(hole) => {
                        let (removed, marker) = self.window.remove(&hole.max_index);
                        changed |= removed;
                        stale |= marker;
                    }
                    MessageHistoryOperation::UpdateReadState(state) => {
                        if peer_id == self.peer_id {
                            self.read_state = Some(state.clone());
                            changed = true;
                        }
                    }
                }
            }
        }
        let authors_changed = self.window.entries.iter().any(|(_, entry)| match entry {
            MessageHistoryEntry::Message(message) => message
                .author
                .as_ref()
                .is_some_and(|author| delta.updated_peers.contains_key(&author.id)),
            MessageHistoryEntry::Hole(_) => false,
        });
        if stale || authors_changed || self.window.is_underfilled() {
            self.rebuild(ctx);
            return true;
        }
        self.window.trim();
        changed
    }

    fn reload(&mut self, ctx: &mut StoreContext) {
        self.read_state = ctx.read_state(self.peer_id);
        self.rebuild(ctx);
    }

    fn snapshot(&self) -> MessageHistorySnapshot {
        MessageHistorySnapshot {
            entries: self.window.entries.iter().map(|(_, e)| e.clone()).collect(),
            earlier: self.window.earlier,
            later: self.window.later,
            read_state: self.read_state.clone(),
        }
    }
}
