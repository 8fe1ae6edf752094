use super::MutableView;
use crate::coordinator::context::StoreContext;
use crate::delta::{MessageHistoryOperation, TransactionDelta};
use crate::types::{Message, MessageId};

/// Follows a single message by id, including its author.
pub(crate) struct MessageView {
    id: MessageId,
    message: Option<Message>,
}

impl MessageView {
    pub fn new(ctx: &mut StoreContext, id: MessageId) -> Self {
        Self {
            id,
            message: ctx.message(id),
        }
    }

    fn affected(&self, delta: &TransactionDelta) -> bool {
        let touches_message = delta
            .history_operations
            .get(&self.id.peer_id)
            .is_some_and(|operations| {
                operations.iter().any(|operation| match operation {
                    MessageHistoryOperation::InsertMessage(message) => message.id == self.id,
                    MessageHistoryOperation::Remove(index, _) => index.id == self.id,
                    _ => false,
                })
            });
        let touches_author = self
            .message
            .as_ref()
            .and_then(|message| message.author.as_ref())
            .is_some_and(|author| delta.updated_peers.contains_key(&author.id));
        touches_message || touches_author
    }
}

impl MutableView for MessageView {
    type Snapshot = Option<Message>;

    fn replay(&mut self, ctx: &mut StoreContext, delta: &TransactionDelta) -> bool {
        if !self.affected(delta) {
            return false;
        }
        let message = ctx.message(self.id);
        if message == self.message {
            return false;
        }
        self.message = message;
        true
    }

    fn reload(&mut self, ctx: &mut StoreContext) {
        self.message = ctx.message(self.id);
    }

    fn snapshot(&self) -> Option<Message> {
        self.message.clone()
    }
}
