use super::MutableView;
use crate::coordinator::context::StoreContext;
use crate::delta::TransactionDelta;

/// The opaque session state blob.
pub(crate) struct StateView {
    state: Option<Vec<u8>>,
}

impl StateView {
    pub fn new(ctx: &mut StoreContext) -> Self {
        Self {
            state: ctx.tables.metadata.user_state(ctx.store.as_ref()),
        }
    }
}

impl MutableView for StateView {
    type Snapshot = Option<Vec<u8>>;

    fn replay(&mut self, _ctx: &mut StoreContext, delta: &TransactionDelta) -> bool {
        match &delta.updated_state {
            Some(state) => {
                self.state = Some(state.clone());
                true
            }
            None => false,
        }
    }

    fn reload(&mut self, ctx: &mut StoreContext) {
        self.state = ctx.tables.metadata.user_state(ctx.store.as_ref());
    }

    fn snapshot(&self) -> Option<Vec<u8>> {
        self.state.clone()
    }
}
