use super::MutableView;
use crate::coordinator::context::StoreContext;
use crate::delta::TransactionDelta;
use crate::types::{PreferencesEntry, PreferencesKey, PreferencesOperation};
use std::collections::{BTreeMap, BTreeSet};

pub(crate) struct PreferencesView {
    keys: BTreeSet<PreferencesKey>,
    values: BTreeMap<PreferencesKey, PreferencesEntry>,
}

impl PreferencesView {
    pub fn new(ctx: &mut StoreContext, keys: BTreeSet<PreferencesKey>) -> Self {
        let values = Self::load(ctx, &keys);
        Self { keys, values }
    }

    fn load(
        ctx: &mut StoreContext,
        keys: &BTreeSet<PreferencesKey>,
    ) -> BTreeMap<PreferencesKey, PreferencesEntry> {
        keys.iter()
            .filter_map(|key| {
                ctx.tables
                    .preferences
                    .get(ctx.store.as_ref(), key)
                    .map(|entry| (key.clone(), entry))
            })
            .collect()
    }
}

impl MutableView for PreferencesView {
    type Snapshot = BTreeMap<PreferencesKey, PreferencesEntry>;

    fn replay(&mut self, _ctx: &mut StoreContext, delta: &TransactionDelta) -> bool {
        let mut changed = false;
        for PreferencesOperation::Update(key, entry) in &delta.preferences_operations {
            if !self.keys.contains(key) {
                continue;
            }
            match entry {
                Some(entry) => {
                    if self.values.get(key) != Some(entry) {
                        self.values.insert(key.clone(), entry.clone());
                        changed = true;
                    }
                }
                None => changed |= self.values.remove(key).is_some(),
            }
        }
        changed
    }

    fn reload(&mut self, ctx: &mut StoreContext) {
        self.values = Self::load(ctx, &self.keys);
    }

    fn snapshot(&self) -> BTreeMap<PreferencesKey, PreferencesEntry> {
        self.values.clone()
    }
}
