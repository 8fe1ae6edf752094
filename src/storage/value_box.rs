use crate::error::ChatStoreError;
use crate::storage::key::ValueBoxKey;
use im::OrdMap;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::ops::Bound;
use std::sync::Arc;

/// Key range owned by one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueBoxTable(pub u8);

/// Ordered binary key-value store with atomic transactions.
///
/// `range` returns keys strictly between `from` and `to`; the scan is ascending
/// when `from < to` and descending otherwise. The schema and state version cells
/// are readable outside of a transaction and then report the last committed value.
pub trait ValueBox: Send {
    fn begin(&mut self) -> Result<(), ChatStoreError>;
    fn commit(&mut self) -> Result<(), ChatStoreError>;
    fn drop_store(&mut self);

    fn get(&self, table: ValueBoxTable, key: &ValueBoxKey) -> Option<Vec<u8>>;
    fn set(&mut self, table: ValueBoxTable, key: &ValueBoxKey, value: Vec<u8>);
    fn remove(&mut self, table: ValueBoxTable, key: &ValueBoxKey);
    fn range(
        &self,
        table: ValueBoxTable,
        from: &ValueBoxKey,
        to: &ValueBoxKey,
        limit: usize,
    ) -> Vec<(ValueBoxKey, Vec<u8>)>;

    fn schema_version(&self) -> Option<i32>;
    fn set_schema_version(&mut self, version: i32);
    fn state_version(&self) -> u64;
    fn set_state_version(&mut self, version: u64);

    /// Marks the running transaction as unable to commit.
    fn report_corruption(&self, message: String);
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StoreImage {
    pub(crate) entries: OrdMap<(ValueBoxTable, ValueBoxKey), Vec<u8>>,
    pub(crate) schema_version: Option<i32>,
    pub(crate) state_version: u64,
}

impl StoreImage {
    fn range(
        &self,
        table: ValueBoxTable,
        from: &ValueBoxKey,
        to: &ValueBoxKey,
        limit: usize,
    ) -> Vec<(ValueBoxKey, Vec<u8>)> {
        if limit == 0 || from == to {
            return Vec::new();
        }
        let take = |(k, v): (&(ValueBoxTable, ValueBoxKey), &Vec<u8>)| (k.1.clone(), v.clone());
        if from < to {
            let bounds = (
                Bound::Excluded((table, from.clone())),
                Bound::Excluded((table, to.clone())),
            );
            self.entries.range(bounds).take(limit).map(take).collect()
        } else {
            let bounds = (
                Bound::Excluded((table, to.clone())),
                Bound::Excluded((table, from.clone())),
            );
            self.entries.range(bounds).rev().take(limit).map(take).collect()
        }
    }
}

#[derive(Default)]
struct Shared {
    committed: Mutex<StoreImage>,
    writer_active: Mutex<bool>,
    writer_released: Condvar,
}

impl Shared {
    fn acquire_writer(&self) {
        let mut active = self.writer_active.lock();
        while *active {
            self.writer_released.wait(&mut active);
        }
        *active = true;
    }

    fn release_writer(&self) {
        *self.writer_active.lock() = false;
        self.writer_released.notify_one();
    }
}

/// In-memory store. Handles obtained through `share` see one committed image, so two
/// engines opened on shared handles behave like two writers on one on-disk store.
#[derive(Default)]
pub struct MemoryValueBox {
    shared: Arc<Shared>,
    working: Option<StoreImage>,
    corruption: Arc<Mutex<Option<String>>>,
}

impl MemoryValueBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle onto the same committed data with its own transaction state.
    pub fn share(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            working: None,
            corruption: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn from_image(image: StoreImage) -> Self {
        let store = Self::default();
        *store.shared.committed.lock() = image;
        store
    }

    pub(crate) fn committed_image(&self) -> StoreImage {
        self.shared.committed.lock().clone()
    }

    pub fn in_transaction(&self) -> bool {
        self.working.is_some()
    }

    fn read<R>(&self, f: impl FnOnce(&StoreImage) -> R) -> R {
        match &self.working {
            Some(image) => f(image),
            None => f(&self.shared.committed.lock()),
        }
    }

    fn write(&mut self, f: impl FnOnce(&mut StoreImage)) {
        match &mut self.working {
            Some(image) => f(image),
            None => {
                // Writes outside a transaction are applied as their own commit.
                let mut committed = self.shared.committed.lock();
                f(&mut committed);
            }
        }
    }

    fn rollback(&mut self) {
        if self.working.take().is_some() {
            self.shared.release_writer();
        }
    }
}

impl ValueBox for MemoryValueBox {
    fn begin(&mut self) -> Result<(), ChatStoreError> {
        if self.working.is_some() {
            return Err(ChatStoreError::StoreUnavailable {
                message: "transaction already open".into(),
            });
        }
        self.shared.acquire_writer();
        self.working = Some(self.shared.committed.lock().clone());
        *self.corruption.lock() = None;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ChatStoreError> {
        let corruption = self.corruption.lock().take();
        if let Some(message) = corruption {
            self.rollback();
            return Err(ChatStoreError::Corrupted { message });
        }
        let Some(image) = self.working.take() else {
            return Err(ChatStoreError::StoreUnavailable {
                message: "commit without open transaction".into(),
            });
        };
        *self.shared.committed.lock() = image;
        self.shared.release_writer();
        Ok(())
    }

    fn drop_store(&mut self) {
        let schema_version = self.read(|image| image.schema_version);
        self.write(|image| {
            *image = StoreImage {
                schema_version,
                ..StoreImage::default()
            }
        });
    }

    fn get(&self, table: ValueBoxTable, key: &ValueBoxKey) -> Option<Vec<u8>> {
        self.read(|image| image.entries.get(&(table, key.clone())).cloned())
    }

    fn set(&mut self, table: ValueBoxTable, key: &ValueBoxKey, value: Vec<u8>) {
        self.write(|image| {
            image.entries.insert((table, key.clone()), value);
        });
    }

    fn remove(&mut self, table: ValueBoxTable, key: &ValueBoxKey) {
        self.write(|image| {
            image.entries.remove(&(table, key.clone()));
        });
    }

    fn range(
        &self,
        table: ValueBoxTable,
        from: &ValueBoxKey,
        to: &ValueBoxKey,
        limit: usize,
    ) -> Vec<(ValueBoxKey, Vec<u8>)> {
        self.read(|image| image.range(table, from, to, limit))
    }

    fn schema_version(&self) -> Option<i32> {
        self.read(|image| image.schema_version)
    }

    fn set_schema_version(&mut self, version: i32) {
        self.write(|image| image.schema_version = Some(version));
    }

    fn state_version(&self) -> u64 {
        self.shared.committed.lock().state_version
    }

    fn set_state_version(&mut self, version: u64) {
        self.write(|image| image.state_version = version);
    }

    fn report_corruption(&self, message: String) {
        let mut slot = self.corruption.lock();
        if slot.is_none() {
            *slot = Some(message);
        }
    }
}

impl Drop for MemoryValueBox {
    fn drop(&mut self) {
        self.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: ValueBoxTable = ValueBoxTable(1);

    fn key(i: i32) -> ValueBoxKey {
        ValueBoxKey::new().i32(i)
    }

    #[test]
    fn range_is_exclusive_and_directional() {
        let mut store = MemoryValueBox::new();
        store.begin().expect("begin");
        for i in 0..10 {
            store.set(T, &key(i), vec![i as u8]);
        }
        store.set(ValueBoxTable(2), &key(5), vec![99]);
        store.commit().expect("commit");

        let asc = store.range(T, &key(2), &key(6), 10);
        assert_eq!(
            asc.iter().map(|(_, v)| v[0]).collect::<Vec<_>>(),
            vec![3, 4, 5]
        );
        let desc = store.range(T, &key(6), &key(2), 2);
        assert_eq!(desc.iter().map(|(_, v)| v[0]).collect::<Vec<_>>(), vec![5, 4]);
        assert!(store.range(T, &key(3), &key(3), 10).is_empty());
    }

    #[test]
    fn uncommitted_writes_are_invisible_to_other_handles() {
        let mut writer = MemoryValueBox::new();
        let reader = writer.share();
        writer.begin().expect("begin");
        writer.set(T, &key(1), vec![1]);
        writer.set_state_version(4);
        assert_eq!(reader.get(T, &key(1)), None);
        assert_eq!(reader.state_version(), 0);
        writer.commit().expect("commit");
        assert_eq!(reader.get(T, &key(1)), Some(vec![1]));
        assert_eq!(reader.state_version(), 4);
    }

    #[test]
    fn corruption_rejects_commit_and_rolls_back() {
        let mut store = MemoryValueBox::new();
        store.begin().expect("begin");
        store.set(T, &key(1), vec![1]);
        store.report_corruption("bad value".into());
        let err = store.commit().expect_err("corrupt commit");
        assert_eq!(err.code_str(), "corrupted");
        assert_eq!(store.get(T, &key(1)), None);
        store.begin().expect("writer released");
        store.commit().expect("clean commit");
    }

    #[test]
    fn drop_store_keeps_schema_version() {
        let mut store = MemoryValueBox::new();
        store.begin().expect("begin");
        store.set_schema_version(7);
        store.set(T, &key(1), vec![1]);
        store.drop_store();
        store.commit().expect("commit");
        assert_eq!(store.schema_version(), Some(7));
        assert_eq!(store.get(T, &key(1)), None);
    }
}
