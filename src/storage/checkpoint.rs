use crate::error::ChatStoreError;
use crate::storage::key::ValueBoxKey;
use crate::storage::value_box::{MemoryValueBox, StoreImage, ValueBox, ValueBoxTable};
use crc32c::crc32c;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const CHECKPOINT_FILE: &str = "store.checkpoint";
const CHECKPOINT_MAGIC: &[u8; 4] = b"CSV1";

#[derive(Serialize, Deserialize)]
struct CheckpointBody {
    schema_version: Option<i32>,
    state_version: u64,
    entries: Vec<(u8, Vec<u8>, Vec<u8>)>,
}

/// Memory store that writes a full checkpoint file after every commit.
///
/// The file is replaced atomically; a torn or corrupt file is rejected on open.
pub struct CheckpointValueBox {
    inner: MemoryValueBox,
    path: PathBuf,
}

impl CheckpointValueBox {
    pub fn open(dir: &Path) -> Result<Self, ChatStoreError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(CHECKPOINT_FILE);
        let inner = if path.exists() {
            let image = read_checkpoint(&path)?;
            debug!(
                path = %path.display(),
                state_version = image.state_version,
                "loaded checkpoint"
            );
            MemoryValueBox::from_image(image)
        } else {
            MemoryValueBox::new()
        };
        Ok(Self { inner, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), ChatStoreError> {
        let image = self.inner.committed_image();
        let body = CheckpointBody {
            schema_version: image.schema_version,
            state_version: image.state_version,
            entries: image
                .entries
                .iter()
                .map(|((table, key), value)| (table.0, key.as_slice().to_vec(), value.clone()))
                .collect(),
        };
        let encoded = rmp_serde::to_vec(&body).map_err(|e| ChatStoreError::Encode(e.to_string()))?;
        let dir = self
            .path
            .parent()
            .ok_or_else(|| ChatStoreError::StoreUnavailable {
                message: "checkpoint path has no parent".into(),
            })?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(CHECKPOINT_MAGIC)?;
        tmp.write_all(&crc32c(&encoded).to_be_bytes())?;
        tmp.write_all(&encoded)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| ChatStoreError::Io(e.error))?;
        Ok(())
    }
}

fn read_checkpoint(path: &Path) -> Result<StoreImage, ChatStoreError> {
    let bytes = fs::read(path)?;
    if bytes.len() < 8 || &bytes[..4] != CHECKPOINT_MAGIC {
        return Err(ChatStoreError::Corrupted {
            message: format!("{} is not a checkpoint file", path.display()),
        });
    }
    let expected = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let payload = &bytes[8..];
    if crc32c(payload) != expected {
        warn!(path = %path.display(), "checkpoint checksum mismatch");
        return Err(ChatStoreError::Corrupted {
            message: "checkpoint checksum mismatch".into(),
        });
    }
    let body: CheckpointBody =
        rmp_serde::from_slice(payload).map_err(|e| ChatStoreError::Decode(e.to_string()))?;
    let mut image = StoreImage {
        schema_version: body.schema_version,
        state_version: body.state_version,
        ..StoreImage::default()
    };
    for (table, key, value) in body.entries {
        image
            .entries
            .insert((ValueBoxTable(table), ValueBoxKey::from_bytes(&key)), value);
    }
    Ok(image)
}

impl ValueBox for CheckpointValueBox {
    fn begin(&mut self) -> Result<(), ChatStoreError> {
        self.inner.begin()
    }

    fn commit(&mut self) -> Result<(), ChatStoreError> {
        self.inner.commit()?;
        self.persist()
    }

    fn drop_store(&mut self) {
        self.inner.drop_store();
    }

    fn get(&self, table: ValueBoxTable, key: &ValueBoxKey) -> Option<Vec<u8>> {
        self.inner.get(table, key)
    }

    fn set(&mut self, table: ValueBoxTable, key: &ValueBoxKey, value: Vec<u8>) {
        self.inner.set(table, key, value);
    }

    fn remove(&mut self, table: ValueBoxTable, key: &ValueBoxKey) {
        self.inner.remove(table, key);
    }

    fn range(
        &self,
        table: ValueBoxTable,
        from: &ValueBoxKey,
        to: &ValueBoxKey,
        limit: usize,
    ) -> Vec<(ValueBoxKey, Vec<u8>)> {
        self.inner.range(table, from, to, limit)
    }

    fn schema_version(&self) -> Option<i32> {
        self.inner.schema_version()
    }

    fn set_schema_version(&mut self, version: i32) {
        self.inner.set_schema_version(version);
    }

    fn state_version(&self) -> u64 {
        self.inner.state_version()
    }

    fn set_state_version(&mut self, version: u64) {
        self.inner.set_state_version(version);
    }

    fn report_corruption(&self, message: String) {
        self.inner.report_corruption(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn committed_state_survives_reopen() {
        let dir = tempdir().expect("temp");
        let table = ValueBoxTable(3);
        let key = ValueBoxKey::new().i32(1);
        {
            let mut store = CheckpointValueBox::open(dir.path()).expect("open");
            store.begin().expect("begin");
            store.set_schema_version(2);
            store.set_state_version(9);
            store.set(table, &key, b"value".to_vec());
            store.commit().expect("commit");
        }
        let store = CheckpointValueBox::open(dir.path()).expect("reopen");
        assert_eq!(store.schema_version(), Some(2));
        assert_eq!(store.state_version(), 9);
        assert_eq!(store.get(table, &key), Some(b"value".to_vec()));
    }

    #[test]
    fn corrupt_checkpoint_is_rejected() {
        let dir = tempdir().expect("temp");
        {
            let mut store = CheckpointValueBox::open(dir.path()).expect("open");
            store.begin().expect("begin");
            store.set(ValueBoxTable(1), &ValueBoxKey::new().i32(1), vec![1, 2, 3]);
            store.commit().expect("commit");
        }
        let path = dir.path().join(CHECKPOINT_FILE);
        let mut bytes = fs::read(&path).expect("read");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).expect("write");
        let err = CheckpointValueBox::open(dir.path())
            .err()
            .expect("corrupt open fails");
        assert_eq!(err.code_str(), "corrupted");
    }
}
