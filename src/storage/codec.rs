use crate::storage::key::ValueBoxKey;
use crate::storage::value_box::{ValueBox, ValueBoxTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::error;

/// Reads and decodes one value; a value that fails to decode is reported as
/// corruption, which makes the running transaction fail at commit.
pub fn get<T: DeserializeOwned>(
    store: &dyn ValueBox,
    table: ValueBoxTable,
    key: &ValueBoxKey,
) -> Option<T> {
    let bytes = store.get(table, key)?;
    decode(store, table, &bytes)
}

pub fn decode<T: DeserializeOwned>(
    store: &dyn ValueBox,
    table: ValueBoxTable,
    bytes: &[u8],
) -> Option<T> {
    match rmp_serde::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            error!(table = table.0, error = %e, "failed to decode stored value");
            store.report_corruption(format!("table {}: {e}", table.0));
            None
        }
    }
}

pub fn put<T: Serialize>(
    store: &mut dyn ValueBox,
    table: ValueBoxTable,
    key: &ValueBoxKey,
    value: &T,
) {
    match rmp_serde::to_vec(value) {
        Ok(bytes) => store.set(table, key, bytes),
        Err(e) => {
            error!(table = table.0, error = %e, "failed to encode value");
            store.report_corruption(format!("table {}: encode failed: {e}", table.0));
        }
    }
}

/// Decoded entries of a key range, in scan order.
pub fn range<T: DeserializeOwned>(
    store: &dyn ValueBox,
    table: ValueBoxTable,
    from: &ValueBoxKey,
    to: &ValueBoxKey,
    limit: usize,
) -> Vec<(ValueBoxKey, T)> {
    store
        .range(table, from, to, limit)
        .into_iter()
        .filter_map(|(key, bytes)| decode(store, table, &bytes).map(|value| (key, value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::value_box::MemoryValueBox;

    #[test]
    fn undecodable_value_poisons_commit() {
        let table = ValueBoxTable(4);
        let key = ValueBoxKey::new().i32(1);
        let mut store = MemoryValueBox::new();
        store.begin().expect("begin");
        store.set(table, &key, vec![0xC1]);
        let value: Option<String> = get(&store, table, &key);
        assert_eq!(value, None);
        assert!(store.commit().is_err());
    }

    #[test]
    fn values_round_trip() {
        let table = ValueBoxTable(4);
        let key = ValueBoxKey::new().i32(1);
        let mut store = MemoryValueBox::new();
        store.begin().expect("begin");
        put(&mut store, table, &key, &(7i32, "seven".to_string()));
        let value: Option<(i32, String)> = get(&store, table, &key);
        assert_eq!(value, Some((7, "seven".to_string())));
        store.commit().expect("commit");
    }
}
