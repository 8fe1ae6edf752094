use chatstore::{
    AddMessagesLocation, ChatStore, ChatStoreConfig, ChatStoreError, ChatStoreSync,
    MemoryValueBox, MessageFlags, MessageId, PeerId, SCHEMA_VERSION, StoreMessage, ValueBox,
};
use tokio::runtime::Handle;

const PEER: PeerId = PeerId {
    namespace: 0,
    id: 9,
};

async fn open_on(store: MemoryValueBox) -> ChatStore {
    ChatStore::open(ChatStoreConfig::development(), store)
        .await
        .expect("open")
}

#[tokio::test]
async fn state_version_moves_only_when_something_changed() {
    let store = open_on(MemoryValueBox::new()).await;
    assert_eq!(store.state_version().await.expect("version"), 0);

    store
        .transaction(|tx| tx.get_state())
        .await
        .expect("read");
    assert_eq!(store.state_version().await.expect("version"), 0);

    store
        .transaction(|tx| {
            tx.add_messages(
                vec![StoreMessage::new(MessageId::new(PEER, 0, 1), 1, "hi")],
                AddMessagesLocation::Random,
            )
        })
        .await
        .expect("write");
    assert_eq!(store.state_version().await.expect("version"), 1);

    store
        .set_keychain_entry("token", b"secret".to_vec())
        .await
        .expect("keychain");
    assert_eq!(store.state_version().await.expect("version"), 1);

    let metrics = store.metrics();
    assert!(metrics.transactions_total >= 3);
    assert_eq!(metrics.transaction_errors, 0);
}

#[tokio::test]
async fn external_writer_forces_views_to_reload() {
    let shared = MemoryValueBox::new();
    let first = open_on(shared.share()).await;
    let second = open_on(shared).await;

    let mut view = first.subscribe_state().await.expect("subscribe");
    second
        .transaction(|tx| tx.set_state(b"from second".to_vec()))
        .await
        .expect("external write");
    assert_eq!(second.state_version().await.expect("version"), 1);

    first.transaction(|_| ()).await.expect("noop");
    let update = view.next().await.expect("reload");
    assert!(update.reloaded);
    assert_eq!(update.snapshot, Some(b"from second".to_vec()));
    assert_eq!(update.state_version, 1);
    assert_eq!(first.state_version().await.expect("version"), 1);
    assert_eq!(first.metrics().external_refreshes, 1);

    first
        .transaction(|tx| tx.set_state(b"from first".to_vec()))
        .await
        .expect("write after reload");
    assert_eq!(first.state_version().await.expect("version"), 2);
    let update = view.next().await.expect("incremental");
    assert!(!update.reloaded);
}

#[tokio::test]
async fn master_client_follows_the_last_writer() {
    let shared = MemoryValueBox::new();
    let first = open_on(shared.share()).await;
    let second = open_on(shared).await;
    assert_ne!(first.session_id(), second.session_id());

    first.become_master_client().await.expect("first master");
    assert!(first.is_master_client());

    second.transaction(|_| ()).await.expect("observe");
    assert_eq!(*second.master_client_id().borrow(), first.session_id());
    assert!(!second.is_master_client());

    second.become_master_client().await.expect("second master");
    let mut watcher = first.master_client_id();
    first.transaction(|_| ()).await.expect("observe");
    assert!(watcher.has_changed().expect("watch open"));
    assert_eq!(*watcher.borrow_and_update(), second.session_id());
    assert!(!first.is_master_client());
}

#[tokio::test]
async fn schema_version_mismatch_is_rejected() {
    let mut raw = MemoryValueBox::new();
    raw.begin().expect("begin");
    raw.set_schema_version(SCHEMA_VERSION + 1);
    raw.commit().expect("commit");

    let err = ChatStore::open(ChatStoreConfig::development(), raw)
        .await
        .err()
        .expect("mismatch");
    assert!(matches!(
        err,
        ChatStoreError::SchemaVersionMismatch { expected, found }
            if expected == SCHEMA_VERSION && found == SCHEMA_VERSION + 1
    ));
    assert_eq!(err.code_str(), "schema_version_mismatch");
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let config = ChatStoreConfig {
        max_queued_requests: 0,
        ..ChatStoreConfig::default()
    };
    let err = ChatStore::open_in_memory(config)
        .await
        .err()
        .expect("invalid");
    assert!(matches!(err, ChatStoreError::InvalidConfig { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn blocking_keychain_read_works_outside_the_queue() {
    let store = open_on(MemoryValueBox::new()).await;
    store
        .set_keychain_entry("token", b"abc".to_vec())
        .await
        .expect("set");

    let value = store.keychain_entry_blocking("token").expect("blocking read");
    assert_eq!(value, Some(b"abc".to_vec()));
    assert_eq!(
        store.keychain_entry_blocking("missing").expect("blocking read"),
        None
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn blocking_call_from_a_transaction_body_fails_fast() {
    let store = open_on(MemoryValueBox::new()).await;
    let inner = store.clone();
    let nested = store
        .transaction(move |_| inner.keychain_entry_blocking("token"))
        .await
        .expect("outer transaction");
    assert!(matches!(nested, Err(ChatStoreError::ReentrantBlockingCall)));

    let sync = ChatStoreSync::new(store.clone(), Handle::current());
    let nested = store
        .transaction(move |_| sync.transaction(|tx| tx.get_state()))
        .await
        .expect("outer transaction");
    assert!(matches!(nested, Err(ChatStoreError::ReentrantBlockingCall)));
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_facade_drives_the_queue_from_blocking_code() {
    let store = open_on(MemoryValueBox::new()).await;
    let sync = ChatStoreSync::new(store.clone(), Handle::current());

    let (value, version) = tokio::task::spawn_blocking(move || {
        sync.set_keychain_entry("token", b"xyz".to_vec())
            .expect("set");
        sync.transaction(|tx| tx.set_state(b"state".to_vec()))
            .expect("transaction");
        (
            sync.keychain_entry("token").expect("get"),
            sync.state_version().expect("version"),
        )
    })
    .await
    .expect("join");

    assert_eq!(value, Some(b"xyz".to_vec()));
    assert_eq!(version, 1);
}

#[tokio::test]
async fn streamed_items_arrive_after_commit() {
    let store = open_on(MemoryValueBox::new()).await;
    let mut items = store
        .transaction_stream(|tx, sink| {
            let ids = tx.add_messages(
                (1..=3)
                    .map(|id| {
                        let mut message =
                            StoreMessage::new(MessageId::new(PEER, 0, id), id, "pending");
                        message.flags.insert(MessageFlags::UNSENT);
                        message
                    })
                    .collect(),
                AddMessagesLocation::Random,
            );
            for id in ids {
                sink.send(id.id);
            }
        })
        .await
        .expect("stream");

    let mut received = Vec::new();
    while let Some(id) = items.recv().await {
        received.push(id);
    }
    assert_eq!(received, vec![1, 2, 3]);

    let unsent = store
        .transaction(|tx| tx.get_unsent_message_ids())
        .await
        .expect("unsent");
    assert_eq!(unsent.len(), 3);
}
