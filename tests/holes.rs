use chatstore::{
    AddMessagesLocation, ChatStore, ChatStoreConfig, HoleFill, HoleFillDirection, MessageHistoryHole,
    MessageId, MessageTags, PeerId, SeedConfiguration, StoreMessage,
};
use std::collections::BTreeSet;

const PEER: PeerId = PeerId {
    namespace: 0,
    id: 1,
};

async fn open(config: ChatStoreConfig) -> ChatStore {
    ChatStore::open_in_memory(config).await.expect("open")
}

fn id(id: i32) -> MessageId {
    MessageId::new(PEER, 0, id)
}

fn message(message_id: i32) -> StoreMessage {
    StoreMessage::new(id(message_id), message_id * 10, format!("m{message_id}"))
}

fn ranges(holes: &[MessageHistoryHole]) -> Vec<(i32, i32)> {
    holes.iter().map(|hole| (hole.min_id, hole.max_id())).collect()
}

async fn holes(store: &ChatStore) -> Vec<MessageHistoryHole> {
    store
        .transaction(|tx| tx.get_message_history_holes(PEER, 0))
        .await
        .expect("holes")
}

#[tokio::test]
async fn upper_to_lower_fill_truncates_at_the_bound() {
    let store = open(ChatStoreConfig::development()).await;
    let seeded = store
        .transaction(|tx| {
            tx.add_hole_range(PEER, 0, 1, 100, MessageTags::ALL);
            tx.get_message_history_holes(PEER, 0)
        })
        .await
        .expect("add hole");
    assert_eq!(ranges(&seeded), vec![(1, 100)]);

    let hole = seeded[0];
    let fill = HoleFill::new(
        false,
        HoleFillDirection::UpperToLower {
            upper_bound: Some(25),
        },
    );
    let stored = store
        .transaction(move |tx| {
            tx.fill_hole(&hole, fill, None, vec![message(10), message(20), message(30)]);
            tx.filter_stored_message_ids(&[id(10), id(20), id(30)])
        })
        .await
        .expect("fill");

    assert_eq!(stored, BTreeSet::from([id(10), id(20)]));
    assert_eq!(ranges(&holes(&store).await), vec![(26, 100)]);
}

#[tokio::test]
async fn repeating_a_fill_changes_nothing() {
    let store = open(ChatStoreConfig::development()).await;
    let hole = store
        .transaction(|tx| {
            tx.add_hole_range(PEER, 0, 1, 100, MessageTags::ALL);
            tx.get_message_history_holes(PEER, 0)[0]
        })
        .await
        .expect("add hole");
    let fill = HoleFill::new(
        false,
        HoleFillDirection::UpperToLower {
            upper_bound: Some(25),
        },
    );
    store
        .transaction(move |tx| tx.fill_hole(&hole, fill, None, vec![message(10), message(20)]))
        .await
        .expect("first fill");
    let version = store.state_version().await.expect("version");
    let after_first = holes(&store).await;

    store
        .transaction(move |tx| tx.fill_hole(&hole, fill, None, vec![message(10), message(20)]))
        .await
        .expect("second fill");

    assert_eq!(store.state_version().await.expect("version"), version);
    assert_eq!(holes(&store).await, after_first);
}

#[tokio::test]
async fn tagged_fill_leaves_other_partitions_unknown() {
    let config = ChatStoreConfig::development().with_seed(SeedConfiguration {
        existing_message_tags: MessageTags::bit(0) | MessageTags::bit(1),
        ..SeedConfiguration::default()
    });
    let store = open(config).await;
    let hole = store
        .transaction(|tx| {
            tx.add_hole_range(PEER, 0, 1, 100, MessageTags::ALL);
            tx.get_message_history_holes(PEER, 0)[0]
        })
        .await
        .expect("add hole");

    let fill = HoleFill::new(true, HoleFillDirection::UpperToLower { upper_bound: None });
    store
        .transaction(move |tx| {
            tx.fill_hole(
                &hole,
                fill,
                Some(MessageTags::bit(0)),
                vec![message(50).with_tags(MessageTags::bit(0))],
            )
        })
        .await
        .expect("tagged fill");

    let remaining = holes(&store).await;
    assert_eq!(ranges(&remaining), vec![(1, 49), (51, 100)]);
    assert!(
        remaining
            .iter()
            .all(|hole| !hole.tags.intersects(MessageTags::bit(0)))
    );
    assert!(
        remaining
            .iter()
            .all(|hole| hole.tags.intersects(MessageTags::bit(1)))
    );
}

#[tokio::test]
async fn multiple_hole_fill_widens_to_the_batch() {
    let store = open(ChatStoreConfig::development()).await;
    let first = store
        .transaction(|tx| {
            tx.add_messages(vec![message(15)], AddMessagesLocation::Random);
            tx.add_hole_range(PEER, 0, 1, 10, MessageTags::ALL);
            tx.add_hole_range(PEER, 0, 20, 30, MessageTags::ALL);
            tx.get_message_history_holes(PEER, 0)[0]
        })
        .await
        .expect("seed");
    assert_eq!((first.min_id, first.max_id()), (1, 10));

    let fill = HoleFill::new(
        false,
        HoleFillDirection::Around {
            lower_bound: Some(5),
            upper_bound: None,
        },
    );
    let stored = store
        .transaction(move |tx| {
            tx.fill_multiple_holes(
                &first,
                fill,
                None,
                vec![message(5), message(8), message(22), message(25)],
            );
            tx.filter_stored_message_ids(&[id(5), id(8), id(15), id(22), id(25)])
        })
        .await
        .expect("fill");

    assert_eq!(stored.len(), 5);
    assert_eq!(ranges(&holes(&store).await), vec![(1, 4), (26, 30)]);
}

#[tokio::test]
async fn add_hole_spans_the_surrounding_gap() {
    let store = open(ChatStoreConfig::development()).await;
    store
        .transaction(|tx| {
            tx.add_messages(vec![message(10), message(20)], AddMessagesLocation::Random);
            tx.add_hole(id(15));
            tx.add_hole(id(10));
            tx.add_hole(id(17));
        })
        .await
        .expect("add holes");

    let holes = holes(&store).await;
    assert_eq!(ranges(&holes), vec![(11, 19)]);
    assert_eq!(holes[0].tags, MessageTags::ALL);
}

#[tokio::test]
async fn upper_history_block_resolves_its_span() {
    let store = open(ChatStoreConfig::development()).await;
    store
        .transaction(|tx| {
            tx.add_hole_range(PEER, 0, 1, 100, MessageTags::ALL);
            tx.add_messages(
                vec![message(40), message(60)],
                AddMessagesLocation::UpperHistoryBlock,
            );
        })
        .await
        .expect("block");

    assert_eq!(ranges(&holes(&store).await), vec![(1, 39), (61, 100)]);
}

#[tokio::test]
async fn configured_namespaces_start_as_one_hole() {
    let config = ChatStoreConfig::development().with_seed(SeedConfiguration {
        initialize_message_namespaces_with_holes: vec![(0, 0)],
        ..SeedConfiguration::default()
    });
    let store = open(config).await;
    store
        .transaction(|tx| tx.add_messages(vec![message(50)], AddMessagesLocation::Random))
        .await
        .expect("add");

    assert_eq!(
        ranges(&holes(&store).await),
        vec![(1, 49), (51, i32::MAX)]
    );
}
