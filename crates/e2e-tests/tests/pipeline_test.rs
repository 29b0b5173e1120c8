//! Live ingestion E2E tests.
//!
//! Updates flow through the ingestor into the index and come back out of the
//! search service: ordering, edits, tombstones and author bookkeeping.

use pretty_assertions::assert_eq;

use btts_indexing::{IngestOutcome, SkipReason};
use btts_search::SearchRequest;
use btts_types::{ChatType, Entities, Media, Message, MessageType, Peer, Update, UserEntity};
use e2e_tests::{group_message, TestHarness, SELF_ID};

fn new_message(message: Message) -> Update {
    Update::NewMessage { message, pts: None }
}

#[tokio::test]
async fn test_ingest_then_search_newest_first() {
    let harness = TestHarness::new();
    harness.watch(-42, "Ops", ChatType::Group).await;
    let group = Peer::Chat(-42);

    for (id, date, text) in [
        (1, 100, "deploy started"),
        (2, 200, "lunch anyone?"),
        (3, 300, "deploy finished"),
        (4, 400, "rollback the deploy"),
    ] {
        let update = new_message(group_message(id, group, 7, date, text));
        let outcome = harness.ingestor.handle_update(&update, &Entities::new()).await;
        assert_eq!(outcome, IngestOutcome::Indexed);
    }

    assert_eq!(harness.search_ids(-42, "deploy").await, vec![4, 3, 1]);

    let response = harness
        .service
        .search(SearchRequest::chat(-42, "deploy").with_page(1, 1))
        .await
        .unwrap();
    assert_eq!(response.estimated_total_hits, 3);
    assert_eq!(response.hits.len(), 1);
    assert_eq!(response.hits[0].document.id, 3);
    assert_eq!(response.hits[0].document.chat_id, -42);
    assert_eq!(response.hits[0].formatted.message, "deploy finished");
}

#[tokio::test]
async fn test_edit_overwrites_document() {
    let harness = TestHarness::new();
    harness.watch(-42, "Ops", ChatType::Group).await;
    let group = Peer::Chat(-42);

    let original = new_message(group_message(5, group, 7, 100, "teh typo"));
    harness.ingestor.handle_update(&original, &Entities::new()).await;
    let edit = Update::EditMessage {
        message: group_message(5, group, 7, 100, "the fix"),
        pts: None,
    };
    assert_eq!(
        harness.ingestor.handle_update(&edit, &Entities::new()).await,
        IngestOutcome::Indexed
    );

    assert!(harness.search_ids(-42, "typo").await.is_empty());
    assert_eq!(harness.search_ids(-42, "fix").await, vec![5]);
    assert_eq!(harness.search_ids(-42, "").await, vec![5]);
}

#[tokio::test]
async fn test_channel_tombstones_respect_no_delete() {
    let harness = TestHarness::new();
    harness.watch(500, "News", ChatType::Channel).await;
    let channel = Peer::Channel(500);

    for id in 1..=3 {
        let post = Message::text(id, channel, id * 10, format!("bulletin {}", id)).as_post();
        harness
            .ingestor
            .handle_update(&new_message(post), &Entities::new())
            .await;
    }
    let delete = |ids: Vec<i64>| Update::DeleteChannelMessages {
        channel_id: 500,
        ids,
        pts: None,
    };

    assert_eq!(
        harness.ingestor.handle_update(&delete(vec![1]), &Entities::new()).await,
        IngestOutcome::Deleted(1)
    );
    assert_eq!(harness.search_ids(500, "bulletin").await, vec![3, 2]);

    harness.set_no_delete(500, true);
    assert_eq!(
        harness.ingestor.handle_update(&delete(vec![2]), &Entities::new()).await,
        IngestOutcome::Skipped(SkipReason::NoDelete)
    );
    assert_eq!(harness.search_ids(500, "bulletin").await, vec![3, 2]);
}

#[tokio::test]
async fn test_unwatched_and_empty_messages_are_skipped() {
    let harness = TestHarness::new();
    harness.watch(-42, "Ops", ChatType::Group).await;

    let elsewhere = group_message(1, Peer::Chat(-99), 7, 100, "secret");
    assert_eq!(
        harness
            .ingestor
            .handle_update(&new_message(elsewhere), &Entities::new())
            .await,
        IngestOutcome::Skipped(SkipReason::NotWatched)
    );

    let blank = group_message(2, Peer::Chat(-42), 7, 100, "");
    assert_eq!(
        harness
            .ingestor
            .handle_update(&new_message(blank), &Entities::new())
            .await,
        IngestOutcome::Skipped(SkipReason::NoText)
    );

    let unknown = harness
        .service
        .search(SearchRequest::chat(-99, "secret"))
        .await
        .unwrap();
    assert!(unknown.hits.is_empty());
}

#[tokio::test]
async fn test_authors_and_type_filters() {
    let harness = TestHarness::new();
    harness.watch(7, "Alice", ChatType::Private).await;
    let alice = Peer::User(7);
    let entities = Entities::new().with_user(UserEntity {
        id: 7,
        username: Some("alice".into()),
        first_name: "Alice".into(),
        last_name: "Smith".into(),
    });

    let incoming = Message::text(1, alice, 100, "sunset at the pier");
    let outgoing = Message::text(2, alice, 200, "sunset was great").outgoing();
    let photo = Message::text(3, alice, 300, "sunset photo").with_media(Media::Photo);
    for message in [incoming, outgoing, photo] {
        harness
            .ingestor
            .handle_update(&new_message(message), &entities)
            .await;
    }

    let info = harness.storage.get_user_info(7).unwrap().unwrap();
    assert_eq!(info.username.as_deref(), Some("alice"));
    assert_eq!(info.first_name, "Alice");

    let mine = harness
        .service
        .search(SearchRequest::chat(7, "sunset").with_users(vec![SELF_ID]))
        .await
        .unwrap();
    let ids: Vec<i64> = mine.hits.iter().map(|h| h.document.id).collect();
    assert_eq!(ids, vec![2]);

    let photos = harness
        .service
        .search(SearchRequest::chat(7, "sunset").with_types(vec![MessageType::Photo]))
        .await
        .unwrap();
    assert_eq!(photos.hits.len(), 1);
    assert_eq!(photos.hits[0].document.kind, MessageType::Photo);
    assert_eq!(photos.hits[0].document.user_id, 7);
}
