//! Bulk import E2E tests.
//!
//! History imported through the importer is searchable right away and the
//! imported chats keep following live updates.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use btts_indexing::{ExportConfig, ImportStage, ImportTarget, IngestOutcome, ResolvedPeer};
use btts_types::{
    ChatEntity, ChatEntityKind, ChatType, Dialog, Entities, Message, MessageRange, Peer, Update,
    UserEntity,
};
use e2e_tests::{group_message, platform, TestHarness};

fn newsroom() -> Entities {
    Entities::new().with_chat(ChatEntity {
        id: 500,
        title: "Newsroom".into(),
        username: Some("newsroom".into()),
        kind: ChatEntityKind::Channel,
    })
}

fn posts(count: i64) -> Vec<Message> {
    (1..=count)
        .map(|id| {
            Message::text(id, Peer::Channel(500), id * 60, format!("dispatch {}", id)).as_post()
        })
        .collect()
}

#[tokio::test]
async fn test_username_import_then_live_updates() {
    let harness = TestHarness::new();
    let scripted = platform()
        .with_username(
            "newsroom",
            ResolvedPeer {
                peer: Peer::Channel(500),
                entities: newsroom(),
            },
        )
        .with_history(500, posts(25));
    let importer = harness.importer(Arc::new(scripted), 10);

    let mut stages = Vec::new();
    let summary = importer
        .import_chat(
            ImportTarget::Username("@newsroom".into()),
            &CancellationToken::new(),
            &mut |p| stages.push(p.stage),
        )
        .await
        .unwrap();

    assert_eq!(summary.chat_id, 500);
    assert_eq!(summary.processed, 25);
    assert_eq!(summary.indexed, 25);
    assert_eq!(stages.first(), Some(&ImportStage::Init));
    assert_eq!(stages.last(), Some(&ImportStage::Complete));

    let chat = harness.watched.get(500).unwrap();
    assert_eq!(chat.title, "Newsroom");
    assert_eq!(chat.chat_type, ChatType::Channel);
    assert!(chat.watching);

    let hits = harness.search_ids(500, "dispatch").await;
    assert_eq!(hits.len(), 25);
    assert_eq!(hits[0], 25);

    let live = Message::text(26, Peer::Channel(500), 26 * 60, "late dispatch").as_post();
    let outcome = harness
        .ingestor
        .handle_update(&Update::NewMessage { message: live, pts: None }, &Entities::new())
        .await;
    assert_eq!(outcome, IngestOutcome::Indexed);
    assert_eq!(harness.search_ids(500, "late").await, vec![26]);
}

#[tokio::test]
async fn test_account_export_selects_dialog_kinds() {
    let harness = TestHarness::new();
    let entities = newsroom()
        .with_user(UserEntity {
            id: 7,
            username: None,
            first_name: "Alice".into(),
            last_name: "Smith".into(),
        })
        .with_chat(ChatEntity {
            id: -42,
            title: "Ops".into(),
            username: None,
            kind: ChatEntityKind::Group,
        });
    let scripted = Arc::new(
        platform()
            .with_ranges(vec![MessageRange::new(1, 100)])
            .with_dialogs(vec![
                Dialog {
                    peer: Peer::User(7),
                    top_message: 2,
                },
                Dialog {
                    peer: Peer::Chat(-42),
                    top_message: 2,
                },
                Dialog {
                    peer: Peer::Channel(500),
                    top_message: 3,
                },
            ])
            .with_entities(entities)
            .with_history(
                7,
                vec![
                    Message::text(1, Peer::User(7), 10, "archive hello"),
                    Message::text(2, Peer::User(7), 20, "archive reply").outgoing(),
                ],
            )
            .with_history(
                -42,
                vec![
                    group_message(1, Peer::Chat(-42), 7, 30, "archive standup"),
                    group_message(2, Peer::Chat(-42), 8, 40, "archive retro"),
                ],
            )
            .with_history(500, posts(3)),
    );
    let importer = harness.importer(scripted.clone(), 10);
    let export = ExportConfig {
        channels: false,
        ..Default::default()
    };

    let summary = importer
        .export_account(&export, &CancellationToken::new(), &mut |_| {})
        .await
        .unwrap();

    assert_eq!(summary.dialogs, 3);
    assert_eq!(summary.chats, vec![7, -42]);
    assert_eq!(summary.indexed, 4);
    assert_eq!(scripted.takeout_log(), vec!["init", "finish:true"]);

    assert_eq!(harness.watched.get(7).unwrap().title, "Alice Smith");
    assert_eq!(harness.watched.get(-42).unwrap().chat_type, ChatType::Group);
    assert!(harness.watched.get(500).is_none());

    let everywhere = harness
        .service
        .search_all_watched("archive", &Default::default(), 0, 10)
        .await
        .unwrap();
    assert_eq!(everywhere.estimated_total_hits, 4);
    assert_eq!(everywhere.hits[0].document.id, 2);
    assert_eq!(everywhere.hits[0].document.chat_id, -42);
}

#[tokio::test]
async fn test_cancelled_export_finishes_takeout_unsuccessfully() {
    let harness = TestHarness::new();
    let scripted = Arc::new(
        platform()
            .with_ranges(vec![MessageRange::new(1, 100)])
            .with_dialogs(vec![Dialog {
                peer: Peer::User(7),
                top_message: 1,
            }]),
    );
    let importer = harness.importer(scripted.clone(), 10);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = importer
        .export_account(&ExportConfig::default(), &cancel, &mut |_| {})
        .await;

    assert!(result.is_err());
    assert_eq!(scripted.takeout_log(), vec!["init", "finish:false"]);
    assert!(harness.watched.is_empty());
}
