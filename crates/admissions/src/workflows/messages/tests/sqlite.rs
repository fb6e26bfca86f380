use std::sync::Arc;
use std::thread;

use chrono::Duration;
use tempfile::TempDir;

use super::common::*;
use crate::workflows::applications::RepositoryError;
use crate::workflows::messages::{
    InquiryType, MessageId, MessageListParams, MessageRepository, MessageService, MessageStatus,
    MessageUpdate, SqliteMessageRepository,
};

#[test]
fn messages_persist_and_filter_in_sqlite() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("admissions.db");
    let service = MessageService::new(Arc::new(
        SqliteMessageRepository::open(&path).expect("open"),
    ));

    let visit = service
        .create_at(message_form("Kofi Boateng", "visit"), received_at())
        .expect("created");
    service
        .create_at(
            message_form("Ama Owusu", "admission"),
            received_at() + Duration::minutes(5),
        )
        .expect("created");
    service
        .update_at(
            &visit.id,
            MessageUpdate {
                status: Some("archived".to_string()),
                ..MessageUpdate::default()
            },
            &staff(),
            received_at() + Duration::hours(1),
        )
        .expect("archived");
    drop(service);

    let reopened = SqliteMessageRepository::open(&path).expect("reopen");
    let stored = reopened
        .fetch(&visit.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.status, MessageStatus::Archived);

    let service = MessageService::new(Arc::new(reopened));
    let page = service
        .list(MessageListParams {
            status: Some("archived".to_string()),
            ..MessageListParams::default()
        })
        .expect("listed");
    assert_eq!(page.pagination.total_messages, 1);
    assert_eq!(page.messages[0].inquiry_type, InquiryType::Visit);

    let stats = service.stats().expect("stats");
    assert_eq!(stats.total, 2);
    assert_eq!(stats.new, 1);
    assert_eq!(stats.archived, 1);
}

#[test]
fn modify_rejects_id_changes_and_unknown_ids() {
    let repository = SqliteMessageRepository::open_in_memory().expect("open");
    let service = MessageService::new(Arc::new(repository));
    let record = service
        .create_at(message_form("Efua Asante", "information"), received_at())
        .expect("created");
    let repository = service.repository();

    let changed = repository.modify(&record.id, |record| {
        record.id = MessageId("other".to_string())
    });
    assert!(matches!(changed, Err(RepositoryError::Conflict)));
    assert_eq!(
        repository.fetch(&record.id).expect("fetch").as_ref(),
        Some(&record)
    );

    assert!(matches!(
        repository.modify(&MessageId("missing".to_string()), |_| {}),
        Err(RepositoryError::NotFound)
    ));
}

#[test]
fn concurrent_opens_mark_read_once() {
    let dir = TempDir::new().expect("temp dir");
    let service = MessageService::new(Arc::new(
        SqliteMessageRepository::open(dir.path().join("admissions.db")).expect("open"),
    ));
    let record = service
        .create_at(message_form("Yaw Darko", "admission"), received_at())
        .expect("created");

    let opened: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|offset| {
                let service = &service;
                let id = &record.id;
                scope.spawn(move || {
                    service
                        .open_at(id, &staff(), received_at() + Duration::minutes(offset + 1))
                        .expect("opened")
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("reader thread"))
            .collect()
    });

    let stored = service
        .repository()
        .fetch(&record.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.status, MessageStatus::Read);
    for record in &opened {
        assert_eq!(record.updated_at, stored.updated_at);
    }
}
