use serde_json::json;
use sobject_sync::models::Record;
use sobject_sync::sync::{Catalog, TickReport};
use sobject_sync::test_support::{
    FakeRemote, TestDatabase, object_definition, record, seed_connection, test_config,
    test_engine, test_engine_with,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn accounts(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| record(json!({"Id": format!("001{i:03}"), "Name": format!("Account {i}")})))
        .collect()
}

fn remote_with_account_and_contact() -> Arc<FakeRemote> {
    let remote = Arc::new(FakeRemote::new());
    remote.add_object(object_definition("Account", &[("Id", "id"), ("Name", "string")]));
    remote.add_object(object_definition("Contact", &[("Id", "id"), ("Email", "string")]));
    remote
}

#[tokio::test]
async fn failing_object_does_not_block_siblings() {
    let test_db = TestDatabase::new().await.expect("test database");
    seed_connection(&test_db).await.expect("seed connection");

    let remote = remote_with_account_and_contact();
    remote.set_records("Account", accounts(3));
    remote.set_records("Contact", vec![record(json!({"Id": "003A", "Email": "a@x.io"}))]);
    remote.fail_queries("Account");

    let engine = test_engine(&test_db, Arc::clone(&remote));
    engine.enable_sync("Account").await.expect("enable Account");
    engine.enable_sync("Contact").await.expect("enable Contact");

    let report = engine.scheduler().tick().await;
    assert_eq!(report.synced, vec!["Contact".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "Account");
    assert!(report.failed[0].1.contains("503"), "got {}", report.failed[0].1);

    assert_eq!(test_db.row_count("Contact").await.expect("count"), 1);
    assert_eq!(test_db.row_count("Account").await.expect("count"), 0);

    let account = engine.entry("Account").await.expect("Account entry");
    let contact = engine.entry("Contact").await.expect("Contact entry");
    assert!(account.last_sync.is_none());
    assert!(contact.last_sync.is_some());
}

#[tokio::test]
async fn failed_object_is_retried_on_the_next_tick() {
    let test_db = TestDatabase::new().await.expect("test database");
    seed_connection(&test_db).await.expect("seed connection");

    let remote = remote_with_account_and_contact();
    remote.set_records("Account", accounts(2));
    remote.fail_queries("Account");

    let engine = test_engine(&test_db, Arc::clone(&remote));
    engine.enable_sync("Account").await.expect("enable");

    let first = engine.scheduler().tick().await;
    assert_eq!(first.failed.len(), 1);

    remote.recover("Account");

    let second = engine.scheduler().tick().await;
    assert_eq!(second.synced, vec!["Account".to_string()]);
    assert_eq!(test_db.row_count("Account").await.expect("count"), 2);
}

#[tokio::test]
async fn missing_credentials_fail_every_cycle_without_remote_calls() {
    let test_db = TestDatabase::new().await.expect("test database");
    let remote = remote_with_account_and_contact();

    let catalog = Catalog::new(test_db.pool_clone());
    catalog
        .enable_sync(&object_definition("Account", &[("Id", "id"), ("Name", "string")]))
        .await
        .expect("enable Account");

    let engine = test_engine(&test_db, Arc::clone(&remote));
    let report = engine.scheduler().tick().await;

    assert!(report.synced.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].1.contains("no valid credentials"));
    assert_eq!(remote.query_calls("Account"), 0);
}

#[tokio::test]
async fn cycle_follows_next_records_url_until_done() {
    let test_db = TestDatabase::new().await.expect("test database");
    seed_connection(&test_db).await.expect("seed connection");

    let remote = remote_with_account_and_contact();
    remote.set_records("Account", accounts(5));
    remote.set_page_size(2);

    let engine = test_engine(&test_db, Arc::clone(&remote));
    engine.enable_sync("Account").await.expect("enable");

    let report = engine.scheduler().tick().await;
    assert_eq!(report.synced, vec!["Account".to_string()]);
    assert_eq!(test_db.row_count("Account").await.expect("count"), 5);
    assert_eq!(remote.query_calls("Account"), 1);
}

#[tokio::test]
async fn objects_not_in_pull_status_are_ignored() {
    let test_db = TestDatabase::new().await.expect("test database");
    seed_connection(&test_db).await.expect("seed connection");

    let remote = remote_with_account_and_contact();
    let engine = test_engine(&test_db, Arc::clone(&remote));
    engine.enable_sync("Account").await.expect("enable");

    sqlx::query("UPDATE syncd_objects SET status = 'push' WHERE sobject_name = 'Account'")
        .execute(test_db.pool())
        .await
        .expect("park Account");

    let report = engine.scheduler().tick().await;
    assert_eq!(report, TickReport::default());
    assert_eq!(remote.query_calls("Account"), 0);
}

#[tokio::test]
async fn run_loop_ticks_until_cancelled() {
    let test_db = TestDatabase::new().await.expect("test database");
    seed_connection(&test_db).await.expect("seed connection");

    let remote = remote_with_account_and_contact();
    remote.set_records("Account", accounts(1));

    let engine = test_engine(&test_db, Arc::clone(&remote));
    engine.enable_sync("Account").await.expect("enable");

    let token = CancellationToken::new();
    let handle = tokio::spawn(engine.scheduler().run(token.clone()));

    tokio::time::timeout(Duration::from_secs(5), async {
        while remote.query_calls("Account") < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("scheduler ticked twice");

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler stopped")
        .expect("scheduler task joined");

    let entry = engine.entry("Account").await.expect("entry");
    assert!(entry.last_sync.is_some());
}

#[tokio::test]
async fn hanging_query_times_out_without_stalling_siblings() {
    let test_db = TestDatabase::new().await.expect("test database");
    seed_connection(&test_db).await.expect("seed connection");

    let remote = remote_with_account_and_contact();
    remote.set_records("Account", accounts(2));
    remote.set_records("Contact", vec![record(json!({"Id": "003A", "Email": "a@x.io"}))]);
    let _gate = remote.hold_queries("Account");

    let mut config = test_config();
    config.request_timeout = Duration::from_millis(200);
    let engine = test_engine_with(&test_db, Arc::clone(&remote), config);
    engine.enable_sync("Account").await.expect("enable Account");
    engine.enable_sync("Contact").await.expect("enable Contact");

    let report = tokio::time::timeout(Duration::from_secs(5), engine.scheduler().tick())
        .await
        .expect("tick finished despite the hanging query");

    assert_eq!(report.synced, vec!["Contact".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "Account");
    assert!(report.failed[0].1.contains("timed out"), "got {}", report.failed[0].1);

    assert!(!engine.runner().in_flight().is_active("Account"));
    assert!(engine.entry("Account").await.expect("entry").last_sync.is_none());
    assert_eq!(test_db.row_count("Contact").await.expect("count"), 1);
}
