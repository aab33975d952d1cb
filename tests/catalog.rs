use sobject_sync::models::SyncStatus;
use sobject_sync::sync::{Catalog, SyncError};
use sobject_sync::test_support::{TestDatabase, object_definition};

async fn table_columns(test_db: &TestDatabase, table: &str) -> Vec<(String, String, i64)> {
    sqlx::query_as("SELECT name, type, pk FROM pragma_table_info(?) ORDER BY cid")
        .bind(table)
        .fetch_all(test_db.pool())
        .await
        .expect("pragma_table_info")
}

#[tokio::test]
async fn enabling_account_creates_table_and_pull_entry() {
    let test_db = TestDatabase::new().await.expect("test database");
    let catalog = Catalog::new(test_db.pool_clone());

    let def = object_definition("Account", &[("Id", "id"), ("Name", "string")]);
    let entry = catalog.enable_sync(&def).await.expect("enable sync");

    assert_eq!(entry.sobject_name, "Account");
    assert_eq!(entry.status, SyncStatus::Pull);
    assert!(entry.last_sync.is_none());
    assert_eq!(entry.sfdc_definition, def);

    assert_eq!(
        table_columns(&test_db, "Account").await,
        vec![
            ("Id".to_string(), "TEXT".to_string(), 1),
            ("Name".to_string(), "TEXT".to_string(), 0),
        ]
    );

    let stored = catalog.get("Account").await.expect("get").expect("row");
    assert_eq!(stored.status, SyncStatus::Pull);
    assert_eq!(stored.sql_definition["table"], "Account");
}

#[tokio::test]
async fn unsupported_field_type_leaves_no_trace() {
    let test_db = TestDatabase::new().await.expect("test database");
    let catalog = Catalog::new(test_db.pool_clone());

    let def = object_definition("Widget__c", &[("Id", "id"), ("Blob__c", "base64")]);
    let err = catalog.enable_sync(&def).await.expect_err("base64 is unsupported");

    match err {
        SyncError::UnsupportedType { field, field_type } => {
            assert_eq!(field, "Blob__c");
            assert_eq!(field_type, "base64");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(!test_db.table_exists("Widget__c").await.expect("lookup"));
    assert!(catalog.get("Widget__c").await.expect("get").is_none());
}

#[tokio::test]
async fn enabling_twice_keeps_one_entry_and_one_table() {
    let test_db = TestDatabase::new().await.expect("test database");
    let catalog = Catalog::new(test_db.pool_clone());

    let def = object_definition("Contact", &[("Id", "id"), ("Email", "string")]);
    catalog.enable_sync(&def).await.expect("first enable");
    catalog.enable_sync(&def).await.expect("second enable");

    let entries = catalog.list(None).await.expect("list");
    assert_eq!(entries.len(), 1);

    let tables: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'Contact'",
    )
    .fetch_one(test_db.pool())
    .await
    .expect("count tables");
    assert_eq!(tables, 1);
}

#[tokio::test]
async fn incompatible_existing_table_is_a_conflict() {
    let test_db = TestDatabase::new().await.expect("test database");
    let catalog = Catalog::new(test_db.pool_clone());

    sqlx::query(r#"CREATE TABLE "Lead" ("Id" INTEGER PRIMARY KEY, "Company" TEXT)"#)
        .execute(test_db.pool())
        .await
        .expect("create legacy table");

    let def = object_definition("Lead", &[("Id", "id"), ("Company", "string")]);
    let err = catalog.enable_sync(&def).await.expect_err("conflict");
    assert!(matches!(err, SyncError::SchemaConflict { .. }), "got {err:?}");
    assert!(catalog.get("Lead").await.expect("get").is_none());
}

#[tokio::test]
async fn redefining_fields_after_enable_is_rejected() {
    let test_db = TestDatabase::new().await.expect("test database");
    let catalog = Catalog::new(test_db.pool_clone());

    catalog
        .enable_sync(&object_definition("Case", &[("Id", "id"), ("Subject", "string")]))
        .await
        .expect("enable");

    let widened = object_definition(
        "Case",
        &[("Id", "id"), ("Subject", "string"), ("Priority", "picklist")],
    );
    let err = catalog.enable_sync(&widened).await.expect_err("schema drift");
    assert!(matches!(err, SyncError::SchemaConflict { .. }), "got {err:?}");

    let stored = catalog.get("Case").await.expect("get").expect("row");
    assert_eq!(stored.sfdc_definition.fields.len(), 2);
}

#[tokio::test]
async fn list_filters_by_status_and_touch_stamps_last_sync() {
    let test_db = TestDatabase::new().await.expect("test database");
    let catalog = Catalog::new(test_db.pool_clone());

    catalog
        .enable_sync(&object_definition("Account", &[("Id", "id")]))
        .await
        .expect("enable");

    sqlx::query("INSERT INTO syncd_objects (sobject_name, sfdc_definition, sql_definition, status) VALUES ('Parked', '{\"name\":\"Parked\"}', '{}', 'none')")
        .execute(test_db.pool())
        .await
        .expect("insert parked entry");

    let pulls = catalog.list(Some(SyncStatus::Pull)).await.expect("list pull");
    assert_eq!(pulls.len(), 1);
    assert_eq!(pulls[0].sobject_name, "Account");

    let now = chrono::Utc::now();
    catalog.touch("Account", now).await.expect("touch");
    let stored = catalog.get("Account").await.expect("get").expect("row");
    let last_sync = stored.last_sync.expect("last_sync set");
    assert!((last_sync - now).num_seconds().abs() <= 1);

    let err = catalog.touch("Missing", now).await.expect_err("unknown object");
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[tokio::test]
async fn enables_succeed_while_other_writes_commit() {
    let test_db = TestDatabase::new().await.expect("test database");
    let catalog = Catalog::new(test_db.pool_clone());

    catalog
        .enable_sync(&object_definition("Base", &[("Id", "id")]))
        .await
        .expect("enable Base");

    let toucher = {
        let catalog = catalog.clone();
        tokio::spawn(async move {
            for _ in 0..300 {
                catalog
                    .touch("Base", chrono::Utc::now())
                    .await
                    .expect("touch Base");
            }
        })
    };

    for i in 0..30 {
        let name = format!("Obj{i}");
        catalog
            .enable_sync(&object_definition(&name, &[("Id", "id"), ("Name", "string")]))
            .await
            .unwrap_or_else(|e| panic!("enable {name} during touches: {e}"));
    }

    let concurrent: Vec<_> = (0..8)
        .map(|i| {
            let catalog = catalog.clone();
            let name = if i % 2 == 0 { "Lead" } else { "Case" };
            tokio::spawn(async move {
                catalog
                    .enable_sync(&object_definition(name, &[("Id", "id"), ("Subject", "string")]))
                    .await
            })
        })
        .collect();

    for handle in concurrent {
        handle
            .await
            .expect("enable task joined")
            .expect("concurrent enable succeeds");
    }
    toucher.await.expect("toucher joined");

    let entries = catalog.list(None).await.expect("list");
    assert_eq!(entries.len(), 33);
}
