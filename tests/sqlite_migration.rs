//! Import, export and status against the embedded SQLite backend.

mod common;

use mudmigrate::entities;
use mudmigrate::migrate::Migrator;
use mudmigrate::storage::{Backend, BackendKind};
use serde_json::json;
use tempfile::tempdir;

fn migrator(root: &std::path::Path) -> Migrator {
    Migrator::new(common::config_in(root), BackendKind::Documents, false)
}

async fn sqlite_count(migrator: &Migrator, collection: &str) -> Option<usize> {
    migrator
        .status()
        .await
        .backend(BackendKind::EmbeddedRelational)
        .and_then(|b| b.count(collection))
}

#[tokio::test]
async fn import_then_status_reports_user_count() {
    let tmp = tempdir().unwrap();
    let m = migrator(tmp.path());
    common::write_sample_documents(&m.config().data_dir());

    let report = m.import(Some(BackendKind::EmbeddedRelational)).await.unwrap();
    assert_eq!(report.entity("users").unwrap().written, 3);
    assert_eq!(report.total_skipped(), 0);

    let status = m.status().await;
    let sqlite = status.backend(BackendKind::EmbeddedRelational).unwrap();
    assert_eq!(sqlite.count("users"), Some(3));
    assert!(status.to_string().contains("users:"));
    for def in entities::registry() {
        assert_eq!(
            sqlite.count(def.collection),
            Some(common::sample_count(def.collection)),
            "{}",
            def.collection
        );
    }
}

#[tokio::test]
async fn import_defaults_to_embedded_when_documents_are_active() {
    let tmp = tempdir().unwrap();
    let m = migrator(tmp.path());
    common::write_sample_documents(&m.config().data_dir());

    let report = m.import(None).await.unwrap();
    assert_eq!(report.destination, "embedded-relational");
    assert!(m.config().sqlite_path().exists());
}

#[tokio::test]
async fn repeated_import_does_not_duplicate() {
    let tmp = tempdir().unwrap();
    let m = migrator(tmp.path());
    common::write_sample_documents(&m.config().data_dir());

    m.import(Some(BackendKind::EmbeddedRelational)).await.unwrap();
    let first: Vec<_> = entities::registry()
        .iter()
        .map(|d| d.collection)
        .collect();
    let mut counts = Vec::new();
    for c in &first {
        counts.push(sqlite_count(&m, c).await);
    }

    m.import(Some(BackendKind::EmbeddedRelational)).await.unwrap();
    m.import(Some(BackendKind::EmbeddedRelational)).await.unwrap();
    for (c, expected) in first.iter().zip(counts) {
        assert_eq!(sqlite_count(&m, c).await, expected, "{c}");
    }
    assert_eq!(sqlite_count(&m, "mud_config").await, Some(1));
    assert_eq!(sqlite_count(&m, "game_timer_config").await, Some(1));
}

#[tokio::test]
async fn missing_singleton_document_gets_one_default_row() {
    let tmp = tempdir().unwrap();
    let m = migrator(tmp.path());
    let data = m.config().data_dir();
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join("users.json"), r#"[{"username": "solo"}]"#).unwrap();

    let report = m.import(Some(BackendKind::EmbeddedRelational)).await.unwrap();
    assert!(report.entity("rooms").unwrap().missing);
    assert_eq!(report.entity("mud_config").unwrap().written, 1);
    assert_eq!(sqlite_count(&m, "mud_config").await, Some(1));
    assert_eq!(sqlite_count(&m, "game_timer_config").await, Some(1));
    assert_eq!(sqlite_count(&m, "rooms").await, Some(0));

    // A configured singleton is not reset by a later import without its file.
    std::fs::write(data.join("mud_config.json"), r#"{"name": "Custom"}"#).unwrap();
    m.import(Some(BackendKind::EmbeddedRelational)).await.unwrap();
    std::fs::remove_file(data.join("mud_config.json")).unwrap();
    m.import(Some(BackendKind::EmbeddedRelational)).await.unwrap();

    let backend = Backend::open_read_only(BackendKind::EmbeddedRelational, &m.config().connect_params())
        .await
        .unwrap();
    let cfg = common::entity("mud_config");
    let rows = backend.read_rows(cfg).await.unwrap().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(cfg.from_row(&rows[0]).unwrap()["name"], json!("Custom"));
}

#[tokio::test]
async fn documents_to_sqlite_to_documents_is_lossless() {
    let tmp = tempdir().unwrap();
    let original = migrator(tmp.path());
    common::write_sample_documents(&original.config().data_dir());
    original.import(Some(BackendKind::EmbeddedRelational)).await.unwrap();

    // Export into a fresh directory sharing the same database file.
    let mut config = original.config().clone();
    config.storage.data_dir = tmp.path().join("exported").to_string_lossy().into_owned();
    let exporter = Migrator::new(config, BackendKind::EmbeddedRelational, false);
    let report = exporter.export(None).await.unwrap();
    assert_eq!(report.source, "embedded-relational");

    for def in entities::registry() {
        let before = common::read_normalized(&original.config().data_dir(), def);
        let after = common::read_normalized(&exporter.config().data_dir(), def);
        assert_eq!(before, after, "{}", def.collection);
        assert_eq!(report.entity(def.collection).unwrap().written, before.len());
    }

    let users: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(exporter.config().data_dir().join("users.json")).unwrap(),
    )
    .unwrap();
    let bob = users
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["username"] == json!("bob"))
        .unwrap();
    assert!(bob.get("email").is_none(), "email must be omitted, not null");
    let mud: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(exporter.config().data_dir().join("mud_config.json")).unwrap(),
    )
    .unwrap();
    assert!(mud.is_object());
}

#[tokio::test]
async fn reimport_updates_only_mutable_columns() {
    let tmp = tempdir().unwrap();
    let m = migrator(tmp.path());
    let data = m.config().data_dir();
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(
        data.join("users.json"),
        r#"[{"username": "alice", "email": "old@example.com", "health": 100}]"#,
    )
    .unwrap();
    m.import(Some(BackendKind::EmbeddedRelational)).await.unwrap();

    std::fs::write(
        data.join("users.json"),
        r#"[{"username": "alice", "email": "new@example.com", "health": 12}]"#,
    )
    .unwrap();
    m.import(Some(BackendKind::EmbeddedRelational)).await.unwrap();

    let exporter = Migrator::new(m.config().clone(), BackendKind::EmbeddedRelational, false);
    exporter.export(None).await.unwrap();
    let users = common::read_normalized(&data, common::entity("users"));
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["health"], json!(12));
    assert_eq!(users[0]["email"], json!("old@example.com"));
}

#[tokio::test]
async fn bad_record_is_skipped_and_counted() {
    let tmp = tempdir().unwrap();
    let m = migrator(tmp.path());
    let data = m.config().data_dir();
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(
        data.join("users.json"),
        r#"[{"username": "ok"}, {"email": "no-key@example.com"}, {"username": "bad", "level": "high"}]"#,
    )
    .unwrap();

    let report = m.import(Some(BackendKind::EmbeddedRelational)).await.unwrap();
    let users = report.entity("users").unwrap();
    assert_eq!(users.read, 3);
    assert_eq!(users.written, 1);
    assert_eq!(users.skipped, 2);
    assert_eq!(sqlite_count(&m, "users").await, Some(1));
}

#[tokio::test]
async fn corrupt_row_is_skipped_on_export() {
    let tmp = tempdir().unwrap();
    let m = migrator(tmp.path());
    common::write_sample_documents(&m.config().data_dir());
    m.import(Some(BackendKind::EmbeddedRelational)).await.unwrap();

    let conn = rusqlite::Connection::open(m.config().sqlite_path()).unwrap();
    let changed = conn
        .execute(
            "UPDATE users SET inventory = '[not json' WHERE username = 'bob'",
            [],
        )
        .unwrap();
    assert_eq!(changed, 1);
    drop(conn);

    let mut config = m.config().clone();
    config.storage.data_dir = tmp.path().join("exported").to_string_lossy().into_owned();
    let exporter = Migrator::new(config, BackendKind::EmbeddedRelational, false);
    let report = exporter.export(None).await.unwrap();

    let users = report.entity("users").unwrap();
    assert_eq!((users.read, users.written, users.skipped), (3, 2, 1));
    assert_eq!(report.total_skipped(), 1);
    assert_eq!(report.entity("rooms").unwrap().written, common::sample_count("rooms"));

    let exported = common::read_normalized(&exporter.config().data_dir(), common::entity("users"));
    let names: Vec<_> = exported.iter().map(|u| u["username"].clone()).collect();
    assert_eq!(names, vec![json!("alice"), json!("carol")]);

    let text = report.to_string();
    assert!(
        text.lines().any(|l| l.trim_start().starts_with("users") && l.ends_with("skipped    1")),
        "{text}"
    );
    assert!(text.ends_with("1 skipped"), "{text}");
}

#[tokio::test]
async fn duplicate_keys_count_once() {
    let tmp = tempdir().unwrap();
    let m = migrator(tmp.path());
    let data = m.config().data_dir();
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(
        data.join("users.json"),
        r#"[{"username": "alice", "health": 10}, {"username": "bob"}, {"username": "alice", "health": 20}]"#,
    )
    .unwrap();

    let report = m.import(Some(BackendKind::EmbeddedRelational)).await.unwrap();
    let users = report.entity("users").unwrap();
    assert_eq!(users.read, 3);
    assert_eq!(users.written, 2);
    assert_eq!(sqlite_count(&m, "users").await, Some(2));
}

#[tokio::test]
async fn malformed_collection_file_aborts_import() {
    let tmp = tempdir().unwrap();
    let m = migrator(tmp.path());
    let data = m.config().data_dir();
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join("users.json"), r#"[{"username": "a"}]"#).unwrap();
    std::fs::write(data.join("rooms.json"), "[{ not json").unwrap();

    assert!(m.import(Some(BackendKind::EmbeddedRelational)).await.is_err());
    // Entities before the failure stay committed.
    assert_eq!(sqlite_count(&m, "users").await, Some(1));
}

#[tokio::test]
async fn export_from_documents_is_rejected() {
    let tmp = tempdir().unwrap();
    let m = migrator(tmp.path());
    let err = m.export(Some(BackendKind::Documents)).await.unwrap_err();
    assert_eq!(err.kind(), mudmigrate::errors::ErrorKind::Configuration);
}

#[tokio::test]
async fn networked_without_url_is_unreachable_in_status() {
    let tmp = tempdir().unwrap();
    let m = migrator(tmp.path());
    let status = m.status().await;
    let pg = status.backend(BackendKind::NetworkedRelational).unwrap();
    assert!(matches!(
        pg.state,
        mudmigrate::migrate::Reachability::Unreachable(_)
    ));
    assert!(!m.config().sqlite_path().exists(), "status must not create the database");
}
