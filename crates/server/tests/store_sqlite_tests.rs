#![cfg(feature = "sqlite")]

use std::{fs, path::Path};

use ddns_server::{
    identity::ClientRequest,
    proto::rr::Name,
    store::{Journal, SqliteConfig, StoreConfig},
    MutationCoordinator, ZoneConfig,
};
use test_support::{fixture_dir, subscribe};

fn config(zone_file: Option<&str>) -> ZoneConfig {
    ZoneConfig::new("zone.example")
        .with_store(StoreConfig::Sqlite(SqliteConfig {
            journal_file_path: "dyn.jrnl".into(),
            zone_file_path: zone_file.map(Into::into),
        }))
        .with_glue("ns", "192.0.2.53".parse().unwrap())
}

fn client() -> ClientRequest {
    ClientRequest::new("192.0.2.1".parse().unwrap())
}

fn journal(dir: &Path) -> Journal {
    Journal::from_file(
        &dir.join("dyn.jrnl"),
        Name::from_ascii("zone.example.").unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_journal_survives_restart() {
    subscribe();
    let dir = fixture_dir(module_path!(), "test_journal_survives_restart");

    let coordinator = MutationCoordinator::from_config(&config(Some("dyn.zone")), Some(&dir))
        .await
        .unwrap();
    coordinator
        .handle("A", "update", &["h1"], Some("192.0.2.1"), &client())
        .await
        .unwrap();
    coordinator
        .handle("TXT", "update", &["h1", "h2"], Some("hello"), &client())
        .await
        .unwrap();
    // no-op, nothing is journaled
    coordinator
        .handle("TXT", "update", &["h2"], Some("hello"), &client())
        .await
        .unwrap();
    let before = coordinator.snapshot().await;
    drop(coordinator);

    let journal = journal(&dir);
    assert_eq!(journal.snapshot_count().unwrap(), 3);
    assert_eq!(journal.select_latest().unwrap().as_ref(), Some(&*before));
    drop(journal);

    let zone_file = fs::read_to_string(dir.join("dyn.zone")).unwrap();
    assert_eq!(zone_file, before.to_zone_file());

    let coordinator = MutationCoordinator::from_config(&config(None), Some(&dir))
        .await
        .unwrap();
    assert_eq!(*coordinator.snapshot().await, *before);

    let response = coordinator
        .handle::<&str>("A", "delete", &["h1"], None, &client())
        .await
        .unwrap();
    assert_eq!(response.serial, Some(before.serial().increment(1).get()));
}

#[tokio::test]
async fn test_zone_file_failure_rolls_back_journal() {
    subscribe();
    let dir = fixture_dir(module_path!(), "test_zone_file_failure_rolls_back_journal");
    fs::create_dir_all(dir.join("out")).unwrap();

    let coordinator =
        MutationCoordinator::from_config(&config(Some("out/dyn.zone")), Some(&dir))
            .await
            .unwrap();
    let before = coordinator.snapshot().await;
    fs::remove_dir_all(dir.join("out")).unwrap();

    let error = coordinator
        .handle("A", "update", &["h1"], Some("192.0.2.1"), &client())
        .await
        .unwrap_err();
    assert!(!error.is_caller_error());
    assert_eq!(*coordinator.snapshot().await, *before);
    drop(coordinator);

    let journal = journal(&dir);
    assert_eq!(journal.snapshot_count().unwrap(), 1);
    assert_eq!(journal.select_latest().unwrap().as_ref(), Some(&*before));
}
