use std::{
    io,
    net::Ipv4Addr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;

use ddns_server::{
    error::{
        PersistenceError, PersistenceErrorKind, PersistenceResult, UpdateErrorKind,
        ValidationError, GENERIC_FAILURE_MESSAGE,
    },
    identity::ClientRequest,
    proto::rr::Name,
    record::{RecordType, RecordValue},
    store::{MemoryBackend, StoreConfig, ZonePersistenceBackend, ZoneState},
    MutationCoordinator, UpdateResponse, ZoneConfig,
};
use test_support::{capture_logs, subscribe};

fn config() -> ZoneConfig {
    ZoneConfig::new("zone.example")
        .with_store(StoreConfig::Memory)
        .with_default_ttl(300)
        .with_glue("ns", Ipv4Addr::new(192, 0, 2, 53))
        .with_trusted_proxies(["10.0.0.0/8".parse().unwrap()])
}

async fn coordinator() -> MutationCoordinator {
    MutationCoordinator::from_config(&config(), None)
        .await
        .unwrap()
}

fn name(s: &str) -> Name {
    Name::from_ascii(s).unwrap()
}

fn client(ip: &str) -> ClientRequest {
    ClientRequest::new(ip.parse().unwrap())
}

/// Commits to memory until told to fail
#[derive(Default)]
struct FlakyBackend {
    inner: MemoryBackend,
    fail: AtomicBool,
    commits: AtomicUsize,
}

#[async_trait]
impl ZonePersistenceBackend for FlakyBackend {
    async fn load(&self) -> PersistenceResult<Option<ZoneState>> {
        self.inner.load().await
    }

    async fn commit(&self, state: &ZoneState) -> PersistenceResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            let io = io::Error::new(io::ErrorKind::Other, "disk on fire: /var/named/zone");
            return Err(PersistenceError::from(PersistenceErrorKind::Io(io)));
        }

        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit(state).await
    }
}

/// Returns from commit only well after the state is durable
#[derive(Default)]
struct SlowBackend {
    inner: MemoryBackend,
}

#[async_trait]
impl ZonePersistenceBackend for SlowBackend {
    async fn load(&self) -> PersistenceResult<Option<ZoneState>> {
        self.inner.load().await
    }

    async fn commit(&self, state: &ZoneState) -> PersistenceResult<()> {
        self.inner.commit(state).await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }
}

#[tokio::test]
async fn test_end_to_end_a_update_from_client_address() {
    subscribe();
    let coordinator = coordinator().await;
    let before = coordinator.snapshot().await.serial();

    let request = client("10.0.0.2").with_forwarded_for("198.51.100.9");
    let response = coordinator
        .handle::<&str>("A", "update", &["h1", "h2"], None, &request)
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(
        response.message,
        "Updated record: [h1.zone.example, h2.zone.example] A 198.51.100.9"
    );
    assert_eq!(
        response.changed,
        vec!["h1.zone.example".to_string(), "h2.zone.example".to_string()]
    );
    assert_eq!(response.serial, Some(before.increment(1).get()));

    let zone = coordinator.snapshot().await;
    assert_eq!(zone.serial(), before.increment(1));
    for owner in ["h1.zone.example.", "h2.zone.example."] {
        let record = zone.get(&name(owner), RecordType::A).unwrap();
        assert_eq!(
            record.value(),
            &RecordValue::A(Ipv4Addr::new(198, 51, 100, 9))
        );
        assert_eq!(record.ttl(), 300);
    }
}

#[tokio::test]
async fn test_delete_of_missing_record_is_idempotent() {
    subscribe();
    let coordinator = coordinator().await;
    let before = coordinator.snapshot().await.serial();

    let response = coordinator
        .handle::<&str>("A", "delete", &["nothing-here"], None, &client("192.0.2.1"))
        .await
        .unwrap();

    assert!(response.success);
    assert!(response.changed.is_empty());
    assert_eq!(response.message, "No change: [nothing-here.zone.example] A");
    assert_eq!(response.serial, Some(before.get()));
    assert_eq!(coordinator.snapshot().await.serial(), before);
}

#[tokio::test]
async fn test_equal_value_update_is_idempotent() {
    subscribe();
    let coordinator = coordinator().await;

    let first = coordinator
        .handle("A", "update", &["h1"], Some("192.0.2.10"), &client("192.0.2.1"))
        .await
        .unwrap();
    let second = coordinator
        .handle("A", "update", &["h1"], Some(" 192.0.2.10 "), &client("192.0.2.1"))
        .await
        .unwrap();

    assert!(second.success);
    assert!(second.changed.is_empty());
    assert_eq!(second.serial, first.serial);
    assert_eq!(second.message, "No change: [h1.zone.example] A 192.0.2.10");
}

#[tokio::test]
async fn test_validator_rejects() {
    subscribe();
    let coordinator = coordinator().await;
    let before = coordinator.snapshot().await.serial();

    let error = coordinator
        .handle("MX", "update", &["h1"], Some("mail"), &client("192.0.2.1"))
        .await
        .unwrap_err();
    assert!(matches!(
        error.kind(),
        UpdateErrorKind::Validation(ValidationError::InvalidRecordType(_))
    ));
    assert!(error.is_caller_error());

    let error = coordinator
        .handle("A", "update", &["-bad-"], Some("192.0.2.1"), &client("192.0.2.1"))
        .await
        .unwrap_err();
    assert!(matches!(
        error.kind(),
        UpdateErrorKind::Validation(ValidationError::InvalidHostLabel(_))
    ));
    assert_eq!(UpdateResponse::from_error(&error).field, Some("host"));

    // the value of a delete is ignored
    coordinator
        .handle("TXT", "update", &["h1"], Some("hello"), &client("192.0.2.1"))
        .await
        .unwrap();
    let response = coordinator
        .handle("TXT", "delete", &["h1"], Some("not even close"), &client("192.0.2.1"))
        .await
        .unwrap();
    assert_eq!(response.message, "Deleted record: [h1.zone.example] TXT");
    assert_eq!(response.serial, Some(before.increment(2).get()));
    assert!(coordinator
        .snapshot()
        .await
        .get(&name("h1.zone.example."), RecordType::TXT)
        .is_none());
}

#[tokio::test]
async fn test_ipv6_only_client_cannot_default_a_record() {
    subscribe();
    let coordinator = coordinator().await;

    let error = coordinator
        .handle::<&str>("A", "update", &["h1"], None, &client("2001:db8::1"))
        .await
        .unwrap_err();
    assert!(matches!(
        error.kind(),
        UpdateErrorKind::NoResolvableAddress(_)
    ));
    assert_eq!(UpdateResponse::from_error(&error).field, Some("value"));

    // the proxy's own address is not the caller's
    let proxied = client("10.0.0.2").with_forwarded_for("2001:db8::9");
    let error = coordinator
        .handle::<&str>("A", "update", &["h1"], None, &proxied)
        .await
        .unwrap_err();
    assert!(matches!(
        error.kind(),
        UpdateErrorKind::NoResolvableAddress(_)
    ));
    assert!(coordinator
        .snapshot()
        .await
        .get(&Name::from_ascii("h1.zone.example.").unwrap(), RecordType::A)
        .is_none());

    // a mapped address is usable
    let response = coordinator
        .handle::<&str>("A", "update", &["h1"], None, &client("::ffff:192.0.2.44"))
        .await
        .unwrap();
    assert_eq!(response.message, "Updated record: [h1.zone.example] A 192.0.2.44");
}

#[tokio::test]
async fn test_failed_commit_leaves_zone_untouched() {
    subscribe();
    let backend = Arc::new(FlakyBackend::default());
    let coordinator = MutationCoordinator::with_backend(&config(), Box::new(backend.clone()))
        .await
        .unwrap();
    let before = coordinator.snapshot().await;
    assert_eq!(backend.commits.load(Ordering::SeqCst), 1);

    backend.fail.store(true, Ordering::SeqCst);
    let error = coordinator
        .handle(
            "A",
            "update",
            &["h1", "h2", "h3"],
            Some("192.0.2.7"),
            &client("192.0.2.1"),
        )
        .await
        .unwrap_err();

    assert!(!error.is_caller_error());
    assert_eq!(error.public_message(), GENERIC_FAILURE_MESSAGE);
    assert!(!UpdateResponse::from_error(&error).message.contains("/var/named"));

    let after = coordinator.snapshot().await;
    assert_eq!(after.serial(), before.serial());
    assert_eq!(*after, *before);
    for owner in ["h1.zone.example.", "h2.zone.example.", "h3.zone.example."] {
        assert!(after.get(&name(owner), RecordType::A).is_none());
    }
    assert_eq!(backend.inner.committed().await.as_ref(), Some(&*before));

    // the same request goes through once the backend recovers, with the next serial
    backend.fail.store(false, Ordering::SeqCst);
    let response = coordinator
        .handle(
            "A",
            "update",
            &["h1", "h2", "h3"],
            Some("192.0.2.7"),
            &client("192.0.2.1"),
        )
        .await
        .unwrap();
    assert_eq!(response.serial, Some(before.serial().increment(1).get()));
    assert_eq!(response.changed.len(), 3);
}

#[tokio::test]
async fn test_serial_wraps_around() {
    let (logs, _guard) = capture_logs();

    let config = config().with_initial_serial(u32::MAX);
    let coordinator = MutationCoordinator::from_config(&config, None)
        .await
        .unwrap();

    let response = coordinator
        .handle("A", "update", &["h1"], Some("192.0.2.1"), &client("192.0.2.1"))
        .await
        .unwrap();
    assert_eq!(response.serial, Some(0));

    let response = coordinator
        .handle("A", "update", &["h1"], Some("192.0.2.2"), &client("192.0.2.1"))
        .await
        .unwrap();
    assert_eq!(response.serial, Some(1));

    assert!(logs.contains("zone serial wraps around"), "{}", logs.logs());
}

#[tokio::test]
async fn test_abandoned_request_still_publishes_its_commit() {
    subscribe();
    let backend = Arc::new(SlowBackend::default());
    let coordinator = MutationCoordinator::with_backend(&config(), Box::new(backend.clone()))
        .await
        .unwrap();
    let before = coordinator.snapshot().await.serial();

    // the caller gives up while the backend is still returning
    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        coordinator.handle("A", "update", &["h1"], Some("192.0.2.1"), &client("192.0.2.1")),
    )
    .await;
    assert!(abandoned.is_err());

    let response = coordinator
        .handle("A", "update", &["h2"], Some("192.0.2.2"), &client("192.0.2.1"))
        .await
        .unwrap();
    assert_eq!(response.serial, Some(before.increment(2).get()));

    let zone = coordinator.snapshot().await;
    assert_eq!(zone.serial(), before.increment(2));
    assert!(zone.get(&name("h1.zone.example."), RecordType::A).is_some());
    assert!(zone.get(&name("h2.zone.example."), RecordType::A).is_some());
    assert_eq!(backend.inner.committed().await.as_ref(), Some(&*zone));
}
