use std::time::Duration;

use tokio::time::timeout;

use lanbeacon_network::{Service, ServiceConfig, ServiceError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn config(id: &str) -> ServiceConfig {
    ServiceConfig {
        poll_interval: Duration::from_secs(60),
        ping_interval: Duration::from_millis(100),
        peer_timeout: Duration::from_millis(400),
        // Ephemeral port so parallel test runs do not collide.
        port: 0,
        id: id.to_string(),
        user_data: b"test".to_vec(),
    }
}

#[tokio::test]
async fn service_starts_and_stops() {
    init_tracing();
    let (service, _events) = Service::start(config("smoke")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    service.stop().await;
}

#[tokio::test]
async fn stop_is_idempotent_and_closes_the_event_streams() {
    init_tracing();
    let (service, mut events) = Service::start(config("double-stop")).unwrap();

    service.stop().await;
    service.stop().await;

    // Once stop has returned, no further events can be delivered: both
    // streams report closure (after anything already buffered).
    let closed = timeout(Duration::from_secs(2), async {
        while events.added.recv().await.is_some() {}
        while events.removed.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok(), "event streams did not close after stop");
}

#[tokio::test]
async fn queries_for_unknown_peers_fail() {
    init_tracing();
    let (service, _events) = Service::start(config("lonely")).unwrap();

    assert_eq!(
        service.peer_user_data("nobody"),
        Err(ServiceError::UnknownPeer("nobody".to_string()))
    );
    assert_eq!(
        service.peer_addresses("nobody"),
        Err(ServiceError::UnknownPeer("nobody".to_string()))
    );
    assert!(service.peer_ids().is_empty());

    service.stop().await;
}

#[tokio::test]
async fn stopping_clears_the_peer_table() {
    init_tracing();
    let (service, _events) = Service::start(config("clears")).unwrap();
    service.stop().await;
    assert!(service.peer_ids().is_empty());
}
