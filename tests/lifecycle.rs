//! Connection lifecycle: notifications, reconnects, shutdown.

mod common;

use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;

use common::{MockTransport, bus, options};
use vertx_eventbus::{
    Error, EventBus, EventBusOptions, Notification, NotificationKind, ReadyState,
    TransportSession,
};

fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<NotificationKind> {
    let mut kinds = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        kinds.push(notification.kind);
    }
    kinds
}

#[tokio::test(start_paused = true)]
async fn test_connects_to_server_url_and_path() {
    let transport = MockTransport::new();
    let _bus = bus(
        options()
            .with_server_url("https://bus.example.com")
            .with_path("/bridge"),
        &transport,
    );

    assert_eq!(transport.urls(), vec!["https://bus.example.com/bridge"]);
}

#[tokio::test(start_paused = true)]
async fn test_connected_and_disconnected_notifications() {
    let transport = MockTransport::new();
    let bus = bus(options(), &transport);
    let mut rx = bus.notifications();

    assert_eq!(bus.connection_state(), ReadyState::Connecting);
    transport.session().open();
    assert!(bus.is_connected());
    assert_eq!(bus.connection_state(), ReadyState::Open);
    assert_eq!(
        drain(&mut rx),
        vec![NotificationKind::Connected, NotificationKind::StateChanged]
    );

    transport.session().drop_connection();
    assert!(!bus.is_connected());
    assert_eq!(bus.connection_state(), ReadyState::Closed);
    assert_eq!(
        drain(&mut rx),
        vec![NotificationKind::Disconnected, NotificationKind::StateChanged]
    );
}

#[tokio::test(start_paused = true)]
async fn test_custom_prefix() {
    let transport = MockTransport::new();
    let bus = bus(options().with_event_name_prefix("app."), &transport);
    let mut rx = bus.notifications();

    transport.session().open();

    let notification = rx.try_recv().expect("notification");
    assert_eq!(notification.name, "app.system.connected");
}

#[tokio::test(start_paused = true)]
async fn test_second_open_does_not_renotify_connected() {
    let transport = MockTransport::new();
    let bus = bus(options(), &transport);
    transport.session().open();
    let mut rx = bus.notifications();

    transport.session().open();
    assert_eq!(drain(&mut rx), vec![NotificationKind::StateChanged]);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_retries_without_ceiling() {
    let transport = MockTransport::new();
    let _bus = bus(options(), &transport);

    for attempt in 1..=5 {
        assert_eq!(transport.session_count(), attempt);
        transport.session().drop_connection();
        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(transport.session_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_disabled() {
    let transport = MockTransport::new();
    let _bus = bus(options().with_reconnect(false), &transport);
    transport.session().open();
    transport.session().drop_connection();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.session_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_reconnect() {
    let transport = MockTransport::new();
    let bus = bus(options(), &transport);
    transport.session().open();

    bus.reconnect();
    assert!(!bus.is_connected());
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(transport.session_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_everything() {
    let transport = MockTransport::new();
    let bus = bus(options().with_buffer_capacity(4), &transport);
    transport.session().open();
    let session = transport.session();

    let mut rx = bus.notifications();

    bus.shutdown();
    assert!(session.is_detached());
    assert!(!bus.is_connected());
    assert_eq!(
        drain(&mut rx),
        vec![NotificationKind::Disconnected, NotificationKind::StateChanged]
    );

    assert!(matches!(
        bus.publish("after", json!(null)),
        Err(Error::NotConnected)
    ));
    assert!(matches!(
        bus.send("after", json!(null)).await,
        Err(Error::NotConnected)
    ));
    assert_eq!(bus.buffered_len(), 0);
    assert!(session.published().is_empty());
    assert_eq!(bus.connection_state(), ReadyState::Closed);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.session_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_drop_closes_transport() {
    let transport = MockTransport::new();
    let bus = bus(options(), &transport);
    transport.session().open();
    let session = transport.session();

    drop(bus);

    assert!(session.is_detached());
    assert_eq!(session.ready_state(), ReadyState::Closed);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.session_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_poll_refreshes_cached_state() {
    let transport = MockTransport::new();
    let bus = bus(options(), &transport);
    let mut rx = bus.notifications();
    transport.session().force_state(ReadyState::Open);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(drain(&mut rx), vec![NotificationKind::StateChanged]);
    // Open by poll, but no open event yet: not "connected".
    assert!(!bus.is_connected());
    assert!(bus.publish("a", json!(null)).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_disabled_bus_never_connects() {
    let transport = MockTransport::new();
    let bus = EventBus::builder()
        .options(EventBusOptions::new().with_enabled(false))
        .transport_arc(transport.clone())
        .build()
        .expect("build");

    assert!(!bus.is_enabled());
    assert_eq!(transport.session_count(), 0);
    assert_eq!(bus.connection_state(), ReadyState::Closed);
}
