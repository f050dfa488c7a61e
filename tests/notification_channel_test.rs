//! Tests for the notification channel session lifecycle
//!
//! The broker side is played by the test over an in-memory transport:
//! each dial hands the test a `MemoryRemote`, and a small helper answers
//! the STOMP handshake so the full protocol path is exercised without a
//! network.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use vm_console::config::NotifyConfig;
use vm_console::notification::stomp::{self, Command, Frame};
use vm_console::notification::transport::{memory_pair, Connector, MemoryRemote};
use vm_console::notification::{
    ConnectOutcome, ConnectionState, NotificationChannel, BROADCAST_TOPIC, USER_QUEUE,
};

/// Connector that hands the broker side of every dialed transport to the test.
fn test_connector() -> (Connector, mpsc::UnboundedReceiver<MemoryRemote>) {
    let (remote_tx, remote_rx) = mpsc::unbounded_channel();
    let connector: Connector = Arc::new(move |_url| {
        let remote_tx = remote_tx.clone();
        Box::pin(async move {
            let (transport, remote) = memory_pair();
            remote_tx.send(remote).ok();
            Ok(transport)
        })
    });
    (connector, remote_rx)
}

/// Connector whose every dial fails.
fn failing_connector() -> Connector {
    Arc::new(|_url| Box::pin(async { anyhow::bail!("connection refused") }))
}

fn channel_with(
    connector: Connector,
    config: NotifyConfig,
) -> NotificationChannel {
    NotificationChannel::new("42", "http://localhost:8080", config)
        .unwrap()
        .with_connector(connector)
}

/// Read the next real frame from the broker side, skipping heartbeats.
async fn next_frame(remote: &mut MemoryRemote) -> Frame {
    loop {
        let raw = timeout(Duration::from_secs(2), remote.rx.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client transport closed");
        if stomp::is_heartbeat(&raw) {
            continue;
        }
        return Frame::parse(&raw).expect("client sent an unparseable frame");
    }
}

/// Answer the STOMP handshake: consume CONNECT, reply CONNECTED, and
/// collect the expected number of SUBSCRIBE frames.
async fn serve_handshake(remote: &mut MemoryRemote, expect_subs: usize) -> (Frame, Vec<Frame>) {
    let connect = next_frame(remote).await;
    assert_eq!(connect.command, Command::Connect);

    remote
        .tx
        .send(
            Frame::new(Command::Connected)
                .with_header("version", "1.2")
                .with_header("user-name", "42")
                .serialize(),
        )
        .unwrap();

    let mut subs = Vec::new();
    while subs.len() < expect_subs {
        let frame = next_frame(remote).await;
        assert_eq!(frame.command, Command::Subscribe);
        subs.push(frame);
    }
    (connect, subs)
}

fn message_frame(body: &str) -> String {
    Frame::new(Command::Message)
        .with_header("destination", USER_QUEUE)
        .with_header("subscription", "sub-0")
        .with_header("message-id", "m-1")
        .with_body(body)
        .serialize()
}

/// Poll until the condition holds or fail after two seconds.
async fn wait_until(cond: impl Fn() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_state_change_lifecycle() {
    // Given: a connected channel for member "42"
    let (connector, mut remote_rx) = test_connector();
    let channel = channel_with(connector, NotifyConfig::default());

    let (outcome, mut remote) = tokio::join!(channel.connect(), async {
        let mut remote = remote_rx.recv().await.unwrap();
        let (connect, subs) = serve_handshake(&mut remote, 1).await;
        // The member id travels both in the url query and the CONNECT header
        assert_eq!(connect.header("memberId"), Some("42"));
        assert_eq!(subs[0].destination(), Some(USER_QUEUE));
        remote
    });
    assert_eq!(outcome, ConnectOutcome::Connected);
    assert_eq!(channel.state(), ConnectionState::Connected);

    // When: a valid state-change frame arrives
    remote
        .tx
        .send(message_frame(
            r#"{"vmId":7,"type":"STATE_CHANGE","prevVmState":"RUNNING","currentVmState":"STOPPED"}"#,
        ))
        .unwrap();
    wait_until(|| channel.notifications().len() == 1).await;

    let events = channel.notifications();
    assert_eq!(events[0].vm_id, 7);
    assert_eq!(events[0].kind, "STATE_CHANGE");
    assert_eq!(events[0].payload.prev_vm_state.as_deref(), Some("RUNNING"));
    assert_eq!(events[0].payload.current_vm_state.as_deref(), Some("STOPPED"));

    // When: a malformed body arrives
    remote.tx.send(message_frame("{not json")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Then: the list is unchanged and the channel stays connected
    assert_eq!(channel.notifications().len(), 1);
    assert_eq!(channel.state(), ConnectionState::Connected);

    // When: the event is consumed
    channel.remove_notification(7);
    assert!(channel.notifications().is_empty());
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    // Given: a connected channel
    let (connector, mut remote_rx) = test_connector();
    let channel = channel_with(connector, NotifyConfig::default());

    let (outcome, mut remote) = tokio::join!(channel.connect(), async {
        let mut remote = remote_rx.recv().await.unwrap();
        serve_handshake(&mut remote, 1).await;
        remote
    });
    assert_eq!(outcome, ConnectOutcome::Connected);

    // When: connect is called again
    let second = channel.connect().await;

    // Then: it is a no-op, no second transport is dialed
    assert_eq!(second, ConnectOutcome::AlreadyActive);
    assert!(remote_rx.try_recv().is_err());

    // And: a single inbound frame yields exactly one event
    remote
        .tx
        .send(message_frame(r#"{"vmId":1,"type":"STATE_CHANGE"}"#))
        .unwrap();
    wait_until(|| !channel.notifications().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(channel.notifications().len(), 1);
}

#[tokio::test]
async fn test_order_preservation_and_latch() {
    // Given: a connected channel
    let (connector, mut remote_rx) = test_connector();
    let channel = channel_with(connector, NotifyConfig::default());
    let (outcome, remote) = tokio::join!(channel.connect(), async {
        let mut remote = remote_rx.recv().await.unwrap();
        serve_handshake(&mut remote, 1).await;
        remote
    });
    assert_eq!(outcome, ConnectOutcome::Connected);
    assert!(!channel.take_new_event());

    // When: five frames arrive in order
    for vm_id in 1..=5 {
        remote
            .tx
            .send(message_frame(&format!(
                r#"{{"vmId":{vm_id},"type":"STATE_CHANGE"}}"#
            )))
            .unwrap();
    }
    wait_until(|| channel.notifications().len() == 5).await;

    // Then: the list preserves arrival order
    let ids: Vec<i64> = channel.notifications().iter().map(|e| e.vm_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    // And: the burst coalesces into a single edge-triggered read
    assert!(channel.take_new_event());
    assert!(!channel.take_new_event());
}

#[tokio::test]
async fn test_broadcast_subscription() {
    // Given: a channel with the broadcast topic enabled
    let (connector, mut remote_rx) = test_connector();
    let channel = channel_with(connector, NotifyConfig::default().with_broadcast(true));

    let (outcome, remote) = tokio::join!(channel.connect(), async {
        let mut remote = remote_rx.recv().await.unwrap();
        let (_, subs) = serve_handshake(&mut remote, 2).await;
        let destinations: Vec<_> = subs.iter().filter_map(|s| s.destination()).collect();
        assert_eq!(destinations, vec![USER_QUEUE, BROADCAST_TOPIC]);
        remote
    });
    assert_eq!(outcome, ConnectOutcome::Connected);

    // When: a broadcast message arrives
    remote
        .tx
        .send(
            Frame::new(Command::Message)
                .with_header("destination", BROADCAST_TOPIC)
                .with_header("subscription", "sub-1")
                .with_body(r#"{"vmId":9,"type":"MAINTENANCE"}"#)
                .serialize(),
        )
        .unwrap();

    // Then: it lands in the same event list
    wait_until(|| !channel.notifications().is_empty()).await;
    assert_eq!(channel.notifications()[0].vm_id, 9);
}

#[tokio::test]
async fn test_connect_failure_degrades_to_failed_state() {
    // Given: a connector that cannot reach the broker
    let channel = channel_with(failing_connector(), NotifyConfig::default());

    // When: connecting
    let outcome = channel.connect().await;

    // Then: the failure is reported as a typed outcome, not a panic/error
    assert_eq!(outcome, ConnectOutcome::Failed);
    assert_eq!(channel.state(), ConnectionState::Failed);
    assert!(channel.notifications().is_empty());

    // And: disconnect afterwards settles the channel
    channel.disconnect();
    assert_eq!(channel.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_handshake_rejection_is_failed() {
    // Given: a broker that answers CONNECT with an ERROR frame
    let (connector, mut remote_rx) = test_connector();
    let channel = channel_with(connector, NotifyConfig::default());

    let (outcome, _) = tokio::join!(channel.connect(), async {
        let mut remote = remote_rx.recv().await.unwrap();
        let connect = next_frame(&mut remote).await;
        assert_eq!(connect.command, Command::Connect);
        remote
            .tx
            .send(
                Frame::new(Command::Error)
                    .with_header("message", "bad credentials")
                    .serialize(),
            )
            .unwrap();
        remote
    });

    assert_eq!(outcome, ConnectOutcome::Failed);
    assert_eq!(channel.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_disconnect_tears_down_and_keeps_events() {
    // Given: a connected channel holding one event
    let (connector, mut remote_rx) = test_connector();
    let channel = channel_with(connector, NotifyConfig::default());
    let (outcome, mut remote) = tokio::join!(channel.connect(), async {
        let mut remote = remote_rx.recv().await.unwrap();
        serve_handshake(&mut remote, 1).await;
        remote
    });
    assert_eq!(outcome, ConnectOutcome::Connected);

    remote
        .tx
        .send(message_frame(r#"{"vmId":3,"type":"STATE_CHANGE"}"#))
        .unwrap();
    wait_until(|| !channel.notifications().is_empty()).await;

    // When: disconnecting
    channel.disconnect();
    assert_eq!(channel.state(), ConnectionState::Disconnected);

    // Then: the session task sends a best-effort DISCONNECT frame
    let frame = next_frame(&mut remote).await;
    assert_eq!(frame.command, Command::Disconnect);

    // And: the event list survives the disconnect
    assert_eq!(channel.notifications().len(), 1);

    // And: disconnecting again is a safe no-op
    channel.disconnect();
    assert_eq!(channel.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_after_transport_loss() {
    // Given: a connected channel with reconnection enabled
    let (connector, mut remote_rx) = test_connector();
    let config = NotifyConfig::default()
        .with_reconnect(true)
        .with_reconnect_delay(Duration::from_millis(20));
    let channel = channel_with(connector, config);

    let (outcome, remote) = tokio::join!(channel.connect(), async {
        let mut remote = remote_rx.recv().await.unwrap();
        serve_handshake(&mut remote, 1).await;
        remote
    });
    assert_eq!(outcome, ConnectOutcome::Connected);

    // When: the transport drops
    drop(remote);

    // Then: a fresh transport is dialed and the handshake repeated
    let mut remote = timeout(Duration::from_secs(2), remote_rx.recv())
        .await
        .expect("no reconnect attempt")
        .unwrap();
    serve_handshake(&mut remote, 1).await;
    wait_until(|| channel.state() == ConnectionState::Connected).await;

    // And: events delivered on the new connection are ingested
    remote
        .tx
        .send(message_frame(r#"{"vmId":5,"type":"STATE_CHANGE"}"#))
        .unwrap();
    wait_until(|| !channel.notifications().is_empty()).await;
    assert_eq!(channel.notifications()[0].vm_id, 5);

    channel.disconnect();
}

#[tokio::test]
async fn test_reconnect_dedup_drops_replayed_frame() {
    // Given: a connected channel with reconnection (and thus dedup) enabled
    let (connector, mut remote_rx) = test_connector();
    let config = NotifyConfig::default()
        .with_reconnect(true)
        .with_reconnect_delay(Duration::from_millis(20));
    let channel = channel_with(connector, config);

    let (outcome, remote) = tokio::join!(channel.connect(), async {
        let mut remote = remote_rx.recv().await.unwrap();
        serve_handshake(&mut remote, 1).await;
        remote
    });
    assert_eq!(outcome, ConnectOutcome::Connected);

    // When: the same frame is delivered twice within the dedup window
    let body = r#"{"vmId":7,"type":"STATE_CHANGE","prevVmState":"RUNNING","currentVmState":"STOPPED"}"#;
    remote.tx.send(message_frame(body)).unwrap();
    remote.tx.send(message_frame(body)).unwrap();

    // Then: only one event is appended
    wait_until(|| !channel.notifications().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(channel.notifications().len(), 1);

    channel.disconnect();
}
