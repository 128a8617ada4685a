mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time;

use taskboard_sync::error::GatewayError;
use taskboard_sync::gateway::frame::Command;
use taskboard_sync::gateway::{
    Channel, ChannelCallbacks, ConnectionState, InboundEvent, Payload, Topic,
};

fn comment_ids(events: &Mutex<Vec<InboundEvent>>) -> Vec<i64> {
    events
        .lock()
        .iter()
        .filter_map(|e| match &e.payload {
            Payload::Comment(c) => Some(c.id),
            _ => None,
        })
        .collect()
}

fn recording_callbacks(
    connects: Arc<AtomicUsize>,
    errors: Arc<Mutex<Vec<GatewayError>>>,
) -> ChannelCallbacks {
    ChannelCallbacks {
        on_connect: Some(Arc::new(move || {
            connects.fetch_add(1, Ordering::SeqCst);
        })),
        on_error: Some(Arc::new(move |err: &GatewayError| {
            errors.lock().push(err.clone());
        })),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn failed_attempts_are_retried_every_reconnect_delay() {
    let (connector, _servers) = common::MockConnector::refusing();
    let channel = Channel::new(common::channel_config(), connector.clone());

    let state = Arc::new(Mutex::new(channel.watch_state()));
    let connected_after_error = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let callbacks = ChannelCallbacks {
        on_connect: None,
        on_error: Some(Arc::new({
            let state = state.clone();
            let connected_after_error = connected_after_error.clone();
            let errors = errors.clone();
            move |_err: &GatewayError| {
                errors.fetch_add(1, Ordering::SeqCst);
                if *state.lock().borrow() == ConnectionState::Connected {
                    connected_after_error.fetch_add(1, Ordering::SeqCst);
                }
            }
        })),
    };
    channel.connect("token", callbacks);

    let watched = connector.clone();
    common::wait_until(move || watched.attempts() >= 4).await;

    assert!(errors.load(Ordering::SeqCst) >= 3);
    assert_eq!(connected_after_error.load(Ordering::SeqCst), 0);
    assert!(!channel.is_connected());

    let times = connector.attempt_times();
    for pair in times.windows(2) {
        assert!(
            pair[1] - pair[0] >= Duration::from_millis(5000),
            "attempts only {:?} apart",
            pair[1] - pair[0]
        );
    }
    channel.disconnect();
}

#[tokio::test]
async fn connect_sends_credential_and_heartbeat_offer() {
    let (connector, mut servers) = common::MockConnector::new();
    let channel = Channel::new(common::channel_config(), connector.clone());
    channel.connect("secret-token", ChannelCallbacks::default());

    let mut server = common::next_server(&mut servers).await;
    let connect = server.accept().await;
    assert_eq!(connect.header("Authorization"), Some("Bearer secret-token"));
    assert_eq!(connect.header("accept-version"), Some("1.2"));
    assert_eq!(connect.header("heart-beat"), Some("4000,4000"));
    assert_eq!(connect.header("host"), Some("taskboard.test"));

    let watched = channel.clone();
    common::wait_until(move || watched.is_connected()).await;
    assert_eq!(channel.attempts(), 0);

    // A second connect while connected does not open another link.
    channel.connect("secret-token", ChannelCallbacks::default());
    time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connector.attempts(), 1);
    channel.disconnect();
}

#[tokio::test]
async fn subscribe_while_disconnected_returns_inert_handle() {
    let (connector, _servers) = common::MockConnector::new();
    let channel = Channel::new(common::channel_config(), connector.clone());

    let handle = channel.subscribe(Topic::TasksGlobal, |_| panic!("must not be called"));
    assert!(!handle.is_active());
    assert_eq!(handle.id(), None);
    assert_eq!(handle.topic(), Topic::TasksGlobal);
    assert!(channel.subscribed_topics().is_empty());
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn messages_are_dispatched_in_arrival_order() {
    let (channel, mut server, _connector) = common::connected_channel().await;

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let _handle = channel.subscribe(Topic::TaskComments(10), move |event| sink.lock().push(event));

    let (id, destination) = server.expect_subscribe().await;
    assert_eq!(destination, "task-comments:10");
    assert!(id.starts_with("sub_"));

    for n in 1..=3 {
        server.message(&id, &destination, &format!(r#"{{"id":{n},"content":"c{n}"}}"#));
    }

    let watched = events.clone();
    common::wait_until(move || watched.lock().len() == 3).await;
    assert_eq!(comment_ids(&events), vec![1, 2, 3]);
    assert!(events.lock().iter().all(|e| e.topic == Topic::TaskComments(10)));
    channel.disconnect();
}

#[tokio::test]
async fn undecodable_message_is_dropped_without_ending_the_connection() {
    let (channel, mut server, _connector) = common::connected_channel().await;

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let _handle = channel.subscribe(Topic::TaskComments(10), move |event| sink.lock().push(event));
    let (id, destination) = server.expect_subscribe().await;

    server.message(&id, &destination, "not json");
    server.message(&id, &destination, r#"{"id":2,"content":"ok"}"#);

    let watched = events.clone();
    common::wait_until(move || !watched.lock().is_empty()).await;
    assert_eq!(comment_ids(&events), vec![2]);
    assert!(channel.is_connected());
    channel.disconnect();
}

#[tokio::test]
async fn no_handler_runs_after_disconnect() {
    let (channel, mut server, _connector) = common::connected_channel().await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handle = channel.subscribe(Topic::TaskComments(10), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let (id, destination) = server.expect_subscribe().await;

    channel.disconnect();
    server.expect(Command::Disconnect).await;
    assert!(!channel.is_connected());
    assert!(!handle.is_active());
    assert!(channel.subscribed_topics().is_empty());

    server.message(&id, &destination, r#"{"id":1,"content":"late"}"#);
    time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Repeated disconnects are harmless.
    channel.disconnect();
    assert_eq!(channel.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn releasing_a_handle_unsubscribes_once() {
    let (channel, mut server, _connector) = common::connected_channel().await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut handle = channel.subscribe(Topic::ProjectTasks(5), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let (id, destination) = server.expect_subscribe().await;
    assert_eq!(destination, "project-tasks:5");
    assert_eq!(channel.subscribed_topics(), vec![Topic::ProjectTasks(5)]);

    handle.release();
    handle.release();
    let unsubscribe = server.expect(Command::Unsubscribe).await;
    assert_eq!(unsubscribe.header("id"), Some(id.as_str()));
    assert!(channel.subscribed_topics().is_empty());

    server.message(&id, &destination, r#"{"type":"CREATED","taskId":1}"#);
    time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Dropping an already released handle sends nothing more.
    drop(handle);
    let _other = channel.subscribe(Topic::TasksGlobal, |_| {});
    server.expect(Command::Subscribe).await;
    channel.disconnect();
}

#[tokio::test]
async fn dropping_a_handle_releases_it() {
    let (channel, mut server, _connector) = common::connected_channel().await;

    let handle = channel.subscribe(Topic::TasksGlobal, |_| {});
    let (id, _) = server.expect_subscribe().await;
    drop(handle);

    let unsubscribe = server.expect(Command::Unsubscribe).await;
    assert_eq!(unsubscribe.header("id"), Some(id.as_str()));
    channel.disconnect();
}

#[tokio::test]
async fn error_frame_during_handshake_is_reported() {
    let (connector, mut servers) = common::MockConnector::new();
    let channel = Channel::new(common::channel_config(), connector.clone());
    let connects = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(Mutex::new(Vec::new()));
    channel.connect("expired", recording_callbacks(connects.clone(), errors.clone()));

    let mut server = common::next_server(&mut servers).await;
    server.expect(Command::Connect).await;
    server.send(
        taskboard_sync::gateway::frame::Frame::new(Command::Error)
            .with_header("message", "Invalid token"),
    );

    let watched = errors.clone();
    common::wait_until(move || !watched.lock().is_empty()).await;
    assert_eq!(
        errors.lock()[0],
        GatewayError::Rejected("Invalid token".to_string())
    );
    assert_eq!(connects.load(Ordering::SeqCst), 0);
    assert!(!channel.is_connected());
    channel.disconnect();
}

#[tokio::test(start_paused = true)]
async fn closed_link_reconnects_after_delay() {
    let (connector, mut servers) = common::MockConnector::new();
    let channel = Channel::new(common::channel_config(), connector.clone());
    let connects = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(Mutex::new(Vec::new()));
    channel.connect("token", recording_callbacks(connects.clone(), errors.clone()));

    let mut first = common::next_server(&mut servers).await;
    first.accept().await;
    let handle = {
        let watched = channel.clone();
        common::wait_until(move || watched.is_connected()).await;
        channel.subscribe(Topic::TasksGlobal, |_| {})
    };
    first.expect_subscribe().await;

    let closed_at = time::Instant::now();
    first.close("server restart");

    let mut second = common::next_server(&mut servers).await;
    assert!(closed_at.elapsed() >= Duration::from_millis(5000));
    assert_eq!(
        errors.lock()[0],
        GatewayError::Closed(Some("server restart".to_string()))
    );
    // Subscriptions do not survive a reconnect.
    assert!(!handle.is_active());

    second.accept().await;
    let watched = connects.clone();
    common::wait_until(move || watched.load(Ordering::SeqCst) == 2).await;
    assert!(channel.is_connected());
    channel.disconnect();
}

#[tokio::test(start_paused = true)]
async fn silent_server_triggers_heartbeat_timeout() {
    let (connector, mut servers) = common::MockConnector::new();
    let channel = Channel::new(common::channel_config(), connector.clone());
    let connects = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(Mutex::new(Vec::new()));
    channel.connect("token", recording_callbacks(connects, errors.clone()));

    let mut first = common::next_server(&mut servers).await;
    first.accept_with_heartbeat("4000,4000").await;

    // Client heartbeats keep flowing to the server while it stays silent.
    let beat = time::timeout(Duration::from_secs(10), first.from_client.recv())
        .await
        .expect("no heartbeat")
        .expect("link closed");
    assert_eq!(beat, "\n");

    let _second = common::next_server(&mut servers).await;
    assert_eq!(errors.lock()[0], GatewayError::HeartbeatTimeout);
    assert_eq!(connector.attempts(), 2);
    channel.disconnect();
}
