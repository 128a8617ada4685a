//! The gateway channel: one persistent connection, its reconnect loop, and
//! inbound dispatch.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use taskboard_common::id::{prefix, prefixed_ulid};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::Config;
use crate::error::GatewayError;

use super::connector::{Connector, Link, LinkEvent};
use super::events::InboundEvent;
use super::frame::{self, Command, Frame, HeartBeat, HEARTBEAT};
use super::registry::{SubscriptionEntry, SubscriptionHandle, SubscriptionRegistry};
use super::session::{ConnectionState, ConnectionStatus};
use super::topic::Topic;

/// The connection is considered lost after this many missed server heartbeats.
const HEARTBEAT_GRACE_FACTOR: u32 = 2;

pub type ConnectCallback = Arc<dyn Fn() + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&GatewayError) + Send + Sync>;

/// Callbacks fired from the channel's worker task.
#[derive(Clone, Default)]
pub struct ChannelCallbacks {
    /// Runs once per successful handshake, before any message is dispatched.
    pub on_connect: Option<ConnectCallback>,
    /// Runs for every failed attempt and every lost connection.
    pub on_error: Option<ErrorCallback>,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: String,
    pub reconnect_delay: Duration,
    pub heartbeat: HeartBeat,
    pub handshake_timeout: Duration,
}

impl From<&Config> for ChannelConfig {
    fn from(config: &Config) -> Self {
        Self {
            url: config.gateway_url.clone(),
            reconnect_delay: config.reconnect_delay,
            heartbeat: HeartBeat::symmetric(config.heartbeat_interval),
            handshake_timeout: config.handshake_timeout,
        }
    }
}

/// A link that completed the handshake.
struct Established {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<LinkEvent>,
    heartbeat: HeartBeat,
}

pub(crate) struct ChannelInner {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    status: ConnectionStatus,
    registry: SubscriptionRegistry,
    /// Sender of the live link while connected.
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one gateway connection. Cheap to clone.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub fn new(config: ChannelConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                config,
                connector,
                status: ConnectionStatus::new(),
                registry: SubscriptionRegistry::new(),
                outbound: Mutex::new(None),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Start connecting with `credential`. A no-op while a previous `connect`
    /// is still connecting or connected.
    ///
    /// Failures are reported through `callbacks.on_error` and retried every
    /// `reconnect_delay` until [`Channel::disconnect`] is called.
    pub fn connect(&self, credential: impl Into<String>, callbacks: ChannelCallbacks) {
        let mut worker = self.inner.worker.lock();
        if worker.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::debug!(state = %self.state(), "gateway connect ignored, already active");
            return;
        }
        let inner = Arc::clone(&self.inner);
        *worker = Some(tokio::spawn(run_channel(inner, credential.into(), callbacks)));
    }

    /// Tear down the connection and every subscription. Safe to call when
    /// already disconnected.
    pub fn disconnect(&self) {
        if let Some(worker) = self.inner.worker.lock().take() {
            worker.abort();
        }
        if let Some(outbound) = self.inner.outbound.lock().take() {
            let _ = outbound.send(Frame::disconnect().encode());
            tracing::info!(url = %self.inner.config.url, "gateway disconnected");
        }
        let cleared = self.inner.registry.clear();
        if cleared > 0 {
            tracing::debug!(cleared, "gateway subscriptions cleared");
        }
        self.inner.status.reset();
    }

    /// Subscribe `handler` to `topic`.
    ///
    /// Only valid while connected: otherwise an inert handle is returned and
    /// nothing is registered. Callers re-subscribe from their connect hook.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionHandle
    where
        F: Fn(InboundEvent) + Send + Sync + 'static,
    {
        let current = self.inner.outbound.lock().clone();
        let outbound = match current {
            Some(tx) if self.is_connected() => tx,
            _ => {
                tracing::warn!(%topic, "subscribe called while gateway is not connected");
                return SubscriptionHandle::inert(topic);
            }
        };

        let id = prefixed_ulid(prefix::SUBSCRIPTION);
        let entry = Arc::new(SubscriptionEntry::new(id.clone(), topic, Box::new(handler)));
        self.inner.registry.insert(&entry);

        let destination = topic.to_string();
        if outbound.send(Frame::subscribe(&id, &destination).encode()).is_err() {
            self.inner.registry.remove(&id);
            entry.deactivate();
            tracing::warn!(%topic, "gateway link closed while subscribing");
            return SubscriptionHandle::inert(topic);
        }

        tracing::info!(%topic, subscription_id = %id, "subscribed");
        SubscriptionHandle::live(entry, Arc::downgrade(&self.inner))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.status.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.status.watch()
    }

    /// Connection attempts since the last successful handshake.
    pub fn attempts(&self) -> u32 {
        self.inner.status.attempts()
    }

    /// Topics with a live subscription on the current connection.
    pub fn subscribed_topics(&self) -> Vec<Topic> {
        self.inner.registry.topics()
    }
}

impl ChannelInner {
    pub(crate) fn unsubscribe(&self, id: &str) {
        self.registry.remove(id);
        if let Some(outbound) = self.outbound.lock().as_ref() {
            let _ = outbound.send(Frame::unsubscribe(id).encode());
            tracing::info!(subscription_id = %id, "unsubscribed");
        }
    }

    fn dispatch(&self, frame: &Frame) {
        let Some(subscription_id) = frame.header("subscription") else {
            tracing::warn!("MESSAGE frame without subscription header");
            return;
        };
        let Some(entry) = self.registry.get(subscription_id) else {
            tracing::debug!(%subscription_id, "message for released subscription dropped");
            return;
        };
        if let Some(destination) = frame.header("destination") {
            match destination.parse::<Topic>() {
                Ok(topic) if topic == entry.topic() => {}
                Ok(_) | Err(_) => {
                    tracing::warn!(%destination, expected = %entry.topic(), "message destination mismatch");
                    return;
                }
            }
        }
        match InboundEvent::decode(entry.topic(), &frame.body) {
            Ok(event) => {
                entry.deliver(event);
            }
            Err(err) => {
                tracing::warn!(%err, topic = %entry.topic(), "dropping undecodable message");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

async fn run_channel(inner: Arc<ChannelInner>, credential: String, callbacks: ChannelCallbacks) {
    loop {
        let attempt = inner.status.begin_attempt();
        tracing::debug!(attempt, url = %inner.config.url, "gateway connecting");

        match handshake(&inner, &credential).await {
            Ok(established) => {
                *inner.outbound.lock() = Some(established.outbound.clone());
                inner.status.mark_connected();
                tracing::info!(
                    url = %inner.config.url,
                    heartbeat_out_ms = established.heartbeat.outgoing.as_millis() as u64,
                    heartbeat_in_ms = established.heartbeat.incoming.as_millis() as u64,
                    "gateway connected"
                );
                if let Some(on_connect) = &callbacks.on_connect {
                    on_connect();
                }

                let reason = run_session(&inner, established).await;

                inner.outbound.lock().take();
                inner.registry.clear();
                inner.status.mark_disconnected();
                tracing::warn!(%reason, "gateway connection lost");
                if let Some(on_error) = &callbacks.on_error {
                    on_error(&reason);
                }
            }
            Err(err) => {
                inner.status.mark_disconnected();
                tracing::warn!(attempt, %err, "gateway handshake failed");
                if let Some(on_error) = &callbacks.on_error {
                    on_error(&err);
                }
            }
        }

        tracing::debug!(
            delay_ms = inner.config.reconnect_delay.as_millis() as u64,
            "gateway reconnect scheduled"
        );
        time::sleep(inner.config.reconnect_delay).await;
    }
}

/// Open a link, send CONNECT and wait for CONNECTED.
async fn handshake(inner: &ChannelInner, credential: &str) -> Result<Established, GatewayError> {
    let Link {
        outbound,
        mut inbound,
    } = inner.connector.open(&inner.config.url).await?;

    let connect = Frame::connect(host_of(&inner.config.url), credential, inner.config.heartbeat);
    outbound
        .send(connect.encode())
        .map_err(|_| GatewayError::Closed(None))?;

    let reply = time::timeout(inner.config.handshake_timeout, first_frame(&mut inbound))
        .await
        .map_err(|_| GatewayError::Timeout)??;

    match reply.command {
        Command::Connected => {
            let server = HeartBeat::from_header(reply.header("heart-beat"));
            Ok(Established {
                outbound,
                inbound,
                heartbeat: HeartBeat::negotiate(inner.config.heartbeat, server),
            })
        }
        Command::Error => Err(GatewayError::Rejected(error_message(&reply))),
        other => Err(GatewayError::Handshake(format!("unexpected {other} frame"))),
    }
}

/// Next non-heartbeat frame off the link.
async fn first_frame(
    inbound: &mut mpsc::UnboundedReceiver<LinkEvent>,
) -> Result<Frame, GatewayError> {
    loop {
        match inbound.recv().await {
            Some(LinkEvent::Text(text)) => {
                if let Some(frame) = frame::decode(&text)? {
                    return Ok(frame);
                }
            }
            Some(LinkEvent::Closed(reason)) => return Err(GatewayError::Closed(reason)),
            None => return Err(GatewayError::Closed(None)),
        }
    }
}

/// Run one established connection until it ends. Returns why it ended.
async fn run_session(inner: &ChannelInner, established: Established) -> GatewayError {
    let Established {
        outbound,
        mut inbound,
        heartbeat,
    } = established;

    let send_every = heartbeat.outgoing;
    let silence_limit = heartbeat.incoming * HEARTBEAT_GRACE_FACTOR;

    // Intervals must be non-zero; disabled directions are gated off below.
    let mut send_timer = time::interval(send_every.max(Duration::from_millis(1)));
    let mut check_timer = time::interval(heartbeat.incoming.max(Duration::from_millis(1)));
    send_timer.tick().await; // First tick fires immediately; skip it.
    check_timer.tick().await;
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            event = inbound.recv() => {
                match event {
                    Some(LinkEvent::Text(text)) => {
                        last_seen = Instant::now();
                        match frame::decode(&text) {
                            Ok(None) => {}
                            Ok(Some(frame)) => match frame.command {
                                Command::Message => inner.dispatch(&frame),
                                Command::Error => return GatewayError::Rejected(error_message(&frame)),
                                Command::Receipt => {
                                    tracing::debug!(receipt = ?frame.header("receipt-id"), "receipt");
                                }
                                other => tracing::debug!(command = %other, "ignoring unexpected frame"),
                            },
                            Err(err) => tracing::warn!(%err, "dropping malformed frame"),
                        }
                    }
                    Some(LinkEvent::Closed(reason)) => return GatewayError::Closed(reason),
                    None => return GatewayError::Closed(None),
                }
            }

            _ = send_timer.tick(), if !send_every.is_zero() => {
                if outbound.send(HEARTBEAT.to_string()).is_err() {
                    return GatewayError::Closed(None);
                }
            }

            _ = check_timer.tick(), if !heartbeat.incoming.is_zero() => {
                if last_seen.elapsed() > silence_limit {
                    return GatewayError::HeartbeatTimeout;
                }
            }
        }
    }
}

fn error_message(frame: &Frame) -> String {
    frame
        .header("message")
        .map(str::to_string)
        .unwrap_or_else(|| frame.body.trim_end().to_string())
}

/// Virtual host for the CONNECT frame: the endpoint's host name.
fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split('/').next().unwrap_or(rest);
    let authority = authority.rsplit('@').next().unwrap_or(authority);
    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    }
}
