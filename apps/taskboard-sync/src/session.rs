//! Session-scoped connection lifecycle.
//!
//! A session starts at login and ends at logout or when the backend rejects
//! the credential. It owns the gateway channel, the standard subscriptions
//! and the unread-count poller; ending it tears all of them down and clears
//! the store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use taskboard_common::id::{prefix, prefixed_ulid};
use taskboard_common::{Identity, Notification};
use tokio::task::JoinHandle;
use tokio::time;

use crate::api::{TaskApi, UnauthorizedHook};
use crate::commands;
use crate::config::Config;
use crate::error::GatewayError;
use crate::gateway::{
    Channel, ChannelCallbacks, ChannelConfig, ConnectionState, Connector, SubscriptionHandle,
};
use crate::router::TopicRouter;
use crate::store::SyncStore;

/// Run after every successful connect, with the router of the live session.
pub type ConnectHook = Arc<dyn Fn(&TopicRouter) + Send + Sync>;
pub type NotificationHook = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Identifies a registered connect hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

struct ActiveSession {
    id: String,
    identity: Identity,
    channel: Channel,
    router: TopicRouter,
    /// User notifications and global task changes, reissued on every connect.
    standard: Arc<Mutex<Vec<SubscriptionHandle>>>,
    poller: JoinHandle<()>,
}

struct SessionInner {
    config: Config,
    api: Arc<dyn TaskApi>,
    connector: Arc<dyn Connector>,
    store: SyncStore,
    active: Mutex<Option<ActiveSession>>,
    hooks: Mutex<Vec<(HookId, ConnectHook)>>,
    next_hook: AtomicU64,
    on_notification: RwLock<Option<NotificationHook>>,
}

/// Owns at most one live session. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(
        config: Config,
        api: Arc<dyn TaskApi>,
        connector: Arc<dyn Connector>,
        store: SyncStore,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                config,
                api,
                connector,
                store,
                active: Mutex::new(None),
                hooks: Mutex::new(Vec::new()),
                next_hook: AtomicU64::new(1),
                on_notification: RwLock::new(None),
            }),
        }
    }

    /// Start a session for `identity`.
    ///
    /// A no-op when a session for the same identity is already running. A
    /// session for another identity is torn down first and the store cleared.
    pub fn start(&self, identity: Identity) {
        let previous = {
            let mut active = self.inner.active.lock();
            if active.as_ref().is_some_and(|s| s.identity == identity) {
                tracing::debug!(user_id = identity.user.id, "session already active");
                return;
            }
            active.take()
        };
        if let Some(previous) = previous {
            tracing::info!(session_id = %previous.id, "replacing session");
            teardown(previous);
            self.inner.store.clear();
        }

        let id = prefixed_ulid(prefix::SESSION);
        let channel = Channel::new(ChannelConfig::from(&self.inner.config), Arc::clone(&self.inner.connector));
        let router = TopicRouter::new(channel.clone(), self.inner.store.clone(), Arc::clone(&self.inner.api));
        let poller = tokio::spawn(poll_unread_count(
            Arc::clone(&self.inner.api),
            self.inner.store.clone(),
            self.inner.config.unread_poll_interval,
        ));

        let callbacks = ChannelCallbacks {
            on_connect: Some(Arc::new({
                let inner = Arc::downgrade(&self.inner);
                let session_id = id.clone();
                move || on_connected(&inner, &session_id)
            })),
            on_error: Some(Arc::new({
                let session_id = id.clone();
                move |err: &GatewayError| tracing::warn!(%session_id, %err, "gateway error, will retry")
            })),
        };

        tracing::info!(session_id = %id, user_id = identity.user.id, "session started");
        let token = identity.token.clone();
        *self.inner.active.lock() = Some(ActiveSession {
            id,
            identity,
            channel: channel.clone(),
            router,
            standard: Arc::new(Mutex::new(Vec::new())),
            poller,
        });
        channel.connect(token, callbacks);
    }

    /// End the session: disconnect, drop subscriptions, stop polling and
    /// clear the store. Safe to call without a session.
    pub fn logout(&self) {
        self.end("logout");
    }

    /// End the session because the credential is no longer valid.
    pub fn invalidate(&self) {
        self.end("credential rejected");
    }

    /// A hook for the REST client to call on 401.
    pub fn unauthorized_hook(&self) -> UnauthorizedHook {
        let inner = Arc::downgrade(&self.inner);
        Arc::new(move || {
            if let Some(inner) = inner.upgrade() {
                SessionManager { inner }.invalidate();
            }
        })
    }

    /// Register a hook run on every successful connect. Runs immediately
    /// when already connected.
    pub fn add_connect_hook<F>(&self, hook: F) -> HookId
    where
        F: Fn(&TopicRouter) + Send + Sync + 'static,
    {
        let id = HookId(self.inner.next_hook.fetch_add(1, Ordering::Relaxed));
        let hook: ConnectHook = Arc::new(hook);
        self.inner.hooks.lock().push((id, Arc::clone(&hook)));

        if let Some(router) = self.router().filter(|r| r.channel().is_connected()) {
            hook(&router);
        }
        id
    }

    pub fn remove_connect_hook(&self, id: HookId) -> bool {
        let mut hooks = self.inner.hooks.lock();
        let before = hooks.len();
        hooks.retain(|(hook_id, _)| *hook_id != id);
        hooks.len() != before
    }

    /// Called for every pushed notification after it is stored.
    pub fn on_notification<F>(&self, hook: F)
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        *self.inner.on_notification.write() = Some(Arc::new(hook));
    }

    pub fn router(&self) -> Option<TopicRouter> {
        self.inner.active.lock().as_ref().map(|s| s.router.clone())
    }

    pub fn store(&self) -> &SyncStore {
        &self.inner.store
    }

    pub fn state(&self) -> ConnectionState {
        self.inner
            .active
            .lock()
            .as_ref()
            .map_or(ConnectionState::Disconnected, |s| s.channel.state())
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.active.lock().as_ref().map(|s| s.identity.clone())
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.active.lock().as_ref().map(|s| s.id.clone())
    }

    fn end(&self, reason: &str) {
        let session = self.inner.active.lock().take();
        if let Some(session) = session {
            tracing::info!(session_id = %session.id, reason, "session ended");
            teardown(session);
        }
        self.inner.store.clear();
    }
}

fn teardown(session: ActiveSession) {
    session.channel.disconnect();
    session.standard.lock().clear();
    session.poller.abort();
    session.router.shutdown();
}

/// Reissue the standard subscriptions and run the connect hooks. No session
/// lock is held while the router or a hook runs.
fn on_connected(inner: &Weak<SessionInner>, session_id: &str) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let (router, user, standard) = {
        let active = inner.active.lock();
        match active.as_ref() {
            Some(s) if s.id == session_id => (s.router.clone(), s.identity.user.id, Arc::clone(&s.standard)),
            _ => return,
        }
    };

    let notify = Arc::downgrade(&inner);
    let handles = vec![
        router.subscribe_user_notifications(user, move |notification| {
            let hook = notify.upgrade().and_then(|inner| notification_hook(&inner));
            if let Some(hook) = hook {
                hook(notification);
            }
        }),
        router.subscribe_global_task_changes(|_| {}),
    ];
    let replaced = std::mem::replace(&mut *standard.lock(), handles);
    drop(replaced);

    let hooks: Vec<ConnectHook> = inner.hooks.lock().iter().map(|(_, h)| Arc::clone(h)).collect();
    tracing::debug!(%session_id, hooks = hooks.len(), "connected, subscriptions issued");
    for hook in hooks {
        hook(&router);
    }
}

fn notification_hook(inner: &SessionInner) -> Option<NotificationHook> {
    inner.on_notification.read().clone()
}

/// Refresh the unread count now and then every `every`, until aborted.
async fn poll_unread_count(api: Arc<dyn TaskApi>, store: SyncStore, every: Duration) {
    let mut ticker = time::interval(every.max(Duration::from_secs(1)));
    loop {
        ticker.tick().await;
        if let Err(err) = commands::refresh_unread_count(api.as_ref(), &store).await {
            tracing::warn!(%err, "unread count poll failed");
        }
    }
}
