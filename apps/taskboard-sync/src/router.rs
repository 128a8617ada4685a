//! Topic router: turns view interests into gateway subscriptions whose
//! handlers feed the store.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use taskboard_common::{Comment, Notification, ProjectId, TaskChangeSignal, TaskId, UserId};
use tokio::task::JoinSet;

use crate::api::TaskApi;
use crate::commands;
use crate::gateway::{Channel, InboundEvent, Payload, SubscriptionHandle, Topic};
use crate::store::{SyncStore, TaskScope};

/// Subscribes views to topics on one channel. Cheap to clone.
///
/// Every method returns a release handle; while the channel is not connected
/// the handle is inert and nothing is subscribed.
#[derive(Clone)]
pub struct TopicRouter {
    channel: Channel,
    store: SyncStore,
    api: Arc<dyn TaskApi>,
    refetches: Refetches,
}

/// Push-triggered refetches still in flight. `None` once shut down.
#[derive(Clone)]
struct Refetches(Arc<Mutex<Option<JoinSet<()>>>>);

impl Refetches {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Some(JoinSet::new()))))
    }

    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut guard = self.0.lock();
        let Some(tasks) = guard.as_mut() else {
            tracing::debug!("router shut down, refetch skipped");
            return;
        };
        while tasks.try_join_next().is_some() {}
        tasks.spawn(fut);
    }

    fn shutdown(&self) {
        if let Some(mut tasks) = self.0.lock().take() {
            tasks.abort_all();
        }
    }
}

impl TopicRouter {
    pub fn new(channel: Channel, store: SyncStore, api: Arc<dyn TaskApi>) -> Self {
        Self {
            channel,
            store,
            api,
            refetches: Refetches::new(),
        }
    }

    /// Abort refetches still in flight. Pushes delivered afterwards update
    /// the store but trigger no further fetches.
    pub fn shutdown(&self) {
        self.refetches.shutdown();
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn store(&self) -> &SyncStore {
        &self.store
    }

    /// Pushed notifications for `user`: inserted into the feed, followed by
    /// a fresh unread-count fetch. `on_notification` runs after the insert.
    pub fn subscribe_user_notifications<F>(&self, user: UserId, on_notification: F) -> SubscriptionHandle
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let store = self.store.clone();
        let api = Arc::clone(&self.api);
        let refetches = self.refetches.clone();
        self.channel
            .subscribe(Topic::UserNotifications(user), move |event: InboundEvent| {
                let Payload::Notification(notification) = event.payload else {
                    return;
                };
                tracing::debug!(notification_id = notification.id, "notification pushed");
                store.insert_notification(notification.clone());
                refetches.spawn(refresh_unread(Arc::clone(&api), store.clone()));
                on_notification(&notification);
            })
    }

    /// Change signals for every task. Any create, update or delete refetches
    /// the all-tasks list.
    pub fn subscribe_global_task_changes<F>(&self, on_signal: F) -> SubscriptionHandle
    where
        F: Fn(&TaskChangeSignal) + Send + Sync + 'static,
    {
        self.subscribe_task_changes(Topic::TasksGlobal, TaskScope::All, on_signal)
    }

    /// Change signals for one project's tasks, refetching that project's list.
    pub fn subscribe_project_task_changes<F>(&self, project: ProjectId, on_signal: F) -> SubscriptionHandle
    where
        F: Fn(&TaskChangeSignal) + Send + Sync + 'static,
    {
        self.subscribe_task_changes(Topic::ProjectTasks(project), TaskScope::Project(project), on_signal)
    }

    /// Comments posted on `task`, inserted newest first.
    pub fn subscribe_task_comments<F>(&self, task: TaskId, on_comment: F) -> SubscriptionHandle
    where
        F: Fn(&Comment) + Send + Sync + 'static,
    {
        let store = self.store.clone();
        self.channel
            .subscribe(Topic::TaskComments(task), move |event: InboundEvent| {
                let Payload::Comment(comment) = event.payload else {
                    return;
                };
                tracing::debug!(task_id = task, comment_id = comment.id, "comment pushed");
                store.insert_comment(task, comment.clone());
                on_comment(&comment);
            })
    }

    fn subscribe_task_changes<F>(&self, topic: Topic, scope: TaskScope, on_signal: F) -> SubscriptionHandle
    where
        F: Fn(&TaskChangeSignal) + Send + Sync + 'static,
    {
        let store = self.store.clone();
        let api = Arc::clone(&self.api);
        let refetches = self.refetches.clone();
        self.channel.subscribe(topic, move |event: InboundEvent| {
            let Payload::TaskChange(signal) = event.payload else {
                return;
            };
            if signal.requires_refetch() {
                tracing::debug!(%topic, kind = ?signal.kind, task_id = ?signal.task_id, "task change, refetching");
                refetches.spawn(refresh_tasks(Arc::clone(&api), store.clone(), scope));
            } else {
                tracing::debug!(%topic, kind = ?signal.kind, "ignoring task signal");
            }
            on_signal(&signal);
        })
    }
}

async fn refresh_tasks(api: Arc<dyn TaskApi>, store: SyncStore, scope: TaskScope) {
    if let Err(err) = commands::refresh_tasks(api.as_ref(), &store, scope).await {
        tracing::warn!(%scope, %err, "push-triggered task refetch failed");
    }
}

async fn refresh_unread(api: Arc<dyn TaskApi>, store: SyncStore) {
    if let Err(err) = commands::refresh_unread_count(api.as_ref(), &store).await {
        tracing::warn!(%err, "unread count refresh failed");
    }
}
