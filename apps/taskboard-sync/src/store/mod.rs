//! Client-side cache of tasks, notifications and comments.
//!
//! Every mutation runs under one lock and is followed by a [`StoreChange`]
//! broadcast. Views read snapshots and re-read when a change they care about
//! arrives.

pub mod collection;
pub mod comments;
pub mod notifications;
pub mod tasks;

use std::sync::Arc;

use parking_lot::Mutex;
use taskboard_common::{Comment, Notification, ProjectId, Task, TaskId, TaskStatus};
use tokio::sync::broadcast;

pub use collection::{Collection, Upsert};
pub use comments::CommentThreads;
pub use notifications::NotificationFeed;
pub use tasks::{TaskBoard, TaskScope};

/// Capacity of the change channel. Lagging listeners skip changes and should
/// re-read everything.
const CHANGE_CAPACITY: usize = 256;

/// What part of the store changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Tasks(TaskScope),
    Notifications,
    Comments(TaskId),
    /// Everything was dropped (logout).
    Cleared,
}

#[derive(Debug, Default)]
struct State {
    tasks: TaskBoard,
    notifications: NotificationFeed,
    comments: CommentThreads,
}

/// Shared store handle. Cheap to clone.
#[derive(Clone)]
pub struct SyncStore {
    state: Arc<Mutex<State>>,
    changes: broadcast::Sender<StoreChange>,
}

impl SyncStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(State::default())),
            changes,
        }
    }

    /// Listen for changes made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn emit(&self, change: StoreChange) {
        // No listeners is fine.
        let _ = self.changes.send(change);
    }

    // -- tasks ---------------------------------------------------------------

    pub fn replace_tasks(&self, scope: TaskScope, tasks: Vec<Task>) {
        let count = tasks.len();
        self.state.lock().tasks.replace(scope, tasks);
        tracing::debug!(%scope, count, "task list replaced");
        self.emit(StoreChange::Tasks(scope));
    }

    pub fn upsert_task(&self, task: Task) {
        let changed = self.state.lock().tasks.upsert(task);
        for scope in changed {
            self.emit(StoreChange::Tasks(scope));
        }
    }

    pub fn remove_task(&self, id: TaskId) {
        let changed = self.state.lock().tasks.remove(id);
        if changed.is_empty() {
            tracing::debug!(task_id = id, "remove for unknown task ignored");
        }
        for scope in changed {
            self.emit(StoreChange::Tasks(scope));
        }
    }

    pub fn release_project(&self, project: ProjectId) {
        self.state.lock().tasks.release(project);
    }

    pub fn tasks(&self, scope: TaskScope) -> Vec<Task> {
        self.state.lock().tasks.tasks(scope)
    }

    pub fn tasks_with_status(&self, scope: TaskScope, status: TaskStatus) -> Vec<Task> {
        self.state.lock().tasks.filtered(scope, status)
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.state.lock().tasks.get(id).cloned()
    }

    // -- notifications -------------------------------------------------------

    pub fn insert_notification(&self, notification: Notification) {
        self.state.lock().notifications.insert(notification);
        self.emit(StoreChange::Notifications);
    }

    pub fn mark_notification_read(&self, id: i64) -> bool {
        let changed = self.state.lock().notifications.mark_read(id);
        if changed {
            self.emit(StoreChange::Notifications);
        } else {
            tracing::debug!(notification_id = id, "mark-read for unknown or read notification ignored");
        }
        changed
    }

    pub fn mark_all_notifications_read(&self) {
        self.state.lock().notifications.mark_all_read();
        self.emit(StoreChange::Notifications);
    }

    pub fn replace_notifications(&self, notifications: Vec<Notification>) {
        self.state.lock().notifications.replace_all(notifications);
        self.emit(StoreChange::Notifications);
    }

    pub fn set_unread_count(&self, count: u64) {
        self.state.lock().notifications.set_unread_count(count);
        self.emit(StoreChange::Notifications);
    }

    pub fn recompute_unread_count(&self) -> u64 {
        let count = self.state.lock().notifications.recompute_unread();
        self.emit(StoreChange::Notifications);
        count
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state.lock().notifications.to_vec()
    }

    pub fn notification(&self, id: i64) -> Option<Notification> {
        self.state.lock().notifications.get(id).cloned()
    }

    pub fn unread_count(&self) -> u64 {
        self.state.lock().notifications.unread_count()
    }

    // -- comments ------------------------------------------------------------

    pub fn replace_comments(&self, task: TaskId, comments: Vec<Comment>) {
        self.state.lock().comments.replace(task, comments);
        self.emit(StoreChange::Comments(task));
    }

    pub fn insert_comment(&self, task: TaskId, comment: Comment) {
        self.state.lock().comments.insert(task, comment);
        self.emit(StoreChange::Comments(task));
    }

    pub fn remove_comment(&self, task: TaskId, comment: i64) {
        if self.state.lock().comments.remove(task, comment) {
            self.emit(StoreChange::Comments(task));
        } else {
            tracing::debug!(task_id = task, comment_id = comment, "remove for unknown comment ignored");
        }
    }

    pub fn release_comments(&self, task: TaskId) {
        self.state.lock().comments.release(task);
    }

    pub fn comments(&self, task: TaskId) -> Vec<Comment> {
        self.state.lock().comments.comments(task)
    }

    // -- lifecycle -----------------------------------------------------------

    /// Drop all cached data.
    pub fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.tasks.clear();
            state.notifications.clear();
            state.comments.clear();
        }
        self.emit(StoreChange::Cleared);
    }
}

impl Default for SyncStore {
    fn default() -> Self {
        Self::new()
    }
}
