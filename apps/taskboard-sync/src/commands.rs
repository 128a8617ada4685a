//! User-initiated operations: call the backend, then reconcile the response
//! into the store.
//!
//! Failures are returned to the caller and leave the store untouched.

use taskboard_common::{Comment, Task, TaskDraft, TaskId};

use crate::api::TaskApi;
use crate::error::ApiError;
use crate::store::{SyncStore, TaskScope};

/// Fetch a task list and replace it in the store.
pub async fn refresh_tasks(
    api: &dyn TaskApi,
    store: &SyncStore,
    scope: TaskScope,
) -> Result<usize, ApiError> {
    let tasks = match scope {
        TaskScope::All => api.fetch_tasks().await?,
        TaskScope::Project(id) => api.fetch_project_tasks(id).await?,
    };
    let count = tasks.len();
    store.replace_tasks(scope, tasks);
    Ok(count)
}

pub async fn create_task(
    api: &dyn TaskApi,
    store: &SyncStore,
    draft: &TaskDraft,
) -> Result<Task, ApiError> {
    let task = api.create_task(draft).await?;
    tracing::info!(task_id = task.id, "task created");
    store.upsert_task(task.clone());
    Ok(task)
}

pub async fn update_task(
    api: &dyn TaskApi,
    store: &SyncStore,
    id: TaskId,
    draft: &TaskDraft,
) -> Result<Task, ApiError> {
    let task = api.update_task(id, draft).await?;
    tracing::info!(task_id = task.id, "task updated");
    store.upsert_task(task.clone());
    Ok(task)
}

pub async fn delete_task(api: &dyn TaskApi, store: &SyncStore, id: TaskId) -> Result<(), ApiError> {
    api.delete_task(id).await?;
    tracing::info!(task_id = id, "task deleted");
    store.remove_task(id);
    Ok(())
}

pub async fn load_notifications(api: &dyn TaskApi, store: &SyncStore) -> Result<usize, ApiError> {
    let notifications = api.fetch_notifications().await?;
    let count = notifications.len();
    store.replace_notifications(notifications);
    Ok(count)
}

/// Load only the unread notifications and derive the count from them.
pub async fn load_unread_notifications(
    api: &dyn TaskApi,
    store: &SyncStore,
) -> Result<u64, ApiError> {
    let notifications = api.fetch_unread_notifications().await?;
    store.replace_notifications(notifications);
    Ok(store.recompute_unread_count())
}

pub async fn refresh_unread_count(api: &dyn TaskApi, store: &SyncStore) -> Result<u64, ApiError> {
    let count = api.fetch_unread_count().await?;
    store.set_unread_count(count);
    Ok(count)
}

pub async fn mark_read(api: &dyn TaskApi, store: &SyncStore, id: i64) -> Result<(), ApiError> {
    api.mark_notification_read(id).await?;
    store.mark_notification_read(id);
    Ok(())
}

pub async fn mark_all_read(api: &dyn TaskApi, store: &SyncStore) -> Result<(), ApiError> {
    api.mark_all_notifications_read().await?;
    store.mark_all_notifications_read();
    Ok(())
}

pub async fn load_comments(
    api: &dyn TaskApi,
    store: &SyncStore,
    task: TaskId,
) -> Result<usize, ApiError> {
    let comments = api.fetch_comments(task).await?;
    let count = comments.len();
    store.replace_comments(task, comments);
    Ok(count)
}

/// Post a comment. The created comment is inserted right away; its pushed
/// echo later replaces it rather than duplicating it.
pub async fn post_comment(
    api: &dyn TaskApi,
    store: &SyncStore,
    task: TaskId,
    content: &str,
) -> Result<Comment, ApiError> {
    let comment = api.create_comment(task, content).await?;
    store.insert_comment(task, comment.clone());
    Ok(comment)
}

pub async fn delete_comment(
    api: &dyn TaskApi,
    store: &SyncStore,
    task: TaskId,
    comment: i64,
) -> Result<(), ApiError> {
    api.delete_comment(task, comment).await?;
    store.remove_comment(task, comment);
    Ok(())
}
