//! REST access to the task backend.

mod client;

pub use client::{ApiClient, UnauthorizedHook};

use async_trait::async_trait;
use taskboard_common::{Comment, Notification, ProjectId, Task, TaskDraft, TaskId};

use crate::error::ApiError;

/// The backend operations the sync core needs.
///
/// [`ApiClient`] talks HTTP; tests substitute an in-memory fake.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, ApiError>;
    async fn fetch_project_tasks(&self, project: ProjectId) -> Result<Vec<Task>, ApiError>;
    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError>;
    async fn update_task(&self, id: TaskId, draft: &TaskDraft) -> Result<Task, ApiError>;
    async fn delete_task(&self, id: TaskId) -> Result<(), ApiError>;

    async fn fetch_notifications(&self) -> Result<Vec<Notification>, ApiError>;
    async fn fetch_unread_notifications(&self) -> Result<Vec<Notification>, ApiError>;
    async fn fetch_unread_count(&self) -> Result<u64, ApiError>;
    async fn mark_notification_read(&self, id: i64) -> Result<(), ApiError>;
    async fn mark_all_notifications_read(&self) -> Result<(), ApiError>;

    async fn fetch_comments(&self, task: TaskId) -> Result<Vec<Comment>, ApiError>;
    async fn create_comment(&self, task: TaskId, content: &str) -> Result<Comment, ApiError>;
    async fn delete_comment(&self, task: TaskId, comment: i64) -> Result<(), ApiError>;
}
