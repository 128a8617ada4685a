pub mod entity;
pub mod id;

pub use entity::{
    AuthUser, ChangeKind, Comment, Entity, Identity, Notification, ProjectId, ProjectSummary, Task,
    TaskChangeSignal, TaskDraft, TaskId, TaskPriority, TaskStatus, TaskSummary, UserId, UserSummary,
};
