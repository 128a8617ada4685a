//! Canonical gateway topics.

use std::fmt;
use std::str::FromStr;

use taskboard_common::{ProjectId, TaskId, UserId};

/// A topic the server publishes on. The string form is the wire destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// `user-notifications:{userId}`
    UserNotifications(UserId),
    /// `tasks-global`
    TasksGlobal,
    /// `project-tasks:{projectId}`
    ProjectTasks(ProjectId),
    /// `task-comments:{taskId}`
    TaskComments(TaskId),
}

impl Topic {
    pub const USER_NOTIFICATIONS: &'static str = "user-notifications";
    pub const TASKS_GLOBAL: &'static str = "tasks-global";
    pub const PROJECT_TASKS: &'static str = "project-tasks";
    pub const TASK_COMMENTS: &'static str = "task-comments";
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserNotifications(id) => write!(f, "{}:{id}", Self::USER_NOTIFICATIONS),
            Self::TasksGlobal => f.write_str(Self::TASKS_GLOBAL),
            Self::ProjectTasks(id) => write!(f, "{}:{id}", Self::PROJECT_TASKS),
            Self::TaskComments(id) => write!(f, "{}:{id}", Self::TASK_COMMENTS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTopic(pub String);

impl fmt::Display for UnknownTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown topic {:?}", self.0)
    }
}

impl std::error::Error for UnknownTopic {}

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::TASKS_GLOBAL {
            return Ok(Self::TasksGlobal);
        }
        let unknown = || UnknownTopic(s.to_string());
        let (kind, id) = s.split_once(':').ok_or_else(unknown)?;
        let id: i64 = id.parse().map_err(|_| unknown())?;
        match kind {
            Self::USER_NOTIFICATIONS => Ok(Self::UserNotifications(id)),
            Self::PROJECT_TASKS => Ok(Self::ProjectTasks(id)),
            Self::TASK_COMMENTS => Ok(Self::TaskComments(id)),
            _ => Err(unknown()),
        }
    }
}
