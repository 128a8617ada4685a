//! Task lists: the all-tasks list and one list per loaded project.

use std::collections::HashMap;
use std::fmt;

use taskboard_common::{ProjectId, Task, TaskId, TaskStatus};

use super::collection::Collection;

/// Which task list a fetch or a change refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskScope {
    All,
    Project(ProjectId),
}

impl fmt::Display for TaskScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Project(id) => write!(f, "project:{id}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskBoard {
    all: Collection<Task>,
    projects: HashMap<ProjectId, Collection<Task>>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a list with a fetched sequence. Loads the project list if it
    /// was not loaded.
    pub fn replace(&mut self, scope: TaskScope, tasks: impl IntoIterator<Item = Task>) {
        let fetched = Collection::from_fetch(tasks);
        match scope {
            TaskScope::All => self.all = fetched,
            TaskScope::Project(id) => {
                self.projects.insert(id, fetched);
            }
        }
    }

    /// Apply a created or updated task to every loaded list. Returns the
    /// scopes that changed.
    pub fn upsert(&mut self, task: Task) -> Vec<TaskScope> {
        let mut changed = Vec::new();
        let owner = task.project_id();
        for (&id, list) in self.projects.iter_mut() {
            if owner == Some(id) {
                list.upsert(task.clone());
                changed.push(TaskScope::Project(id));
            } else if list.remove(task.id).is_some() {
                changed.push(TaskScope::Project(id));
            }
        }
        self.all.upsert(task);
        changed.insert(0, TaskScope::All);
        changed
    }

    /// Remove a task from every list. Returns the scopes that held it.
    pub fn remove(&mut self, id: TaskId) -> Vec<TaskScope> {
        let mut changed = Vec::new();
        if self.all.remove(id).is_some() {
            changed.push(TaskScope::All);
        }
        for (&project, list) in self.projects.iter_mut() {
            if list.remove(id).is_some() {
                changed.push(TaskScope::Project(project));
            }
        }
        changed
    }

    /// Forget a project list once nothing displays it.
    pub fn release(&mut self, project: ProjectId) -> bool {
        self.projects.remove(&project).is_some()
    }

    pub fn is_loaded(&self, scope: TaskScope) -> bool {
        match scope {
            TaskScope::All => true,
            TaskScope::Project(id) => self.projects.contains_key(&id),
        }
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.all
            .get(id)
            .or_else(|| self.projects.values().find_map(|list| list.get(id)))
    }

    /// Snapshot of one list. Empty when the project list is not loaded.
    pub fn tasks(&self, scope: TaskScope) -> Vec<Task> {
        self.list(scope).map(Collection::to_vec).unwrap_or_default()
    }

    /// Snapshot of one list restricted to a status.
    pub fn filtered(&self, scope: TaskScope, status: TaskStatus) -> Vec<Task> {
        self.list(scope)
            .map(|list| list.iter().filter(|t| t.status == status).cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn list(&self, scope: TaskScope) -> Option<&Collection<Task>> {
        match scope {
            TaskScope::All => Some(&self.all),
            TaskScope::Project(id) => self.projects.get(&id),
        }
    }
}
