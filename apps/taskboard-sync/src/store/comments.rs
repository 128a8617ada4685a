//! Comment threads, one per task that has its comments open.

use std::collections::HashMap;

use taskboard_common::{Comment, TaskId};

use super::collection::Collection;

#[derive(Debug, Clone, Default)]
pub struct CommentThreads {
    threads: HashMap<TaskId, Collection<Comment>>,
}

impl CommentThreads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, task: TaskId, comments: impl IntoIterator<Item = Comment>) {
        self.threads.insert(task, Collection::from_fetch(comments));
    }

    /// Prepend a comment, or replace it in place when the id is known. A
    /// self-posted comment and its pushed echo end up as one entry.
    pub fn insert(&mut self, task: TaskId, comment: Comment) {
        self.threads.entry(task).or_default().upsert(comment);
    }

    /// Remove by id. Returns false when the comment was not present.
    pub fn remove(&mut self, task: TaskId, comment: i64) -> bool {
        self.threads
            .get_mut(&task)
            .is_some_and(|thread| thread.remove(comment).is_some())
    }

    /// Forget a thread once nothing displays it.
    pub fn release(&mut self, task: TaskId) -> bool {
        self.threads.remove(&task).is_some()
    }

    pub fn comments(&self, task: TaskId) -> Vec<Comment> {
        self.threads
            .get(&task)
            .map(Collection::to_vec)
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.threads.clear();
    }
}
