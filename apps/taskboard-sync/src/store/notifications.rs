//! The notification feed and its unread counter.

use taskboard_common::Notification;

use super::collection::{Collection, Upsert};

/// Newest-first notifications plus the unread count shown in the UI.
///
/// The count has two producers: pushed inserts and read marks adjust it
/// incrementally, while polling overwrites it. It never goes below zero.
#[derive(Debug, Clone, Default)]
pub struct NotificationFeed {
    items: Collection<Notification>,
    unread: u64,
}

impl NotificationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a pushed notification.
    ///
    /// A new id is prepended and counts if unread. A known id is replaced in
    /// place and the count follows the change in read state.
    pub fn insert(&mut self, notification: Notification) {
        let unread = !notification.is_read;
        match self.items.upsert(notification) {
            Upsert::Inserted => {
                if unread {
                    self.unread += 1;
                }
            }
            Upsert::Replaced(previous) => match (!previous.is_read, unread) {
                (false, true) => self.unread += 1,
                (true, false) => self.unread = self.unread.saturating_sub(1),
                _ => {}
            },
        }
    }

    /// Mark one notification read. Returns false when the id is unknown or
    /// already read; nothing changes then.
    pub fn mark_read(&mut self, id: i64) -> bool {
        match self.items.get_mut(id) {
            Some(n) if !n.is_read => {
                n.is_read = true;
                self.unread = self.unread.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    pub fn mark_all_read(&mut self) {
        for n in self.items.iter_mut() {
            n.is_read = true;
        }
        self.unread = 0;
    }

    /// Replace the list with a fetched one. The count is left to its own
    /// fetch.
    pub fn replace_all(&mut self, notifications: impl IntoIterator<Item = Notification>) {
        self.items.replace_all(notifications);
    }

    /// Overwrite the count with a server value. Last write wins.
    pub fn set_unread_count(&mut self, count: u64) {
        self.unread = count;
    }

    /// Derive the count from the loaded list.
    pub fn recompute_unread(&mut self) -> u64 {
        self.unread = self.items.iter().filter(|n| !n.is_read).count() as u64;
        self.unread
    }

    pub fn unread_count(&self) -> u64 {
        self.unread
    }

    pub fn get(&self, id: i64) -> Option<&Notification> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Notification> {
        self.items.to_vec()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
