//! Ordered, id-unique list of entities.

use std::collections::HashSet;

use taskboard_common::Entity;

/// Outcome of [`Collection::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert<T> {
    Inserted,
    Replaced(T),
}

/// A newest-first list in which every id appears at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection<T> {
    items: Vec<T>,
}

impl<T: Entity + Clone> Collection<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build from a fetched sequence, keeping fetch order. A repeated id keeps
    /// its first occurrence.
    pub fn from_fetch(items: impl IntoIterator<Item = T>) -> Self {
        let mut seen = HashSet::new();
        let items = items
            .into_iter()
            .filter(|item| seen.insert(item.id()))
            .collect();
        Self { items }
    }

    pub fn replace_all(&mut self, items: impl IntoIterator<Item = T>) {
        *self = Self::from_fetch(items);
    }

    /// Replace the entry with the same id in place, or prepend.
    pub fn upsert(&mut self, item: T) -> Upsert<T> {
        match self.position(item.id()) {
            Some(index) => Upsert::Replaced(std::mem::replace(&mut self.items[index], item)),
            None => {
                self.items.insert(0, item);
                Upsert::Inserted
            }
        }
    }

    pub fn remove(&mut self, id: i64) -> Option<T> {
        self.position(id).map(|index| self.items.remove(index))
    }

    pub fn get(&self, id: i64) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut T> {
        self.items.iter_mut().find(|item| item.id() == id)
    }

    pub fn position(&self, id: i64) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.position(id).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.clone()
    }
}

impl<T: Entity + Clone> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}
