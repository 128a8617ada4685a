//! Subscription registry and the handles that own subscriptions.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use super::channel::ChannelInner;
use super::events::InboundEvent;
use super::topic::Topic;

/// Callback invoked once per inbound message on a subscription.
pub type Handler = Box<dyn Fn(InboundEvent) + Send + Sync>;

/// One live interest in a topic.
pub struct SubscriptionEntry {
    id: String,
    topic: Topic,
    handler: Handler,
    active: AtomicBool,
}

impl SubscriptionEntry {
    pub fn new(id: String, topic: Topic, handler: Handler) -> Self {
        Self {
            id,
            topic,
            handler,
            active: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop delivery. Returns whether the entry was still active.
    pub fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    /// Invoke the handler unless the entry has been deactivated.
    pub fn deliver(&self, event: InboundEvent) -> bool {
        if !self.is_active() {
            return false;
        }
        (self.handler)(event);
        true
    }
}

/// Registry of the connection's subscriptions, keyed by subscription id.
///
/// Holds only weak references: the requester owns the entry through its
/// [`SubscriptionHandle`], so a dropped handle can never be invoked.
pub struct SubscriptionRegistry {
    entries: DashMap<String, Weak<SubscriptionEntry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn insert(&self, entry: &Arc<SubscriptionEntry>) {
        self.entries
            .insert(entry.id().to_string(), Arc::downgrade(entry));
    }

    /// Look up a live, active entry. Dead entries found on the way are pruned.
    pub fn get(&self, id: &str) -> Option<Arc<SubscriptionEntry>> {
        let entry = self.entries.get(id).and_then(|weak| weak.upgrade());
        match entry {
            Some(entry) if entry.is_active() => Some(entry),
            _ => {
                self.entries.remove(id);
                None
            }
        }
    }

    pub fn remove(&self, id: &str) {
        self.entries.remove(id);
    }

    /// Deactivate and forget every subscription.
    pub fn clear(&self) -> usize {
        let mut cleared = 0;
        self.entries.retain(|_, weak| {
            if let Some(entry) = weak.upgrade() {
                if entry.deactivate() {
                    cleared += 1;
                }
            }
            false
        });
        cleared
    }

    /// Topics with at least one live subscription.
    pub fn topics(&self) -> Vec<Topic> {
        let topics: HashSet<Topic> = self
            .entries
            .iter()
            .filter_map(|e| e.value().upgrade())
            .filter(|e| e.is_active())
            .map(|e| e.topic())
            .collect();
        topics.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner of one subscription.
///
/// Releasing is idempotent and also happens on drop. A handle returned while
/// the channel was not connected is inert: it was never registered and
/// releasing it does nothing.
pub struct SubscriptionHandle {
    topic: Topic,
    entry: Option<Arc<SubscriptionEntry>>,
    channel: Weak<ChannelInner>,
}

impl SubscriptionHandle {
    pub(crate) fn live(entry: Arc<SubscriptionEntry>, channel: Weak<ChannelInner>) -> Self {
        Self {
            topic: entry.topic(),
            entry: Some(entry),
            channel,
        }
    }

    pub fn inert(topic: Topic) -> Self {
        Self {
            topic,
            entry: None,
            channel: Weak::new(),
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// The subscription id sent to the server, if this handle was registered.
    pub fn id(&self) -> Option<&str> {
        self.entry.as_ref().map(|e| e.id())
    }

    pub fn is_active(&self) -> bool {
        self.entry.as_ref().is_some_and(|e| e.is_active())
    }

    pub fn release(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        if entry.deactivate() {
            if let Some(channel) = self.channel.upgrade() {
                channel.unsubscribe(entry.id());
            }
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("topic", &self.topic)
            .field("id", &self.id())
            .field("active", &self.is_active())
            .finish()
    }
}
