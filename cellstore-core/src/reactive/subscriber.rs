//! Subscriber types for the reactive system.
//!
//! A subscriber is a callback attached to one field of a store. It is called
//! once per committed batch that changed the field (base) or may have
//! changed it (derived).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::graph::FieldId;

/// Notification callback.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Unique identifier for a subscriber.
///
/// Each subscription gets a unique ID when created. This ID is used to
/// remove exactly that subscription later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Callbacks of one store, grouped by field.
#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    by_field: HashMap<FieldId, Vec<(SubscriberId, Callback)>>,
}

impl SubscriberRegistry {
    pub(crate) fn insert(&mut self, field: FieldId, callback: Callback) -> SubscriberId {
        let id = SubscriberId::new();
        self.by_field.entry(field).or_default().push((id, callback));
        id
    }

    pub(crate) fn remove(&mut self, field: FieldId, id: SubscriberId) -> bool {
        let Some(subscribers) = self.by_field.get_mut(&field) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        let removed = subscribers.len() != before;
        if subscribers.is_empty() {
            self.by_field.remove(&field);
        }
        removed
    }

    pub(crate) fn count(&self, field: FieldId) -> usize {
        self.by_field.get(&field).map_or(0, Vec::len)
    }

    /// Callbacks for `fields`, in field order then subscription order.
    pub(crate) fn callbacks_for(&self, fields: &[FieldId]) -> Vec<Callback> {
        fields
            .iter()
            .filter_map(|field| self.by_field.get(field))
            .flat_map(|subscribers| subscribers.iter().map(|(_, cb)| Arc::clone(cb)))
            .collect()
    }
}

/// Handle to a registered callback.
///
/// Dropping this handle unsubscribes the callback.
#[must_use = "dropping a Subscription unsubscribes it immediately"]
pub struct Subscription {
    id: SubscriberId,
    field: FieldId,
    registry: Weak<RwLock<SubscriberRegistry>>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriberId,
        field: FieldId,
        registry: &Arc<RwLock<SubscriberRegistry>>,
    ) -> Self {
        Self {
            id,
            field,
            registry: Arc::downgrade(registry),
        }
    }

    /// Get the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// The field this subscription listens to.
    pub fn field(&self) -> FieldId {
        self.field
    }

    /// Stop receiving notifications.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.write().remove(self.field, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("field", &self.field)
            .finish()
    }
}
