/* 📖 # Why apply envelopes to an ordered Vec?

Listings are small and displayed in the order the backend returned them. New
entities are appended; updates replace in place so a row does not jump around.
A linear scan by id is cheaper than keeping an index in sync for the sizes
involved.

A LiveSet can carry a scope predicate. The secret feed broadcasts every
project's secrets; a project view only keeps the ones the predicate accepts and
drops an entity that moves out of scope.
*/

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::envelope::{Change, ChangeEnvelope};
use crate::model::Entity;

/// What applying one envelope did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Replaced,
    Removed,
    Ignored,
}

type Scope<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A listing kept current by change envelopes.
#[derive(Clone)]
pub struct LiveSet<T: Entity> {
    items: Vec<T>,
    scope: Option<Scope<T>>,
}

impl<T: Entity> LiveSet<T> {
    pub fn new() -> Self {
        Self::from_snapshot(Vec::new())
    }

    pub fn from_snapshot(items: Vec<T>) -> Self {
        Self { items, scope: None }
    }

    /// Restrict the set to entities matching `scope`. Current items outside it are dropped.
    pub fn scoped(mut self, scope: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.items.retain(|item| scope(item));
        self.scope = Some(Arc::new(scope));
        self
    }

    fn in_scope(&self, item: &T) -> bool {
        self.scope.as_ref().is_none_or(|scope| scope(item))
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    /// Apply one envelope. Pings never change the set.
    pub fn apply(&mut self, envelope: &ChangeEnvelope<T>) -> Applied {
        let applied = match &envelope.change {
            Change::Ping => Applied::Ignored,
            Change::Create(item) | Change::Update(item) => self.upsert(item),
            Change::Delete(item) => match self.position(item.id()) {
                Some(index) => {
                    self.items.remove(index);
                    Applied::Removed
                }
                None => Applied::Ignored,
            },
        };
        debug!(kind = %envelope.change.kind(), ?applied, "applied change");
        applied
    }

    fn upsert(&mut self, item: &T) -> Applied {
        if item.has_ordered_timestamps() == Some(false) {
            warn!(id = item.id(), "entity was updated before it was created");
        }
        let position = self.position(item.id());
        if !self.in_scope(item) {
            return match position {
                Some(index) => {
                    self.items.remove(index);
                    Applied::Removed
                }
                None => Applied::Ignored,
            };
        }
        match position {
            Some(index) => {
                self.items[index] = item.clone();
                Applied::Replaced
            }
            None => {
                self.items.push(item.clone());
                Applied::Inserted
            }
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.position(id).map(|index| &self.items[index])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T: Entity> Default for LiveSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> fmt::Debug for LiveSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSet")
            .field("items", &self.items)
            .field("scoped", &self.scope.is_some())
            .finish()
    }
}

/// Shared access to a LiveSet from a feed thread and its readers.
#[derive(Debug)]
pub struct LiveSetHandle<T: Entity>(Arc<RwLock<LiveSet<T>>>);

impl<T: Entity> Clone for LiveSetHandle<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Entity> LiveSetHandle<T> {
    pub fn new(set: LiveSet<T>) -> Self {
        Self(Arc::new(RwLock::new(set)))
    }

    pub fn apply(&self, envelope: &ChangeEnvelope<T>) -> Applied {
        self.0.write().apply(envelope)
    }

    /// Copy of the current items.
    pub fn snapshot(&self) -> Vec<T> {
        self.0.read().items().to_vec()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.0.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }
}
