//! MRU Registry
//!
//! Recency list of resident objects with a memory budget.

use lru::LruCache;
use tracing::debug;

use crate::object::{ObjectId, ObjectRef};

/// A resident object and the footprint charged for it
struct Resident {
    object: ObjectRef,
    footprint: u64,
}

/// Resident objects ordered by recency, indexed by id
///
/// `touch` is O(1) for objects already present. Eviction always takes the
/// least-recently-used end and never the object just touched, so a single
/// object larger than the whole budget is accepted as the sole resident.
pub struct MruList {
    /// Front = most recent, back = least recent
    entries: LruCache<ObjectId, Resident>,

    /// Sum of resident footprints
    used: u64,

    /// Memory budget (soft target)
    budget: u64,
}

impl MruList {
    /// Create an empty list with the given budget
    pub fn new(budget: u64) -> Self {
        Self {
            entries: LruCache::unbounded(),
            used: 0,
            budget,
        }
    }

    /// Record a use of `object`, making it the most recent
    ///
    /// A new object is charged its `memory_size()`; a present one has its
    /// footprint refreshed. Returns the objects evicted to get back within
    /// budget, least recent first.
    pub fn touch(&mut self, object: &ObjectRef) -> Vec<ObjectRef> {
        let id = object.id();
        let footprint = object.memory_size();

        match self.entries.get_mut(&id) {
            Some(resident) => {
                self.used = self.used - resident.footprint + footprint;
                resident.footprint = footprint;
            }
            None => {
                self.entries.push(
                    id,
                    Resident {
                        object: object.clone(),
                        footprint,
                    },
                );
                self.used += footprint;
            }
        }

        self.evict_over_budget()
    }

    /// Stop tracking an object, returning it if it was resident
    pub fn remove(&mut self, id: ObjectId) -> Option<ObjectRef> {
        let resident = self.entries.pop(&id)?;
        self.used -= resident.footprint;
        Some(resident.object)
    }

    /// Put back a victim that could not leave memory, as least recent
    ///
    /// Nothing is evicted, so the list may stay over budget until the next
    /// `touch` retries the victim first.
    pub fn reinstate(&mut self, object: ObjectRef) {
        let id = object.id();
        let footprint = object.memory_size();
        if let Some(previous) = self.entries.push(id, Resident { object, footprint }) {
            self.used -= previous.1.footprint;
        }
        self.entries.demote(&id);
        self.used += footprint;
    }

    /// Change the budget, evicting as needed
    pub fn set_budget(&mut self, budget: u64) -> Vec<ObjectRef> {
        self.budget = budget;
        self.evict_over_budget()
    }

    /// Evict everything, least recent first
    pub fn clear(&mut self) -> Vec<ObjectRef> {
        let mut victims = Vec::with_capacity(self.entries.len());
        while let Some((_, resident)) = self.entries.pop_lru() {
            victims.push(resident.object);
        }
        self.used = 0;
        victims
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains(&id)
    }

    /// Resident ids, most recent first
    pub fn ids(&self) -> Vec<ObjectId> {
        self.entries.iter().map(|(&id, _)| id).collect()
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_over_budget(&mut self) -> Vec<ObjectRef> {
        let mut victims = Vec::new();

        while self.used > self.budget && self.entries.len() > 1 {
            let Some((id, resident)) = self.entries.pop_lru() else {
                break;
            };
            self.used -= resident.footprint;
            debug!(id, footprint = resident.footprint, used = self.used, "Evicted from MRU");
            victims.push(resident.object);
        }

        victims
    }
}
