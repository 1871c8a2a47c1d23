//! Small-Object Pool
//!
//! Keeps objects too small to be worth paging permanently in memory.

use std::collections::HashMap;

use crate::object::ObjectId;

/// Admission decision for one object, made once at first load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Admission {
    #[default]
    Undecided,
    /// Pinned in memory with this size charged to the pool
    Resident(u64),
    /// Left to the MRU / write buffer
    Paged,
}

/// Bypass pool for small objects
///
/// An object is admitted when its size is within the per-object threshold
/// (`budget / expected_objects`) and the running total stays within budget.
/// Admitted objects are never evicted or written by the cache.
pub struct SmallObjectPool {
    /// Decisions for ids below the pre-sized table length
    table: Vec<Admission>,

    /// Decisions for ids outside the table
    overflow: HashMap<ObjectId, Admission>,

    used: u64,
    budget: u64,
    expected_objects: usize,
}

impl SmallObjectPool {
    pub fn new(budget: u64, expected_objects: usize) -> Self {
        let mut pool = Self {
            table: Vec::new(),
            overflow: HashMap::new(),
            used: 0,
            budget,
            expected_objects: 0,
        };
        pool.set_number_of_objects(expected_objects);
        pool
    }

    /// Pre-size the decision table for ids `0..count`
    ///
    /// Existing decisions are kept.
    pub fn set_number_of_objects(&mut self, count: usize) {
        self.expected_objects = count;
        if count > self.table.len() {
            self.table.resize(count, Admission::Undecided);

            let moved: Vec<ObjectId> = self
                .overflow
                .keys()
                .copied()
                .filter(|&id| (id as usize) < count)
                .collect();
            for id in moved {
                if let Some(decision) = self.overflow.remove(&id) {
                    self.table[id as usize] = decision;
                }
            }
        }
    }

    /// Decide whether `id` stays in memory permanently
    ///
    /// The first call for an id makes the decision (charging `size` if
    /// admitted); later calls repeat it. With a zero budget nothing new is
    /// admitted and no decision is recorded.
    pub fn should_stay_in_memory(&mut self, id: ObjectId, size: u64) -> bool {
        match self.decision(id) {
            Admission::Resident(_) => return true,
            Admission::Paged => return false,
            Admission::Undecided => {}
        }
        if self.budget == 0 {
            return false;
        }

        let admit = size <= self.threshold() && self.used + size <= self.budget;
        let decision = if admit {
            self.used += size;
            Admission::Resident(size)
        } else {
            Admission::Paged
        };
        self.set_decision(id, decision);
        admit
    }

    /// Whether `id` has been admitted
    pub fn is_resident(&self, id: ObjectId) -> bool {
        matches!(self.decision(id), Admission::Resident(_))
    }

    /// Forget an object (it was deleted), returning the size released
    pub fn release(&mut self, id: ObjectId) -> Option<u64> {
        let decision = self.decision(id);
        self.set_decision(id, Admission::Undecided);
        match decision {
            Admission::Resident(size) => {
                self.used -= size;
                Some(size)
            }
            _ => None,
        }
    }

    /// Largest object size the pool will admit
    pub fn threshold(&self) -> u64 {
        match self.expected_objects {
            0 => self.budget,
            n => self.budget / n as u64,
        }
    }

    pub fn set_budget(&mut self, budget: u64) {
        self.budget = budget;
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    fn decision(&self, id: ObjectId) -> Admission {
        match usize::try_from(id).ok().and_then(|i| self.table.get(i)) {
            Some(&decision) => decision,
            None => self.overflow.get(&id).copied().unwrap_or_default(),
        }
    }

    fn set_decision(&mut self, id: ObjectId, decision: Admission) {
        if let Some(slot) = usize::try_from(id).ok().and_then(|i| self.table.get_mut(i)) {
            *slot = decision;
        } else if decision == Admission::Undecided {
            self.overflow.remove(&id);
        } else {
            self.overflow.insert(id, decision);
        }
    }
}
