//! Scheduler attributes and activation decisions
//!
//! [`QkAttr`] is the state a scheduling pass reads and writes inside its
//! critical section. The ready-set itself belongs to the framework registry
//! and is passed in by the caller.

use qp_core::QPSet;
use qp_qf::{QSchedStatus, QF_MAX_ACTIVE};

/// Ceiling that blocks every active object
pub(crate) const CEILING_ALL: u8 = QF_MAX_ACTIVE as u8 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QkAttr {
    /// Priority of the active object running now, 0 when idle
    pub curr: u8,
    /// Priority chosen by the last scheduling decision, 0 when none
    pub next: u8,
    /// Nothing at or below this priority may be scheduled
    pub lock_ceiling: u8,
    /// Priority that raised the current ceiling
    pub lock_holder: u8,
    /// Interrupt nesting depth
    pub int_nest: u8,
}

impl QkAttr {
    pub const fn new() -> Self {
        Self {
            curr: 0,
            next: 0,
            lock_ceiling: CEILING_ALL,
            lock_holder: 0,
            int_nest: 0,
        }
    }

    /// Highest ready priority above both `floor` and the lock ceiling
    pub fn candidate(&self, ready: QPSet, floor: u8) -> Option<u8> {
        ready
            .find_max()
            .filter(|&p| p > floor && p > self.lock_ceiling)
    }

    /// Scheduling decision at a preemption point. Records the winner as
    /// `next` and returns it with the priority to resume afterwards.
    pub fn plan_activation(&mut self, ready: QPSet) -> Option<(u8, u8)> {
        match self.candidate(ready, self.curr) {
            Some(p) => {
                self.next = p;
                Some((p, self.curr))
            }
            None => {
                self.next = 0;
                None
            }
        }
    }

    pub fn commit_activation(&mut self, p: u8) {
        self.curr = p;
        self.next = 0;
    }

    /// Decision after a dispatch step started from priority `pin`. Without
    /// a candidate the preempted priority is resumed.
    pub fn next_after_dispatch(&mut self, ready: QPSet, pin: u8) -> Option<u8> {
        let next = self.candidate(ready, pin);
        match next {
            Some(p) => self.next = p,
            None => {
                self.curr = pin;
                self.next = 0;
            }
        }
        next
    }

    pub fn lock(&mut self, ceiling: u8) -> QSchedStatus {
        if ceiling > self.lock_ceiling {
            let status = QSchedStatus::Locked {
                prev: self.lock_ceiling,
                holder: self.lock_holder,
            };
            self.lock_ceiling = ceiling;
            self.lock_holder = self.curr;
            status
        } else {
            QSchedStatus::Unlocked
        }
    }

    /// Restore the ceiling saved in `status`. `false` if the current ceiling
    /// is not above the saved one, which means unbalanced locking.
    pub fn unlock(&mut self, status: QSchedStatus) -> bool {
        match status {
            QSchedStatus::Locked { prev, holder } => {
                if self.lock_ceiling <= prev {
                    return false;
                }
                self.lock_ceiling = prev;
                self.lock_holder = holder;
                true
            }
            QSchedStatus::Unlocked => true,
        }
    }
}
