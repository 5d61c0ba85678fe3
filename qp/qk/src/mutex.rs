//! Priority-ceiling mutex
//!
//! Locking raises the scheduler ceiling so that no active object at or below
//! the mutex ceiling can preempt the holder. Nothing ever blocks: the holder
//! simply keeps running with preemption suppressed for that range.

use qp_qf::{QCtx, QSchedStatus};

pub struct QMutex {
    ceiling: u8,
}

impl QMutex {
    /// Mutex shared by active objects up to priority `ceiling`
    pub const fn new(ceiling: u8) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> u8 {
        self.ceiling
    }

    /// Raise the ceiling until the guard is dropped
    pub fn lock<'a>(&self, ctx: &'a QCtx) -> QMutexGuard<'a> {
        QMutexGuard {
            ctx,
            status: ctx.lock(self.ceiling),
        }
    }
}

/// Restores the previous ceiling when dropped
pub struct QMutexGuard<'a> {
    ctx: &'a QCtx,
    status: QSchedStatus,
}

impl QMutexGuard<'_> {
    pub fn status(&self) -> QSchedStatus {
        self.status
    }
}

impl Drop for QMutexGuard<'_> {
    fn drop(&mut self) {
        self.ctx.unlock(self.status);
    }
}
