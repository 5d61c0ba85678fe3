#![no_std]
#![forbid(unsafe_code)]

//! QK - Preemptive Priority-Based Kernel
//!
//! QK runs every active object to completion on a single stack. After each
//! post made outside interrupt context, and when the outermost interrupt
//! returns, a scheduling pass picks the highest ready priority above both
//! the running priority and the lock ceiling, and dispatches its events
//! until nothing higher than the preempted priority is left.
//!
//! Key features:
//! - Preemptive priority-based scheduling without per-object stacks
//! - Interrupt nesting with scheduling deferred to the outermost exit
//! - Priority-ceiling locking ([`QMutex`]) instead of blocking mutexes
//! - Deterministic scheduling decisions through the O(1) ready-set

use core::cell::RefCell;

use critical_section::Mutex;
use qp_core::{on_fatal_error, q_require, QEvt};
use qp_qf::{QActive, QContext, QEventQueue, QSchedStatus, QF};

pub mod config;
pub mod mutex;
mod scheduler;

pub use config::*;
pub use mutex::*;

use scheduler::{QkAttr, CEILING_ALL};

/// The QK preemptive kernel
///
/// Construct it once before interrupts are enabled and hand it out by shared
/// reference; active objects reach it as their [`QContext`].
pub struct QK {
    qf: QF,
    attr: Mutex<RefCell<QkAttr>>,
    config: QKConfig,
}

impl QK {
    /// Create a kernel. Scheduling stays locked until
    /// [`QK::start_scheduler`] or [`QK::run`].
    pub const fn new(config: QKConfig) -> Self {
        Self {
            qf: QF::new(config.qf),
            attr: Mutex::new(RefCell::new(QkAttr::new())),
            config,
        }
    }

    /// Framework registry
    pub fn qf(&self) -> &QF {
        &self.qf
    }

    pub fn config(&self) -> &QKConfig {
        &self.config
    }

    /// Start `ao` at `prio` with mailbox `queue`, running its top-most
    /// initial transition with preemption up to `prio` suppressed.
    pub fn start(&self, prio: u8, ao: &'static mut dyn QActive, queue: &'static dyn QEventQueue) {
        let status = self.lock(prio);
        self.qf.start_with(self, prio, ao, queue);
        self.unlock(status);
    }

    /// Stop the active object at `prio`
    pub fn stop(&self, prio: u8) {
        self.qf.stop(prio);
    }

    /// Call `on_startup`, release the start-up lock and run the first
    /// scheduling pass
    pub fn start_scheduler(&self) {
        (self.config.on_startup)();
        critical_section::with(|cs| {
            let mut attr = self.attr.borrow_ref_mut(cs);
            attr.lock_ceiling = 0;
            attr.lock_holder = 0;
        });
        log::debug!("scheduler started");
        self.sched();
    }

    /// Start scheduling and loop on `on_idle` forever
    pub fn run(&self) -> ! {
        self.start_scheduler();
        loop {
            (self.config.on_idle)();
        }
    }

    /// Block scheduling again and call `on_cleanup`
    pub fn shutdown(&self) {
        critical_section::with(|cs| self.attr.borrow_ref_mut(cs).lock_ceiling = CEILING_ALL);
        (self.config.on_cleanup)();
    }

    /// Priority of the running active object, 0 when idle
    pub fn curr(&self) -> u8 {
        critical_section::with(|cs| self.attr.borrow_ref(cs).curr)
    }

    pub fn lock_ceiling(&self) -> u8 {
        critical_section::with(|cs| self.attr.borrow_ref(cs).lock_ceiling)
    }

    pub fn lock_holder(&self) -> u8 {
        critical_section::with(|cs| self.attr.borrow_ref(cs).lock_holder)
    }

    pub fn int_nest(&self) -> u8 {
        critical_section::with(|cs| self.attr.borrow_ref(cs).int_nest)
    }

    pub fn is_in_isr(&self) -> bool {
        self.int_nest() > 0
    }

    /// Scheduling pass. Does nothing in interrupt context or when nothing
    /// above the running priority and the ceiling is ready.
    pub fn sched(&self) {
        let plan = critical_section::with(|cs| {
            let mut attr = self.attr.borrow_ref_mut(cs);
            if attr.int_nest > 0 {
                return None;
            }
            let ready = self.qf.ready_set_in(cs);
            attr.plan_activation(ready)
        });
        if let Some((p, pin)) = plan {
            self.activate(p, pin);
        }
    }

    /// Dispatch starting at `p` until nothing above `pin` is ready
    fn activate(&self, mut p: u8, pin: u8) {
        loop {
            critical_section::with(|cs| self.attr.borrow_ref_mut(cs).commit_activation(p));
            log::trace!("activate prio {} over {}", p, pin);
            if !self.qf.dispatch(p, self) {
                on_fatal_error(module_path!(), 1100);
            }
            let next = critical_section::with(|cs| {
                let ready = self.qf.ready_set_in(cs);
                self.attr.borrow_ref_mut(cs).next_after_dispatch(ready, pin)
            });
            match next {
                Some(n) => p = n,
                None => break,
            }
        }
    }

    /// Post `e` to `prio`; overflow is fatal
    pub fn post(&self, prio: u8, e: QEvt) {
        self.qf.post(prio, e, None);
        self.sched();
    }

    /// Post `e` to `prio` keeping at least `margin` free slots
    pub fn try_post(&self, prio: u8, e: QEvt, margin: u16) -> bool {
        let posted = self.qf.post(prio, e, Some(margin));
        if posted {
            self.sched();
        }
        posted
    }

    pub fn post_lifo(&self, prio: u8, e: QEvt) {
        self.qf.post_lifo(prio, e);
        self.sched();
    }

    /// Publish `e`. All subscribers are queued before any of them runs.
    pub fn publish(&self, e: QEvt) {
        self.qf.publish(e);
        self.sched();
    }

    /// Process one tick of `rate`
    pub fn tick(&self, rate: u8) {
        self.qf.tick(rate);
        self.sched();
    }

    /// Raise the lock ceiling to `ceiling`. Locking from an interrupt is
    /// fatal.
    pub fn lock(&self, ceiling: u8) -> QSchedStatus {
        let status = critical_section::with(|cs| {
            let mut attr = self.attr.borrow_ref_mut(cs);
            if attr.int_nest > 0 {
                return None;
            }
            Some(attr.lock(ceiling))
        });
        match status {
            Some(status) => {
                if status.is_locked() {
                    log::debug!("scheduler locked at {}", ceiling);
                }
                status
            }
            None => on_fatal_error(module_path!(), 1200),
        }
    }

    /// Restore the ceiling saved by [`QK::lock`] and run any scheduling
    /// that was held back
    pub fn unlock(&self, status: QSchedStatus) {
        if !status.is_locked() {
            return;
        }
        let balanced = critical_section::with(|cs| {
            let mut attr = self.attr.borrow_ref_mut(cs);
            attr.int_nest == 0 && attr.unlock(status)
        });
        q_require!(balanced, 1210);
        log::debug!("scheduler unlocked: {}", status);
        self.sched();
    }

    /// Interrupt entry
    pub fn isr_enter(&self) {
        let ok = critical_section::with(|cs| {
            let mut attr = self.attr.borrow_ref_mut(cs);
            match attr.int_nest.checked_add(1) {
                Some(n) => {
                    attr.int_nest = n;
                    true
                }
                None => false,
            }
        });
        q_require!(ok, 1300);
    }

    /// Interrupt exit. Leaving the outermost interrupt runs the scheduler.
    pub fn isr_exit(&self) {
        let nest = critical_section::with(|cs| {
            let mut attr = self.attr.borrow_ref_mut(cs);
            let nest = attr.int_nest.checked_sub(1)?;
            attr.int_nest = nest;
            Some(nest)
        });
        match nest {
            Some(0) => self.sched(),
            Some(_) => {}
            None => on_fatal_error(module_path!(), 1310),
        }
    }

    /// Run `f` as an interrupt handler body
    pub fn isr<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.isr_enter();
        let r = f(self);
        self.isr_exit();
        r
    }
}

impl QContext for QK {
    fn framework(&self) -> &QF {
        &self.qf
    }

    fn post(&self, prio: u8, e: QEvt) {
        QK::post(self, prio, e);
    }

    fn try_post(&self, prio: u8, e: QEvt, margin: u16) -> bool {
        QK::try_post(self, prio, e, margin)
    }

    fn post_lifo(&self, prio: u8, e: QEvt) {
        QK::post_lifo(self, prio, e);
    }

    fn publish(&self, e: QEvt) {
        QK::publish(self, e);
    }

    fn lock(&self, ceiling: u8) -> QSchedStatus {
        QK::lock(self, ceiling)
    }

    fn unlock(&self, status: QSchedStatus) {
        QK::unlock(self, status);
    }
}
