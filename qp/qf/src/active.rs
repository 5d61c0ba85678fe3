//! Active object trait, state-machine adapter and the framework service trait

use core::fmt;

use qp_core::{QEvt, QSignal, QStateHandler, QStateReturn};
use qp_qep::QHsm;

use crate::{QTimeEvt, QF};

/// Framework context as seen from inside an active object
pub type QCtx = dyn QContext + 'static;

/// State handler of an active object with extended state `T`
pub type QActiveHandler<T> = QStateHandler<T, QCtx>;

/// Return value of an active-object state handler
pub type QActiveReturn<T> = QStateReturn<T, QCtx>;

/// Scheduler lock status returned by [`QContext::lock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QSchedStatus {
    /// The ceiling was raised; unlocking restores `prev`
    Locked { prev: u8, holder: u8 },
    /// The ceiling was already at or above the request
    Unlocked,
}

impl QSchedStatus {
    pub fn is_locked(self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}

impl fmt::Display for QSchedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked { prev, holder } => write!(f, "Locked(prev={}, holder={})", prev, holder),
            Self::Unlocked => write!(f, "Unlocked"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QSchedStatus {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Locked { prev, holder } => defmt::write!(fmt, "Locked(prev={}, holder={})", prev, holder),
            Self::Unlocked => defmt::write!(fmt, "Unlocked"),
        }
    }
}

/// Framework services available to active objects and application code.
///
/// Everything except delivery and locking is answered by the [`QF`] registry
/// returned from [`QContext::framework`]. A kernel overrides the delivery
/// methods to run its scheduler after the event is queued.
pub trait QContext {
    /// Registry backing this context
    fn framework(&self) -> &QF;

    /// Post `e` to the active object at `prio`. Overflow is fatal.
    fn post(&self, prio: u8, e: QEvt) {
        self.framework().post(prio, e, None);
    }

    /// Post `e` keeping at least `margin` free slots; `false` if refused
    fn try_post(&self, prio: u8, e: QEvt, margin: u16) -> bool {
        self.framework().post(prio, e, Some(margin))
    }

    /// Post `e` to the front of the mailbox at `prio`
    fn post_lifo(&self, prio: u8, e: QEvt) {
        self.framework().post_lifo(prio, e);
    }

    /// Deliver `e` to every subscriber of its signal
    fn publish(&self, e: QEvt) {
        self.framework().publish(e);
    }

    /// Allocate a pooled event. Exhaustion is fatal.
    fn new_evt(&self, sig: QSignal, payload: &[u8]) -> QEvt {
        self.framework().new_evt(sig, payload)
    }

    /// Allocate a pooled event keeping `margin` blocks in reserve
    fn try_new_evt(&self, sig: QSignal, payload: &[u8], margin: u16) -> Option<QEvt> {
        self.framework().try_new_evt(sig, payload, margin)
    }

    fn subscribe(&self, prio: u8, sig: QSignal) {
        self.framework().subscribe(prio, sig);
    }

    fn unsubscribe(&self, prio: u8, sig: QSignal) {
        self.framework().unsubscribe(prio, sig);
    }

    fn unsubscribe_all(&self, prio: u8) {
        self.framework().unsubscribe_all(prio);
    }

    /// Arm `te` to fire after `n_ticks`, then every `interval` ticks (0 = once)
    fn arm(&self, te: &'static QTimeEvt, n_ticks: u32, interval: u32) {
        self.framework().arm(te, n_ticks, interval);
    }

    /// Disarm `te`; `true` if it was still armed
    fn disarm(&self, te: &'static QTimeEvt) -> bool {
        self.framework().disarm(te)
    }

    /// Restart the countdown of `te`; `true` if it was armed
    fn rearm(&self, te: &'static QTimeEvt, n_ticks: u32) -> bool {
        self.framework().rearm(te, n_ticks)
    }

    /// Raise the scheduler ceiling to `ceiling`
    fn lock(&self, _ceiling: u8) -> QSchedStatus {
        QSchedStatus::Unlocked
    }

    /// Restore the ceiling saved by [`QContext::lock`]
    fn unlock(&self, _status: QSchedStatus) {}
}

/// Object that processes events to completion at a fixed priority
pub trait QActive: Send {
    /// Take the top-most initial transition
    fn init(&mut self, prio: u8, ctx: &QCtx);

    /// Process one event to completion
    fn dispatch(&mut self, e: &QEvt, ctx: &QCtx);
}

/// Active object backed by a hierarchical state machine over `T`
pub struct QActiveHsm<T> {
    hsm: QHsm<T, QCtx>,
    me: T,
    prio: u8,
}

impl<T: Send> QActiveHsm<T> {
    /// Create an active object whose top-most initial transition is `initial`
    pub const fn new(me: T, initial: QActiveHandler<T>) -> Self {
        Self {
            hsm: QHsm::new(initial),
            me,
            prio: 0,
        }
    }

    /// Priority assigned at start, 0 before
    pub fn prio(&self) -> u8 {
        self.prio
    }

    /// Current leaf state
    pub fn state(&self) -> QActiveHandler<T> {
        self.hsm.state()
    }

    pub fn is_in(&mut self, ctx: &QCtx, state: QActiveHandler<T>) -> bool {
        self.hsm.is_in(&mut self.me, ctx, state)
    }

    /// Extended state
    pub fn inner(&self) -> &T {
        &self.me
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.me
    }
}

impl<T: Send> QActive for QActiveHsm<T> {
    fn init(&mut self, prio: u8, ctx: &QCtx) {
        self.prio = prio;
        self.hsm.init(&mut self.me, &QEvt::reserved(QSignal::INIT), ctx);
    }

    fn dispatch(&mut self, e: &QEvt, ctx: &QCtx) {
        log::trace!("prio {} dispatch sig {}", self.prio, e.sig().0);
        self.hsm.dispatch(&mut self.me, e, ctx);
    }
}
