//! Hierarchy probing helpers
//!
//! The hierarchy is never stored. A state's superstate is discovered by
//! sending it the reserved `EMPTY` event, to which every state answers
//! `Super(parent)` and the top state answers `Ignored`. Outermost user
//! states therefore name [`QHsm::top`] as their superstate.

use heapless::Vec;
use qp_core::{on_fatal_error, same_state, QEvt, QSignal, QStateHandler, QStateReturn};

use crate::{QHsm, MAX_NEST_DEPTH};

/// Bounded chain of states, innermost first
pub type QStatePath<T, C> = Vec<QStateHandler<T, C>, MAX_NEST_DEPTH>;

impl<T, C: ?Sized> QHsm<T, C> {
    /// Superstate of `s`, or `None` at the top of the hierarchy
    pub(crate) fn superstate(&self, me: &mut T, ctx: &C, s: QStateHandler<T, C>) -> Option<QStateHandler<T, C>> {
        match s(me, &QEvt::reserved(QSignal::EMPTY), ctx) {
            QStateReturn::Super(parent) => Some(parent),
            _ => None,
        }
    }

    /// Run the entry action of `s`. Entry actions cannot take transitions.
    pub(crate) fn enter(&self, me: &mut T, ctx: &C, s: QStateHandler<T, C>) {
        match s(me, &QEvt::reserved(QSignal::ENTRY), ctx) {
            QStateReturn::Transition(_) | QStateReturn::Initial(_) => on_fatal_error(module_path!(), 410),
            _ => {}
        }
    }

    /// Run the exit action of `s` and return its superstate
    pub(crate) fn exit(&self, me: &mut T, ctx: &C, s: QStateHandler<T, C>) -> Option<QStateHandler<T, C>> {
        match s(me, &QEvt::reserved(QSignal::EXIT), ctx) {
            QStateReturn::Super(parent) => Some(parent),
            QStateReturn::Transition(_) | QStateReturn::Initial(_) => on_fatal_error(module_path!(), 420),
            _ => self.superstate(me, ctx, s),
        }
    }

    /// Chain from `from` up to, but not including, `stop`.
    ///
    /// The flag tells whether `stop` was met; `false` means the walk reached
    /// the top state first. The top state itself is never part of a path.
    pub(crate) fn path_to(
        &self,
        me: &mut T,
        ctx: &C,
        from: QStateHandler<T, C>,
        stop: QStateHandler<T, C>,
    ) -> (QStatePath<T, C>, bool) {
        let mut path = QStatePath::new();
        let mut s = from;
        loop {
            if same_state(s, stop) {
                return (path, true);
            }
            let Some(parent) = self.superstate(me, ctx, s) else {
                return (path, false);
            };
            if path.push(s).is_err() {
                on_fatal_error(module_path!(), 400);
            }
            s = parent;
        }
    }

    /// Enter every state of `path`, outermost first
    pub(crate) fn enter_path(&self, me: &mut T, ctx: &C, path: &[QStateHandler<T, C>]) {
        for s in path.iter().rev() {
            self.enter(me, ctx, *s);
        }
    }
}
