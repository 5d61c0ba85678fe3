#![no_std]
#![forbid(unsafe_code)]

//! # QP Event Processor (QEP)
//!
//! Hierarchical state machine engine implementing UML statechart semantics:
//! - entry and exit actions, run in hierarchy order
//! - transitions through the least common ancestor of source and target
//! - nested initial transitions drilled down to a leaf
//! - self-transitions that always exit and re-enter
//!
//! A machine is the pair of a [`QHsm`] (which state is current) and the
//! extended state `T` the handlers operate on. The context `C` is handed to
//! every handler untouched; active objects use it to reach the framework.

use qp_core::{on_fatal_error, same_state, QEvt, QStateHandler, QStateReturn};

pub mod hsm;
pub mod transition;

pub use hsm::QStatePath;

/// Maximum number of nested states below the top state
pub const MAX_NEST_DEPTH: usize = 6;

/// Hierarchical state machine
pub struct QHsm<T, C: ?Sized> {
    /// Current leaf state while the machine is at rest
    state: QStateHandler<T, C>,
    /// Initial pseudostate before `init`, transition target afterwards
    temp: QStateHandler<T, C>,
}

impl<T, C: ?Sized> QHsm<T, C> {
    /// Create a machine whose top-most initial transition is `initial`
    pub const fn new(initial: QStateHandler<T, C>) -> Self {
        Self {
            state: Self::top,
            temp: initial,
        }
    }

    /// The top state. Ignores every event and has no superstate.
    pub fn top(_me: &mut T, _e: &QEvt, _ctx: &C) -> QStateReturn<T, C> {
        QStateReturn::Ignored
    }

    /// Current state
    pub fn state(&self) -> QStateHandler<T, C> {
        self.state
    }

    /// Take the top-most initial transition.
    ///
    /// The initial pseudostate receives `e` and must answer with the target
    /// state; every state from the top down to the target is entered and
    /// nested initial transitions are followed to a leaf.
    pub fn init(&mut self, me: &mut T, e: &QEvt, ctx: &C) {
        let target = match (self.temp)(me, e, ctx) {
            QStateReturn::Initial(target) | QStateReturn::Transition(target) => target,
            _ => on_fatal_error(module_path!(), 300),
        };
        let top = self.state;
        let (path, _) = self.path_to(me, ctx, target, top);
        self.enter_path(me, ctx, &path);
        let leaf = self.drill(me, ctx, target);
        self.state = leaf;
        self.temp = leaf;
    }

    /// Dispatch one event, running to completion.
    ///
    /// The event is offered to the current state and then to each superstate
    /// in turn until some state handles, ignores or transitions on it.
    pub fn dispatch(&mut self, me: &mut T, e: &QEvt, ctx: &C) -> QStateReturn<T, C> {
        let mut s = self.state;
        let mut hops = 0;
        let r = loop {
            match s(me, e, ctx) {
                QStateReturn::Super(parent) => {
                    hops += 1;
                    if hops > MAX_NEST_DEPTH {
                        on_fatal_error(module_path!(), 310);
                    }
                    s = parent;
                }
                r => break r,
            }
        };
        match r {
            QStateReturn::Transition(target) => {
                log::trace!("sig {} triggers transition", e.sig().0);
                self.transition(me, ctx, s, target);
            }
            QStateReturn::Initial(_) => on_fatal_error(module_path!(), 320),
            _ => {}
        }
        r
    }

    /// Check whether `state` is the current state or one of its superstates
    pub fn is_in(&self, me: &mut T, ctx: &C, state: QStateHandler<T, C>) -> bool {
        let mut s = Some(self.state);
        let mut hops = 0;
        while let Some(cur) = s {
            if same_state(cur, state) {
                return true;
            }
            if hops > MAX_NEST_DEPTH {
                on_fatal_error(module_path!(), 330);
            }
            hops += 1;
            s = self.superstate(me, ctx, cur);
        }
        false
    }
}
