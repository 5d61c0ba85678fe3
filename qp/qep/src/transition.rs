//! Transition execution
//!
//! A transition taken by state `source` (the current state or one of its
//! superstates) runs in three phases:
//! 1. exit from the current state up to `source`;
//! 2. exit from `source` up to the least common ancestor (LCA) of source and
//!    target, then enter from the LCA down to the target;
//! 3. follow initial transitions from the target down to a leaf.

use qp_core::{on_fatal_error, same_state, QEvt, QSignal, QStateHandler, QStateReturn};

use crate::{QHsm, QStatePath, MAX_NEST_DEPTH};

impl<T, C: ?Sized> QHsm<T, C> {
    pub(crate) fn transition(
        &mut self,
        me: &mut T,
        ctx: &C,
        source: QStateHandler<T, C>,
        target: QStateHandler<T, C>,
    ) {
        self.temp = target;

        let mut s = self.state;
        let mut hops = 0;
        while !same_state(s, source) {
            s = match self.exit(me, ctx, s) {
                Some(parent) if hops < MAX_NEST_DEPTH => parent,
                _ => on_fatal_error(module_path!(), 500),
            };
            hops += 1;
        }

        if same_state(source, target) {
            // self-transition: always exit and re-enter
            self.exit(me, ctx, source);
            self.enter(me, ctx, target);
        } else {
            let (chain, _) = self.path_to(me, ctx, target, Self::top);
            let entry = self.exit_to_lca(me, ctx, source, &chain);
            self.enter_path(me, ctx, &chain[..entry]);
        }

        let leaf = self.drill(me, ctx, target);
        self.state = leaf;
        self.temp = leaf;
    }

    /// Exit from `source` until reaching a state on the target `chain`.
    ///
    /// Returns how many states of `chain` (innermost first) still need
    /// entering. Reaching the top means the whole chain is entered.
    fn exit_to_lca(
        &self,
        me: &mut T,
        ctx: &C,
        source: QStateHandler<T, C>,
        chain: &QStatePath<T, C>,
    ) -> usize {
        let position = |s: QStateHandler<T, C>| chain.iter().position(|c| same_state(*c, s));

        // source encloses the target: nothing to exit
        if let Some(k) = position(source) {
            return k;
        }
        let mut candidate = self.exit(me, ctx, source);
        let mut hops = 0;
        loop {
            let s = match candidate {
                Some(s) if !same_state(s, Self::top) => s,
                _ => return chain.len(),
            };
            if let Some(k) = position(s) {
                return k;
            }
            hops += 1;
            if hops > MAX_NEST_DEPTH {
                on_fatal_error(module_path!(), 510);
            }
            candidate = self.exit(me, ctx, s);
        }
    }

    /// Follow initial transitions starting at `state` and return the leaf
    pub(crate) fn drill(&mut self, me: &mut T, ctx: &C, state: QStateHandler<T, C>) -> QStateHandler<T, C> {
        let init = QEvt::reserved(QSignal::INIT);
        let mut t = state;
        loop {
            match t(me, &init, ctx) {
                QStateReturn::Initial(sub) => {
                    self.temp = sub;
                    let (path, reached) = self.path_to(me, ctx, sub, t);
                    if !reached || path.is_empty() {
                        on_fatal_error(module_path!(), 520);
                    }
                    self.enter_path(me, ctx, &path);
                    t = sub;
                }
                QStateReturn::Transition(_) => on_fatal_error(module_path!(), 530),
                _ => return t,
            }
        }
    }
}
