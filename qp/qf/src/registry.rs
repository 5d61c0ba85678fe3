//! Framework registry
//!
//! [`QF`] owns everything shared between active objects: the table of
//! mailboxes and active objects indexed by priority, the ready-set, the
//! publish-subscribe table, the registered event pools and the time-event
//! lists of every tick rate. All of it lives behind one critical-section
//! mutex; fatal errors are always reported after the section is left.

use core::cell::RefCell;
use core::ptr;

use critical_section::{CriticalSection, Mutex};
use heapless::Vec;
use qp_core::{on_fatal_error, q_require, QError, QEvt, QEvtHandle, QEvtStore, QPSet, QResult, QSignal};

use crate::{
    QActive, QContext, QCtx, QEventQueue, QFConfig, QTimeEvt, QF_MAX_ACTIVE, QF_MAX_EPOOL, QF_MAX_PUB_SIG,
    QF_MAX_TICK_RATE, QF_MAX_TIMEEVT,
};

type QTimeEvtList = Vec<&'static QTimeEvt, QF_MAX_TIMEEVT>;

struct QFState {
    queues: [Option<&'static dyn QEventQueue>; QF_MAX_ACTIVE + 1],
    actives: [Option<&'static mut dyn QActive>; QF_MAX_ACTIVE + 1],
    ready: QPSet,
    subscribers: [QPSet; QF_MAX_PUB_SIG],
    pools: Vec<&'static dyn QEvtStore, QF_MAX_EPOOL>,
    time_evts: [QTimeEvtList; QF_MAX_TICK_RATE],
}

impl QFState {
    const fn new() -> Self {
        const NO_QUEUE: Option<&'static dyn QEventQueue> = None;
        const NO_ACTIVE: Option<&'static mut dyn QActive> = None;
        const NO_TIME_EVTS: QTimeEvtList = Vec::new();
        Self {
            queues: [NO_QUEUE; QF_MAX_ACTIVE + 1],
            actives: [NO_ACTIVE; QF_MAX_ACTIVE + 1],
            ready: QPSet::EMPTY,
            subscribers: [QPSet::EMPTY; QF_MAX_PUB_SIG],
            pools: Vec::new(),
            time_evts: [NO_TIME_EVTS; QF_MAX_TICK_RATE],
        }
    }
}

/// Outcome of a post computed inside the critical section
enum Delivery {
    Queued,
    Refused(QEvt),
    NoTarget(QEvt),
}

/// The framework registry
pub struct QF {
    state: Mutex<RefCell<QFState>>,
    config: QFConfig,
}

impl QF {
    pub const fn new(config: QFConfig) -> Self {
        Self {
            state: Mutex::new(RefCell::new(QFState::new())),
            config,
        }
    }

    pub fn config(&self) -> &QFConfig {
        &self.config
    }

    fn require_prio(&self, prio: u8, id: u32) {
        q_require!(self.config.valid_prio(prio), id);
    }

    /// Bind the mailbox `queue` to `prio`. A taken priority is fatal.
    pub fn register(&self, prio: u8, queue: &'static dyn QEventQueue) {
        self.require_prio(prio, 700);
        let fresh = critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            let slot = &mut st.queues[prio as usize];
            if slot.is_some() {
                return false;
            }
            *slot = Some(queue);
            true
        });
        q_require!(fresh, 701);
    }

    /// Attach the active object serving `prio`
    pub fn attach(&self, prio: u8, ao: &'static mut dyn QActive) {
        self.require_prio(prio, 710);
        let attached = critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            if st.queues[prio as usize].is_none() {
                return false;
            }
            st.actives[prio as usize] = Some(ao);
            true
        });
        q_require!(attached, 711);
    }

    /// Register `ao` with its mailbox and take its top-most initial
    /// transition, using this registry as context.
    pub fn start(&self, prio: u8, ao: &'static mut dyn QActive, queue: &'static dyn QEventQueue) {
        self.start_with(self, prio, ao, queue);
    }

    /// Same as [`QF::start`] with an explicit context for the initial
    /// transition
    pub fn start_with(&self, ctx: &QCtx, prio: u8, ao: &'static mut dyn QActive, queue: &'static dyn QEventQueue) {
        log::debug!("starting active object at prio {}", prio);
        self.register(prio, queue);
        ao.init(prio, ctx);
        self.attach(prio, ao);
    }

    /// Remove the active object at `prio` from the framework.
    ///
    /// It is unsubscribed from every signal, its time events are disarmed
    /// and the events still queued for it are released.
    pub fn stop(&self, prio: u8) {
        self.require_prio(prio, 720);
        let queue = critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            let queue = st.queues[prio as usize].take();
            st.actives[prio as usize] = None;
            st.ready.remove(prio);
            for subs in st.subscribers.iter_mut() {
                subs.remove(prio);
            }
            for list in st.time_evts.iter_mut() {
                list.retain(|te| {
                    if te.target() == prio {
                        te.disarm_in(cs);
                        return false;
                    }
                    true
                });
            }
            queue
        });
        match queue {
            Some(queue) => {
                while let Some(e) = critical_section::with(|cs| queue.pop_front(cs)) {
                    drop(e);
                }
                log::debug!("stopped active object at prio {}", prio);
            }
            None => on_fatal_error(module_path!(), 721),
        }
    }

    pub fn is_registered(&self, prio: u8) -> bool {
        self.config.valid_prio(prio)
            && critical_section::with(|cs| self.state.borrow_ref(cs).queues[prio as usize].is_some())
    }

    /// Take the active object at `prio` out of the table for a dispatch step
    pub fn take_active(&self, prio: u8) -> Option<&'static mut dyn QActive> {
        if !self.config.valid_prio(prio) {
            return None;
        }
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).actives[prio as usize].take())
    }

    /// Put back an object taken with [`QF::take_active`]. Dropped if the
    /// priority was stopped in the meantime.
    pub fn restore_active(&self, prio: u8, ao: &'static mut dyn QActive) {
        critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            if st.queues[prio as usize].is_some() && st.actives[prio as usize].is_none() {
                st.actives[prio as usize] = Some(ao);
            }
        });
    }

    fn deliver(&self, cs: CriticalSection<'_>, prio: u8, e: QEvt, margin: u16, lifo: bool) -> Delivery {
        let mut st = self.state.borrow_ref_mut(cs);
        let Some(queue) = st.queues[prio as usize] else {
            return Delivery::NoTarget(e);
        };
        let pushed = if lifo {
            queue.push_front(cs, e)
        } else {
            queue.push_back(cs, e, margin)
        };
        match pushed {
            Ok(()) => {
                st.ready.insert(prio);
                Delivery::Queued
            }
            Err(e) => Delivery::Refused(e),
        }
    }

    /// Post `e` to the mailbox at `prio` and mark it ready.
    ///
    /// With `Some(margin)` a post that would leave fewer than `margin` free
    /// slots is refused and `false` is returned. Without a margin a full
    /// mailbox is fatal.
    pub fn post(&self, prio: u8, e: QEvt, margin: Option<u16>) -> bool {
        self.require_prio(prio, 730);
        let sig = e.sig();
        let delivery = critical_section::with(|cs| self.deliver(cs, prio, e, margin.unwrap_or(0), false));
        match delivery {
            Delivery::Queued => {
                log::trace!("post sig {} to prio {}", sig.0, prio);
                true
            }
            Delivery::Refused(e) if margin.is_some() => {
                log::warn!("post sig {} to prio {} refused by margin", sig.0, prio);
                drop(e);
                false
            }
            Delivery::Refused(_) => on_fatal_error(module_path!(), 731),
            Delivery::NoTarget(_) => on_fatal_error(module_path!(), 732),
        }
    }

    /// Post `e` to the front of the mailbox at `prio`. A full mailbox is fatal.
    pub fn post_lifo(&self, prio: u8, e: QEvt) {
        self.require_prio(prio, 740);
        let sig = e.sig();
        let delivery = critical_section::with(|cs| self.deliver(cs, prio, e, 0, true));
        match delivery {
            Delivery::Queued => log::trace!("post_lifo sig {} to prio {}", sig.0, prio),
            Delivery::Refused(_) => on_fatal_error(module_path!(), 741),
            Delivery::NoTarget(_) => on_fatal_error(module_path!(), 742),
        }
    }

    /// Pop the front event of the mailbox at `prio`, clearing its ready bit
    /// when the mailbox drains
    pub fn get(&self, prio: u8) -> Option<QEvt> {
        if !self.config.valid_prio(prio) {
            return None;
        }
        critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            let queue = st.queues[prio as usize]?;
            let e = queue.pop_front(cs);
            if queue.is_empty(cs) {
                st.ready.remove(prio);
            }
            e
        })
    }

    /// Run one dispatch step for `prio`: take the front event, dispatch it
    /// to completion and release it. Returns `false` if nothing was queued.
    pub fn dispatch(&self, prio: u8, ctx: &QCtx) -> bool {
        let Some(e) = self.get(prio) else {
            return false;
        };
        let Some(ao) = self.take_active(prio) else {
            on_fatal_error(module_path!(), 750);
        };
        ao.dispatch(&e, ctx);
        drop(e);
        self.restore_active(prio, ao);
        true
    }

    /// Ready-set as seen inside an open critical section
    pub fn ready_set_in(&self, cs: CriticalSection<'_>) -> QPSet {
        self.state.borrow_ref(cs).ready
    }

    pub fn ready_set(&self) -> QPSet {
        critical_section::with(|cs| self.ready_set_in(cs))
    }

    /// Number of events waiting at `prio`
    pub fn queue_len(&self, prio: u8) -> usize {
        self.require_prio(prio, 760);
        let len = critical_section::with(|cs| {
            let st = self.state.borrow_ref(cs);
            st.queues[prio as usize].map(|q| q.len(cs))
        });
        match len {
            Some(len) => len,
            None => on_fatal_error(module_path!(), 761),
        }
    }

    /// Lowest number of free mailbox slots ever seen at `prio`
    pub fn queue_min_free(&self, prio: u8) -> u16 {
        self.require_prio(prio, 770);
        let n_min = critical_section::with(|cs| {
            let st = self.state.borrow_ref(cs);
            st.queues[prio as usize].map(|q| q.n_min(cs))
        });
        match n_min {
            Some(n_min) => n_min,
            None => on_fatal_error(module_path!(), 771),
        }
    }

    fn require_pub_signal(&self, sig: QSignal, id: u32) {
        q_require!(self.config.valid_pub_signal(sig), id);
    }

    pub fn subscribe(&self, prio: u8, sig: QSignal) {
        self.require_prio(prio, 800);
        self.require_pub_signal(sig, 801);
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).subscribers[sig.0 as usize].insert(prio));
    }

    pub fn unsubscribe(&self, prio: u8, sig: QSignal) {
        self.require_prio(prio, 810);
        self.require_pub_signal(sig, 811);
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).subscribers[sig.0 as usize].remove(prio));
    }

    pub fn unsubscribe_all(&self, prio: u8) {
        self.require_prio(prio, 820);
        critical_section::with(|cs| {
            for subs in self.state.borrow_ref_mut(cs).subscribers.iter_mut() {
                subs.remove(prio);
            }
        });
    }

    /// Current subscribers of `sig`
    pub fn subscribers(&self, sig: QSignal) -> QPSet {
        self.require_pub_signal(sig, 830);
        critical_section::with(|cs| self.state.borrow_ref(cs).subscribers[sig.0 as usize])
    }

    /// Post `e` to every subscriber of its signal, highest priority first.
    ///
    /// Each subscriber gets its own handle. The caller's handle is held
    /// until all posts are done, so the event cannot be recycled by a
    /// subscriber that consumes it early.
    pub fn publish(&self, e: QEvt) {
        let sig = e.sig();
        self.require_pub_signal(sig, 840);
        let subs = self.subscribers(sig);
        log::trace!("publish sig {} to {}", sig.0, subs);
        for prio in subs.iter() {
            self.post(prio, e.clone(), None);
        }
        drop(e);
    }

    /// Register an event pool. Pools must be added in increasing block-size
    /// order; the returned pool id starts at 1.
    pub fn add_pool(&self, store: &'static dyn QEvtStore) -> QResult<u8> {
        let id = critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            if let Some(last) = st.pools.last() {
                if last.block_size() >= store.block_size() {
                    return Err(QError::PoolOrder);
                }
            }
            st.pools.push(store).map_err(|_| QError::TooManyPools)?;
            Ok(st.pools.len() as u8)
        })?;
        log::debug!(
            "event pool {} registered: {} blocks of {}B",
            id,
            store.n_tot(),
            store.block_size()
        );
        Ok(id)
    }

    fn pool(&self, pool_id: u8) -> Option<&'static dyn QEvtStore> {
        let idx = (pool_id as usize).checked_sub(1)?;
        critical_section::with(|cs| self.state.borrow_ref(cs).pools.get(idx).copied())
    }

    /// Smallest pool whose blocks hold `len` bytes
    fn best_fit(&self, len: usize) -> Option<(u8, &'static dyn QEvtStore)> {
        critical_section::with(|cs| {
            let st = self.state.borrow_ref(cs);
            st.pools
                .iter()
                .position(|p| p.block_size() >= len)
                .map(|idx| (idx as u8 + 1, st.pools[idx]))
        })
    }

    fn alloc(&self, sig: QSignal, payload: &[u8], margin: Option<u16>) -> Option<QEvt> {
        let Some((pool_id, store)) = self.best_fit(payload.len()) else {
            on_fatal_error(module_path!(), 900);
        };
        QEvtHandle::alloc(store, pool_id, sig, payload, margin).map(QEvt::from)
    }

    /// Allocate a pooled event from the best-fitting pool. Exhaustion is
    /// fatal.
    pub fn new_evt(&self, sig: QSignal, payload: &[u8]) -> QEvt {
        match self.alloc(sig, payload, None) {
            Some(e) => e,
            None => on_fatal_error(module_path!(), 910),
        }
    }

    /// Allocate a pooled event unless that leaves fewer than `margin` free
    /// blocks in the pool
    pub fn try_new_evt(&self, sig: QSignal, payload: &[u8], margin: u16) -> Option<QEvt> {
        self.alloc(sig, payload, Some(margin))
    }

    /// Lowest number of free blocks ever seen in pool `pool_id`
    pub fn pool_min_free(&self, pool_id: u8) -> u16 {
        match self.pool(pool_id) {
            Some(store) => store.n_min(),
            None => on_fatal_error(module_path!(), 920),
        }
    }

    /// Free blocks currently in pool `pool_id`
    pub fn pool_free(&self, pool_id: u8) -> u16 {
        match self.pool(pool_id) {
            Some(store) => store.n_free(),
            None => on_fatal_error(module_path!(), 921),
        }
    }

    fn require_rate(&self, rate: u8, id: u32) {
        q_require!(rate < self.config.tick_rates, id);
    }

    /// Arm `te` to fire after `n_ticks` and then every `interval` ticks.
    /// Arming an armed event or a zero countdown is fatal.
    pub fn arm(&self, te: &'static QTimeEvt, n_ticks: u32, interval: u32) {
        q_require!(n_ticks > 0, 1000);
        self.require_rate(te.rate(), 1001);
        self.require_prio(te.target(), 1002);
        let armed = critical_section::with(|cs| {
            let link = te.arm_in(cs, n_ticks, interval)?;
            if link {
                let mut st = self.state.borrow_ref_mut(cs);
                if st.time_evts[te.rate() as usize].push(te).is_err() {
                    return None;
                }
            }
            Some(())
        });
        q_require!(armed.is_some(), 1003);
    }

    /// Disarm `te`; `false` if it had already fired or was never armed
    pub fn disarm(&self, te: &'static QTimeEvt) -> bool {
        critical_section::with(|cs| {
            let armed = te.disarm_in(cs);
            let mut st = self.state.borrow_ref_mut(cs);
            st.time_evts[te.rate() as usize].retain(|other| !ptr::eq(*other, te));
            armed
        })
    }

    /// Restart the countdown of `te` at `n_ticks`, arming it if needed.
    /// Returns whether it was armed before.
    pub fn rearm(&self, te: &'static QTimeEvt, n_ticks: u32) -> bool {
        q_require!(n_ticks > 0, 1010);
        self.require_rate(te.rate(), 1011);
        let rearmed = critical_section::with(|cs| {
            let (was_armed, link) = te.rearm_in(cs, n_ticks);
            if link {
                let mut st = self.state.borrow_ref_mut(cs);
                if st.time_evts[te.rate() as usize].push(te).is_err() {
                    return None;
                }
            }
            Some(was_armed)
        });
        match rearmed {
            Some(was_armed) => was_armed,
            None => on_fatal_error(module_path!(), 1012),
        }
    }

    /// Count down every time event of `rate` and post the expired ones to
    /// their targets, in arming order.
    pub fn tick(&self, rate: u8) {
        self.require_rate(rate, 1020);
        let mut fired: QTimeEvtList = Vec::new();
        critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            st.time_evts[rate as usize].retain(|te| {
                let outcome = te.on_tick(cs);
                if outcome.fire {
                    // same capacity as the list being walked
                    let _ = fired.push(*te);
                }
                outcome.keep
            });
        });
        for te in fired {
            log::trace!("time event sig {} fired for prio {}", te.sig().0, te.target());
            self.post(te.target(), QEvt::Static(te.evt()), None);
        }
    }

    /// Whether no time event of `rate` is armed
    pub fn no_time_events_active(&self, rate: u8) -> bool {
        self.require_rate(rate, 1030);
        critical_section::with(|cs| {
            self.state.borrow_ref(cs).time_evts[rate as usize]
                .iter()
                .all(|te| te.ctr_in(cs) == 0)
        })
    }
}

impl QContext for QF {
    fn framework(&self) -> &QF {
        self
    }
}
