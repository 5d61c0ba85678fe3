//! Time events
//!
//! A [`QTimeEvt`] is a statically allocated event bound to a target active
//! object and a tick rate. Arming links it into the rate's list; every
//! [`QF::tick`](crate::QF::tick) counts it down and posts it by reference
//! when the counter reaches zero.

use core::cell::Cell;

use critical_section::{CriticalSection, Mutex};
use qp_core::{QSignal, QStaticEvt};

#[derive(Debug, Clone, Copy, Default)]
struct QTimeEvtState {
    ctr: u32,
    interval: u32,
    linked: bool,
    was_disarmed: bool,
}

/// Outcome of one tick for a linked time event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QTickOutcome {
    pub keep: bool,
    pub fire: bool,
}

/// Countdown event delivered to one active object
pub struct QTimeEvt {
    evt: QStaticEvt,
    target: u8,
    rate: u8,
    state: Mutex<Cell<QTimeEvtState>>,
}

impl QTimeEvt {
    /// Time event posting `sig` to priority `target`, counted on tick `rate`
    pub const fn new(sig: QSignal, target: u8, rate: u8) -> Self {
        Self {
            evt: QStaticEvt::new(sig),
            target,
            rate,
            state: Mutex::new(Cell::new(QTimeEvtState {
                ctr: 0,
                interval: 0,
                linked: false,
                was_disarmed: false,
            })),
        }
    }

    pub fn sig(&self) -> QSignal {
        self.evt.sig()
    }

    pub fn target(&self) -> u8 {
        self.target
    }

    pub fn rate(&self) -> u8 {
        self.rate
    }

    /// The event posted on expiry
    pub fn evt(&self) -> &QStaticEvt {
        &self.evt
    }

    /// Ticks left before the event fires, 0 when disarmed
    pub fn ctr(&self) -> u32 {
        critical_section::with(|cs| self.state.borrow(cs).get().ctr)
    }

    /// Reload value, 0 for one-shot events
    pub fn interval(&self) -> u32 {
        critical_section::with(|cs| self.state.borrow(cs).get().interval)
    }

    pub fn is_armed(&self) -> bool {
        self.ctr() > 0
    }

    /// Whether the event was disarmed explicitly since it was last armed.
    /// Reading clears the flag.
    pub fn was_disarmed(&self) -> bool {
        critical_section::with(|cs| {
            let cell = self.state.borrow(cs);
            let mut s = cell.get();
            let was = s.was_disarmed;
            s.was_disarmed = false;
            cell.set(s);
            was
        })
    }

    /// Start the countdown. Returns `true` if the event must be linked into
    /// its rate list, `None` if it was already armed.
    pub(crate) fn arm_in(&self, cs: CriticalSection<'_>, n_ticks: u32, interval: u32) -> Option<bool> {
        let cell = self.state.borrow(cs);
        let mut s = cell.get();
        if s.ctr != 0 {
            return None;
        }
        let link = !s.linked;
        s.ctr = n_ticks;
        s.interval = interval;
        s.linked = true;
        s.was_disarmed = false;
        cell.set(s);
        Some(link)
    }

    /// Stop the countdown and mark the event unlinked. The caller removes
    /// it from the rate list in the same critical section.
    pub(crate) fn disarm_in(&self, cs: CriticalSection<'_>) -> bool {
        let cell = self.state.borrow(cs);
        let mut s = cell.get();
        let armed = s.ctr != 0;
        if armed {
            s.ctr = 0;
            s.was_disarmed = true;
        }
        s.linked = false;
        cell.set(s);
        armed
    }

    /// Restart the countdown. Returns whether the event was armed and
    /// whether it must be linked into its rate list.
    pub(crate) fn rearm_in(&self, cs: CriticalSection<'_>, n_ticks: u32) -> (bool, bool) {
        let cell = self.state.borrow(cs);
        let mut s = cell.get();
        let armed = s.ctr != 0;
        let link = !s.linked;
        s.ctr = n_ticks;
        s.linked = true;
        cell.set(s);
        (armed, link)
    }

    pub(crate) fn ctr_in(&self, cs: CriticalSection<'_>) -> u32 {
        self.state.borrow(cs).get().ctr
    }

    #[cfg(test)]
    pub(crate) fn is_linked(&self, cs: CriticalSection<'_>) -> bool {
        self.state.borrow(cs).get().linked
    }

    pub(crate) fn on_tick(&self, cs: CriticalSection<'_>) -> QTickOutcome {
        let cell = self.state.borrow(cs);
        let mut s = cell.get();
        let outcome = match s.ctr {
            0 => {
                s.linked = false;
                QTickOutcome { keep: false, fire: false }
            }
            1 if s.interval == 0 => {
                s.ctr = 0;
                s.linked = false;
                QTickOutcome { keep: false, fire: true }
            }
            1 => {
                s.ctr = s.interval;
                QTickOutcome { keep: true, fire: true }
            }
            _ => {
                s.ctr -= 1;
                QTickOutcome { keep: true, fire: false }
            }
        };
        cell.set(s);
        outcome
    }
}

impl core::fmt::Debug for QTimeEvt {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QTimeEvt")
            .field("sig", &self.sig())
            .field("target", &self.target)
            .field("rate", &self.rate)
            .field("ctr", &self.ctr())
            .finish()
    }
}
