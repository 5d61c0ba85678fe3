//! Bounded event queues
//!
//! A [`QEQueue`] stores up to `N` event references. It backs active-object
//! mailboxes, where the framework drives it through [`QEventQueue`] inside its
//! own critical sections, and it can also be used directly to hand events
//! from an interrupt to a polling thread.

use core::cell::RefCell;
use core::convert::Infallible;

use critical_section::{CriticalSection, Mutex};
use heapless::Deque;
use qp_core::{on_fatal_error, QEvt};

/// Mailbox operations used by the framework.
///
/// Every method runs inside a critical section the caller already holds.
pub trait QEventQueue: Sync {
    /// Append `e` unless fewer than `margin` free slots would remain
    /// afterwards. A refused event is handed back.
    fn push_back(&self, cs: CriticalSection<'_>, e: QEvt, margin: u16) -> Result<(), QEvt>;

    /// Insert `e` at the front. A full queue hands the event back.
    fn push_front(&self, cs: CriticalSection<'_>, e: QEvt) -> Result<(), QEvt>;

    /// Remove the front event
    fn pop_front(&self, cs: CriticalSection<'_>) -> Option<QEvt>;

    fn len(&self, cs: CriticalSection<'_>) -> usize;

    fn is_empty(&self, cs: CriticalSection<'_>) -> bool {
        self.len(cs) == 0
    }

    /// Lowest number of free slots seen since start-up
    fn n_min(&self, cs: CriticalSection<'_>) -> u16;

    fn capacity(&self) -> usize;
}

struct QEQueueInner<const N: usize> {
    buf: Deque<QEvt, N>,
    n_min: u16,
}

impl<const N: usize> QEQueueInner<N> {
    fn n_free(&self) -> u16 {
        (N - self.buf.len()) as u16
    }

    fn track_min(&mut self) {
        let free = self.n_free();
        if free < self.n_min {
            self.n_min = free;
        }
    }
}

/// Event queue of capacity `N`
pub struct QEQueue<const N: usize> {
    inner: Mutex<RefCell<QEQueueInner<N>>>,
}

impl<const N: usize> QEQueue<N> {
    /// Create a new empty event queue
    pub const fn new() -> Self {
        assert!(N > 0 && N <= u16::MAX as usize, "queue capacity out of range");
        Self {
            inner: Mutex::new(RefCell::new(QEQueueInner {
                buf: Deque::new(),
                n_min: N as u16,
            })),
        }
    }

    /// Post `e` to the back of the queue (FIFO).
    ///
    /// With `Some(margin)` the call returns `false` and releases the event
    /// when fewer than `margin` slots would stay free. Without a margin a
    /// full queue is fatal.
    pub fn post(&self, e: QEvt, margin: Option<u16>) -> bool {
        let refused = critical_section::with(|cs| self.push_back(cs, e, margin.unwrap_or(0)).err());
        match (refused, margin) {
            (None, _) => true,
            (Some(_), Some(_)) => false,
            (Some(_), None) => on_fatal_error(module_path!(), 600),
        }
    }

    /// Post `e` to the front of the queue (LIFO). A full queue is fatal.
    pub fn post_lifo(&self, e: QEvt) {
        let refused = critical_section::with(|cs| self.push_front(cs, e).err());
        if refused.is_some() {
            on_fatal_error(module_path!(), 610);
        }
    }

    /// Take the front event without blocking
    pub fn get(&self) -> nb::Result<QEvt, Infallible> {
        critical_section::with(|cs| self.pop_front(cs)).ok_or(nb::Error::WouldBlock)
    }

    /// Get the number of events in the queue
    pub fn len(&self) -> usize {
        critical_section::with(|cs| QEventQueue::len(self, cs))
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of free slots
    pub fn n_free(&self) -> u16 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).n_free())
    }

    /// Low-water mark of free slots
    pub fn n_min(&self) -> u16 {
        critical_section::with(|cs| QEventQueue::n_min(self, cs))
    }

    /// Get the maximum capacity of the queue
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for QEQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> QEventQueue for QEQueue<N> {
    fn push_back(&self, cs: CriticalSection<'_>, e: QEvt, margin: u16) -> Result<(), QEvt> {
        let mut q = self.inner.borrow_ref_mut(cs);
        if q.n_free() <= margin {
            return Err(e);
        }
        q.buf.push_back(e)?;
        q.track_min();
        Ok(())
    }

    fn push_front(&self, cs: CriticalSection<'_>, e: QEvt) -> Result<(), QEvt> {
        let mut q = self.inner.borrow_ref_mut(cs);
        q.buf.push_front(e)?;
        q.track_min();
        Ok(())
    }

    fn pop_front(&self, cs: CriticalSection<'_>) -> Option<QEvt> {
        self.inner.borrow_ref_mut(cs).buf.pop_front()
    }

    fn len(&self, cs: CriticalSection<'_>) -> usize {
        self.inner.borrow_ref(cs).buf.len()
    }

    fn n_min(&self, cs: CriticalSection<'_>) -> u16 {
        self.inner.borrow_ref(cs).n_min
    }

    fn capacity(&self) -> usize {
        N
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qp_core::{QSignal, QStaticEvt};

    static EVT1: QStaticEvt = QStaticEvt::new(QSignal(10));
    static EVT2: QStaticEvt = QStaticEvt::new(QSignal(20));
    static EVT3: QStaticEvt = QStaticEvt::new(QSignal(30));

    fn sig(queue: &QEQueue<4>) -> Option<u16> {
        queue.get().ok().map(|e| e.sig().0)
    }

    #[test]
    fn test_event_queue_fifo() {
        let queue: QEQueue<4> = QEQueue::new();
        assert!(queue.is_empty());

        assert!(queue.post((&EVT1).into(), None));
        assert!(queue.post((&EVT2).into(), None));
        assert!(queue.post((&EVT3).into(), None));
        assert_eq!(queue.len(), 3);

        assert_eq!(sig(&queue), Some(10));
        assert_eq!(sig(&queue), Some(20));
        assert_eq!(sig(&queue), Some(30));
        assert!(matches!(queue.get(), Err(nb::Error::WouldBlock)));
    }

    #[test]
    fn test_event_queue_lifo() {
        let queue: QEQueue<4> = QEQueue::new();
        queue.post((&EVT1).into(), None);
        queue.post_lifo((&EVT2).into());

        assert_eq!(sig(&queue), Some(20));
        assert_eq!(sig(&queue), Some(10));
    }

    #[test]
    fn test_margin_keeps_free_slots() {
        let queue: QEQueue<4> = QEQueue::new();
        assert!(queue.post((&EVT1).into(), Some(2)));
        assert!(queue.post((&EVT1).into(), Some(2)));
        // two free, margin 2 must keep both
        assert!(!queue.post((&EVT1).into(), Some(2)));
        assert_eq!(queue.n_free(), 2);
        assert!(queue.post((&EVT1).into(), Some(1)));
        assert_eq!(queue.n_min(), 1);
    }

    #[test]
    #[should_panic(expected = "fatal error")]
    fn test_overflow_without_margin_is_fatal() {
        let queue: QEQueue<1> = QEQueue::new();
        queue.post((&EVT1).into(), None);
        queue.post((&EVT2).into(), None);
    }
}
