//! Event types and signal definitions
//!
//! An event is a signal plus an opaque payload. Events either live in static
//! storage ([`QStaticEvt`]) or in a block of an event pool, reached through a
//! reference-counted [`QEvtHandle`]. [`QEvt`] is the tagged variant that
//! queues, publish-subscribe and state handlers pass around.

use core::fmt;

use crate::on_fatal_error;

/// Type-safe event signal identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QSignal(pub u16);

impl QSignal {
    /// Reserved signal for initial transitions
    pub const INIT: QSignal = QSignal(0);
    /// Reserved signal for state entry actions
    pub const ENTRY: QSignal = QSignal(1);
    /// Reserved signal for state exit actions
    pub const EXIT: QSignal = QSignal(2);
    /// Reserved signal used to probe a state for its superstate
    pub const EMPTY: QSignal = QSignal(3);

    /// First user-defined signal
    pub const USER: QSignal = QSignal(4);

    /// Create a new signal from a raw value
    pub const fn new(signal: u16) -> Self {
        QSignal(signal)
    }

    /// Get the raw signal value
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Check if this is one of the reserved framework signals
    pub const fn is_reserved(self) -> bool {
        self.0 < Self::USER.0
    }
}

impl fmt::Display for QSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QSignal({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QSignal {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "QSignal({})", self.0);
    }
}

/// Event in static storage. Never pooled, its reference count is ignored.
#[derive(Debug)]
pub struct QStaticEvt {
    sig: QSignal,
    payload: &'static [u8],
}

impl QStaticEvt {
    /// Create a static event without payload
    pub const fn new(sig: QSignal) -> Self {
        Self { sig, payload: &[] }
    }

    /// Create a static event carrying `payload`
    pub const fn with_payload(sig: QSignal, payload: &'static [u8]) -> Self {
        Self { sig, payload }
    }

    pub const fn sig(&self) -> QSignal {
        self.sig
    }

    pub const fn payload(&self) -> &'static [u8] {
        self.payload
    }
}

static RESERVED: [QStaticEvt; 4] = [
    QStaticEvt::new(QSignal::INIT),
    QStaticEvt::new(QSignal::ENTRY),
    QStaticEvt::new(QSignal::EXIT),
    QStaticEvt::new(QSignal::EMPTY),
];

/// Storage seam between event handles and the pools that own their blocks.
///
/// A store keeps, per block, the event signal, the reference counter and the
/// payload bytes. All methods are constant time.
pub trait QEvtStore: Sync {
    /// Payload capacity of one block, in bytes
    fn block_size(&self) -> usize;

    /// Take a free block, fill it and set its reference counter to one.
    ///
    /// With `Some(margin)` the allocation fails (returns `None`) when fewer
    /// than `margin` blocks would remain free. Without a margin exhaustion is
    /// fatal.
    fn alloc(&self, sig: QSignal, payload: &[u8], margin: Option<u16>) -> Option<u16>;

    /// Add one holder to `block`, returning the new count
    fn retain(&self, block: u16) -> u8;

    /// Drop one holder from `block`, returning the remaining count. The block
    /// goes back to the free list when the count reaches zero.
    fn release(&self, block: u16) -> u8;

    /// Current reference counter of `block`
    fn ref_ctr(&self, block: u16) -> u8;

    /// Run `f` over the payload of `block`
    fn read(&self, block: u16, f: &mut dyn FnMut(&[u8]));

    /// Blocks currently free
    fn n_free(&self) -> u16;

    /// Lowest number of free blocks seen since start-up
    fn n_min(&self) -> u16;

    /// Total number of blocks
    fn n_tot(&self) -> u16;
}

/// Owned reference to a pool-allocated event.
///
/// Cloning adds a holder, dropping removes one; the last drop recycles the
/// block.
pub struct QEvtHandle {
    sig: QSignal,
    pool_id: u8,
    block: u16,
    store: &'static dyn QEvtStore,
}

impl QEvtHandle {
    /// Allocate an event from `store`, which is registered as pool `pool_id`.
    pub fn alloc(
        store: &'static dyn QEvtStore,
        pool_id: u8,
        sig: QSignal,
        payload: &[u8],
        margin: Option<u16>,
    ) -> Option<Self> {
        if payload.len() > store.block_size() {
            on_fatal_error(module_path!(), 100);
        }
        let block = store.alloc(sig, payload, margin)?;
        Some(Self {
            sig,
            pool_id,
            block,
            store,
        })
    }

    pub fn sig(&self) -> QSignal {
        self.sig
    }

    pub fn pool_id(&self) -> u8 {
        self.pool_id
    }

    /// Block index inside the owning pool
    pub fn block(&self) -> u16 {
        self.block
    }

    pub fn ref_ctr(&self) -> u8 {
        self.store.ref_ctr(self.block)
    }
}

impl Clone for QEvtHandle {
    fn clone(&self) -> Self {
        self.store.retain(self.block);
        Self {
            sig: self.sig,
            pool_id: self.pool_id,
            block: self.block,
            store: self.store,
        }
    }
}

impl Drop for QEvtHandle {
    fn drop(&mut self) {
        self.store.release(self.block);
    }
}

impl fmt::Debug for QEvtHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QEvtHandle")
            .field("sig", &self.sig)
            .field("pool_id", &self.pool_id)
            .field("block", &self.block)
            .finish()
    }
}

/// Event reference passed through queues and into state handlers
#[derive(Debug, Clone)]
pub enum QEvt {
    Static(&'static QStaticEvt),
    Pooled(QEvtHandle),
}

impl QEvt {
    /// One of the reserved events (`INIT`, `ENTRY`, `EXIT`, `EMPTY`)
    pub fn reserved(sig: QSignal) -> Self {
        match RESERVED.get(sig.0 as usize) {
            Some(evt) => QEvt::Static(evt),
            None => on_fatal_error(module_path!(), 110),
        }
    }

    pub fn sig(&self) -> QSignal {
        match self {
            QEvt::Static(evt) => evt.sig(),
            QEvt::Pooled(handle) => handle.sig(),
        }
    }

    /// Pool of origin, 0 for static events
    pub fn pool_id(&self) -> u8 {
        match self {
            QEvt::Static(_) => 0,
            QEvt::Pooled(handle) => handle.pool_id(),
        }
    }

    /// Number of outstanding holders, 0 for static events
    pub fn ref_ctr(&self) -> u8 {
        match self {
            QEvt::Static(_) => 0,
            QEvt::Pooled(handle) => handle.ref_ctr(),
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self, QEvt::Pooled(_))
    }

    /// Run `f` over the payload bytes.
    ///
    /// For pooled events `f` runs inside the pool's critical section and must
    /// stay short.
    pub fn with_payload<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        match self {
            QEvt::Static(evt) => f(evt.payload()),
            QEvt::Pooled(handle) => {
                let mut f = Some(f);
                let mut out = None;
                handle.store.read(handle.block, &mut |bytes| {
                    if let Some(f) = f.take() {
                        out = Some(f(bytes));
                    }
                });
                match out {
                    Some(out) => out,
                    None => on_fatal_error(module_path!(), 120),
                }
            }
        }
    }

    /// Copy the payload into `buf`, returning the number of bytes copied
    pub fn payload(&self, buf: &mut [u8]) -> usize {
        self.with_payload(|bytes| {
            let n = bytes.len().min(buf.len());
            buf[..n].copy_from_slice(&bytes[..n]);
            n
        })
    }
}

impl From<&'static QStaticEvt> for QEvt {
    fn from(evt: &'static QStaticEvt) -> Self {
        QEvt::Static(evt)
    }
}

impl From<QEvtHandle> for QEvt {
    fn from(handle: QEvtHandle) -> Self {
        QEvt::Pooled(handle)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QEvt {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "QEvt(sig={}, pool={})", self.sig().0, self.pool_id());
    }
}
