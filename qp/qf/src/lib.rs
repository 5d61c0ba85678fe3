#![no_std]
#![forbid(unsafe_code)]

//! # QP Framework (QF)
//!
//! The Framework layer provides active objects, event queues, publish-subscribe,
//! event pools and time events for building concurrent, event-driven embedded
//! systems.
//!
//! Active objects are encapsulated, event-driven concurrent objects that
//! communicate through asynchronous message passing. Each active object has
//! its own mailbox and processes one event at a time to completion. The
//! [`QF`] registry ties them together; a kernel decides when each one runs.

pub mod active;
pub mod config;
pub mod queue;
pub mod registry;
pub mod time;

pub use qp_core::*;
pub use active::*;
pub use config::*;
pub use queue::*;
pub use registry::*;
pub use time::*;

/// Maximum number of active objects (priorities `1..=QF_MAX_ACTIVE`)
pub const QF_MAX_ACTIVE: usize = 64;

/// Number of independent tick rates
pub const QF_MAX_TICK_RATE: usize = 4;

/// Maximum number of event pools
pub const QF_MAX_EPOOL: usize = 3;

/// Signals below this bound can be published
pub const QF_MAX_PUB_SIG: usize = 64;

/// Maximum number of time events linked per tick rate
pub const QF_MAX_TIMEEVT: usize = 16;
