//! Invariant-violation reporting
//!
//! Every layer reports corrupted state (queue overflow without a margin,
//! pool exhaustion, malformed state hierarchy, ...) through
//! [`on_fatal_error`]. The board code installs its handler once at start-up;
//! without one the runtime panics.

use core::cell::Cell;
use critical_section::Mutex;

/// Handler invoked on an invariant violation. Must not return.
pub type QFatalHandler = fn(module: &'static str, id: u32) -> !;

static HANDLER: Mutex<Cell<Option<QFatalHandler>>> = Mutex::new(Cell::new(None));

/// Install the fatal-error handler.
pub fn set_fatal_handler(handler: QFatalHandler) {
    critical_section::with(|cs| HANDLER.borrow(cs).set(Some(handler)));
}

/// Report an invariant violation at `id` inside `module`.
///
/// Callers must not hold a critical section.
#[cold]
#[inline(never)]
pub fn on_fatal_error(module: &'static str, id: u32) -> ! {
    log::error!("fatal error in {} at {}", module, id);
    let handler = critical_section::with(|cs| HANDLER.borrow(cs).get());
    match handler {
        Some(handler) => handler(module, id),
        None => panic!("fatal error in {} at {}", module, id),
    }
}

/// Report a fatal error at `id` unless `cond` holds.
#[macro_export]
macro_rules! q_assert {
    ($cond:expr, $id:expr) => {
        if !$cond {
            $crate::on_fatal_error(module_path!(), $id)
        }
    };
}

/// Precondition check, same behavior as [`q_assert!`].
#[macro_export]
macro_rules! q_require {
    ($cond:expr, $id:expr) => {
        $crate::q_assert!($cond, $id)
    };
}
