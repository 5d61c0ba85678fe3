#![no_std]
#![forbid(unsafe_code)]

//! # QP Core
//!
//! Core types shared by every layer of the runtime: signals and the
//! reference-counted event handle, the priority set used for ready-set and
//! subscriber bookkeeping, the return type of state handlers, and the
//! fatal-error hook through which all invariant violations are reported.

#[cfg(feature = "std")]
extern crate std;

use core::fmt;

pub mod events;
pub mod fatal;
pub mod priorities;
pub mod states;

pub use events::*;
pub use fatal::*;
pub use priorities::*;
pub use states::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the runtime for recoverable errors
pub type QResult<T> = Result<T, QError>;

/// Recoverable configuration and registration errors.
///
/// Invariant violations never show up here; they are reported through
/// [`on_fatal_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QError {
    /// Priority outside `1..=QF_MAX_ACTIVE`
    InvalidPriority,
    /// Signal outside the publishable range
    InvalidSignal,
    /// A configuration value exceeds a compile-time capacity
    InvalidConfig,
    /// Event pools must be added in increasing block-size order
    PoolOrder,
    /// No room left in the event-pool table
    TooManyPools,
}

impl fmt::Display for QError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QError::InvalidPriority => write!(f, "Invalid priority level"),
            QError::InvalidSignal => write!(f, "Signal outside the publishable range"),
            QError::InvalidConfig => write!(f, "Configuration exceeds compile-time capacity"),
            QError::PoolOrder => write!(f, "Event pools out of block-size order"),
            QError::TooManyPools => write!(f, "Event-pool table is full"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for QError {}

#[cfg(feature = "defmt")]
impl defmt::Format for QError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            QError::InvalidPriority => defmt::write!(fmt, "InvalidPriority"),
            QError::InvalidSignal => defmt::write!(fmt, "InvalidSignal"),
            QError::InvalidConfig => defmt::write!(fmt, "InvalidConfig"),
            QError::PoolOrder => defmt::write!(fmt, "PoolOrder"),
            QError::TooManyPools => defmt::write!(fmt, "TooManyPools"),
        }
    }
}
