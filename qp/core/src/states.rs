//! State handlers and their return codes
//!
//! A state is a plain function over the extended state `T`, the current
//! event and a context `C` passed through dispatch unchanged. The handler
//! tells the dispatch engine what to do next through [`QStateReturn`].

use core::fmt;

use crate::QEvt;

/// State handler function pointer type
pub type QStateHandler<T, C> = fn(&mut T, &QEvt, &C) -> QStateReturn<T, C>;

/// State handler return codes
pub enum QStateReturn<T, C: ?Sized> {
    /// Event consumed, no state change
    Handled,
    /// Event not relevant here or anywhere above
    Ignored,
    /// Not handled here, retry in the given superstate
    Super(QStateHandler<T, C>),
    /// External transition to the given target
    Transition(QStateHandler<T, C>),
    /// Default substate selected while processing `INIT`
    Initial(QStateHandler<T, C>),
}

impl<T, C: ?Sized> QStateReturn<T, C> {
    /// Check if this is a transition
    pub fn is_transition(&self) -> bool {
        matches!(self, QStateReturn::Transition(_) | QStateReturn::Initial(_))
    }
}

impl<T, C: ?Sized> Clone for QStateReturn<T, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, C: ?Sized> Copy for QStateReturn<T, C> {}

impl<T, C: ?Sized> PartialEq for QStateReturn<T, C> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (QStateReturn::Handled, QStateReturn::Handled) => true,
            (QStateReturn::Ignored, QStateReturn::Ignored) => true,
            (QStateReturn::Super(a), QStateReturn::Super(b))
            | (QStateReturn::Transition(a), QStateReturn::Transition(b))
            | (QStateReturn::Initial(a), QStateReturn::Initial(b)) => same_state(*a, *b),
            _ => false,
        }
    }
}

impl<T, C: ?Sized> Eq for QStateReturn<T, C> {}

impl<T, C: ?Sized> fmt::Debug for QStateReturn<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QStateReturn::Handled => write!(f, "Handled"),
            QStateReturn::Ignored => write!(f, "Ignored"),
            QStateReturn::Super(s) => write!(f, "Super({:p})", *s as *const ()),
            QStateReturn::Transition(s) => write!(f, "Transition({:p})", *s as *const ()),
            QStateReturn::Initial(s) => write!(f, "Initial({:p})", *s as *const ()),
        }
    }
}

#[cfg(feature = "defmt")]
impl<T, C: ?Sized> defmt::Format for QStateReturn<T, C> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            QStateReturn::Handled => defmt::write!(fmt, "Handled"),
            QStateReturn::Ignored => defmt::write!(fmt, "Ignored"),
            QStateReturn::Super(_) => defmt::write!(fmt, "Super"),
            QStateReturn::Transition(_) => defmt::write!(fmt, "Transition"),
            QStateReturn::Initial(_) => defmt::write!(fmt, "Initial"),
        }
    }
}

/// Identity of two state handlers
#[inline]
pub fn same_state<T, C: ?Sized>(a: QStateHandler<T, C>, b: QStateHandler<T, C>) -> bool {
    a as *const () == b as *const ()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(_me: &mut u8, _e: &QEvt, _ctx: &()) -> QStateReturn<u8, ()> {
        QStateReturn::Handled
    }

    fn b(_me: &mut u8, _e: &QEvt, _ctx: &()) -> QStateReturn<u8, ()> {
        QStateReturn::Ignored
    }

    #[test]
    fn test_handler_identity() {
        assert!(same_state::<u8, ()>(a, a));
        assert!(!same_state::<u8, ()>(a, b));
        let to_a = QStateReturn::<u8, ()>::Transition(a);
        assert_eq!(to_a, QStateReturn::Transition(a));
        assert_ne!(to_a, QStateReturn::Initial(a));
        assert!(QStateReturn::<u8, ()>::Initial(b).is_transition());
    }
}
