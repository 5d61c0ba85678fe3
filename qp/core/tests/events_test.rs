//! Event tests for qp-core
//! These tests run on the host with std, but exercise the no_std code paths

use qp_core::{QEvt, QSignal, QStaticEvt};

static TIMEOUT: QStaticEvt = QStaticEvt::new(QSignal(7));
static DATA: QStaticEvt = QStaticEvt::with_payload(QSignal(8), &[0xAA, 0x55]);

#[test]
fn test_signal_creation() {
    let sig1 = QSignal::new(1);
    let sig2 = QSignal::new(2);
    assert_ne!(sig1, sig2);
    assert_eq!(QSignal::new(42).raw(), 42);
}

#[test]
fn test_reserved_signals_precede_user() {
    for sig in [QSignal::INIT, QSignal::ENTRY, QSignal::EXIT, QSignal::EMPTY] {
        assert!(sig < QSignal::USER);
    }
}

#[test]
fn test_static_event_signal() {
    let evt: QEvt = (&TIMEOUT).into();
    assert_eq!(evt.sig(), QSignal(7));
    assert!(evt.with_payload(|bytes| bytes.is_empty()));
}

#[test]
fn test_static_event_clone_is_cheap() {
    let evt: QEvt = (&DATA).into();
    let copy = evt.clone();
    assert_eq!(copy.sig(), evt.sig());
    assert_eq!(copy.ref_ctr(), 0);
    let mut buf = [0u8; 4];
    assert_eq!(copy.payload(&mut buf), 2);
    assert_eq!(&buf[..2], &[0xAA, 0x55]);
}
