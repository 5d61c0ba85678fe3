//! Memory management tests for qp-mem

use qp_core::{QEvt, QEvtHandle, QEvtStore, QSignal};
use qp_mem::{QMPool, QPoolStats};

fn leak_pool<const B: usize, const N: usize>() -> &'static QMPool<B, N> {
    Box::leak(Box::new(QMPool::new()))
}

#[test]
fn test_pool_stats_utilization() {
    let mut stats = QPoolStats::new(10);
    stats.on_alloc();
    stats.on_alloc();
    assert_eq!(stats.utilization(), 20);
}

#[test]
fn test_matched_get_put_sequence() {
    let pool: QMPool<16, 5> = QMPool::new();
    let mut taken = Vec::new();
    for _ in 0..5 {
        taken.push(pool.get(None).unwrap());
        assert!(pool.stats().free_blocks <= 5);
    }
    assert!(pool.stats().is_exhausted());
    for block in taken.drain(..).rev() {
        pool.put(block);
    }
    assert_eq!(pool.stats().free_blocks, 5);
    assert_eq!(pool.stats().min_free_blocks, 0);
}

#[test]
fn test_event_handle_refcount() {
    let pool = leak_pool::<8, 2>();
    let handle = QEvtHandle::alloc(pool, 1, QSignal(10), &[1, 2, 3], None).unwrap();
    assert_eq!(handle.ref_ctr(), 1);
    assert_eq!(pool.n_free(), 1);

    let second = handle.clone();
    assert_eq!(handle.ref_ctr(), 2);

    drop(handle);
    assert_eq!(second.ref_ctr(), 1);
    assert_eq!(pool.n_free(), 1);

    drop(second);
    assert_eq!(pool.n_free(), 2);
}

#[test]
fn test_event_payload_roundtrip_through_pool() {
    let pool = leak_pool::<8, 1>();
    let evt = QEvt::from(QEvtHandle::alloc(pool, 1, QSignal(11), &[7, 8], None).unwrap());
    assert_eq!(evt.sig(), QSignal(11));
    assert_eq!(evt.pool_id(), 1);
    assert_eq!(evt.with_payload(|bytes| bytes.to_vec()), vec![7, 8]);
}

#[test]
fn test_event_alloc_with_margin() {
    let pool = leak_pool::<8, 2>();
    let first = QEvtHandle::alloc(pool, 1, QSignal(12), &[], Some(1));
    assert!(first.is_some());
    assert!(QEvtHandle::alloc(pool, 1, QSignal(12), &[], Some(1)).is_none());
    assert_eq!(pool.n_min(), 1);
}

#[test]
#[should_panic(expected = "fatal error")]
fn test_oversized_payload_is_fatal() {
    let pool = leak_pool::<2, 1>();
    let _ = QEvtHandle::alloc(pool, 1, QSignal(13), &[0; 3], None);
}
