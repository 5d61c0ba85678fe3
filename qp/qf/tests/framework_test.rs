//! Framework registry tests for qp-qf
//!
//! These drive the registry directly, without a kernel: events are posted,
//! published or fired by ticks and then dispatched by hand with
//! `QF::dispatch`.

use std::sync::{Arc, Mutex};

use qp_core::{QError, QEvt, QSignal, QStaticEvt};
use qp_mem::QMPool;
use qp_qep::QHsm;
use qp_qf::{
    QActiveHsm, QActiveReturn, QCtx, QContext, QEQueue, QFConfig, QStateReturn, QTimeEvt, QF, QF_MAX_TIMEEVT,
};

const PING: QSignal = QSignal(10);
const NEWS: QSignal = QSignal(11);
const TIMEOUT: QSignal = QSignal(12);

static PING_EVT: QStaticEvt = QStaticEvt::new(PING);

type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    prio: u8,
    subs: &'static [QSignal],
    log: Log,
}

impl Recorder {
    fn initial(me: &mut Recorder, _e: &QEvt, ctx: &QCtx) -> QActiveReturn<Recorder> {
        for sig in me.subs {
            ctx.subscribe(me.prio, *sig);
        }
        QStateReturn::Initial(Recorder::active)
    }

    fn active(me: &mut Recorder, e: &QEvt, _ctx: &QCtx) -> QActiveReturn<Recorder> {
        if e.sig().is_reserved() {
            return QStateReturn::Super(QHsm::top);
        }
        let entry = format!("p{}:sig{}:ref{}", me.prio, e.sig().0, e.ref_ctr());
        me.log.lock().unwrap().push(entry);
        QStateReturn::Handled
    }
}

fn spawn(qf: &QF, prio: u8, subs: &'static [QSignal], log: &Log) {
    let ao = Box::leak(Box::new(QActiveHsm::new(
        Recorder {
            prio,
            subs,
            log: log.clone(),
        },
        Recorder::initial,
    )));
    let queue = Box::leak(Box::new(QEQueue::<4>::new()));
    qf.start(prio, ao, queue);
}

fn leak_pool<const B: usize, const N: usize>() -> &'static QMPool<B, N> {
    Box::leak(Box::new(QMPool::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[test]
fn test_ready_set_tracks_mailboxes() {
    let qf = QF::new(QFConfig::DEFAULT);
    let log = Log::default();
    for prio in 1..=3 {
        spawn(&qf, prio, &[], &log);
    }

    let check = |qf: &QF| {
        for prio in 1..=3 {
            assert_eq!(qf.ready_set().contains(prio), qf.queue_len(prio) > 0);
        }
    };

    check(&qf);
    qf.post(2, (&PING_EVT).into(), None);
    check(&qf);
    qf.post(3, (&PING_EVT).into(), None);
    qf.post(3, (&PING_EVT).into(), None);
    check(&qf);
    assert_eq!(qf.ready_set().find_max(), Some(3));

    assert!(qf.dispatch(3, &qf));
    check(&qf);
    assert!(qf.dispatch(3, &qf));
    check(&qf);
    assert!(!qf.dispatch(3, &qf));
    assert_eq!(qf.ready_set().find_max(), Some(2));
    assert!(qf.dispatch(2, &qf));
    check(&qf);
    assert!(qf.ready_set().is_empty());
}

#[test]
fn test_post_lifo_jumps_the_queue() {
    let qf = QF::new(QFConfig::DEFAULT);
    let log = Log::default();
    spawn(&qf, 1, &[], &log);
    static NEWS_EVT: QStaticEvt = QStaticEvt::new(NEWS);

    qf.post(1, (&PING_EVT).into(), None);
    qf.post_lifo(1, (&NEWS_EVT).into());
    while qf.dispatch(1, &qf) {}
    assert_eq!(entries(&log), vec!["p1:sig11:ref0", "p1:sig10:ref0"]);
}

#[test]
fn test_publish_recycles_after_last_subscriber() {
    let qf = QF::new(QFConfig::DEFAULT);
    let pool = leak_pool::<16, 4>();
    assert_eq!(qf.add_pool(pool), Ok(1));

    let log = Log::default();
    for prio in [1, 2, 3] {
        spawn(&qf, prio, &[NEWS], &log);
    }
    assert_eq!(qf.subscribers(NEWS).iter().collect::<Vec<_>>(), vec![3, 2, 1]);

    let e = qf.new_evt(NEWS, &[7]);
    assert_eq!(e.pool_id(), 1);
    assert_eq!(qf.pool_free(1), 3);
    qf.publish(e);
    assert_eq!(qf.pool_free(1), 3);

    assert!(qf.dispatch(3, &qf));
    assert_eq!(qf.pool_free(1), 3);
    assert!(qf.dispatch(2, &qf));
    assert_eq!(qf.pool_free(1), 3);
    assert!(qf.dispatch(1, &qf));
    assert_eq!(qf.pool_free(1), 4);

    assert_eq!(
        entries(&log),
        vec!["p3:sig11:ref3", "p2:sig11:ref2", "p1:sig11:ref1"]
    );
    assert_eq!(qf.pool_min_free(1), 3);
}

#[test]
fn test_publish_without_subscribers_recycles_immediately() {
    let qf = QF::new(QFConfig::DEFAULT);
    let pool = leak_pool::<16, 2>();
    qf.add_pool(pool).unwrap();
    qf.publish(qf.new_evt(NEWS, &[]));
    assert_eq!(qf.pool_free(1), 2);
}

#[test]
fn test_margin_rejection_releases_event() {
    let qf = QF::new(QFConfig::DEFAULT);
    let pool = leak_pool::<8, 4>();
    qf.add_pool(pool).unwrap();
    let log = Log::default();
    spawn(&qf, 1, &[], &log);

    assert!(qf.post(1, qf.new_evt(PING, &[]), Some(2)));
    assert!(qf.post(1, qf.new_evt(PING, &[]), Some(2)));
    assert!(!qf.post(1, qf.new_evt(PING, &[]), Some(2)));
    assert_eq!(qf.queue_len(1), 2);
    assert_eq!(qf.pool_free(1), 2);
    assert_eq!(qf.queue_min_free(1), 2);
}

#[test]
fn test_event_allocation_picks_best_fit() {
    let qf = QF::new(QFConfig::DEFAULT);
    qf.add_pool(leak_pool::<8, 2>()).unwrap();
    qf.add_pool(leak_pool::<32, 2>()).unwrap();

    assert_eq!(qf.new_evt(PING, &[0; 4]).pool_id(), 1);
    assert_eq!(qf.new_evt(PING, &[0; 20]).pool_id(), 2);

    let held = [qf.new_evt(PING, &[]), qf.new_evt(PING, &[])];
    assert!(qf.try_new_evt(PING, &[], 0).is_none());
    drop(held);
    assert!(qf.try_new_evt(PING, &[], 1).is_some());
}

#[test]
fn test_pools_must_grow() {
    let qf = QF::new(QFConfig::DEFAULT);
    qf.add_pool(leak_pool::<16, 2>()).unwrap();
    assert_eq!(qf.add_pool(leak_pool::<8, 2>()), Err(QError::PoolOrder));
    qf.add_pool(leak_pool::<32, 2>()).unwrap();
    qf.add_pool(leak_pool::<64, 2>()).unwrap();
    assert_eq!(qf.add_pool(leak_pool::<128, 2>()), Err(QError::TooManyPools));
}

#[test]
fn test_one_shot_time_event_fires_once() {
    static ONE_SHOT: QTimeEvt = QTimeEvt::new(TIMEOUT, 1, 0);
    let qf = QF::new(QFConfig::DEFAULT);
    let log = Log::default();
    spawn(&qf, 1, &[], &log);

    qf.arm(&ONE_SHOT, 3, 0);
    assert!(!qf.no_time_events_active(0));
    qf.tick(0);
    qf.tick(0);
    assert_eq!(qf.queue_len(1), 0);
    qf.tick(0);
    assert_eq!(qf.queue_len(1), 1);
    assert!(!ONE_SHOT.is_armed());
    assert!(qf.no_time_events_active(0));

    for _ in 0..5 {
        qf.tick(0);
    }
    assert_eq!(qf.queue_len(1), 1);
    assert!(!qf.disarm(&ONE_SHOT));
}

#[test]
fn test_periodic_time_event_until_disarmed() {
    static PERIODIC: QTimeEvt = QTimeEvt::new(TIMEOUT, 1, 1);
    let qf = QF::new(QFConfig::DEFAULT);
    let log = Log::default();
    spawn(&qf, 1, &[], &log);

    qf.arm(&PERIODIC, 3, 3);
    let mut fired_at = Vec::new();
    for tick in 1..=9 {
        qf.tick(1);
        if qf.dispatch(1, &qf) {
            fired_at.push(tick);
        }
    }
    assert_eq!(fired_at, vec![3, 6, 9]);

    assert!(qf.disarm(&PERIODIC));
    assert!(PERIODIC.was_disarmed());
    for _ in 0..6 {
        qf.tick(1);
    }
    assert_eq!(qf.queue_len(1), 0);
    assert!(qf.no_time_events_active(1));
}

#[test]
fn test_rearm_restarts_countdown() {
    static WATCHDOG: QTimeEvt = QTimeEvt::new(TIMEOUT, 1, 2);
    let qf = QF::new(QFConfig::DEFAULT);
    let log = Log::default();
    spawn(&qf, 1, &[], &log);

    qf.arm(&WATCHDOG, 2, 0);
    qf.tick(2);
    assert!(qf.rearm(&WATCHDOG, 2));
    qf.tick(2);
    assert_eq!(qf.queue_len(1), 0);
    qf.tick(2);
    assert_eq!(qf.queue_len(1), 1);
    assert!(!qf.rearm(&WATCHDOG, 1));
    qf.tick(2);
    assert_eq!(qf.queue_len(1), 2);
}

#[test]
fn test_disarm_frees_slot_in_full_rate_list() {
    let qf = QF::new(QFConfig::DEFAULT);
    let log = Log::default();
    spawn(&qf, 1, &[], &log);

    let tes: Vec<&'static QTimeEvt> = (0..=QF_MAX_TIMEEVT)
        .map(|_| &*Box::leak(Box::new(QTimeEvt::new(TIMEOUT, 1, 0))))
        .collect();
    for &te in &tes[..QF_MAX_TIMEEVT] {
        qf.arm(te, 5, 0);
    }

    assert!(qf.disarm(tes[0]));
    qf.arm(tes[QF_MAX_TIMEEVT], 1, 0);
    qf.tick(0);
    assert_eq!(qf.queue_len(1), 1);
    assert!(!tes[0].is_armed());
}

#[test]
fn test_rearmed_time_event_fires_after_later_ones() {
    const LATE: QSignal = QSignal(13);
    static FIRST: QTimeEvt = QTimeEvt::new(TIMEOUT, 1, 0);
    static SECOND: QTimeEvt = QTimeEvt::new(LATE, 1, 0);
    let qf = QF::new(QFConfig::DEFAULT);
    let log = Log::default();
    spawn(&qf, 1, &[], &log);

    qf.arm(&FIRST, 2, 0);
    qf.arm(&SECOND, 2, 0);
    assert!(qf.disarm(&FIRST));
    qf.arm(&FIRST, 2, 0);
    qf.tick(0);
    qf.tick(0);
    while qf.dispatch(1, &qf) {}
    assert_eq!(entries(&log), vec!["p1:sig13:ref0", "p1:sig12:ref0"]);
}

#[test]
fn test_stop_unsubscribes_and_releases() {
    static ORPHAN: QTimeEvt = QTimeEvt::new(TIMEOUT, 4, 0);
    let qf = QF::new(QFConfig::DEFAULT);
    let pool = leak_pool::<8, 4>();
    qf.add_pool(pool).unwrap();
    let log = Log::default();
    spawn(&qf, 4, &[NEWS, PING], &log);

    qf.post(4, qf.new_evt(PING, &[]), None);
    qf.post(4, qf.new_evt(PING, &[]), None);
    assert_eq!(qf.pool_free(1), 2);
    qf.arm(&ORPHAN, 3, 0);

    qf.stop(4);
    assert!(ORPHAN.was_disarmed());
    assert!(qf.no_time_events_active(0));
    assert!(!qf.is_registered(4));
    assert!(qf.subscribers(NEWS).is_empty());
    assert!(!qf.ready_set().contains(4));
    assert_eq!(qf.pool_free(1), 4);
}

#[test]
fn test_context_forwards_to_registry() {
    let qf = QF::new(QFConfig::DEFAULT);
    let log = Log::default();
    spawn(&qf, 5, &[], &log);
    let ctx: &QCtx = &qf;
    ctx.post(5, (&PING_EVT).into());
    assert!(ctx.try_post(5, (&PING_EVT).into(), 0));
    assert!(!ctx.lock(10).is_locked());
    assert_eq!(qf.queue_len(5), 2);
}

#[test]
#[should_panic(expected = "fatal error")]
fn test_duplicate_priority_is_fatal() {
    let qf = QF::new(QFConfig::DEFAULT);
    let log = Log::default();
    spawn(&qf, 1, &[], &log);
    spawn(&qf, 1, &[], &log);
}

#[test]
#[should_panic(expected = "fatal error")]
fn test_overflow_without_margin_is_fatal() {
    let qf = QF::new(QFConfig::DEFAULT);
    let log = Log::default();
    spawn(&qf, 1, &[], &log);
    for _ in 0..5 {
        qf.post(1, (&PING_EVT).into(), None);
    }
}

#[test]
#[should_panic(expected = "fatal error")]
fn test_post_to_unregistered_priority_is_fatal() {
    let qf = QF::new(QFConfig::DEFAULT);
    qf.post(9, (&PING_EVT).into(), None);
}

#[test]
#[should_panic(expected = "fatal error")]
fn test_arming_armed_time_event_is_fatal() {
    static TWICE: QTimeEvt = QTimeEvt::new(TIMEOUT, 1, 3);
    let qf = QF::new(QFConfig::DEFAULT);
    qf.arm(&TWICE, 5, 0);
    qf.arm(&TWICE, 5, 0);
}
