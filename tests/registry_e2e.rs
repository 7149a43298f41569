use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use logexpect::{
    BatchHandler, ConfigError, Dispatch, LogCursor, LogExpectError, LogSource, MemoryLog, MemoryLogs, Outcome,
    Registry, RegistryConfig, SourceConfig, SourceError, Tag, Transaction,
};

fn fast() -> RegistryConfig {
    RegistryConfig {
        poll_interval: Duration::from_millis(1),
        ..RegistryConfig::default()
    }
}

fn setup() -> (Registry, MemoryLog) {
    let logs = Arc::new(MemoryLogs::new());
    let log = logs.create("v1").unwrap();
    (Registry::with_config(logs, fast()), log)
}

/// Appends `txs` one at a time from another thread, after the worker had a
/// chance to open its tail cursor.
fn produce(log: &MemoryLog, txs: Vec<Transaction>) -> thread::JoinHandle<()> {
    let log = log.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        for tx in txs {
            log.append(tx).unwrap();
            thread::sleep(Duration::from_millis(1));
        }
    })
}

fn scenario_rules(registry: &mut Registry) {
    registry.add_rule("l1", &["0", "*", "ReqStart"]).unwrap();
    registry.add_rule("l1", &["0", "=", "ReqURL", "/foo"]).unwrap();
}

#[test]
fn scenario_a_backreference_succeeds() {
    let (mut registry, log) = setup();
    registry.command("l1", &["-v", "v1", "-g", "raw"]).unwrap();
    scenario_rules(&mut registry);
    registry.start("l1").unwrap();

    let producer = produce(
        &log,
        vec![
            Transaction::client(7).record(Tag::ReqStart, "127.0.0.1 4711"),
            Transaction::client(7).record(Tag::ReqUrl, "/foo/bar"),
        ],
    );
    registry.wait("l1").unwrap();
    producer.join().unwrap();
    assert_eq!(log.open_readers(), 0);
}

#[test]
fn scenario_b_backreference_mismatch_fails() {
    let (mut registry, log) = setup();
    registry.command("l1", &["-v", "v1"]).unwrap();
    scenario_rules(&mut registry);
    registry.start("l1").unwrap();

    let producer = produce(
        &log,
        vec![
            Transaction::client(7).record(Tag::ReqStart, ""),
            Transaction::client(9).record(Tag::ReqUrl, "/foo"),
        ],
    );
    let err = registry.wait("l1").unwrap_err();
    producer.join().unwrap();

    let LogExpectError::Expectation(failure) = err else {
        panic!("expected a match failure, got {err:?}");
    };
    assert_eq!(failure.vxid.get(), 9);
    assert_eq!(failure.tag, "ReqURL");
    assert_eq!(failure.payload, "/foo");
    assert_eq!(failure.rule_index, 1);
    assert_eq!(log.open_readers(), 0);
}

#[test]
fn scenario_c_skip_budget_absorbs_noise() {
    let (mut registry, log) = setup();
    registry.command("l1", &["-v", "v1"]).unwrap();
    registry.add_rule("l1", &["2", "*", "BereqAcct"]).unwrap();
    registry.start("l1").unwrap();

    let producer = produce(
        &log,
        vec![
            Transaction::backend(3).record(Tag::BereqMethod, "GET"),
            Transaction::backend(3).record(Tag::BereqUrl, "/"),
            Transaction::backend(3).record(Tag::BereqAcct, "0 0 0 0 0 0"),
        ],
    );
    registry.wait("l1").unwrap();
    producer.join().unwrap();

    let report = registry.session("l1").unwrap().last_report().unwrap();
    assert_eq!(report.cursor.skip_count(), 0);
    assert_eq!(report.records_evaluated, 3);
}

#[test]
fn scenario_d_zero_budget_fails_on_noise() {
    let (mut registry, log) = setup();
    registry.command("l1", &["-v", "v1"]).unwrap();
    registry.add_rule("l1", &["0", "*", "BereqAcct"]).unwrap();
    registry.start("l1").unwrap();

    let producer = produce(
        &log,
        vec![
            Transaction::backend(3).record(Tag::BereqMethod, "GET"),
            Transaction::backend(3).record(Tag::BereqAcct, "0 0 0 0 0 0"),
        ],
    );
    let err = registry.wait("l1").unwrap_err();
    producer.join().unwrap();
    assert!(err.is_expectation());
}

#[test]
fn tag_filter_hides_noise_from_strict_rules() {
    let (mut registry, log) = setup();
    registry.command("l1", &["-v", "v1", "-i", "Req*"]).unwrap();
    registry.add_rule("l1", &["0", "*", "ReqStart"]).unwrap();
    registry.add_rule("l1", &["0", "=", "ReqMethod", "GET"]).unwrap();
    registry.start("l1").unwrap();

    let producer = produce(
        &log,
        vec![Transaction::client(11)
            .record(Tag::Begin, "req 10 rxreq")
            .record(Tag::ReqStart, "")
            .record(Tag::Timestamp, "Start: 0")
            .record(Tag::ReqMethod, "GET")],
    );
    registry.wait("l1").unwrap();
    producer.join().unwrap();
}

#[test]
fn query_limits_delivered_transactions() {
    let (mut registry, log) = setup();
    registry
        .command("l1", &["-v", "v1", "-q", "ReqURL ~ \"^/wanted\""])
        .unwrap();
    registry.add_rule("l1", &["0", "*", "ReqURL", "wanted"]).unwrap();
    registry.start("l1").unwrap();

    let producer = produce(
        &log,
        vec![
            Transaction::client(1).record(Tag::ReqUrl, "/other"),
            Transaction::client(2).record(Tag::ReqUrl, "/wanted"),
        ],
    );
    registry.wait("l1").unwrap();
    producer.join().unwrap();
}

#[test]
fn head_mode_reads_existing_records() {
    let (mut registry, log) = setup();
    log.append(Transaction::client(1).record(Tag::ReqStart, "")).unwrap();
    log.append(Transaction::client(1).record(Tag::End, "")).unwrap();

    registry.command("l1", &["-v", "v1", "-d", "1"]).unwrap();
    registry.add_rule("l1", &["0", "*", "ReqStart"]).unwrap();
    registry.add_rule("l1", &["0", "=", "End"]).unwrap();
    registry.run("l1").unwrap();
}

#[test]
fn explicit_batches_are_transparent_to_rules() {
    let (mut registry, log) = setup();
    registry.command("l1", &["-v", "v1"]).unwrap();
    registry.add_rule("l1", &["0", "*", "ReqStart"]).unwrap();
    registry.add_rule("l1", &["0", "*", "ReqStart"]).unwrap();
    registry.start("l1").unwrap();

    let writer = log.clone();
    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        writer
            .append_batch(vec![
                Transaction::client(1).record(Tag::ReqStart, ""),
                Transaction::client(2).record(Tag::ReqStart, ""),
            ])
            .unwrap();
    });
    registry.wait("l1").unwrap();
    producer.join().unwrap();
}

#[test]
fn overrun_is_a_source_error() {
    let logs = Arc::new(MemoryLogs::new());
    let log = logs.insert("v1", MemoryLog::with_capacity(1)).unwrap();
    let mut registry = Registry::with_config(
        logs,
        RegistryConfig {
            poll_interval: Duration::from_millis(500),
            ..RegistryConfig::default()
        },
    );
    registry.command("l1", &["-v", "v1"]).unwrap();
    registry.add_rule("l1", &["*", "*", "End"]).unwrap();
    registry.start("l1").unwrap();

    // The worker finds the log empty and sleeps; the writer laps it meanwhile.
    thread::sleep(Duration::from_millis(50));
    for n in 0..3 {
        log.append(Transaction::client(n).record(Tag::End, "")).unwrap();
    }
    let err = registry.wait("l1").unwrap_err();
    assert!(matches!(err, LogExpectError::Source(SourceError::Overrun { .. })), "{err:?}");
    assert_eq!(log.open_readers(), 0);
}

#[test]
fn unknown_endpoint_fails_at_start() {
    let (mut registry, _) = setup();
    registry.command("l1", &["-v", "nope"]).unwrap();
    registry.add_rule("l1", &["*", "*", "End"]).unwrap();
    let err = registry.start("l1").unwrap_err();
    assert!(matches!(err, LogExpectError::Source(SourceError::Open { .. })));
    assert!(!registry.session("l1").unwrap().is_running());
}

#[test]
fn configuration_errors_surface_immediately() {
    let (mut registry, _) = setup();
    assert!(matches!(
        registry.add_rule("l1", &["x", "*", "End"]),
        Err(LogExpectError::Config(ConfigError::NotAnInteger { .. }))
    ));
    assert!(matches!(
        registry.add_rule("l1", &["0", "*", "NoSuchTag"]),
        Err(LogExpectError::Config(ConfigError::UnknownTag { .. }))
    ));
    assert!(matches!(
        registry.add_rule("l1", &["0", "*", "ReqURL", "(unclosed"]),
        Err(LogExpectError::Config(ConfigError::InvalidPattern { .. }))
    ));
    assert!(matches!(
        registry.start("l1"),
        Err(LogExpectError::Config(ConfigError::MissingEndpoint))
    ));
    assert!(matches!(
        registry.command("v1", &["-v", "v1"]),
        Err(LogExpectError::Config(ConfigError::InvalidName { .. }))
    ));
}

#[test]
fn rerun_with_same_rules_gives_same_verdict() {
    let (mut registry, log) = setup();
    registry.command("l1", &["-v", "v1", "-d", "1"]).unwrap();
    log.append(Transaction::client(4).record(Tag::ReqStart, "")).unwrap();
    log.append(Transaction::client(4).record(Tag::ReqUrl, "/bar")).unwrap();

    scenario_rules(&mut registry);
    let rules = registry.session("l1").unwrap().rules().to_vec();
    for _ in 0..2 {
        registry.replace_rules("l1", rules.clone()).unwrap();
        let err = registry.run("l1").unwrap_err();
        assert!(err.is_expectation());
    }
}

#[test]
fn reset_all_cancels_running_workers() {
    let (mut registry, log) = setup();
    for name in ["l1", "l2", "l3"] {
        registry.command(name, &["-v", "v1"]).unwrap();
        registry.add_rule(name, &["*", "*", "End"]).unwrap();
        registry.start(name).unwrap();
    }
    assert_eq!(log.open_readers(), 3);

    registry.reset_all();
    assert!(registry.is_empty());
    assert_eq!(log.open_readers(), 0);
}

/// Wraps a source and counts cursor closes.
struct CountingSource {
    inner: MemoryLogs,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

struct CountingCursor {
    inner: Box<dyn LogCursor>,
    closed: Arc<AtomicUsize>,
}

impl LogSource for CountingSource {
    fn open(&self, config: &SourceConfig) -> Result<Box<dyn LogCursor>, SourceError> {
        let inner = self.inner.open(config)?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingCursor {
            inner,
            closed: Arc::clone(&self.closed),
        }))
    }
}

impl LogCursor for CountingCursor {
    fn dispatch(&mut self, on_batch: &mut BatchHandler<'_>) -> Result<Dispatch, SourceError> {
        self.inner.dispatch(on_batch)
    }

    fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close();
    }
}

#[test]
fn every_finish_closes_the_cursor_once() {
    let closed = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(CountingSource {
        inner: MemoryLogs::new(),
        opened: AtomicUsize::new(0),
        closed: Arc::clone(&closed),
    });
    let log = source.inner.create("v1").unwrap();
    let mut registry = Registry::with_config(source.clone(), fast());

    // success
    registry.command("l1", &["-v", "v1", "-d", "1"]).unwrap();
    log.append(Transaction::client(1).record(Tag::End, "")).unwrap();
    registry.add_rule("l1", &["*", "*", "End"]).unwrap();
    registry.run("l1").unwrap();

    // failure
    registry.command("l2", &["-v", "v1", "-d", "1"]).unwrap();
    registry.add_rule("l2", &["0", "*", "ReqStart"]).unwrap();
    assert!(registry.run("l2").unwrap_err().is_expectation());

    // cancellation
    registry.command("l3", &["-v", "v1"]).unwrap();
    registry.add_rule("l3", &["*", "*", "ReqStart"]).unwrap();
    registry.start("l3").unwrap();
    registry.reset_all();

    assert_eq!(source.opened.load(Ordering::SeqCst), 3);
    assert_eq!(closed.load(Ordering::SeqCst), 3);
    assert_eq!(log.open_readers(), 0);
}

#[test]
fn cancelled_outcome_is_recorded_not_reported() {
    let (mut registry, _log) = setup();
    registry.command("l1", &["-v", "v1"]).unwrap();
    registry.add_rule("l1", &["*", "*", "End"]).unwrap();
    registry.start("l1").unwrap();
    registry.cancel("l1");
    registry.wait("l1").unwrap();
    assert_eq!(
        registry.session("l1").unwrap().last_report().unwrap().outcome,
        Outcome::Cancelled
    );
}

#[test]
fn second_start_waits_for_running_worker() {
    let (mut registry, log) = setup();
    registry.command("l1", &["-v", "v1"]).unwrap();
    registry.add_rule("l1", &["*", "*", "End"]).unwrap();
    registry.command("l1", &["-start"]).unwrap();
    let first = registry.session("l1").unwrap().run_id().unwrap();

    let producer = produce(&log, vec![Transaction::client(1).record(Tag::End, "")]);
    // Blocks until the first run sees its End record, then starts afresh.
    registry.command("l1", &["-start"]).unwrap();
    producer.join().unwrap();

    let session = registry.session("l1").unwrap();
    assert!(session.is_running());
    let second = session.run_id().unwrap();
    assert_ne!(first, second);

    log.append(Transaction::client(2).record(Tag::End, "")).unwrap();
    registry.wait("l1").unwrap();
    assert!(registry.session("l1").unwrap().last_report().unwrap().outcome.is_success());
    assert_eq!(log.open_readers(), 0);
}
