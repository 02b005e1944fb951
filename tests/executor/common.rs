//! Common test utilities for executor tests

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlexec::{
    Concurrency, Connection, ConnectionError, ConnectionSource, ExecutorConfig, SourceError,
    SourceResult, SqlExecutor, TxnOp,
};

/// Every call the executor makes against the mock, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Acquire(usize),
    Begin(usize),
    Commit(usize),
    Rollback(usize),
    Release(usize),
}

/// Shared recording of calls plus injectable failures
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
    next_conn: AtomicUsize,
    pub fail_acquire: AtomicBool,
    pub fail_begin: AtomicBool,
    pub fail_commit: AtomicBool,
    pub fail_rollback: AtomicBool,
}

impl Recorder {
    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| matches(e)).count()
    }

    pub fn acquires(&self) -> usize {
        self.count(|e| matches!(e, Event::Acquire(_)))
    }

    pub fn begins(&self) -> usize {
        self.count(|e| matches!(e, Event::Begin(_)))
    }

    pub fn commits(&self) -> usize {
        self.count(|e| matches!(e, Event::Commit(_)))
    }

    pub fn rollbacks(&self) -> usize {
        self.count(|e| matches!(e, Event::Rollback(_)))
    }

    pub fn releases(&self) -> usize {
        self.count(|e| matches!(e, Event::Release(_)))
    }
}

fn injected(op: TxnOp) -> ConnectionError {
    ConnectionError::new(op, format!("injected {} failure", op))
}

pub struct MockConn {
    pub id: usize,
    recorder: Arc<Recorder>,
}

impl Connection for MockConn {
    fn begin(&mut self) -> Result<(), ConnectionError> {
        self.recorder.record(Event::Begin(self.id));
        if self.recorder.fail_begin.load(Ordering::SeqCst) {
            return Err(injected(TxnOp::Begin));
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        self.recorder.record(Event::Commit(self.id));
        if self.recorder.fail_commit.load(Ordering::SeqCst) {
            return Err(injected(TxnOp::Commit));
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ConnectionError> {
        self.recorder.record(Event::Rollback(self.id));
        if self.recorder.fail_rollback.load(Ordering::SeqCst) {
            return Err(injected(TxnOp::Rollback));
        }
        Ok(())
    }
}

/// Connection source that hands out a fresh numbered connection per acquire
#[derive(Default)]
pub struct MockSource {
    pub recorder: Arc<Recorder>,
}

impl ConnectionSource for MockSource {
    type Connection = MockConn;

    fn acquire(&self) -> SourceResult<MockConn> {
        if self.recorder.fail_acquire.load(Ordering::SeqCst) {
            return Err(SourceError::Timeout(Duration::from_millis(10)));
        }
        let id = self.recorder.next_conn.fetch_add(1, Ordering::SeqCst);
        self.recorder.record(Event::Acquire(id));
        Ok(MockConn {
            id,
            recorder: Arc::clone(&self.recorder),
        })
    }

    fn release(&self, conn: MockConn) {
        self.recorder.record(Event::Release(conn.id));
    }
}

/// Create a running executor over a fresh mock source
pub fn create_executor(concurrency: Concurrency) -> (SqlExecutor<MockSource>, Arc<Recorder>) {
    create_executor_with(ExecutorConfig::default(), concurrency)
}

/// Route executor logs to the test harness; `RUST_LOG` is not consulted
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Create a running executor with an explicit config
pub fn create_executor_with(
    config: ExecutorConfig,
    concurrency: Concurrency,
) -> (SqlExecutor<MockSource>, Arc<Recorder>) {
    init_tracing();
    let source = MockSource::default();
    let recorder = Arc::clone(&source.recorder);
    let executor = SqlExecutor::new(config);
    executor.initialize(Arc::new(source), concurrency).unwrap();
    (executor, recorder)
}

/// Poll until `condition` holds or five seconds pass
#[allow(dead_code)]
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
