//! Config Tests
//!
//! Executors built from `sqlexec.toml`.

use crate::common::*;
use sqlexec::{Concurrency, ExecError, ExecutorConfig, SqlExecutor, CONFIG_FILE_NAME};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn executor_from_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(
        &path,
        r#"
concurrency = "3"
shutdown_grace_ms = 1500
thread_name_prefix = "orders-db"
"#,
    )
    .unwrap();

    let config = ExecutorConfig::from_file(&path).unwrap();
    assert_eq!(config.shutdown_grace(), Duration::from_millis(1500));

    let executor = SqlExecutor::new(config);
    executor
        .initialize_with_config(Arc::new(MockSource::default()))
        .unwrap();
    assert_eq!(executor.concurrency(), Concurrency::bounded(3));
    assert_eq!(executor.stats().workers, 3);

    let name = executor
        .submit(|_c, _x| Ok(std::thread::current().name().map(str::to_string)))
        .unwrap()
        .wait()
        .unwrap()
        .unwrap();
    assert!(name.starts_with("orders-db-"), "thread name was {}", name);
}

#[test]
fn generated_default_file_loads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    ExecutorConfig::write_default_if_missing(&path).unwrap();

    let config = ExecutorConfig::from_file(&path).unwrap();
    assert_eq!(config, ExecutorConfig::default());
    assert_eq!(config.concurrency().unwrap(), Concurrency::Serial);
}

#[test]
fn queue_depth_limits_waiting_tasks() {
    let config = ExecutorConfig::default().with_max_queue_depth(1);
    let (executor, _recorder) = create_executor_with(config, Concurrency::Serial);
    let (started_tx, started_rx) = std::sync::mpsc::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

    let running = executor
        .submit(move |_c, _x| {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            Ok(())
        })
        .unwrap();
    started_rx.recv().unwrap();

    let waiting = executor.submit(|_c, _x| Ok(())).unwrap();
    let err = executor.submit(|_c, _x| Ok(())).unwrap_err();
    assert!(matches!(err, ExecError::QueueFull { max_queue_depth: 1 }));
    assert!(err.is_rejected());

    release_tx.send(()).unwrap();
    running.wait().unwrap();
    waiting.wait().unwrap();
    assert_eq!(executor.stats().rejected, 1);
}
