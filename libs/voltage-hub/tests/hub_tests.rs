//! ModbusHub integration tests against the in-memory transport

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Call, MockTransport};
use tracing_test::traced_test;
use voltage_hub::{BatchLimits, HubError, ModbusHub};

fn hub(mock: &MockTransport, message_wait: Option<Duration>) -> ModbusHub {
    ModbusHub::new(mock.clone(), message_wait)
}

// ========== Batched reads ==========

#[tokio::test]
async fn test_batch_read_splits_on_gap() {
    let mock = MockTransport::with_registers([(10, 100), (11, 110), (12, 120), (20, 200)]);
    let hub = hub(&mock, None);

    let data = hub.batch_read([20, 11, 10, 12], 1).await.unwrap();

    assert_eq!(mock.reads(), vec![(10, 3), (20, 1)]);
    assert_eq!(data.len(), 4);
    assert_eq!(data[&10], 100);
    assert_eq!(data[&12], 120);
    assert_eq!(data[&20], 200);
}

#[tokio::test]
async fn test_batch_read_splits_on_width() {
    let mock = MockTransport::with_registers([(5, 1), (6, 2), (70, 3)]);
    let hub = hub(&mock, None);

    let data = hub.batch_read([5, 6, 70], 1).await.unwrap();

    assert_eq!(mock.reads(), vec![(5, 2), (70, 1)]);
    assert_eq!(data.len(), 3);
}

#[tokio::test]
async fn test_filler_registers_are_not_projected() {
    let mock = MockTransport::with_registers([(100, 1), (101, 99), (102, 2)]);
    let hub = hub(&mock, None).with_batch_limits(BatchLimits {
        max_registers: 64,
        max_gap: 2,
    });

    let data = hub.batch_read([100, 102], 1).await.unwrap();

    assert_eq!(mock.reads(), vec![(100, 3)]);
    assert_eq!(data.len(), 2);
    assert!(!data.contains_key(&101));
    assert_eq!(data[&102], 2);
}

#[tokio::test]
async fn test_batch_read_passes_slave_id() {
    let mock = MockTransport::new();
    let hub = hub(&mock, None);

    hub.batch_read([1], 7).await.unwrap();

    assert_eq!(
        mock.calls()[0].call,
        Call::Read {
            address: 1,
            count: 1,
            slave: 7
        }
    );
}

#[tokio::test]
async fn test_empty_request_issues_no_transaction() {
    let mock = MockTransport::new();
    let hub = hub(&mock, None);

    let data = hub.batch_read(Vec::new(), 1).await.unwrap();

    assert!(data.is_empty());
    assert_eq!(mock.call_count(), 0);
}

// ========== Failures ==========

#[tokio::test]
#[traced_test]
async fn test_exception_discards_whole_read() {
    let mock = MockTransport::with_registers([(10, 1), (11, 2), (20, 3), (40, 4)]);
    mock.exception_at(20);
    let hub = hub(&mock, None);

    let data = hub.batch_read([10, 11, 20, 40], 1).await.unwrap();

    // The first batch succeeded but nothing of it is returned
    assert!(data.is_empty());
    // The read stops at the failing batch
    assert_eq!(mock.reads(), vec![(10, 2), (20, 1)]);
    assert!(logs_contain("Error reading registers at 20 (count 1)"));
}

#[tokio::test]
async fn test_transport_fault_propagates() {
    let mock = MockTransport::with_registers([(10, 1)]);
    mock.fault_at(10);
    let hub = hub(&mock, None);

    let err = hub.batch_read([10], 1).await.unwrap_err();

    assert!(matches!(err, HubError::Io(_)));
    assert!(err.needs_reconnect());
    assert!(!hub.is_connected().await);
}

#[tokio::test]
async fn test_write_goes_to_transport() {
    let mock = MockTransport::new();
    let hub = hub(&mock, None);

    hub.write_register(2168, 1, 1).await.unwrap();
    assert_eq!(mock.register(2168), Some(1));

    mock.fail_writes();
    let err = hub.write_register(2168, 0, 1).await.unwrap_err();
    assert!(matches!(err, HubError::Exception { function_code: 0x06, .. }));
    assert_eq!(mock.register(2168), Some(1));
}

#[tokio::test]
async fn test_connect_delegates_without_retry() {
    let mock = MockTransport::new();
    mock.set_connect_result(false);
    let hub = hub(&mock, None);

    assert!(!hub.connect().await.unwrap());
    assert!(!hub.is_connected().await);

    mock.set_connect_result(true);
    assert!(hub.connect().await.unwrap());
    assert!(hub.is_connected().await);
}

// ========== Pacing ==========

#[tokio::test(start_paused = true)]
async fn test_cooldown_between_batches() {
    let wait = Duration::from_millis(100);
    let mock = MockTransport::with_registers([(10, 1), (20, 2), (30, 3)]);
    let hub = hub(&mock, Some(wait));

    hub.batch_read([10, 20, 30], 1).await.unwrap();

    let calls = mock.calls();
    assert_eq!(calls.len(), 3);
    for pair in calls.windows(2) {
        assert!(pair[1].started - pair[0].finished >= wait);
    }
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_spans_reads_and_writes() {
    let wait = Duration::from_millis(250);
    let mock = MockTransport::new();
    let hub = hub(&mock, Some(wait));

    hub.batch_read([1], 1).await.unwrap();
    hub.write_register(1, 5, 1).await.unwrap();
    hub.batch_read([1], 1).await.unwrap();

    let calls = mock.calls();
    assert!(matches!(calls[1].call, Call::Write { .. }));
    for pair in calls.windows(2) {
        assert!(pair[1].started - pair[0].finished >= wait);
    }
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_applies_after_failed_transaction() {
    let wait = Duration::from_millis(100);
    let mock = MockTransport::new();
    mock.exception_at(1);
    let hub = hub(&mock, Some(wait));

    let data = hub.batch_read([1], 1).await.unwrap();
    assert!(data.is_empty());
    hub.batch_read([2], 1).await.unwrap();

    let calls = mock.calls();
    assert!(calls[1].started - calls[0].finished >= wait);
}

#[tokio::test(start_paused = true)]
async fn test_no_cooldown_when_spacing_already_elapsed() {
    let wait = Duration::from_millis(100);
    let mock = MockTransport::new();
    let hub = hub(&mock, Some(wait));

    hub.batch_read([1], 1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    let before = tokio::time::Instant::now();
    hub.batch_read([1], 1).await.unwrap();

    assert_eq!(mock.calls()[1].started, before);
}

// ========== Serialization ==========

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_never_overlap_on_the_bus() {
    let mock = MockTransport::with_registers([(1, 1), (50, 2), (200, 3)]);
    mock.set_latency(Duration::from_millis(20));
    let hub = Arc::new(hub(&mock, None));

    let (a, b, c, d) = tokio::join!(
        hub.batch_read([1, 50], 1),
        hub.write_register(7, 7, 1),
        hub.batch_read([200], 1),
        hub.batch_read([1, 200], 1),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();
    d.unwrap();

    assert_eq!(mock.call_count(), 6);
    assert_eq!(mock.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_batch_read_holds_gate_for_whole_call() {
    let mock = MockTransport::with_registers([(1, 1), (100, 2)]);
    mock.set_latency(Duration::from_millis(10));
    let hub = Arc::new(hub(&mock, None));

    let (read, write) = tokio::join!(hub.batch_read([1, 100], 1), hub.write_register(5, 5, 1));
    read.unwrap();
    write.unwrap();

    // Both reads of the first call complete before the write starts
    let calls: Vec<Call> = mock.calls().into_iter().map(|record| record.call).collect();
    assert!(matches!(calls[0], Call::Read { address: 1, .. }));
    assert!(matches!(calls[1], Call::Read { address: 100, .. }));
    assert!(matches!(calls[2], Call::Write { address: 5, .. }));
}
