//! Common test utilities: an in-memory transport that records every call

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use voltage_hub::{ExceptionCode, HubError, ModbusTransport, ReadResponse, Result};

/// One transaction seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Read { address: u16, count: u16, slave: u8 },
    Write { address: u16, value: u16, slave: u8 },
}

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub call: Call,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Default)]
struct State {
    registers: HashMap<u16, u16>,
    exception_at: HashSet<u16>,
    fault_at: HashSet<u16>,
    fail_writes: bool,
    connect_result: Option<bool>,
    connected: bool,
    latency: Duration,
    calls: Vec<CallRecord>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Cloneable handle; every clone shares the same state so tests keep one
/// handle after moving another into the hub
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.state.lock().connected = true;
        mock
    }

    pub fn with_registers<I>(registers: I) -> Self
    where
        I: IntoIterator<Item = (u16, u16)>,
    {
        let mock = Self::new();
        mock.state.lock().registers.extend(registers);
        mock
    }

    pub fn set_register(&self, address: u16, value: u16) {
        self.state.lock().registers.insert(address, value);
    }

    /// Any read whose span covers `address` gets an exception reply
    pub fn exception_at(&self, address: u16) {
        self.state.lock().exception_at.insert(address);
    }

    /// Any read whose span covers `address` fails with a transport fault
    pub fn fault_at(&self, address: u16) {
        self.state.lock().fault_at.insert(address);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.exception_at.clear();
        state.fault_at.clear();
        state.fail_writes = false;
    }

    pub fn fail_writes(&self) {
        self.state.lock().fail_writes = true;
    }

    pub fn set_connect_result(&self, result: bool) {
        self.state.lock().connect_result = Some(result);
    }

    pub fn disconnect(&self) {
        self.state.lock().connected = false;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.state.lock().calls.clone()
    }

    pub fn reads(&self) -> Vec<(u16, u16)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|record| match record.call {
                Call::Read { address, count, .. } => Some((address, count)),
                Call::Write { .. } => None,
            })
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }

    pub fn register(&self, address: u16) -> Option<u16> {
        self.state.lock().registers.get(&address).copied()
    }

    fn begin(&self) -> (Instant, Duration) {
        let mut state = self.state.lock();
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);
        (Instant::now(), state.latency)
    }

    fn finish(&self, call: Call, started: Instant) {
        let mut state = self.state.lock();
        state.in_flight -= 1;
        state.calls.push(CallRecord {
            call,
            started,
            finished: Instant::now(),
        });
    }
}

#[async_trait]
impl ModbusTransport for MockTransport {
    async fn connect(&mut self) -> Result<bool> {
        let mut state = self.state.lock();
        let result = state.connect_result.unwrap_or(true);
        state.connected = result;
        Ok(result)
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        slave: u8,
    ) -> Result<ReadResponse> {
        let (started, latency) = self.begin();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let result = {
            let mut state = self.state.lock();
            let span = address..address + count;
            if !state.connected {
                Err(HubError::NotConnected)
            } else if span.clone().any(|a| state.fault_at.contains(&a)) {
                state.connected = false;
                Err(HubError::io("Connection reset by peer"))
            } else if span.clone().any(|a| state.exception_at.contains(&a)) {
                Ok(ReadResponse::Exception {
                    function_code: 0x03,
                    code: ExceptionCode::IllegalDataAddress,
                })
            } else {
                Ok(ReadResponse::Registers(
                    span.map(|a| state.registers.get(&a).copied().unwrap_or(0))
                        .collect(),
                ))
            }
        };

        self.finish(
            Call::Read {
                address,
                count,
                slave,
            },
            started,
        );
        result
    }

    async fn write_register(&mut self, address: u16, value: u16, slave: u8) -> Result<()> {
        let (started, latency) = self.begin();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let result = {
            let mut state = self.state.lock();
            if !state.connected {
                Err(HubError::NotConnected)
            } else if state.fail_writes {
                Err(HubError::Exception {
                    function_code: 0x06,
                    code: ExceptionCode::IllegalDataValue,
                })
            } else {
                state.registers.insert(address, value);
                Ok(())
            }
        };

        self.finish(
            Call::Write {
                address,
                value,
                slave,
            },
            started,
        );
        result
    }

    async fn close(&mut self) {
        self.state.lock().connected = false;
    }
}
