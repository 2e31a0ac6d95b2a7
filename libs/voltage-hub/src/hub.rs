//! Modbus hub
//!
//! Owns the transport and serializes every bus transaction behind one
//! exclusive gate. The gate also guards the pacing timestamp, so the
//! cooldown between transactions holds no matter how many callers queue.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, trace};

use crate::batch::{plan_batches, BatchLimits};
use crate::error::{HubError, Result};
use crate::transport::{ModbusTransport, ReadResponse};

/// Register address to register word
pub type RegisterMap = HashMap<u16, u16>;

struct HubInner {
    transport: Box<dyn ModbusTransport>,
    last_call_finished_at: Option<Instant>,
}

impl HubInner {
    /// Wait out the remaining cooldown of the previous transaction
    async fn cooldown(&mut self, message_wait: Option<Duration>) {
        let (Some(wait), Some(finished_at)) = (message_wait, self.last_call_finished_at) else {
            return;
        };
        let ready_at = finished_at + wait;
        let now = Instant::now();
        if ready_at > now {
            let delay = ready_at - now;
            debug!("Cooldown {:?} before next transaction", delay);
            tokio::time::sleep(delay).await;
        }
    }

    fn mark_finished(&mut self) {
        self.last_call_finished_at = Some(Instant::now());
    }
}

/// Thread-safe wrapper around one Modbus transport
pub struct ModbusHub {
    inner: Mutex<HubInner>,
    message_wait: Option<Duration>,
    limits: BatchLimits,
}

impl ModbusHub {
    /// `message_wait` is the minimum spacing between the end of one
    /// transaction and the start of the next
    pub fn new(transport: impl ModbusTransport + 'static, message_wait: Option<Duration>) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                transport: Box::new(transport),
                last_call_finished_at: None,
            }),
            message_wait: message_wait.filter(|wait| !wait.is_zero()),
            limits: BatchLimits::default(),
        }
    }

    pub fn with_batch_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn batch_limits(&self) -> BatchLimits {
        self.limits
    }

    pub fn message_wait(&self) -> Option<Duration> {
        self.message_wait
    }

    /// Connect the underlying transport, no retry
    pub async fn connect(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        inner.transport.connect().await
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.transport.is_connected()
    }

    pub async fn close(&self) {
        self.inner.lock().await.transport.close().await;
    }

    /// Read `registers` with as few transactions as the batch limits allow
    ///
    /// The gate is held for the whole call. An exception reply from any
    /// batch discards everything read so far and yields an empty map;
    /// transport faults are returned as errors.
    pub async fn batch_read<I>(&self, registers: I, slave: u8) -> Result<RegisterMap>
    where
        I: IntoIterator<Item = u16>,
    {
        let batches = plan_batches(registers, self.limits);
        let mut data = RegisterMap::new();
        if batches.is_empty() {
            return Ok(data);
        }

        debug!(
            "Batch read: {} registers in {} transactions (slave {})",
            batches.iter().map(|b| b.registers.len()).sum::<usize>(),
            batches.len(),
            slave
        );

        let mut inner = self.inner.lock().await;
        for batch in &batches {
            inner.cooldown(self.message_wait).await;
            let result = inner
                .transport
                .read_holding_registers(batch.start, batch.count, slave)
                .await;
            inner.mark_finished();

            let words = match result? {
                ReadResponse::Registers(words) => words,
                response @ ReadResponse::Exception { .. } => {
                    error!(
                        "Error reading registers at {} (count {}): {:?}",
                        batch.start, batch.count, response
                    );
                    return Ok(RegisterMap::new());
                },
            };

            if words.len() < batch.count as usize {
                return Err(HubError::protocol(format!(
                    "Short read at {}: expected {} registers, got {}",
                    batch.start,
                    batch.count,
                    words.len()
                )));
            }

            trace!(
                "Read {} registers at {}: {:?}",
                batch.count,
                batch.start,
                words
            );
            for &register in &batch.registers {
                data.insert(register, words[batch.offset_of(register)]);
            }
        }

        Ok(data)
    }

    /// Write one holding register under the same gate and pacing as reads
    pub async fn write_register(&self, register: u16, value: u16, slave: u8) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.cooldown(self.message_wait).await;
        let result = inner.transport.write_register(register, value, slave).await;
        inner.mark_finished();

        if let Err(e) = &result {
            error!("Error writing register {} = {}: {}", register, value, e);
        } else {
            debug!("Wrote register {} = {} (slave {})", register, value, slave);
        }
        result
    }
}

impl std::fmt::Debug for ModbusHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusHub")
            .field("message_wait", &self.message_wait)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
