//! Transport boundary
//!
//! The hub talks to the bus through an already-configured point-to-point
//! Modbus client. Connection policy (when to reconnect, how often) belongs to
//! whoever owns the hub, not to the transport.

use async_trait::async_trait;
use tokio_modbus::ExceptionCode;

use crate::error::Result;

/// Outcome of a read holding registers transaction that reached the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResponse {
    /// Register words in address order
    Registers(Vec<u16>),
    /// Device answered with an exception frame
    Exception {
        function_code: u8,
        code: ExceptionCode,
    },
}

impl ReadResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, ReadResponse::Exception { .. })
    }

    /// Register words, empty for exception replies
    pub fn registers(&self) -> &[u16] {
        match self {
            ReadResponse::Registers(registers) => registers,
            ReadResponse::Exception { .. } => &[],
        }
    }
}

/// Modbus client used by [`crate::ModbusHub`]
///
/// Implementations are driven by one caller at a time; the hub serializes
/// every call behind its own gate.
#[async_trait]
pub trait ModbusTransport: Send {
    /// Open the link. `Ok(false)` means the peer could not be reached.
    async fn connect(&mut self) -> Result<bool>;

    fn is_connected(&self) -> bool;

    /// FC03. Exception replies are returned as [`ReadResponse::Exception`];
    /// transport faults are returned as errors.
    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        slave: u8,
    ) -> Result<ReadResponse>;

    /// FC06. Exception replies and transport faults are both errors.
    async fn write_register(&mut self, address: u16, value: u16, slave: u8) -> Result<()>;

    async fn close(&mut self);
}
