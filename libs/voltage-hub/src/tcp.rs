//! Modbus TCP transport
//!
//! Adapts a `tokio-modbus` client context to [`ModbusTransport`]. The socket
//! is opened here so the connect timeout and `TCP_NODELAY` stay under our
//! control; framing and transaction ids belong to the client context.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{error::Elapsed, timeout};
use tokio_modbus::client::{tcp, Context, Reader, Writer};
use tokio_modbus::prelude::{Slave, SlaveContext};
use tokio_modbus::{ExceptionCode, FunctionCode};
use tracing::{error, info, warn};

use crate::constants::DEFAULT_SLAVE_ID;
use crate::error::{HubError, Result};
use crate::transport::{ModbusTransport, ReadResponse};

/// Device reply: the response data or its exception code
type DeviceReply<T> = std::result::Result<T, ExceptionCode>;

type TimedResponse<T> = std::result::Result<
    std::result::Result<DeviceReply<T>, tokio_modbus::Error>,
    Elapsed,
>;

/// TCP connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpParams {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
}

/// [`ModbusTransport`] over a single TCP connection
///
/// Any transport fault or response timeout drops the client context; the
/// owner decides when to call [`ModbusTransport::connect`] again.
pub struct TcpTransport {
    params: TcpParams,
    context: Option<Context>,
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("params", &self.params)
            .field("connected", &self.context.is_some())
            .finish()
    }
}

impl TcpTransport {
    pub fn new(params: TcpParams) -> Self {
        Self {
            params,
            context: None,
        }
    }

    pub fn params(&self) -> &TcpParams {
        &self.params
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.params.host, self.params.port)
    }

    /// Client context addressed to `slave`
    fn context_for(&mut self, slave: u8) -> Result<&mut Context> {
        let context = self.context.as_mut().ok_or(HubError::NotConnected)?;
        context.set_slave(Slave(slave));
        Ok(context)
    }

    /// Split a timed request into transport faults and the device's reply
    ///
    /// Transport faults and timeouts drop the client context; exception
    /// replies leave it usable.
    fn settle<T>(&mut self, result: TimedResponse<T>) -> Result<DeviceReply<T>> {
        match result {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                warn!("Modbus TCP transaction failed, dropping connection: {}", e);
                self.context = None;
                Err(e.into())
            },
            Err(_) => {
                let response_timeout = self.params.response_timeout;
                warn!(
                    "No response within {:?}, dropping connection",
                    response_timeout
                );
                self.context = None;
                Err(HubError::timeout(format!(
                    "No response within {response_timeout:?}"
                )))
            },
        }
    }
}

#[async_trait]
impl ModbusTransport for TcpTransport {
    async fn connect(&mut self) -> Result<bool> {
        let addr = self.addr();
        info!("Connecting to Modbus TCP endpoint: {}", addr);

        match timeout(self.params.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Failed to set TCP_NODELAY: {}", e);
                }
                info!("Connected to Modbus TCP endpoint: {}", addr);
                self.context = Some(tcp::attach_slave(stream, Slave(DEFAULT_SLAVE_ID)));
                Ok(true)
            },
            Ok(Err(e)) => {
                error!("Failed to connect to {}: {}", addr, e);
                self.context = None;
                Ok(false)
            },
            Err(_) => {
                warn!("Connection to {} timed out", addr);
                self.context = None;
                Ok(false)
            },
        }
    }

    fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        slave: u8,
    ) -> Result<ReadResponse> {
        let response_timeout = self.params.response_timeout;
        let context = self.context_for(slave)?;
        let result = timeout(
            response_timeout,
            context.read_holding_registers(address, count),
        )
        .await;

        Ok(match self.settle(result)? {
            Ok(words) => ReadResponse::Registers(words),
            Err(code) => ReadResponse::Exception {
                function_code: FunctionCode::ReadHoldingRegisters.value(),
                code,
            },
        })
    }

    async fn write_register(&mut self, address: u16, value: u16, slave: u8) -> Result<()> {
        let response_timeout = self.params.response_timeout;
        let context = self.context_for(slave)?;
        let result = timeout(response_timeout, context.write_single_register(address, value)).await;

        self.settle(result)?.map_err(|code| HubError::Exception {
            function_code: FunctionCode::WriteSingleRegister.value(),
            code,
        })
    }

    async fn close(&mut self) {
        if self.context.take().is_some() {
            info!("Disconnected from {}", self.addr());
        }
    }
}
