//! Modbus TCP simulator
//!
//! A small in-memory holding register bank served over Modbus TCP by the
//! `tokio-modbus` server, for integration tests and the service's
//! simulation mode. Only FC03 and FC06 are answered; reading or
//! writing an address that is not in the bank yields an illegal data address
//! exception.

use std::collections::HashMap;
use std::future;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};
use tokio_modbus::server::Service;
use tokio_modbus::{ExceptionCode, Request, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::constants::MODBUS_MAX_READ_REGISTERS;
use crate::error::Result;

/// In-memory Modbus TCP server
#[derive(Debug, Clone, Default)]
pub struct ModbusSimulator {
    holding_registers: Arc<RwLock<HashMap<u16, u16>>>,
}

impl ModbusSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the register bank
    pub fn with_registers<I>(registers: I) -> Self
    where
        I: IntoIterator<Item = (u16, u16)>,
    {
        let simulator = Self::new();
        simulator.holding_registers.write().extend(registers);
        simulator
    }

    /// Store `text` as big-endian byte pairs from `address`, NUL padded to
    /// `count` registers
    pub fn set_string(&self, address: u16, count: u16, text: &str) {
        let mut bytes = text.as_bytes().to_vec();
        bytes.resize(count as usize * 2, 0);
        let mut bank = self.holding_registers.write();
        for (offset, pair) in bytes.chunks_exact(2).enumerate() {
            bank.insert(
                address.wrapping_add(offset as u16),
                u16::from_be_bytes([pair[0], pair[1]]),
            );
        }
    }

    pub fn set_register(&self, address: u16, value: u16) {
        self.holding_registers.write().insert(address, value);
    }

    pub fn remove_register(&self, address: u16) {
        self.holding_registers.write().remove(&address);
    }

    pub fn register(&self, address: u16) -> Option<u16> {
        self.holding_registers.read().get(&address).copied()
    }

    /// Bind `bind_addr` and serve until `shutdown` is cancelled
    pub async fn start(&self, bind_addr: &str, shutdown: CancellationToken) -> Result<SocketAddr> {
        let listener = TcpListener::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Modbus simulator listening on {}", local_addr);

        let server = Server::new(listener);
        let simulator = self.clone();
        let on_connected = move |stream: TcpStream, socket_addr: SocketAddr| {
            let simulator = simulator.clone();
            async move {
                debug!("Simulator connection from {}", socket_addr);
                accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                    Ok(Some(simulator.clone()))
                })
            }
        };
        let on_process_error = |err| {
            error!("Simulator connection error: {}", err);
        };

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Modbus simulator on {} stopped", local_addr);
                },
                result = server.serve(&on_connected, on_process_error) => {
                    if let Err(e) = result {
                        error!("Modbus simulator on {} failed: {}", local_addr, e);
                    }
                },
            }
        });

        Ok(local_addr)
    }

    fn read_holding_registers(
        &self,
        address: u16,
        count: u16,
    ) -> std::result::Result<Vec<u16>, ExceptionCode> {
        if count == 0 || count > MODBUS_MAX_READ_REGISTERS {
            return Err(ExceptionCode::IllegalDataValue);
        }

        let bank = self.holding_registers.read();
        (0..count)
            .map(|offset| {
                address
                    .checked_add(offset)
                    .and_then(|register| bank.get(&register).copied())
                    .ok_or_else(|| {
                        debug!(
                            "Simulator read of unmapped register {}",
                            address as u32 + offset as u32
                        );
                        ExceptionCode::IllegalDataAddress
                    })
            })
            .collect()
    }

    fn write_single_register(
        &self,
        address: u16,
        value: u16,
    ) -> std::result::Result<(), ExceptionCode> {
        let mut bank = self.holding_registers.write();
        let slot = bank
            .get_mut(&address)
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        *slot = value;
        debug!("Simulator register {} = {}", address, value);
        Ok(())
    }
}

impl Service for ModbusSimulator {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<std::result::Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let response = match req {
            Request::ReadHoldingRegisters(address, count) => self
                .read_holding_registers(address, count)
                .map(Response::ReadHoldingRegisters),
            Request::WriteSingleRegister(address, value) => self
                .write_single_register(address, value)
                .map(|()| Response::WriteSingleRegister(address, value)),
            other => {
                debug!("Simulator rejected unsupported request {:?}", other);
                Err(ExceptionCode::IllegalFunction)
            },
        };
        future::ready(response)
    }
}
