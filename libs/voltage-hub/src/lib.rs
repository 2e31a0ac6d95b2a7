//! Voltage Hub - shared Modbus register access
//!
//! Many logical entities (sensors, switches) read small, often adjacent register
//! ranges from one physical Modbus device. This library turns their combined
//! demand into as few wire transactions as possible while keeping the bus
//! single-threaded and paced.
//!
//! # Architecture
//!
//! ```text
//! ModbusEntity ──registers──► ModbusCoordinator ──union──► ModbusHub ──► ModbusTransport
//!      ▲                            │                        │ (gate + pacing)
//!      └──── get(address) ◄─────────┘◄── RegisterMap ◄───────┘
//! ```
//!
//! - **`transport`**: the consumed client boundary (`ModbusTransport`) plus the
//!   `tokio-modbus` TCP adapter in `tcp`
//! - **`hub`**: exclusive bus gate, inter-call cooldown and batched reads
//! - **`batch`**: pure batch planning (gap and width limits)
//! - **`coordinator`**: per-cycle demand aggregation, published mapping, write path
//! - **`register`** / **`entity`** / **`codec`**: typed register ranges, entity
//!   descriptions and value decoding
//! - **`simulator`**: in-process Modbus TCP server for tests and offline runs

pub mod batch;
pub mod codec;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod hub;
pub mod register;
pub mod simulator;
pub mod tcp;
pub mod transport;

// Re-export core types
pub use batch::{plan_batches, BatchLimits, RegisterBatch};
pub use codec::{decode_registers, RegisterValue};
pub use config::{HubConfig, IdentityConfig};
pub use coordinator::{CoordinatorEvent, ModbusCoordinator, RefreshOutcome};
pub use entity::{EntityDescription, EntityKind, EntityState, EntityValue, ModbusEntity};
pub use error::{HubError, Result};
pub use hub::{ModbusHub, RegisterMap};
pub use register::{derive_registers, RegisterType};
pub use simulator::ModbusSimulator;
pub use tcp::{TcpParams, TcpTransport};
pub use tokio_modbus::ExceptionCode;
pub use transport::{ModbusTransport, ReadResponse};
