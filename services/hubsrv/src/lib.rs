//! hubsrv - Modbus register hub service
//!
//! Connects to one Modbus TCP device (or an in-process simulator), registers
//! the configured entities with a `voltage_hub::ModbusCoordinator` and polls
//! their combined register demand.

pub mod cli;
pub mod config;
pub mod logging;
pub mod service;
pub mod shutdown;

pub use cli::{Args, Command, SwitchState};
pub use config::AppConfig;
pub use service::HubService;
