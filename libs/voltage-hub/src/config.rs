//! Hub configuration
//!
//! Parameters threaded into the transport, hub and coordinator constructors.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::BatchLimits;
use crate::constants::DEFAULT_SLAVE_ID;
use crate::error::{HubError, Result};
use crate::tcp::TcpParams;

/// Connection and scheduling parameters for one Modbus device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
    /// Minimum spacing between the end of one transaction and the start of
    /// the next; 0 disables pacing
    #[serde(default)]
    pub message_wait_ms: u64,
    /// Refresh period; 0 means refresh on demand only
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    #[serde(default)]
    pub batch: BatchLimits,
}

fn default_port() -> u16 {
    502
}

fn default_slave_id() -> u8 {
    DEFAULT_SLAVE_ID
}

fn default_update_interval_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    3_000
}

fn default_response_timeout_ms() -> u64 {
    1_000
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: default_port(),
            slave_id: default_slave_id(),
            message_wait_ms: 0,
            update_interval_ms: default_update_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
            batch: BatchLimits::default(),
        }
    }
}

impl HubConfig {
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(HubError::config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(HubError::config("port must be non-zero"));
        }
        // 0 is broadcast, 248-255 are reserved
        if self.slave_id == 0 || self.slave_id > 247 {
            return Err(HubError::config(format!(
                "slave_id must be 1-247, got {}",
                self.slave_id
            )));
        }
        if self.connect_timeout_ms == 0 || self.response_timeout_ms == 0 {
            return Err(HubError::config("timeouts must be positive"));
        }
        self.batch.validate()
    }

    pub fn message_wait(&self) -> Option<Duration> {
        (self.message_wait_ms > 0).then(|| Duration::from_millis(self.message_wait_ms))
    }

    pub fn update_interval(&self) -> Option<Duration> {
        (self.update_interval_ms > 0).then(|| Duration::from_millis(self.update_interval_ms))
    }

    pub fn tcp_params(&self) -> TcpParams {
        TcpParams {
            host: self.host.clone(),
            port: self.port,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            response_timeout: Duration::from_millis(self.response_timeout_ms),
        }
    }
}

/// Where the device keeps its serial number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_address")]
    pub address: u16,
    #[serde(default = "default_identity_count")]
    pub count: u16,
}

fn default_identity_address() -> u16 {
    529
}

fn default_identity_count() -> u16 {
    16
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            address: default_identity_address(),
            count: default_identity_count(),
        }
    }
}
