//! Service configuration
//!
//! Loaded from a YAML file, then overridden by `HUBSRV_` prefixed environment
//! variables (`__` separates nesting levels, e.g. `HUBSRV_HUB__PORT=1502`).

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use voltage_hub::{
    derive_registers, EntityDescription, HubConfig, IdentityConfig, ModbusEntity, RegisterType,
};

pub const ENV_PREFIX: &str = "HUBSRV_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub entities: Vec<EntityDescription>,
}

fn default_name() -> String {
    "hubsrv".to_string()
}

/// In-process device used instead of real hardware
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Listen address; port 0 picks a free port
    #[serde(default = "default_simulation_bind")]
    pub bind: String,
    /// Serial number stored at the identity registers
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub registers: Vec<SimulatedRegister>,
}

fn default_simulation_bind() -> String {
    "127.0.0.1:0".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedRegister {
    pub address: u16,
    pub value: u16,
}

impl AppConfig {
    /// Load from `path` with `HUBSRV_` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    pub fn load_with_prefix(path: impl AsRef<Path>, env_prefix: &str) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            bail!("Configuration file not found: {}", path.display());
        }

        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(env_prefix).split("__"))
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    }

    /// Validate everything and build the entities
    ///
    /// Any invalid entity aborts startup; nothing is silently skipped.
    pub fn validate(&self) -> Result<Vec<ModbusEntity>> {
        self.hub.validate().context("Invalid hub configuration")?;
        derive_registers(
            self.identity.address,
            RegisterType::String,
            Some(self.identity.count),
        )
        .context("Invalid identity configuration")?;

        let mut keys = HashSet::new();
        let mut entities = Vec::with_capacity(self.entities.len());
        for description in &self.entities {
            if !keys.insert(description.key.as_str()) {
                bail!("Duplicate entity key '{}'", description.key);
            }
            entities.push(ModbusEntity::new(description.clone())?);
        }

        Ok(entities)
    }
}
