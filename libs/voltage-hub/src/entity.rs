//! Entity descriptions
//!
//! One description type covers every consumer; what differs between a plain
//! register, a scaled sensor and a switch is the [`EntityKind`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{decode_registers, RegisterValue};
use crate::coordinator::ModbusCoordinator;
use crate::error::{HubError, Result};
use crate::hub::RegisterMap;
use crate::register::{derive_registers, RegisterType};

/// Behaviour applied to the decoded value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityKind {
    /// Decoded value as is
    #[default]
    Plain,
    /// Numeric value divided by `scale`
    Scaled { scale: f64 },
    /// Two-state value written and read through one register
    Switch {
        #[serde(default = "default_on_value")]
        on_value: u16,
        #[serde(default)]
        off_value: u16,
    },
}

fn default_on_value() -> u16 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescription {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Base register address
    pub address: u16,
    pub register_type: RegisterType,
    /// Explicit word count; required for string and bits types
    #[serde(default)]
    pub count: Option<u16>,
    #[serde(default)]
    pub kind: EntityKind,
}

/// Value reported by an available entity
#[derive(Debug, Clone, PartialEq)]
pub enum EntityValue {
    Raw(RegisterValue),
    Number(f64),
    On,
    Off,
}

impl fmt::Display for EntityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityState {
    /// At least one required register is missing from the published mapping
    Unavailable,
    Available(EntityValue),
}

impl EntityState {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => f.write_str("unavailable"),
            Self::Available(value) => write!(f, "{value}"),
        }
    }
}

/// Consumer built from a validated [`EntityDescription`]
#[derive(Debug, Clone)]
pub struct ModbusEntity {
    description: EntityDescription,
    registers: Vec<u16>,
}

impl ModbusEntity {
    pub fn new(description: EntityDescription) -> Result<Self> {
        if description.key.trim().is_empty() {
            return Err(HubError::config("entity key must not be empty"));
        }

        match description.kind {
            EntityKind::Scaled { scale } if scale == 0.0 || !scale.is_finite() => {
                return Err(HubError::config(format!(
                    "entity '{}': scale must be a non-zero number",
                    description.key
                )));
            },
            EntityKind::Scaled { .. } if !description.register_type.is_numeric() => {
                return Err(HubError::config(format!(
                    "entity '{}': {} registers cannot be scaled",
                    description.key, description.register_type
                )));
            },
            EntityKind::Switch {
                on_value,
                off_value,
            } if on_value == off_value => {
                return Err(HubError::config(format!(
                    "entity '{}': on_value and off_value are both {}",
                    description.key, on_value
                )));
            },
            EntityKind::Switch { .. } if !description.register_type.is_numeric() => {
                return Err(HubError::config(format!(
                    "entity '{}': {} registers cannot back a switch",
                    description.key, description.register_type
                )));
            },
            _ => {},
        }

        let registers = derive_registers(
            description.address,
            description.register_type,
            description.count,
        )
        .map_err(|e| match e {
            HubError::Config(msg) => {
                HubError::config(format!("entity '{}': {}", description.key, msg))
            },
            other => other,
        })?;

        Ok(Self {
            description,
            registers,
        })
    }

    pub fn key(&self) -> &str {
        &self.description.key
    }

    /// Display name, falling back to the key
    pub fn name(&self) -> &str {
        self.description
            .name
            .as_deref()
            .unwrap_or(&self.description.key)
    }

    pub fn description(&self) -> &EntityDescription {
        &self.description
    }

    /// Registers this entity contributes to the aggregated demand
    pub fn registers(&self) -> &[u16] {
        &self.registers
    }

    pub fn is_switch(&self) -> bool {
        matches!(self.description.kind, EntityKind::Switch { .. })
    }

    /// Decode the entity's value from `data`
    pub fn state(&self, data: &RegisterMap) -> Result<EntityState> {
        let Some(words) = self
            .registers
            .iter()
            .map(|register| data.get(register).copied())
            .collect::<Option<Vec<u16>>>()
        else {
            return Ok(EntityState::Unavailable);
        };

        let value = decode_registers(&words, self.description.register_type)?;
        let value = match self.description.kind {
            EntityKind::Plain => EntityValue::Raw(value),
            EntityKind::Scaled { scale } => {
                let number = value.as_f64().ok_or_else(|| {
                    HubError::decode(format!(
                        "entity '{}': value {} is not numeric",
                        self.key(),
                        value
                    ))
                })?;
                EntityValue::Number(number / scale)
            },
            EntityKind::Switch {
                on_value,
                off_value,
            } => match value.as_i64() {
                Some(v) if v == on_value as i64 => EntityValue::On,
                Some(v) if v == off_value as i64 => EntityValue::Off,
                _ => {
                    return Err(HubError::decode(format!(
                        "entity '{}': unexpected value {} (on={}, off={})",
                        self.key(),
                        value,
                        on_value,
                        off_value
                    )))
                },
            },
        };

        Ok(EntityState::Available(value))
    }

    /// State from the coordinator's published mapping
    pub fn current_state(&self, coordinator: &ModbusCoordinator) -> Result<EntityState> {
        self.state(&coordinator.snapshot())
    }

    pub async fn turn_on(&self, coordinator: &ModbusCoordinator) -> Result<()> {
        let (on_value, _) = self.switch_values()?;
        coordinator
            .write_register(self.description.address, on_value)
            .await
    }

    pub async fn turn_off(&self, coordinator: &ModbusCoordinator) -> Result<()> {
        let (_, off_value) = self.switch_values()?;
        coordinator
            .write_register(self.description.address, off_value)
            .await
    }

    fn switch_values(&self) -> Result<(u16, u16)> {
        match self.description.kind {
            EntityKind::Switch {
                on_value,
                off_value,
            } => Ok((on_value, off_value)),
            _ => Err(HubError::config(format!(
                "entity '{}' is not a switch",
                self.key()
            ))),
        }
    }
}
