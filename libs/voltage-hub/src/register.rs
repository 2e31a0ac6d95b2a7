//! Typed register ranges
//!
//! Entities declare a base address and a data type; the register list they
//! contribute to the aggregated demand is derived here, once, at setup.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};

/// Data type stored in a register range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterType {
    Int16,
    #[serde(rename = "uint16")]
    UInt16,
    Int32,
    #[serde(rename = "uint32")]
    UInt32,
    Int64,
    #[serde(rename = "uint64")]
    UInt64,
    Float32,
    Float64,
    String,
    Bits,
}

impl RegisterType {
    /// Number of 16-bit words implied by the type, `None` for variable-width types
    pub fn word_count(&self) -> Option<u16> {
        match self {
            Self::Int16 | Self::UInt16 => Some(1),
            Self::Int32 | Self::UInt32 | Self::Float32 => Some(2),
            Self::Int64 | Self::UInt64 | Self::Float64 => Some(4),
            Self::String | Self::Bits => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::String | Self::Bits)
    }
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
            Self::Bits => "bits",
        };
        f.write_str(name)
    }
}

/// Derive the contiguous register list `[base, base + count)` for a typed range
///
/// `count` is the explicit word count if given, otherwise the width implied
/// by `register_type`. An explicit count of 0 counts as not given. Both
/// present and different, or neither present, is a configuration error.
pub fn derive_registers(
    base: u16,
    register_type: RegisterType,
    explicit_count: Option<u16>,
) -> Result<Vec<u16>> {
    let explicit_count = explicit_count.filter(|count| *count != 0);
    let count = match (explicit_count, register_type.word_count()) {
        (Some(explicit), Some(implied)) if explicit != implied => {
            return Err(HubError::config(format!(
                "register count {explicit} does not match the length {implied} of {register_type}"
            )))
        },
        (Some(explicit), _) => explicit,
        (None, Some(implied)) => implied,
        (None, None) => {
            return Err(HubError::config(format!(
                "register count must be set for {register_type} registers"
            )))
        },
    };

    let end = base as u32 + count as u32;
    if end > 0x1_0000 {
        return Err(HubError::config(format!(
            "registers {base}..{end} run past the end of the address space"
        )));
    }

    Ok((base..=(end - 1) as u16).collect())
}
