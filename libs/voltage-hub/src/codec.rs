//! Register value decoding
//!
//! Raw register words (in address order) are turned into typed values here.
//! Multi-register values use big-endian word order: the first register holds
//! the most significant word.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{HubError, Result};
use crate::register::RegisterType;

/// Decoded register value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisterValue {
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Text(String),
    Bits(Vec<bool>),
}

impl RegisterValue {
    /// Try to convert to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Unsigned(u) => Some(*u as f64),
            Self::Float(f) => Some(*f),
            Self::Text(_) | Self::Bits(_) => None,
        }
    }

    /// Try to convert to i64; floats only convert when they hold a whole number
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Unsigned(u) => i64::try_from(*u).ok(),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_f64().is_some()
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Unsigned(u) => write!(f, "{u}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Bits(bits) => {
                for bit in bits {
                    f.write_str(if *bit { "1" } else { "0" })?;
                }
                Ok(())
            },
        }
    }
}

fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_be_bytes()).collect()
}

fn fixed<const N: usize>(words: &[u16], register_type: RegisterType) -> Result<[u8; N]> {
    let bytes = words_to_bytes(words);
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        HubError::decode(format!(
            "{register_type} needs {} registers, got {}",
            N / 2,
            bytes.len() / 2
        ))
    })
}

/// Decode `words` as `register_type`
pub fn decode_registers(words: &[u16], register_type: RegisterType) -> Result<RegisterValue> {
    let value = match register_type {
        RegisterType::Int16 => {
            RegisterValue::Integer(i16::from_be_bytes(fixed(words, register_type)?) as i64)
        },
        RegisterType::UInt16 => {
            RegisterValue::Integer(u16::from_be_bytes(fixed(words, register_type)?) as i64)
        },
        RegisterType::Int32 => {
            RegisterValue::Integer(i32::from_be_bytes(fixed(words, register_type)?) as i64)
        },
        RegisterType::UInt32 => {
            RegisterValue::Integer(u32::from_be_bytes(fixed(words, register_type)?) as i64)
        },
        RegisterType::Int64 => {
            RegisterValue::Integer(i64::from_be_bytes(fixed(words, register_type)?))
        },
        RegisterType::UInt64 => {
            RegisterValue::Unsigned(u64::from_be_bytes(fixed(words, register_type)?))
        },
        RegisterType::Float32 => {
            RegisterValue::Float(f32::from_be_bytes(fixed(words, register_type)?) as f64)
        },
        RegisterType::Float64 => {
            RegisterValue::Float(f64::from_be_bytes(fixed(words, register_type)?))
        },
        RegisterType::String => {
            if words.is_empty() {
                return Err(HubError::decode("No registers for string"));
            }
            let bytes = words_to_bytes(words);
            let text = String::from_utf8_lossy(&bytes);
            RegisterValue::Text(text.trim_end_matches(['\0', ' ']).to_string())
        },
        RegisterType::Bits => {
            if words.is_empty() {
                return Err(HubError::decode("No registers for bits"));
            }
            let bits = words
                .iter()
                .flat_map(|word| (0..16).map(move |bit| (word >> bit) & 0x01 == 1))
                .collect();
            RegisterValue::Bits(bits)
        },
    };

    trace!(
        "Decoded {}: registers={:04X?}, value={}",
        register_type,
        words,
        value
    );
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_decode_16bit() {
        assert_eq!(
            decode_registers(&[0xFFFF], RegisterType::Int16).unwrap(),
            RegisterValue::Integer(-1)
        );
        assert_eq!(
            decode_registers(&[0xFFFF], RegisterType::UInt16).unwrap(),
            RegisterValue::Integer(65535)
        );
    }

    #[test]
    fn test_decode_32bit_big_endian_words() {
        assert_eq!(
            decode_registers(&[0x0001, 0x0002], RegisterType::UInt32).unwrap(),
            RegisterValue::Integer(0x0001_0002)
        );
        assert_eq!(
            decode_registers(&[0xFFFF, 0xFFFE], RegisterType::Int32).unwrap(),
            RegisterValue::Integer(-2)
        );
        // 25.0f32 = 0x41C80000
        assert_eq!(
            decode_registers(&[0x41C8, 0x0000], RegisterType::Float32).unwrap(),
            RegisterValue::Float(25.0)
        );
    }

    #[test]
    fn test_decode_64bit() {
        assert_eq!(
            decode_registers(&[0xFFFF, 0xFFFF, 0xFFFF, 0xFFFF], RegisterType::UInt64).unwrap(),
            RegisterValue::Unsigned(u64::MAX)
        );
        assert_eq!(
            decode_registers(&[0, 0, 0, 5], RegisterType::Int64).unwrap(),
            RegisterValue::Integer(5)
        );
        // 1.5f64 = 0x3FF8000000000000
        assert_eq!(
            decode_registers(&[0x3FF8, 0, 0, 0], RegisterType::Float64).unwrap(),
            RegisterValue::Float(1.5)
        );
    }

    #[test]
    fn test_decode_wrong_word_count() {
        let err = decode_registers(&[1], RegisterType::Float32).unwrap_err();
        assert!(matches!(err, HubError::Decode(msg) if msg.contains("needs 2 registers, got 1")));
        assert!(decode_registers(&[], RegisterType::UInt16).is_err());
        assert!(decode_registers(&[1, 2], RegisterType::Int16).is_err());
    }

    #[test]
    fn test_decode_string_trims_padding() {
        // "SN-42" padded with NULs
        let words = [0x534E, 0x2D34, 0x3200, 0x0000];
        assert_eq!(
            decode_registers(&words, RegisterType::String).unwrap(),
            RegisterValue::Text("SN-42".to_string())
        );
    }

    #[test]
    fn test_decode_bits_lsb_first() {
        let value = decode_registers(&[0x0005], RegisterType::Bits).unwrap();
        let RegisterValue::Bits(bits) = value else {
            panic!("expected bits");
        };
        assert_eq!(bits.len(), 16);
        assert!(bits[0]);
        assert!(!bits[1]);
        assert!(bits[2]);
        assert!(bits[3..].iter().all(|b| !b));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(RegisterValue::Integer(3).as_f64(), Some(3.0));
        assert_eq!(RegisterValue::Float(2.0).as_i64(), Some(2));
        assert_eq!(RegisterValue::Float(2.5).as_i64(), None);
        assert_eq!(RegisterValue::Unsigned(u64::MAX).as_i64(), None);
        assert!(!RegisterValue::Text("x".into()).is_numeric());
        assert_eq!(RegisterValue::Bits(vec![true, false]).to_string(), "10");
    }
}
