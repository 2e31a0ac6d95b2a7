//! Modbus batching constants
//!
//! The read width limit follows the Modbus application protocol: a PDU is at
//! most 253 bytes, inherited from the RS485 ADU limit of 256 bytes.

// ============================================================================
// Batching Constants
// ============================================================================

/// Maximum span of one batched read, in registers
///
/// Filler registers pulled in between requested ones count toward this span.
pub const MAX_BATCHED_REGISTERS_COUNT: u16 = 64;

/// Maximum address delta between two consecutive requested registers
/// that still lets them share a batch
pub const MAX_BATCHED_REGISTERS_GAP: u16 = 1;

/// Slave id used when the configuration does not name one
pub const DEFAULT_SLAVE_ID: u8 = 1;

// ============================================================================
// Protocol Limits
// ============================================================================

/// Maximum number of registers for FC03 (Read Holding Registers)
///
/// Response PDU: Function Code(1) + Byte Count(1) + N × 2 ≤ 253,
/// therefore N ≤ 125
pub const MODBUS_MAX_READ_REGISTERS: u16 = 125;
