//! Batch planning for holding register reads
//!
//! Turns an arbitrary set of requested register addresses into the fewest
//! contiguous read transactions allowed by the gap and width limits.

use serde::{Deserialize, Serialize};

use crate::constants::{
    MAX_BATCHED_REGISTERS_COUNT, MAX_BATCHED_REGISTERS_GAP, MODBUS_MAX_READ_REGISTERS,
};
use crate::error::{HubError, Result};

/// Limits applied while growing a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLimits {
    /// Maximum span of one transaction, in registers
    #[serde(default = "default_max_registers")]
    pub max_registers: u16,
    /// Maximum address delta between consecutive requested registers
    #[serde(default = "default_max_gap")]
    pub max_gap: u16,
}

fn default_max_registers() -> u16 {
    MAX_BATCHED_REGISTERS_COUNT
}

fn default_max_gap() -> u16 {
    MAX_BATCHED_REGISTERS_GAP
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_registers: MAX_BATCHED_REGISTERS_COUNT,
            max_gap: MAX_BATCHED_REGISTERS_GAP,
        }
    }
}

impl BatchLimits {
    pub fn validate(&self) -> Result<()> {
        if self.max_registers == 0 || self.max_registers > MODBUS_MAX_READ_REGISTERS {
            return Err(HubError::config(format!(
                "max_registers must be 1-{}, got {}",
                MODBUS_MAX_READ_REGISTERS, self.max_registers
            )));
        }
        if self.max_gap == 0 {
            return Err(HubError::config("max_gap must be at least 1"));
        }
        Ok(())
    }
}

/// One planned read transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBatch {
    /// First register of the span
    pub start: u16,
    /// Span length, filler registers included
    pub count: u16,
    /// Requested registers covered by the span, ascending
    pub registers: Vec<u16>,
}

impl RegisterBatch {
    /// Last register of the span
    pub fn end(&self) -> u16 {
        self.start + (self.count - 1)
    }

    /// Index of `register` inside the transaction's result array
    pub fn offset_of(&self, register: u16) -> usize {
        (register - self.start) as usize
    }
}

/// Plan batched reads for `registers`
///
/// Registers are sorted and deduplicated, then grouped greedily from the
/// lowest address: a batch keeps growing while the next register is within
/// `max_gap` of the previous one and strictly less than `max_registers` away
/// from the batch start.
pub fn plan_batches<I>(registers: I, limits: BatchLimits) -> Vec<RegisterBatch>
where
    I: IntoIterator<Item = u16>,
{
    let mut sorted: Vec<u16> = registers.into_iter().collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut batches = Vec::new();
    let mut first = 0;

    while first < sorted.len() {
        let mut last = first;
        while last + 1 < sorted.len()
            && sorted[last + 1] - sorted[first] < limits.max_registers
            && sorted[last + 1] - sorted[last] <= limits.max_gap
        {
            last += 1;
        }

        batches.push(RegisterBatch {
            start: sorted[first],
            count: sorted[last] - sorted[first] + 1,
            registers: sorted[first..=last].to_vec(),
        });

        first = last + 1;
    }

    batches
}
