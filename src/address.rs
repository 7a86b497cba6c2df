//! Hardware addresses, synapse types and the bit-packed address codecs.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DynapseError;
use crate::{CHIPS_PER_DEVICE, CORES_PER_CHIP, NEURONS_PER_CHIP, NEURONS_PER_CORE, VIRTUAL_CHIP_ID};

/// The type of synapse a neuron exposes to its targets.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum SynapseType {
    /// Slow inhibitory synapse (code 0).
    SlowInhibitory,
    /// Fast inhibitory synapse (code 1).
    FastInhibitory,
    /// Slow excitatory synapse (code 2).
    SlowExcitatory,
    /// Fast excitatory synapse (code 3).
    FastExcitatory,
    /// No synapse type assigned yet (code -1).
    Unassigned,
}

impl SynapseType {
    /// The numeric code used by the device tools for this synapse type.
    pub fn code(&self) -> i8 {
        match self {
            SynapseType::SlowInhibitory => 0,
            SynapseType::FastInhibitory => 1,
            SynapseType::SlowExcitatory => 2,
            SynapseType::FastExcitatory => 3,
            SynapseType::Unassigned => -1,
        }
    }

    /// Parse a synapse type from its short name (`sInh`, `fInh`, `sExc`, `fExc`).
    pub fn from_name(name: &str) -> Result<Self, DynapseError> {
        match name {
            "sInh" => Ok(SynapseType::SlowInhibitory),
            "fInh" => Ok(SynapseType::FastInhibitory),
            "sExc" => Ok(SynapseType::SlowExcitatory),
            "fExc" => Ok(SynapseType::FastExcitatory),
            _ => Err(DynapseError::InvalidConfiguration(format!(
                "Cannot decode neuron type: specified neuron type ({}) does not match any of the default ones",
                name
            ))),
        }
    }
}

impl fmt::Display for SynapseType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A physical neuron address on the device.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct Address {
    /// The chip the neuron sits on.
    pub chip_id: u8,
    /// The core within the chip.
    pub core_id: u8,
    /// The neuron within the core.
    pub neuron_id: u16,
}

impl Address {
    /// Create a new address, checking each field against the device capacities.
    /// The reserved virtual chip ID is accepted for input-only addressing.
    pub fn new(chip_id: u8, core_id: u8, neuron_id: u16) -> Result<Self, DynapseError> {
        if chip_id >= CHIPS_PER_DEVICE && chip_id != VIRTUAL_CHIP_ID {
            return Err(DynapseError::OutOfRange(format!(
                "Chip id {} exceeds the {} chips of the device",
                chip_id, CHIPS_PER_DEVICE
            )));
        }
        if core_id >= CORES_PER_CHIP {
            return Err(DynapseError::OutOfRange(format!(
                "Core id {} exceeds the {} cores of a chip",
                core_id, CORES_PER_CHIP
            )));
        }
        if neuron_id >= NEURONS_PER_CORE {
            return Err(DynapseError::OutOfRange(format!(
                "Neuron id {} exceeds the {} neurons of a core",
                neuron_id, NEURONS_PER_CORE
            )));
        }
        Ok(Address {
            chip_id,
            core_id,
            neuron_id,
        })
    }

    /// The absolute neuron index used by the firing-rate aggregation,
    /// i.e., `chip_id * 1024 + core_id * 256 + neuron_id`.
    pub fn flat_index(&self) -> usize {
        self.chip_id as usize * NEURONS_PER_CHIP as usize
            + self.core_id as usize * NEURONS_PER_CORE as usize
            + self.neuron_id as usize
    }
}

impl fmt::Display for Address {
    /// Format the address the way the device tools expect it, e.g. `U00C02N064`.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "U{:02}C{:02}N{:03}",
            self.chip_id, self.core_id, self.neuron_id
        )
    }
}

/// A physical neuron, i.e., an address plus a synapse type tag.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct Neuron {
    pub address: Address,
    pub synapse_type: SynapseType,
}

impl Neuron {
    pub fn new(address: Address, synapse_type: SynapseType) -> Self {
        Neuron {
            address,
            synapse_type,
        }
    }
}

/// Pack an input-event address into the 16-bit FPGA spike generator format.
///
/// The layout is, from the most significant bit:
///
/// ```text
/// 15 14 13 12 11 10 9 8 7 6 5 4 3 2 1 0
/// |---| chip_dest
///       |-----------------| neuron_address
///                           |-| virtual_core
///                               |-----| core_dest
/// ```
///
/// Each field is checked against its bit width before packing, so no component
/// is ever silently truncated.
pub fn encode_input_address(
    virtual_core: u8,
    neuron_address: u8,
    core_dest: u8,
    chip_dest: u8,
) -> Result<u16, DynapseError> {
    if virtual_core > 0x3 {
        return Err(DynapseError::InvalidConfiguration(format!(
            "Virtual source core id {} does not fit in 2 bits",
            virtual_core
        )));
    }
    if core_dest > 0xF {
        return Err(DynapseError::InvalidConfiguration(format!(
            "Destination core mask {:#06b} does not fit in 4 bits",
            core_dest
        )));
    }
    if chip_dest > 0x3 {
        return Err(DynapseError::InvalidConfiguration(format!(
            "Destination chip id {} does not fit in 2 bits",
            chip_dest
        )));
    }
    Ok(((chip_dest as u16) << 14)
        | ((neuron_address as u16) << 6)
        | ((virtual_core as u16) << 4)
        | core_dest as u16)
}

/// Unpack an input-event address.
/// Returns `(virtual_core, neuron_address, core_dest)`; the inverse of [`encode_input_address`]
/// over its low 14 bits.
pub fn decode_input_address(address: u16) -> (u8, u8, u8) {
    let virtual_core = ((address >> 4) & 0x3) as u8;
    let neuron_address = ((address >> 6) & 0xFF) as u8;
    let core_dest = (address & 0xF) as u8;
    (virtual_core, neuron_address, core_dest)
}

/// Extract `(core_id, chip_id, neuron_id)` from the first word of a recorded spike event.
pub fn decode_spike_word(word: u32) -> (u8, u8, u32) {
    let core_id = ((word >> 1) & 0x1F) as u8;
    let chip_id = ((word >> 6) & 0x3F) as u8;
    let neuron_id = (word >> 12) & 0xFFFFF;
    (core_id, chip_id, neuron_id)
}

/// Extract the type field from the first word of a recorded special event.
pub fn decode_special_word(word: u32) -> u8 {
    ((word >> 1) & 0x7F) as u8
}
