//! Populations of device neurons and the overflow-propagating address allocator.
use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::address::{Address, Neuron, SynapseType};
use crate::error::DynapseError;
use crate::{CHIPS_PER_DEVICE, CORES_PER_CHIP, NEURONS_PER_CORE, VIRTUAL_CHIP_ID};

/// Where to allocate the next group of neurons of a population.
#[derive(Debug, PartialEq, Clone)]
pub enum NeuronRange {
    /// A contiguous run of logical neuron indices starting at `start_neuron`
    /// on the given chip and core.
    Run {
        chip_id: u8,
        core_id: u8,
        start_neuron: usize,
        size: usize,
    },
    /// A contiguous run continuing right after the last allocated neuron.
    Continue { size: usize },
    /// An explicit list of logical neuron indices on the given chip and core.
    Explicit {
        chip_id: u8,
        core_id: u8,
        ids: Vec<usize>,
    },
}

/// The allocation cursor: origin of the next [`NeuronRange::Continue`] call.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
struct Cursor {
    chip_id: u8,
    core_id: u8,
    next_neuron: usize,
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor {
            chip_id: 0,
            core_id: 0,
            next_neuron: 0,
        }
    }
}

/// An ordered, optionally 2-D-shaped collection of neurons sharing a logical name.
///
/// Neurons are appended through the allocator and never removed; only their
/// synapse type can be edited in place.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Population {
    name: String,
    neurons: Vec<Neuron>,
    shape: Option<(usize, usize)>,
    cursor: Cursor,
}

impl Population {
    /// Create a new, empty population.
    pub fn new(name: &str) -> Self {
        Population {
            name: name.to_string(),
            neurons: Vec::new(),
            shape: None,
            cursor: Cursor::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.neurons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neurons.is_empty()
    }

    pub fn neurons(&self) -> &[Neuron] {
        &self.neurons
    }

    pub fn neuron(&self, index: usize) -> Option<&Neuron> {
        self.neurons.get(index)
    }

    /// The 2-D shape of the population, defaulting to a single row.
    pub fn shape(&self) -> (usize, usize) {
        self.shape.unwrap_or((1, self.neurons.len()))
    }

    /// The grid position (row, column) of the neuron at `index` under the current shape.
    pub fn position(&self, index: usize) -> (usize, usize) {
        let (_, columns) = self.shape();
        (index / columns.max(1), index % columns.max(1))
    }

    /// Map a logical neuron index onto a physical address, propagating overflow
    /// across the neuron -> core -> chip hierarchy.
    ///
    /// Returns the address together with a flag telling whether any overflow occurred.
    fn resolve(
        &self,
        chip_id: u8,
        core_id: u8,
        logical_id: usize,
    ) -> Result<(Address, bool), DynapseError> {
        let core_increment = logical_id / NEURONS_PER_CORE as usize;
        let neuron_id = (logical_id % NEURONS_PER_CORE as usize) as u16;
        let raw_core = core_id as usize + core_increment;
        let chip_increment = raw_core / CORES_PER_CHIP as usize;
        let new_core = (raw_core % CORES_PER_CHIP as usize) as u8;
        let new_chip = chip_id as usize + chip_increment;

        // The virtual chip is used to address host-injected inputs and is
        // exempt from the physical bound.
        if new_chip >= CHIPS_PER_DEVICE as usize && chip_id != VIRTUAL_CHIP_ID {
            return Err(DynapseError::OutOfRange(format!(
                "Error in population {}: neuron U{:02}C{:02}N{:03} does not fit in the boundaries of the chips",
                self.name, chip_id, core_id, logical_id
            )));
        }

        let address = Address {
            chip_id: new_chip as u8,
            core_id: new_core,
            neuron_id,
        };
        Ok((address, core_increment > 0 || chip_increment > 0))
    }

    /// Allocate a group of neurons and append them to the population.
    ///
    /// Logical indices overflowing the core wrap onto the next core, and cores
    /// overflowing the chip wrap onto the next chip; the first overflow of a call
    /// is reported with a warning. Allocation fails with an
    /// [`DynapseError::OutOfRange`] error when a neuron would land beyond the last
    /// physical chip, unless the originating chip is the virtual input chip.
    ///
    /// On success the cursor is left one past the last allocated neuron, so a
    /// subsequent [`NeuronRange::Continue`] call resumes right after it.
    /// Returns the freshly allocated neurons.
    pub fn add_neurons(
        &mut self,
        range: NeuronRange,
        synapse_type: SynapseType,
    ) -> Result<&[Neuron], DynapseError> {
        let (chip_id, core_id, logical_ids) = match range {
            NeuronRange::Run {
                chip_id,
                core_id,
                start_neuron,
                size,
            } => (
                chip_id,
                core_id,
                (start_neuron..start_neuron + size).collect::<Vec<_>>(),
            ),
            NeuronRange::Continue { size } => (
                self.cursor.chip_id,
                self.cursor.core_id,
                (self.cursor.next_neuron..self.cursor.next_neuron + size).collect(),
            ),
            NeuronRange::Explicit {
                chip_id,
                core_id,
                ids,
            } => (chip_id, core_id, ids),
        };

        // Resolve everything before mutating, so a failing call leaves the
        // population untouched.
        let mut resolved = Vec::with_capacity(logical_ids.len());
        let mut first_overflow = None;
        for &logical_id in &logical_ids {
            let (address, overflowed) = self.resolve(chip_id, core_id, logical_id)?;
            if overflowed && first_overflow.is_none() {
                first_overflow = Some((logical_id, address));
            }
            resolved.push(address);
        }

        if let Some((logical_id, address)) = first_overflow {
            warn!(
                "Warning in population {}, neuron id overflow: neuron U{:02}C{:02}N{:03} transformed to {}",
                self.name, chip_id, core_id, logical_id, address
            );
        }

        if let Some(last) = resolved.last() {
            self.cursor = Cursor {
                chip_id: last.chip_id,
                core_id: last.core_id,
                next_neuron: last.neuron_id as usize + 1,
            };
        }

        let start = self.neurons.len();
        self.neurons
            .extend(resolved.into_iter().map(|a| Neuron::new(a, synapse_type)));

        // Appending invalidates any explicit 2-D shape.
        self.shape = None;

        Ok(&self.neurons[start..])
    }

    /// Reshape the population into a 2-D grid.
    /// The product of the shape must equal the number of neurons.
    pub fn reshape(&mut self, rows: usize, columns: usize) -> Result<(), DynapseError> {
        if rows * columns != self.neurons.len() {
            return Err(DynapseError::InvalidConfiguration(format!(
                "Error in population {}: shape ({}, {}) does not match the population size ({})",
                self.name,
                rows,
                columns,
                self.neurons.len()
            )));
        }
        self.shape = Some((rows, columns));
        Ok(())
    }

    /// Assign a synapse type to a uniformly-random fraction of the still-unassigned neurons.
    ///
    /// The number of neurons to take is `ceil(frac * population size)`, clipped to
    /// the unassigned neurons actually available. Fails when the population has no
    /// unassigned neuron left.
    pub fn assign_types<R: Rng>(
        &mut self,
        frac: f64,
        synapse_type: SynapseType,
        rng: &mut R,
    ) -> Result<(), DynapseError> {
        if !(0.0..=1.0).contains(&frac) {
            return Err(DynapseError::InvalidConfiguration(format!(
                "Error in population {}: fraction {} is not within [0, 1]",
                self.name, frac
            )));
        }

        let mut remaining: Vec<usize> = (0..self.neurons.len())
            .filter(|&i| self.neurons[i].synapse_type == SynapseType::Unassigned)
            .collect();
        if remaining.is_empty() {
            return Err(DynapseError::InvalidConfiguration(format!(
                "Error in population {}: all neurons already have a type, fraction {} cannot be assigned to {:?}",
                self.name, frac, synapse_type
            )));
        }

        remaining.shuffle(rng);
        let requested = (frac * self.neurons.len() as f64).ceil() as usize;
        let taken = requested.min(remaining.len());
        if requested > remaining.len() {
            warn!(
                "Warning in population {}, insufficient unassigned neurons: type {:?} assigned to fraction {} instead of {}",
                self.name,
                synapse_type,
                remaining.len() as f64 / self.neurons.len() as f64,
                frac
            );
        }
        info!(
            "Population {}: fraction {} (asked for {}) assigned to {:?}",
            self.name,
            taken as f64 / self.neurons.len() as f64,
            frac,
            synapse_type
        );

        for &i in &remaining[..taken] {
            self.neurons[i].synapse_type = synapse_type;
        }
        Ok(())
    }
}
