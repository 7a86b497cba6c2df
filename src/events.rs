//! Columnar set of recorded events with filtering, segmentation and aggregation.
use itertools::{izip, Itertools};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::DynapseError;
use crate::{NEURONS_PER_CHIP, NEURONS_PER_CORE};

/// Core selection for [`EventSet::filter`].
#[derive(Debug, PartialEq, Clone)]
pub enum CoreFilter {
    /// Keep events from every core.
    All,
    /// Keep events from a single core.
    One(u8),
    /// Keep events from the listed cores.
    List(Vec<u8>),
}

/// Neuron selection for [`EventSet::filter`].
#[derive(Debug, PartialEq, Clone)]
pub enum NeuronFilter {
    /// Keep events from every neuron.
    All,
    /// Keep events from a single neuron id, on any selected core.
    One(u32),
    /// Keep events from the listed neuron ids, on any selected core.
    List(Vec<u32>),
    /// One neuron list per selected core, in positional correspondence with
    /// [`CoreFilter::List`].
    PerCore(Vec<Vec<u32>>),
}

/// A set of recorded events, stored as equal-length columns.
///
/// Timestamps are absolute microsecond counters (the first value is not zero).
/// All operations are pure and return a new set.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct EventSet {
    timestamps: Vec<u32>,
    chip_ids: Vec<u8>,
    core_ids: Vec<u8>,
    neuron_ids: Vec<u32>,
}

impl EventSet {
    /// Create a new event set from its columns.
    /// The columns must have identical lengths.
    pub fn new(
        timestamps: Vec<u32>,
        chip_ids: Vec<u8>,
        core_ids: Vec<u8>,
        neuron_ids: Vec<u32>,
    ) -> Result<Self, DynapseError> {
        let len = timestamps.len();
        if chip_ids.len() != len || core_ids.len() != len || neuron_ids.len() != len {
            return Err(DynapseError::InvalidConfiguration(format!(
                "Event columns must have identical lengths, got {}/{}/{}/{}",
                len,
                chip_ids.len(),
                core_ids.len(),
                neuron_ids.len()
            )));
        }
        Ok(EventSet {
            timestamps,
            chip_ids,
            core_ids,
            neuron_ids,
        })
    }

    pub fn empty() -> Self {
        EventSet {
            timestamps: vec![],
            chip_ids: vec![],
            core_ids: vec![],
            neuron_ids: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[u32] {
        &self.timestamps
    }

    pub fn chip_ids(&self) -> &[u8] {
        &self.chip_ids
    }

    pub fn core_ids(&self) -> &[u8] {
        &self.core_ids
    }

    pub fn neuron_ids(&self) -> &[u32] {
        &self.neuron_ids
    }

    /// Iterate over the events as `(timestamp, chip_id, core_id, neuron_id)` tuples.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u8, u8, u32)> + '_ {
        (0..self.len()).map(move |i| {
            (
                self.timestamps[i],
                self.chip_ids[i],
                self.core_ids[i],
                self.neuron_ids[i],
            )
        })
    }

    fn select(&self, indices: impl Iterator<Item = usize>) -> EventSet {
        let mut out = EventSet::empty();
        for i in indices {
            out.timestamps.push(self.timestamps[i]);
            out.chip_ids.push(self.chip_ids[i]);
            out.core_ids.push(self.core_ids[i]);
            out.neuron_ids.push(self.neuron_ids[i]);
        }
        out
    }

    /// Keep only the events matching the given chip, core and neuron selection.
    ///
    /// Only one chip can be filtered at a time. When `neurons` is
    /// [`NeuronFilter::PerCore`], `cores` must be a [`CoreFilter::List`] of the
    /// same length, and each neuron list applies to the core at the same position.
    ///
    /// Returns an [`DynapseError::EmptyResult`] error when no event survives the filter.
    pub fn filter(
        &self,
        chip_id: u8,
        cores: CoreFilter,
        neurons: NeuronFilter,
    ) -> Result<EventSet, DynapseError> {
        if let NeuronFilter::PerCore(ref lists) = neurons {
            match cores {
                CoreFilter::List(ref core_list) if core_list.len() == lists.len() => {}
                _ => {
                    return Err(DynapseError::InvalidConfiguration(
                        "A per-core neuron filter requires a core list of the same length"
                            .to_string(),
                    ))
                }
            }
        }

        let keep = |i: usize| -> bool {
            if self.chip_ids[i] != chip_id {
                return false;
            }
            let core = self.core_ids[i];
            let neuron = self.neuron_ids[i];
            let core_ok = match &cores {
                CoreFilter::All => true,
                CoreFilter::One(c) => core == *c,
                CoreFilter::List(cs) => cs.contains(&core),
            };
            if !core_ok {
                return false;
            }
            match &neurons {
                NeuronFilter::All => true,
                NeuronFilter::One(n) => neuron == *n,
                NeuronFilter::List(ns) => ns.contains(&neuron),
                NeuronFilter::PerCore(lists) => match &cores {
                    CoreFilter::List(cs) => cs
                        .iter()
                        .zip(lists.iter())
                        .any(|(c, ns)| core == *c && ns.contains(&neuron)),
                    _ => unreachable!("checked above"),
                },
            }
        };

        let filtered = self.select((0..self.len()).filter(|i| keep(*i)));
        if filtered.is_empty() {
            return Err(DynapseError::EmptyResult(
                "No spikes found while filtering events, check the constraints".to_string(),
            ));
        }
        Ok(filtered)
    }

    /// Split the set into the segments bounded by a start and a stop trigger neuron.
    ///
    /// Every returned segment starts at a spike of `start_trigger` and ends at the
    /// first following spike of `stop_trigger`, both included. Segments are ordered
    /// and non-overlapping. At most `max_number` segments are extracted when given.
    ///
    /// Returns an [`DynapseError::EmptyResult`] error when no segment is found.
    pub fn isolate_events_sets(
        &self,
        start_trigger: Address,
        stop_trigger: Address,
        max_number: Option<usize>,
    ) -> Result<Vec<EventSet>, DynapseError> {
        let matches = |address: &Address| -> Vec<usize> {
            izip!(&self.chip_ids, &self.core_ids, &self.neuron_ids)
                .positions(|(&chip, &core, &neuron)| {
                    chip == address.chip_id
                        && core == address.core_id
                        && neuron == address.neuron_id as u32
                })
                .collect()
        };
        let start_indices = matches(&start_trigger);
        let stop_indices = matches(&stop_trigger);

        let mut segments = Vec::new();
        let mut previous_stop = 0;
        while max_number.map_or(true, |limit| segments.len() < limit) {
            let start = match start_indices.iter().find(|&&i| i >= previous_stop) {
                Some(&i) => i,
                None => break,
            };
            let stop = match stop_indices.iter().find(|&&i| i >= start) {
                Some(&i) => i,
                None => break,
            };
            segments.push(self.select(start..=stop));
            previous_stop = stop;
        }

        if segments.is_empty() {
            return Err(DynapseError::EmptyResult(
                "Cannot find any valid experiment, check the start and stop trigger neurons"
                    .to_string(),
            ));
        }
        Ok(segments)
    }

    /// Rebase the set so that its first event happens at time 0.
    pub fn normalize(&self) -> EventSet {
        match self.timestamps.first() {
            Some(&t0) => EventSet {
                timestamps: self.timestamps.iter().map(|t| t - t0).collect(),
                chip_ids: self.chip_ids.clone(),
                core_ids: self.core_ids.clone(),
                neuron_ids: self.neuron_ids.clone(),
            },
            None => self.clone(),
        }
    }

    /// The absolute neuron index of the event at `i`.
    fn flat_neuron(&self, i: usize) -> usize {
        self.chip_ids[i] as usize * NEURONS_PER_CHIP as usize
            + self.core_ids[i] as usize * NEURONS_PER_CORE as usize
            + self.neuron_ids[i] as usize
    }

    /// Aggregate the set into a neuron-by-time-bin firing rate matrix.
    ///
    /// The inclusive time span of the set is divided into `num_bins` equal-width
    /// intervals, half-open except the last one which also contains the final
    /// timestamp. For every absolute neuron index below `tot_neurons` the spike
    /// count per bin is divided by the bin width in seconds to obtain a rate in Hz.
    /// Events with an absolute neuron index at or above `tot_neurons` are dropped.
    ///
    /// Returns the bin start times (in microseconds) and the
    /// `tot_neurons x num_bins` rate matrix.
    pub fn calculate_firing_rate_matrix(
        &self,
        num_bins: usize,
        tot_neurons: usize,
    ) -> Result<(Vec<f64>, DMatrix<f64>), DynapseError> {
        if num_bins == 0 {
            return Err(DynapseError::InvalidConfiguration(
                "The number of bins must be positive".to_string(),
            ));
        }
        if self.is_empty() {
            return Err(DynapseError::EmptyResult(
                "Cannot compute a firing rate matrix from an empty event set".to_string(),
            ));
        }

        let t0 = self.timestamps[0] as f64;
        let tn = self.timestamps[self.len() - 1] as f64;
        let bin_width = (tn - t0) / num_bins as f64;
        if bin_width == 0.0 {
            return Err(DynapseError::InvalidConfiguration(
                "The event set spans a zero time interval".to_string(),
            ));
        }

        let bin_starts: Vec<f64> = (0..num_bins).map(|i| t0 + i as f64 * bin_width).collect();
        let mut rates = DMatrix::<f64>::zeros(tot_neurons, num_bins);

        for i in 0..self.len() {
            let neuron = self.flat_neuron(i);
            if neuron >= tot_neurons {
                continue;
            }
            let mut bin = ((self.timestamps[i] as f64 - t0) / bin_width) as usize;
            if bin >= num_bins {
                // The final timestamp closes the last bin.
                bin = num_bins - 1;
            }
            rates[(neuron, bin)] += 1.0;
        }

        let bin_seconds = bin_width / 1e6;
        rates.iter_mut().for_each(|count| *count /= bin_seconds);

        Ok((bin_starts, rates))
    }
}
