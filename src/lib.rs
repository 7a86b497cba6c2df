//! This crate provides tools for offline experimentation with the DYNAP-se neuromorphic chip.
//!
//! Three independent workflows are covered:
//! 1. building input spike patterns and writing them to a stimulus file,
//! 2. allocating neuron populations on the chip grid and deriving connectivity tables,
//! 3. decoding the binary event log recorded by the device and aggregating firing rates.
//!
//! # Building Populations and Connections
//!
//! ```rust
//! use rusty_dynapse::population::{NeuronRange, Population};
//! use rusty_dynapse::connections::{ConnectionPolicy, Connections};
//! use rusty_dynapse::address::SynapseType;
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! let mut source = Population::new("sensors");
//! source
//!     .add_neurons(
//!         NeuronRange::Run { chip_id: 0, core_id: 0, start_neuron: 0, size: 16 },
//!         SynapseType::FastExcitatory,
//!     )
//!     .unwrap();
//!
//! let mut target = Population::new("pool");
//! target
//!     .add_neurons(
//!         NeuronRange::Run { chip_id: 0, core_id: 1, start_neuron: 0, size: 16 },
//!         SynapseType::Unassigned,
//!     )
//!     .unwrap();
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let connections =
//!     Connections::connect(&source, &target, &ConnectionPolicy::Bernoulli { p: 0.5 }, &mut rng)
//!         .unwrap();
//! assert!(!connections.is_empty());
//! ```
//!
//! # Building Input Patterns
//!
//! ```rust
//! use rusty_dynapse::pattern::{Firing, InputPattern};
//!
//! let mut pattern = InputPattern::new("tonic", 900.0).unwrap();
//! pattern.constant_freq(0, 10, 0b1111, 50.0, 0.02, 1.0, 0).unwrap();
//! assert_eq!(pattern.len(), 51);
//!
//! // A single event with a 0.1 s delay at isi_base 900 is 10_000 ISI units.
//! let mut single = InputPattern::new("one", 900.0).unwrap();
//! single.single_event(0, 0, 0b0001, Firing::Period(0.1), 0).unwrap();
//! assert_eq!(single.events()[0].delay, 10_000);
//! ```
//!
//! # Decoding Recordings
//!
//! ```rust,no_run
//! use rusty_dynapse::decoder::import_events;
//!
//! let recording = import_events("recording.aedat").unwrap();
//! let set = recording.events.filter(
//!     0,
//!     rusty_dynapse::events::CoreFilter::All,
//!     rusty_dynapse::events::NeuronFilter::All,
//! ).unwrap();
//! let (bins, rates) = set.calculate_firing_rate_matrix(10, 1024).unwrap();
//! assert_eq!(rates.ncols(), bins.len());
//! ```

pub mod address;
pub mod connections;
pub mod decoder;
pub mod error;
pub mod events;
pub mod pattern;
pub mod population;

/// The number of neurons on one physical core.
pub const NEURONS_PER_CORE: u16 = 256;
/// The number of cores on one physical chip.
pub const CORES_PER_CHIP: u8 = 4;
/// The number of physical chips on the device.
pub const CHIPS_PER_DEVICE: u8 = 4;
/// The number of neurons on one physical chip.
pub const NEURONS_PER_CHIP: u16 = NEURONS_PER_CORE * CORES_PER_CHIP as u16;
/// The reserved chip ID used to address host-injected (virtual) input neurons.
pub const VIRTUAL_CHIP_ID: u8 = 4;

/// The largest event delay representable by the FPGA spike generator, in ISI units.
pub const MAX_DELAY: u32 = (1 << 16) - 1;
/// The capacity of the on-device stimulus buffer, in events.
pub const MAX_STIMULUS_EVENTS: usize = (1 << 15) - 1;
/// The ISI base giving a time resolution of one microsecond.
pub const ISI_US_BASE: f64 = 90.0;
