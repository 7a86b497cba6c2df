//! Connectivity between populations and the device-loadable connection table.
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};
use serde::{Deserialize, Serialize};

use crate::address::{Neuron, SynapseType};
use crate::error::DynapseError;
use crate::population::Population;

/// The policy deciding which (source, destination) pairs get connected.
#[derive(Debug, PartialEq, Clone)]
pub enum ConnectionPolicy {
    /// Every pair connects independently with probability `p`.
    Bernoulli { p: f64 },
    /// Every pair connects with probability `k * exp(-d^2 / (2 r^2))`, where `d`
    /// is the Euclidean distance between the two neurons on their populations'
    /// 2-D shape grids.
    Gaussian { k: f64, r: f64 },
    /// Every source neuron connects to `floor(f * |destination|)` destination
    /// neurons drawn uniformly without replacement.
    Deterministic { f: f64 },
    /// An explicit `|source| x |destination|` weight matrix; every non-zero entry
    /// becomes a connection with the entry (cast to integer) as weight.
    Matrix(DMatrix<f64>),
}

/// A single connection of the table.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub source: Neuron,
    pub target: Neuron,
    pub weight: i32,
    /// The synapse type the connection is programmed with. Defaults to the
    /// source neuron's own type.
    pub synapse_type: SynapseType,
}

/// An external description of synapses as three parallel arrays, e.g. coming
/// from a network simulator. Any collaborator exposing this shape is accepted.
pub trait SynapseSpec {
    fn source_indices(&self) -> &[usize];
    fn target_indices(&self) -> &[usize];
    fn weights(&self) -> &[f64];
}

/// The connections between one source and one destination population.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Connections {
    source_name: String,
    target_name: String,
    connections: Vec<Connection>,
}

impl Connections {
    /// Connect two populations under the given policy.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rusty_dynapse::address::SynapseType;
    /// use rusty_dynapse::connections::{ConnectionPolicy, Connections};
    /// use rusty_dynapse::population::{NeuronRange, Population};
    /// use rand::SeedableRng;
    /// use rand_chacha::ChaCha8Rng;
    ///
    /// let mut source = Population::new("in");
    /// source.add_neurons(
    ///     NeuronRange::Run { chip_id: 0, core_id: 0, start_neuron: 0, size: 1 },
    ///     SynapseType::FastExcitatory,
    /// ).unwrap();
    /// let mut target = Population::new("out");
    /// target.add_neurons(
    ///     NeuronRange::Run { chip_id: 0, core_id: 1, start_neuron: 0, size: 10 },
    ///     SynapseType::Unassigned,
    /// ).unwrap();
    ///
    /// let mut rng = ChaCha8Rng::seed_from_u64(1);
    /// let connections = Connections::connect(
    ///     &source,
    ///     &target,
    ///     &ConnectionPolicy::Deterministic { f: 0.3 },
    ///     &mut rng,
    /// ).unwrap();
    /// assert_eq!(connections.len(), 3);
    /// ```
    pub fn connect<R: Rng>(
        source: &Population,
        target: &Population,
        policy: &ConnectionPolicy,
        rng: &mut R,
    ) -> Result<Self, DynapseError> {
        let invalid = |detail: String| {
            DynapseError::InvalidConfiguration(format!(
                "Error while connecting populations {} -> {}: {}",
                source.name(),
                target.name(),
                detail
            ))
        };

        let mut connections = Vec::new();
        match policy {
            ConnectionPolicy::Bernoulli { p } => {
                let trial = Bernoulli::new(*p)
                    .map_err(|_| invalid(format!("probability {} is not within [0, 1]", p)))?;
                for src in source.neurons() {
                    for dst in target.neurons() {
                        if trial.sample(rng) {
                            connections.push(Connection {
                                source: *src,
                                target: *dst,
                                weight: 1,
                                synapse_type: src.synapse_type,
                            });
                        }
                    }
                }
            }
            ConnectionPolicy::Gaussian { k, r } => {
                if !(0.0..=1.0).contains(k) {
                    return Err(invalid(format!("gain {} is not within [0, 1]", k)));
                }
                if *r <= 0.0 {
                    return Err(invalid(format!("radius {} is not positive", r)));
                }
                for (i, src) in source.neurons().iter().enumerate() {
                    let (src_row, src_col) = source.position(i);
                    for (j, dst) in target.neurons().iter().enumerate() {
                        let (dst_row, dst_col) = target.position(j);
                        let d_row = dst_row as f64 - src_row as f64;
                        let d_col = dst_col as f64 - src_col as f64;
                        let squared_distance = d_row * d_row + d_col * d_col;
                        let p = k * (-squared_distance / (2.0 * r * r)).exp();
                        let trial = Bernoulli::new(p)
                            .map_err(|_| invalid(format!("probability {} is not within [0, 1]", p)))?;
                        if trial.sample(rng) {
                            connections.push(Connection {
                                source: *src,
                                target: *dst,
                                weight: 1,
                                synapse_type: src.synapse_type,
                            });
                        }
                    }
                }
            }
            ConnectionPolicy::Deterministic { f } => {
                if !(0.0..=1.0).contains(f) {
                    return Err(invalid(format!("fraction {} is not within [0, 1]", f)));
                }
                let per_source = (f * target.len() as f64).floor() as usize;
                for src in source.neurons() {
                    let mut picked = rand::seq::index::sample(rng, target.len(), per_source)
                        .into_vec();
                    picked.sort_unstable();
                    for j in picked {
                        connections.push(Connection {
                            source: *src,
                            target: *target.neuron(j).expect("sampled index within bounds"),
                            weight: 1,
                            synapse_type: src.synapse_type,
                        });
                    }
                }
            }
            ConnectionPolicy::Matrix(weights) => {
                if weights.nrows() != source.len() || weights.ncols() != target.len() {
                    return Err(invalid(format!(
                        "weight matrix is {}x{} but the populations are {}x{}",
                        weights.nrows(),
                        weights.ncols(),
                        source.len(),
                        target.len()
                    )));
                }
                for i in 0..source.len() {
                    for j in 0..target.len() {
                        let weight = weights[(i, j)];
                        if weight != 0.0 {
                            let src = source.neuron(i).expect("index within bounds");
                            connections.push(Connection {
                                source: *src,
                                target: *target.neuron(j).expect("index within bounds"),
                                weight: weight as i32,
                                synapse_type: src.synapse_type,
                            });
                        }
                    }
                }
            }
        }

        Ok(Connections {
            source_name: source.name().to_string(),
            target_name: target.name().to_string(),
            connections,
        })
    }

    /// Connect two populations from explicit index and weight lists.
    /// The three lists must have identical lengths and the indices must fall
    /// within the respective populations.
    pub fn from_indices(
        source: &Population,
        target: &Population,
        source_indices: &[usize],
        target_indices: &[usize],
        weights: &[f64],
    ) -> Result<Self, DynapseError> {
        if source_indices.len() != target_indices.len()
            || source_indices.len() != weights.len()
        {
            return Err(DynapseError::InvalidConfiguration(format!(
                "Error while connecting populations {} -> {}: index and weight lists have lengths {}/{}/{}",
                source.name(),
                target.name(),
                source_indices.len(),
                target_indices.len(),
                weights.len()
            )));
        }

        let mut connections = Vec::with_capacity(weights.len());
        for ((&i, &j), &weight) in source_indices.iter().zip(target_indices).zip(weights) {
            let src = source.neuron(i).ok_or_else(|| {
                DynapseError::OutOfRange(format!(
                    "Source index {} exceeds the size of population {}",
                    i,
                    source.name()
                ))
            })?;
            let dst = target.neuron(j).ok_or_else(|| {
                DynapseError::OutOfRange(format!(
                    "Target index {} exceeds the size of population {}",
                    j,
                    target.name()
                ))
            })?;
            connections.push(Connection {
                source: *src,
                target: *dst,
                weight: weight as i32,
                synapse_type: src.synapse_type,
            });
        }

        Ok(Connections {
            source_name: source.name().to_string(),
            target_name: target.name().to_string(),
            connections,
        })
    }

    /// Connect two populations from an external synapse description.
    pub fn from_synapses<S: SynapseSpec>(
        source: &Population,
        target: &Population,
        synapses: &S,
    ) -> Result<Self, DynapseError> {
        Self::from_indices(
            source,
            target,
            synapses.source_indices(),
            synapses.target_indices(),
            synapses.weights(),
        )
    }

    /// Override the per-connection synapse types with an explicit list.
    pub fn with_types(mut self, types: &[SynapseType]) -> Result<Self, DynapseError> {
        if types.len() != self.connections.len() {
            return Err(DynapseError::InvalidConfiguration(format!(
                "Error while connecting populations {} -> {}: {} types given for {} connections",
                self.source_name,
                self.target_name,
                types.len(),
                self.connections.len()
            )));
        }
        for (connection, &synapse_type) in self.connections.iter_mut().zip(types) {
            connection.synapse_type = synapse_type;
        }
        Ok(self)
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    /// Save the connections to a JSON file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), DynapseError> {
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| DynapseError::Io(e.to_string()))?;
        writer.flush()?;
        Ok(())
    }

    /// Load connections back from a JSON file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Connections, DynapseError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| DynapseError::Io(e.to_string()))
    }
}

/// Write connection batches to a text table ready to be uploaded to the device.
///
/// Every batch is introduced by a separator line naming the two populations,
/// followed by one line per connection in the form
/// `U00C00N001->3-1-U00C01N017`.
pub fn write_connections<P: AsRef<Path>>(
    path: P,
    batches: &[&Connections],
) -> Result<(), DynapseError> {
    let file = File::create(&path).map_err(|e| {
        DynapseError::Io(format!(
            "Error while writing file {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;
    let mut writer = BufWriter::new(file);
    for batch in batches {
        writeln!(
            writer,
            "#!======================================== Connecting {}->{}",
            batch.source_name, batch.target_name
        )?;
        for connection in batch.iter() {
            writeln!(
                writer,
                "{}->{}-{}-{}",
                connection.source.address,
                connection.synapse_type,
                connection.weight,
                connection.target.address
            )?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::NeuronRange;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Read;

    const SEED: u64 = 42;

    fn population(name: &str, core_id: u8, size: usize, synapse_type: SynapseType) -> Population {
        let mut population = Population::new(name);
        population
            .add_neurons(
                NeuronRange::Run {
                    chip_id: 0,
                    core_id,
                    start_neuron: 0,
                    size,
                },
                synapse_type,
            )
            .unwrap();
        population
    }

    #[test]
    fn test_bernoulli_extremes() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let source = population("a", 0, 4, SynapseType::FastExcitatory);
        let target = population("b", 1, 5, SynapseType::Unassigned);

        let all =
            Connections::connect(&source, &target, &ConnectionPolicy::Bernoulli { p: 1.0 }, &mut rng)
                .unwrap();
        assert_eq!(all.len(), 20);
        assert!(all
            .iter()
            .all(|c| c.synapse_type == SynapseType::FastExcitatory && c.weight == 1));

        let none =
            Connections::connect(&source, &target, &ConnectionPolicy::Bernoulli { p: 0.0 }, &mut rng)
                .unwrap();
        assert!(none.is_empty());

        assert!(matches!(
            Connections::connect(
                &source,
                &target,
                &ConnectionPolicy::Bernoulli { p: 1.5 },
                &mut rng
            ),
            Err(DynapseError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_gaussian_full_gain_connects_overlapping_positions() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let source = population("a", 0, 1, SynapseType::SlowExcitatory);
        let target = population("b", 1, 1, SynapseType::Unassigned);

        // Both single neurons sit at grid position (0, 0): distance 0, p = k = 1.
        let connections = Connections::connect(
            &source,
            &target,
            &ConnectionPolicy::Gaussian { k: 1.0, r: 2.0 },
            &mut rng,
        )
        .unwrap();
        assert_eq!(connections.len(), 1);

        assert!(matches!(
            Connections::connect(
                &source,
                &target,
                &ConnectionPolicy::Gaussian { k: 1.0, r: 0.0 },
                &mut rng
            ),
            Err(DynapseError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_deterministic_connectivity() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let source = population("a", 0, 1, SynapseType::FastInhibitory);
        let target = population("b", 1, 10, SynapseType::Unassigned);

        let connections = Connections::connect(
            &source,
            &target,
            &ConnectionPolicy::Deterministic { f: 0.3 },
            &mut rng,
        )
        .unwrap();
        assert_eq!(connections.len(), 3);

        // Destinations are distinct.
        let mut targets: Vec<_> = connections.iter().map(|c| c.target.address).collect();
        targets.dedup();
        assert_eq!(targets.len(), 3);
    }

    #[test]
    fn test_matrix_connectivity() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let source = population("a", 0, 2, SynapseType::FastExcitatory);
        let target = population("b", 1, 3, SynapseType::Unassigned);

        let weights = DMatrix::from_row_slice(2, 3, &[0.0, 2.0, 0.0, 3.0, 0.0, 0.0]);
        let connections = Connections::connect(
            &source,
            &target,
            &ConnectionPolicy::Matrix(weights),
            &mut rng,
        )
        .unwrap();
        assert_eq!(connections.len(), 2);
        let weights: Vec<_> = connections.iter().map(|c| c.weight).collect();
        assert_eq!(weights, vec![2, 3]);

        let wrong_shape = DMatrix::from_row_slice(1, 3, &[1.0, 1.0, 1.0]);
        assert!(matches!(
            Connections::connect(
                &source,
                &target,
                &ConnectionPolicy::Matrix(wrong_shape),
                &mut rng
            ),
            Err(DynapseError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_from_indices() {
        let source = population("a", 0, 2, SynapseType::FastExcitatory);
        let target = population("b", 1, 2, SynapseType::Unassigned);

        let connections =
            Connections::from_indices(&source, &target, &[0, 1], &[1, 0], &[1.0, 2.0]).unwrap();
        assert_eq!(connections.len(), 2);
        assert_eq!(
            connections.iter().map(|c| c.weight).collect::<Vec<_>>(),
            vec![1, 2]
        );

        assert!(matches!(
            Connections::from_indices(&source, &target, &[0], &[1, 0], &[1.0, 2.0]),
            Err(DynapseError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Connections::from_indices(&source, &target, &[5], &[0], &[1.0]),
            Err(DynapseError::OutOfRange(_))
        ));
    }

    struct FakeSynapses {
        i: Vec<usize>,
        j: Vec<usize>,
        w: Vec<f64>,
    }

    impl SynapseSpec for FakeSynapses {
        fn source_indices(&self) -> &[usize] {
            &self.i
        }
        fn target_indices(&self) -> &[usize] {
            &self.j
        }
        fn weights(&self) -> &[f64] {
            &self.w
        }
    }

    #[test]
    fn test_from_synapses() {
        let source = population("a", 0, 3, SynapseType::SlowInhibitory);
        let target = population("b", 1, 3, SynapseType::Unassigned);
        let synapses = FakeSynapses {
            i: vec![0, 2],
            j: vec![2, 0],
            w: vec![1.0, 1.0],
        };
        let connections = Connections::from_synapses(&source, &target, &synapses).unwrap();
        assert_eq!(connections.len(), 2);
        assert!(connections
            .iter()
            .all(|c| c.synapse_type == SynapseType::SlowInhibitory));
    }

    #[test]
    fn test_with_types() {
        let source = population("a", 0, 1, SynapseType::FastExcitatory);
        let target = population("b", 1, 1, SynapseType::Unassigned);
        let connections =
            Connections::from_indices(&source, &target, &[0], &[0], &[1.0]).unwrap();

        let retyped = connections
            .clone()
            .with_types(&[SynapseType::SlowInhibitory])
            .unwrap();
        assert_eq!(
            retyped.iter().next().unwrap().synapse_type,
            SynapseType::SlowInhibitory
        );

        assert!(matches!(
            connections.with_types(&[]),
            Err(DynapseError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_save_load() {
        let source = population("a", 0, 2, SynapseType::FastExcitatory);
        let target = population("b", 1, 2, SynapseType::Unassigned);
        let connections =
            Connections::from_indices(&source, &target, &[0, 1], &[1, 0], &[1.0, 2.0]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connections.json");
        connections.save_to(&path).unwrap();
        let loaded = Connections::load_from(&path).unwrap();
        assert_eq!(loaded, connections);
    }

    #[test]
    fn test_write_connections() {
        let source = population("sensors", 0, 1, SynapseType::FastExcitatory);
        let target = population("pool", 1, 2, SynapseType::Unassigned);
        let connections =
            Connections::from_indices(&source, &target, &[0, 0], &[0, 1], &[1.0, 2.0]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.txt");
        write_connections(&path, &[&connections]).unwrap();

        let mut contents = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(
            lines[0],
            "#!======================================== Connecting sensors->pool"
        );
        assert_eq!(lines[1], "U00C00N000->3-1-U00C01N000");
        assert_eq!(lines[2], "U00C00N000->3-2-U00C01N001");
    }
}
